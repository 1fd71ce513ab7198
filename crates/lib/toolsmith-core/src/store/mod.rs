//! `SurrealDB` backing store for interface records and the tool registry.
//!
//! One store handle serves both tables; the interface and registry
//! operations live in their own modules.

mod interfaces;
mod tools;

use std::{error::Error, fmt, sync::Arc};

use surrealdb::{Connection, Surreal};
use toolsmith_store::schema::{TABLE_INTERFACE, TABLE_TOOL};

pub use interfaces::{InterfaceRow, InterfaceStore};
pub use tools::{ToolRegistry, ToolRow, updated_within};

#[derive(Debug)]
pub enum StoreError {
    Surreal(Box<surrealdb::Error>),
    InvalidInput(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surreal(err) => write!(f, "SurrealDB error: {err}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Surreal(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct SurrealToolStore<C: Connection> {
    db: Arc<Surreal<C>>,
}

impl<C: Connection> Clone for SurrealToolStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealToolStore<C> {
    #[must_use]
    pub fn new(db: Surreal<C>) -> Self {
        Self { db: Arc::new(db) }
    }

    #[must_use]
    pub const fn from_arc(db: Arc<Surreal<C>>) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn db(&self) -> &Surreal<C> {
        &self.db
    }

    /// Defines both tables, their fields and the unique tool name index.
    /// Safe to call on every start.
    ///
    /// # Errors
    /// Returns `StoreError` if a definition statement fails.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let statements = format!(
            "
            DEFINE TABLE IF NOT EXISTS {TABLE_INTERFACE} SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS position ON {TABLE_INTERFACE} TYPE int;
            DEFINE FIELD IF NOT EXISTS category ON {TABLE_INTERFACE} TYPE string;
            DEFINE FIELD IF NOT EXISTS sub_category ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS third_category ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS interface_name ON {TABLE_INTERFACE} TYPE string;
            DEFINE FIELD IF NOT EXISTS target_url ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS description ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS limit_info ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS input_params ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS output_params ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS example ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS data_example ON {TABLE_INTERFACE} TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS updated_at ON {TABLE_INTERFACE} TYPE string;

            DEFINE TABLE IF NOT EXISTS {TABLE_TOOL} SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS name ON {TABLE_TOOL} TYPE string;
            DEFINE FIELD IF NOT EXISTS description ON {TABLE_TOOL} TYPE string;
            DEFINE FIELD IF NOT EXISTS input_schema ON {TABLE_TOOL} TYPE string;
            DEFINE FIELD IF NOT EXISTS created_at ON {TABLE_TOOL} TYPE string;
            DEFINE FIELD IF NOT EXISTS updated_at ON {TABLE_TOOL} TYPE string;
            DEFINE INDEX IF NOT EXISTS {TABLE_TOOL}_name ON {TABLE_TOOL} FIELDS name UNIQUE;
            "
        );
        self.db.query(statements).await?.check()?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, field: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}
