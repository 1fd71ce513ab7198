use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{Connection, Surreal};
use toolsmith_store::models::{InputSchema, ToolDescriptor};
use toolsmith_store::schema::TABLE_TOOL;

use super::{StoreError, StoreResult, SurrealToolStore, ensure_non_empty};

/// Stored form of a tool descriptor. The schema is kept as a JSON string and
/// timestamps as RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRow {
    pub name: String,
    pub description: String,
    pub input_schema: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<&ToolDescriptor> for ToolRow {
    type Error = StoreError;

    fn try_from(descriptor: &ToolDescriptor) -> Result<Self, Self::Error> {
        let input_schema = serde_json::to_string(&descriptor.input_schema).map_err(|err| {
            StoreError::InvalidInput(format!(
                "schema for {} is not serializable: {err}",
                descriptor.name
            ))
        })?;
        Ok(Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input_schema,
            created_at: descriptor.created_at.to_rfc3339(),
            updated_at: descriptor.updated_at.to_rfc3339(),
        })
    }
}

impl TryFrom<ToolRow> for ToolDescriptor {
    type Error = StoreError;

    fn try_from(row: ToolRow) -> Result<Self, Self::Error> {
        let input_schema: InputSchema = serde_json::from_str(&row.input_schema).map_err(|err| {
            StoreError::InvalidInput(format!("stored schema for {} is malformed: {err}", row.name))
        })?;
        let created_at = parse_timestamp(&row.created_at, &row.name)?;
        let updated_at = parse_timestamp(&row.updated_at, &row.name)?;
        Ok(Self {
            name: row.name,
            description: row.description,
            input_schema,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(value: &str, name: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| {
            StoreError::InvalidInput(format!("stored timestamp for {name} is malformed: {err}"))
        })
}

/// Registry of synthesized tools keyed by tool name.
pub struct ToolRegistry<C: Connection> {
    db: Arc<Surreal<C>>,
}

impl<C: Connection> Clone for ToolRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealToolStore<C> {
    #[must_use]
    pub fn registry(&self) -> ToolRegistry<C> {
        ToolRegistry {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> ToolRegistry<C> {
    /// Inserts or updates a descriptor by name, keeping the original
    /// `created_at` of an existing row.
    ///
    /// # Errors
    /// Returns `StoreError` if the name is empty or the database write fails.
    pub async fn upsert(&self, descriptor: ToolDescriptor) -> StoreResult<ToolDescriptor> {
        ensure_non_empty(&descriptor.name, "name")?;
        let mut row = ToolRow::try_from(&descriptor)?;
        let existing: Option<ToolRow> =
            self.db.select((TABLE_TOOL, descriptor.name.as_str())).await?;
        if let Some(existing) = existing {
            row.created_at = existing.created_at;
        }
        let stored: Option<ToolRow> = self
            .db
            .upsert((TABLE_TOOL, descriptor.name.as_str()))
            .content(row.clone())
            .await?;
        ToolDescriptor::try_from(stored.unwrap_or(row))
    }

    /// Fetches a descriptor by tool name.
    ///
    /// # Errors
    /// Returns `StoreError` if the query fails or the stored row is malformed.
    pub async fn get_by_name(&self, name: &str) -> StoreResult<Option<ToolDescriptor>> {
        let row: Option<ToolRow> = self.db.select((TABLE_TOOL, name)).await?;
        row.map(ToolDescriptor::try_from).transpose()
    }

    /// Lists every descriptor ordered by name.
    ///
    /// # Errors
    /// Returns `StoreError` if the query fails or a stored row is malformed.
    pub async fn list_all(&self) -> StoreResult<Vec<ToolDescriptor>> {
        let query = format!("SELECT * FROM {TABLE_TOOL} ORDER BY name ASC;");
        let mut response = self.db.query(query).await?;
        let rows: Vec<ToolRow> = response.take(0)?;
        rows.into_iter().map(ToolDescriptor::try_from).collect()
    }

    /// Removes a descriptor. Returns whether a row existed.
    ///
    /// # Errors
    /// Returns `StoreError` if the database delete fails.
    pub async fn delete_by_name(&self, name: &str) -> StoreResult<bool> {
        let removed: Option<ToolRow> = self.db.delete((TABLE_TOOL, name)).await?;
        Ok(removed.is_some())
    }

    /// Whether the named tool was updated within `window` of the wall clock.
    ///
    /// # Errors
    /// Returns `StoreError` if the lookup fails.
    pub async fn is_recently_updated(&self, name: &str, window: Duration) -> StoreResult<bool> {
        self.is_recently_updated_at(name, window, Utc::now()).await
    }

    /// Whether the named tool was updated within `window` of `now`. A name
    /// without a row is never recent.
    ///
    /// # Errors
    /// Returns `StoreError` if the lookup fails.
    pub async fn is_recently_updated_at(
        &self,
        name: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self
            .get_by_name(name)
            .await?
            .is_some_and(|descriptor| updated_within(descriptor.updated_at, window, now)))
    }
}

/// Whether `updated_at` falls within `window` before `now`.
#[must_use]
pub fn updated_within(updated_at: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    let Ok(window) = chrono::Duration::from_std(window) else {
        return true;
    };
    now.signed_duration_since(updated_at) < window
}
