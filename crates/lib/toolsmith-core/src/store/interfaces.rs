use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use surrealdb::{Connection, Surreal};
use toolsmith_store::models::InterfaceRecord;
use toolsmith_store::schema::TABLE_INTERFACE;

use super::{StoreError, StoreResult, SurrealToolStore, ensure_non_empty};

/// Stored form of an interface record; `position` keeps document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRow {
    pub position: i64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_category: Option<String>,
    pub interface_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_example: Option<String>,
    pub updated_at: String,
}

impl InterfaceRow {
    fn new(position: i64, record: InterfaceRecord, updated_at: String) -> Self {
        Self {
            position,
            category: record.category,
            sub_category: record.sub_category,
            third_category: record.third_category,
            interface_name: record.interface_name,
            target_url: record.target_url,
            description: record.description,
            limit_info: record.limit_info,
            input_params: record.input_params,
            output_params: record.output_params,
            example: record.example,
            data_example: record.data_example,
            updated_at,
        }
    }
}

impl From<InterfaceRow> for InterfaceRecord {
    fn from(row: InterfaceRow) -> Self {
        Self {
            category: row.category,
            sub_category: row.sub_category,
            third_category: row.third_category,
            interface_name: row.interface_name,
            target_url: row.target_url,
            description: row.description,
            limit_info: row.limit_info,
            input_params: row.input_params,
            output_params: row.output_params,
            example: row.example,
            data_example: row.data_example,
        }
    }
}

#[derive(Deserialize)]
struct TableInfo {
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

/// Persisted snapshot of the parsed documentation.
pub struct InterfaceStore<C: Connection> {
    db: Arc<Surreal<C>>,
}

impl<C: Connection> Clone for InterfaceStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealToolStore<C> {
    #[must_use]
    pub fn interfaces(&self) -> InterfaceStore<C> {
        InterfaceStore {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> InterfaceStore<C> {
    /// Replaces every stored interface with `records` in one transaction.
    ///
    /// # Errors
    /// Returns `StoreError` if a record has no interface name or the
    /// transaction fails.
    pub async fn replace_all(&self, records: Vec<InterfaceRecord>) -> StoreResult<usize> {
        for record in &records {
            ensure_non_empty(&record.interface_name, "interface_name")?;
        }
        let updated_at = Utc::now().to_rfc3339();
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let position = i64::try_from(index).map_err(|_| {
                    StoreError::InvalidInput("too many interface records".to_string())
                })?;
                Ok(InterfaceRow::new(position, record, updated_at.clone()))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let count = rows.len();

        let response = if rows.is_empty() {
            self.db
                .query(format!("DELETE {TABLE_INTERFACE};"))
                .await?
        } else {
            self.db
                .query(format!(
                    "BEGIN TRANSACTION; DELETE {TABLE_INTERFACE}; INSERT INTO {TABLE_INTERFACE} $rows; COMMIT TRANSACTION;"
                ))
                .bind(("rows", rows))
                .await?
        };
        response.check()?;
        Ok(count)
    }

    /// Lists stored interfaces in document order.
    ///
    /// # Errors
    /// Returns `StoreError` if the database query fails.
    pub async fn list_all(&self) -> StoreResult<Vec<InterfaceRecord>> {
        let query = format!("SELECT * FROM {TABLE_INTERFACE} ORDER BY position ASC;");
        let mut response = self.db.query(query).await?;
        let rows: Vec<InterfaceRow> = response.take(0)?;
        Ok(rows.into_iter().map(InterfaceRecord::from).collect())
    }

    /// Column names as defined on the interface table.
    ///
    /// # Errors
    /// Returns `StoreError` if the table cannot be introspected.
    pub async fn columns(&self) -> StoreResult<Vec<String>> {
        let mut response = self
            .db
            .query(format!("INFO FOR TABLE {TABLE_INTERFACE};"))
            .await?;
        let info: Option<TableInfo> = response.take(0)?;
        Ok(info
            .map(|info| info.fields.into_keys().collect())
            .unwrap_or_default())
    }
}
