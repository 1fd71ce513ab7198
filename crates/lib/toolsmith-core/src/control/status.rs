use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::Connection;
use toolsmith_store::schema::make_tool_name;
use tracing::info;

use crate::modules::ModuleState;
use crate::store::updated_within;

use super::{ControlError, ToolsmithControlPlane};

/// Registry state of a tool name relative to the staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorState {
    /// No registry row.
    Pending,
    /// Updated within the threshold.
    Ready,
    /// Updated before the threshold.
    Stale,
}

/// Whether a tool in the given states can be dispatched.
#[must_use]
pub fn reconcile(descriptor: DescriptorState, module: ModuleState) -> bool {
    matches!(descriptor, DescriptorState::Ready | DescriptorState::Stale)
        && module == ModuleState::Built
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub interface_name: Option<String>,
    pub descriptor: DescriptorState,
    pub module: ModuleState,
    pub servable: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeleteReport {
    pub descriptor_removed: bool,
    pub module_removed: bool,
}

impl<C: Connection> ToolsmithControlPlane<C> {
    /// Reports descriptor and module state for every known tool name: every
    /// stored interface plus every registry row.
    ///
    /// # Errors
    /// Returns `ControlError` if the stores or the module directory cannot be
    /// read.
    pub async fn status(&self, threshold: Duration) -> Result<Vec<ToolStatus>, ControlError> {
        let now = self.clock().now();
        let mut names: BTreeMap<String, (Option<String>, Option<DateTime<Utc>>)> = BTreeMap::new();

        for record in self.interfaces().list_all().await? {
            if let Some(tool_name) = make_tool_name(&record.interface_name) {
                names.entry(tool_name).or_default().0 = Some(record.interface_name);
            }
        }
        for descriptor in self.registry().list_all().await? {
            names.entry(descriptor.name).or_default().1 = Some(descriptor.updated_at);
        }

        let mut statuses = Vec::with_capacity(names.len());
        for (name, (interface_name, updated_at)) in names {
            let descriptor = match updated_at {
                None => DescriptorState::Pending,
                Some(at) if updated_within(at, threshold, now) => DescriptorState::Ready,
                Some(_) => DescriptorState::Stale,
            };
            let module = self.layout().state(&name).await?;
            statuses.push(ToolStatus {
                servable: reconcile(descriptor, module),
                name,
                interface_name,
                descriptor,
                module,
                updated_at,
            });
        }
        Ok(statuses)
    }

    /// Deletes a registry row and, when asked, its module file.
    ///
    /// # Errors
    /// Returns `ControlError` if the registry delete or the file removal fails.
    pub async fn delete_tool(
        &self,
        name: &str,
        remove_module: bool,
    ) -> Result<DeleteReport, ControlError> {
        let descriptor_removed = self.registry().delete_by_name(name).await?;
        let module_removed = if remove_module {
            self.layout().remove(name).await?
        } else {
            false
        };
        info!(tool = name, descriptor_removed, module_removed, "tool deleted");
        Ok(DeleteReport {
            descriptor_removed,
            module_removed,
        })
    }
}
