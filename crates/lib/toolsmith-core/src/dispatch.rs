//! Runtime dispatch of synthesized tools.
//!
//! The dispatcher keeps an in-memory table of registry descriptors, resolves a
//! tool name to a module through a [`ModuleLoader`], runs it on its own task
//! under a timeout, and folds every failure into a [`DispatchOutcome`].

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use serde_json::Value;
use surrealdb::Connection;
use tokio::sync::RwLock;
use toolsmith_store::models::ToolDescriptor;
use tracing::{debug, warn};

use crate::modules::{JsonObject, ModuleFailure, ModuleLoader, run_bounded};
use crate::store::{StoreResult, ToolRegistry};

pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Records serialized as pretty JSON.
    Success(String),
    NotFound { name: String },
    MalformedTool { name: String, reason: String },
    Execution {
        name: String,
        message: String,
        line: Option<u32>,
    },
}

impl DispatchOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(payload) => write!(f, "{payload}"),
            Self::NotFound { name } => write!(f, "Unknown tool: {name}"),
            Self::MalformedTool { name, reason } => {
                write!(f, "Tool {name} is not usable: {reason}")
            }
            Self::Execution {
                name,
                message,
                line: Some(line),
            } => write!(f, "Error executing tool {name} at line {line}: {message}"),
            Self::Execution {
                name,
                message,
                line: None,
            } => write!(f, "Error executing tool {name}: {message}"),
        }
    }
}

/// Lists and invokes registered tools.
pub struct Dispatcher<C: Connection> {
    registry: ToolRegistry<C>,
    loader: Arc<dyn ModuleLoader>,
    table: RwLock<HashMap<String, ToolDescriptor>>,
    invoke_timeout: Duration,
}

impl<C: Connection> Dispatcher<C> {
    #[must_use]
    pub fn new(registry: ToolRegistry<C>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            registry,
            loader,
            table: RwLock::new(HashMap::new()),
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Reloads the tool table from the registry.
    ///
    /// # Errors
    /// Returns `StoreError` if the registry cannot be read.
    pub async fn refresh(&self) -> StoreResult<Vec<ToolDescriptor>> {
        let descriptors = self.registry.list_all().await?;
        let table = descriptors
            .iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor.clone()))
            .collect();
        *self.table.write().await = table;
        debug!(tools = descriptors.len(), "tool table refreshed");
        Ok(descriptors)
    }

    /// Every registry descriptor, ordered by name.
    ///
    /// # Errors
    /// Returns `StoreError` if the registry cannot be read.
    pub async fn list_tools(&self) -> StoreResult<Vec<ToolDescriptor>> {
        self.refresh().await
    }

    /// Looks a tool up, preferring the registry over the cached table.
    ///
    /// A name missing from the table triggers one full refresh. A cached name
    /// is re-read from the registry so deletes and rebuilds made elsewhere are
    /// seen on the next call.
    async fn resolve(&self, name: &str) -> StoreResult<Option<ToolDescriptor>> {
        let cached = self.table.read().await.contains_key(name);
        if !cached {
            self.refresh().await?;
            return Ok(self.table.read().await.get(name).cloned());
        }

        let current = self.registry.get_by_name(name).await?;
        let mut table = self.table.write().await;
        table.remove(name);
        if let Some(descriptor) = &current {
            table.insert(descriptor.name.clone(), descriptor.clone());
        }
        drop(table);
        if current.is_none() {
            debug!(tool = name, "tool left the registry; evicted");
        }
        Ok(current)
    }

    /// Invokes a tool by name.
    ///
    /// # Errors
    /// Returns `StoreError` only when the registry cannot be read; every
    /// module-side failure is reported as a `DispatchOutcome`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> StoreResult<DispatchOutcome> {
        let Some(descriptor) = self.resolve(name).await? else {
            return Ok(DispatchOutcome::NotFound {
                name: name.to_string(),
            });
        };

        let module = match self.loader.load(&descriptor.name).await {
            Ok(module) => module,
            Err(err) => {
                warn!(tool = name, error = %err, "tool module unavailable");
                return Ok(DispatchOutcome::MalformedTool {
                    name: descriptor.name,
                    reason: err.to_string(),
                });
            }
        };

        let result = run_bounded(
            module.execute(arguments.unwrap_or_default()),
            self.invoke_timeout,
        )
        .await;

        Ok(match result {
            Ok(value) => records_outcome(descriptor.name, value),
            Err(ModuleFailure::Raised { message, line }) => {
                warn!(tool = name, error = %message, "tool raised");
                DispatchOutcome::Execution {
                    name: descriptor.name,
                    message,
                    line,
                }
            }
            Err(failure @ (ModuleFailure::Load(_) | ModuleFailure::Contract(_))) => {
                DispatchOutcome::MalformedTool {
                    name: descriptor.name,
                    reason: failure.to_string(),
                }
            }
        })
    }
}

fn records_outcome(name: String, value: Value) -> DispatchOutcome {
    let is_records = value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_object));
    if !is_records {
        return DispatchOutcome::MalformedTool {
            name,
            reason: "execute did not return a list of records".to_string(),
        };
    }
    match serde_json::to_string_pretty(&value) {
        Ok(payload) => DispatchOutcome::Success(payload),
        Err(err) => DispatchOutcome::MalformedTool {
            name,
            reason: format!("records are not serializable: {err}"),
        },
    }
}
