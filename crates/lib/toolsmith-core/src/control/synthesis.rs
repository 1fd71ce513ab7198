use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use surrealdb::Connection;
use toolsmith_store::models::{InputSchema, InterfaceRecord, ToolDescriptor};
use toolsmith_store::schema::make_tool_name;
use tracing::{info, warn};

use crate::generation::{CodeGenerator, SynthesisPrompt};
use crate::inference::try_infer_schema;

use super::{ControlError, ToolsmithControlPlane};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisFailureKind {
    Generation,
    ModuleWrite,
    InvalidName,
}

/// A record the batch could not turn into a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisFailure {
    pub interface_name: String,
    pub tool_name: Option<String>,
    pub kind: SynthesisFailureKind,
    pub message: String,
}

/// Outcome of one synthesis batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub synthesized: Vec<ToolDescriptor>,
    pub skipped_recent: Vec<String>,
    pub skipped_invalid: usize,
    pub failures: Vec<SynthesisFailure>,
    /// Generator calls made; bounded by `max_records`.
    pub attempted: usize,
}

/// Turns stored interfaces into module files and registry rows.
pub struct SynthesisOrchestrator<C: Connection> {
    control: ToolsmithControlPlane<C>,
    generator: Arc<dyn CodeGenerator>,
    call_interval: Option<Duration>,
    force: bool,
}

impl<C: Connection> SynthesisOrchestrator<C> {
    #[must_use]
    pub fn new(control: ToolsmithControlPlane<C>, generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            control,
            generator,
            call_interval: None,
            force: false,
        }
    }

    /// Waits this long between consecutive generator calls.
    #[must_use]
    pub const fn with_call_interval(mut self, interval: Option<Duration>) -> Self {
        self.call_interval = interval;
        self
    }

    /// Ignores the staleness gate.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub const fn control(&self) -> &ToolsmithControlPlane<C> {
        &self.control
    }

    /// Synthesizes tools for stored interfaces in document order until
    /// `max_records` generator calls have been made.
    ///
    /// Interfaces whose tool was updated within `staleness` are skipped without
    /// a call. Generator and write failures are recorded in the report and the
    /// batch continues.
    ///
    /// # Errors
    /// Returns `ControlError` if reading interfaces or writing the registry
    /// fails.
    pub async fn synthesize_batch(
        &self,
        max_records: usize,
        staleness: Duration,
    ) -> Result<SynthesisReport, ControlError> {
        let records = self.control.interfaces().list_all().await?;
        let registry = self.control.registry();
        let mut report = SynthesisReport::default();

        for record in records {
            if report.attempted >= max_records {
                break;
            }

            let Some(tool_name) = make_tool_name(&record.interface_name) else {
                report.skipped_invalid += 1;
                report.failures.push(SynthesisFailure {
                    interface_name: record.interface_name.clone(),
                    tool_name: None,
                    kind: SynthesisFailureKind::InvalidName,
                    message: "interface name yields no tool name".to_string(),
                });
                continue;
            };

            let now = self.control.clock().now();
            if !self.force && registry.is_recently_updated_at(&tool_name, staleness, now).await? {
                info!(tool = %tool_name, "skipping recently synthesized tool");
                report.skipped_recent.push(tool_name);
                continue;
            }

            let schema = match try_infer_schema(record.input_params.as_deref()) {
                Ok(schema) => schema,
                Err(degraded) => {
                    warn!(
                        tool = %tool_name,
                        error = %degraded,
                        "parameter table degraded; using empty schema"
                    );
                    InputSchema::default()
                }
            };

            if report.attempted > 0
                && let Some(interval) = self.call_interval
            {
                tokio::time::sleep(interval).await;
            }
            report.attempted += 1;

            let prompt = SynthesisPrompt::new(&record, tool_name.clone(), schema.clone());
            let source = match self.generator.generate(&prompt).await {
                Ok(source) => source,
                Err(err) => {
                    warn!(tool = %tool_name, error = %err, "generation failed");
                    report.failures.push(failure(
                        &record,
                        &tool_name,
                        SynthesisFailureKind::Generation,
                        err.to_string(),
                    ));
                    continue;
                }
            };

            let path = match self.control.layout().write_atomic(&tool_name, &source).await {
                Ok(path) => path,
                Err(err) => {
                    warn!(tool = %tool_name, error = %err, "module write failed");
                    report.failures.push(failure(
                        &record,
                        &tool_name,
                        SynthesisFailureKind::ModuleWrite,
                        err.to_string(),
                    ));
                    continue;
                }
            };

            let descriptor = ToolDescriptor::new(
                tool_name.clone(),
                tool_description(&record),
                schema,
                self.control.clock().now(),
            );
            let stored = registry.upsert(descriptor).await?;
            info!(tool = %tool_name, path = %path.display(), "tool synthesized");
            report.synthesized.push(stored);
        }

        info!(
            attempted = report.attempted,
            synthesized = report.synthesized.len(),
            skipped_recent = report.skipped_recent.len(),
            failures = report.failures.len(),
            "synthesis batch finished"
        );
        Ok(report)
    }
}

fn failure(
    record: &InterfaceRecord,
    tool_name: &str,
    kind: SynthesisFailureKind,
    message: String,
) -> SynthesisFailure {
    SynthesisFailure {
        interface_name: record.interface_name.clone(),
        tool_name: Some(tool_name.to_string()),
        kind,
        message,
    }
}

fn tool_description(record: &InterfaceRecord) -> String {
    match record.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => description.to_string(),
        _ => {
            let path = record.category_path();
            if path.is_empty() {
                record.interface_name.clone()
            } else {
                format!("{} ({path})", record.interface_name)
            }
        }
    }
}
