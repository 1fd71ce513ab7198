use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use surrealdb::Connection;
use tracing::{info, warn};

use crate::modules::{ModuleFailure, ModuleLoader, run_bounded};

use super::{ControlError, ToolsmithControlPlane};

pub const DEFAULT_KEEP_REPORTS: usize = 5;
const REPORT_PREFIX: &str = "report_";

/// Options for an offline verification run.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub report_dir: Option<PathBuf>,
    pub keep_reports: usize,
    pub timeout: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            report_dir: None,
            keep_reports: DEFAULT_KEEP_REPORTS,
            timeout: Duration::from_secs(120),
        }
    }
}

impl VerifyOptions {
    #[must_use]
    pub fn with_report_dir(mut self, report_dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(report_dir.into());
        self
    }
}

/// Result of running one module's `test()`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyEntry {
    pub name: String,
    pub passed: bool,
    pub is_list: bool,
    pub not_empty: bool,
    pub items_are_objects: bool,
    pub record_count: usize,
    pub failure_reason: Option<String>,
    pub error_line: Option<u32>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifySummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub generated_at: DateTime<Utc>,
    pub summary: VerifySummary,
    /// Failed entries first.
    pub results: Vec<VerifyEntry>,
    #[serde(skip)]
    pub report_path: Option<PathBuf>,
}

impl<C: Connection> ToolsmithControlPlane<C> {
    /// Runs `test()` of every registered tool and validates what it returns.
    /// When a report directory is set, writes the report there and prunes old
    /// reports.
    ///
    /// # Errors
    /// Returns `ControlError` if the registry cannot be read or the report
    /// cannot be written.
    pub async fn verify_tools(
        &self,
        loader: &dyn ModuleLoader,
        options: &VerifyOptions,
    ) -> Result<VerifyReport, ControlError> {
        let descriptors = self.registry().list_all().await?;
        let mut results = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let started = Instant::now();
            let outcome = match loader.load(&descriptor.name).await {
                Ok(module) => run_bounded(module.self_test(), options.timeout).await,
                Err(err) => Err(ModuleFailure::Load(err.to_string())),
            };
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let entry = evaluate(descriptor.name, &outcome, elapsed);
            if entry.passed {
                info!(tool = %entry.name, ms = elapsed, "self-test passed");
            } else {
                warn!(
                    tool = %entry.name,
                    reason = entry.failure_reason.as_deref().unwrap_or(""),
                    "self-test failed"
                );
            }
            results.push(entry);
        }

        results.sort_by_key(|entry| entry.passed);
        let passed = results.iter().filter(|entry| entry.passed).count();
        let total = results.len();
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };

        let mut report = VerifyReport {
            generated_at: self.clock().now(),
            summary: VerifySummary {
                total,
                passed,
                failed: total - passed,
                success_rate,
            },
            results,
            report_path: None,
        };

        if let Some(dir) = &options.report_dir {
            report.report_path = Some(write_report(dir, &report, options.keep_reports).await?);
        }
        Ok(report)
    }
}

/// Validates a `test()` result: a non-empty list of objects.
fn evaluate(
    name: String,
    outcome: &Result<Value, ModuleFailure>,
    execution_time_ms: u64,
) -> VerifyEntry {
    let mut entry = VerifyEntry {
        name,
        passed: false,
        is_list: false,
        not_empty: false,
        items_are_objects: false,
        record_count: 0,
        failure_reason: None,
        error_line: None,
        execution_time_ms,
    };

    match outcome {
        Ok(Value::Array(items)) => {
            entry.is_list = true;
            entry.record_count = items.len();
            entry.not_empty = !items.is_empty();
            entry.items_are_objects = entry.not_empty && items.iter().all(Value::is_object);
            entry.passed = entry.not_empty && entry.items_are_objects;
            entry.failure_reason = if !entry.not_empty {
                Some("returned an empty list".to_string())
            } else if !entry.items_are_objects {
                Some("list items are not objects".to_string())
            } else {
                None
            };
        }
        Ok(other) => {
            entry.failure_reason = Some(format!("returned {} instead of a list", kind_of(other)));
        }
        Err(failure) => {
            if let ModuleFailure::Raised { line, .. } = failure {
                entry.error_line = *line;
            }
            entry.failure_reason = Some(failure.to_string());
        }
    }
    entry
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

async fn write_report(
    dir: &Path,
    report: &VerifyReport,
    keep: usize,
) -> Result<PathBuf, ControlError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "{REPORT_PREFIX}{}.json",
        report.generated_at.format("%Y%m%d_%H%M%S_%3f")
    ));
    let body = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, body).await?;
    info!(path = %path.display(), "verification report written");
    prune_reports(dir, keep).await?;
    Ok(path)
}

/// Keeps the newest `keep` reports. Report names sort by timestamp.
async fn prune_reports(dir: &Path, keep: usize) -> std::io::Result<()> {
    let mut reports = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(REPORT_PREFIX) && name.ends_with(".json") {
            reports.push((name, entry.path()));
        }
    }
    reports.sort_by(|left, right| right.0.cmp(&left.0));
    for (_, path) in reports.into_iter().skip(keep) {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}
