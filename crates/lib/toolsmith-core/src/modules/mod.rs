//! Generated module files and the capability traits used to run them.
//!
//! [`ModuleLayout`] owns where modules live and how they are written.
//! [`ModuleLoader`] and [`ToolModule`] are the seam between the dispatcher and
//! whatever runtime executes module source.

mod runtime;

use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{io::AsyncWriteExt, task::JoinHandle};
use tracing::warn;
use toolsmith_store::schema::{DEFAULT_MODULE_EXTENSION, module_file_name};

pub use runtime::{DEFAULT_INTERPRETER, ScriptLoader};

pub type JsonObject = Map<String, Value>;

/// Build state of a module file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Absent,
    Building,
    Built,
}

/// Filesystem placement of generated modules.
#[derive(Debug, Clone)]
pub struct ModuleLayout {
    dir: PathBuf,
    extension: String,
}

impl ModuleLayout {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    #[must_use]
    pub fn with_default_extension(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_MODULE_EXTENSION)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the module for a tool name.
    #[must_use]
    pub fn path_for(&self, tool_name: &str) -> PathBuf {
        self.dir.join(module_file_name(tool_name, &self.extension))
    }

    fn temp_prefix(&self, tool_name: &str) -> String {
        format!(".{}.", module_file_name(tool_name, &self.extension))
    }

    /// Current build state of a module.
    ///
    /// # Errors
    /// Returns an IO error if the module directory cannot be inspected.
    pub async fn state(&self, tool_name: &str) -> std::io::Result<ModuleState> {
        if tokio::fs::try_exists(self.path_for(tool_name)).await? {
            return Ok(ModuleState::Built);
        }
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ModuleState::Absent);
            }
            Err(err) => return Err(err),
        };
        let prefix = self.temp_prefix(tool_name);
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".tmp") {
                return Ok(ModuleState::Building);
            }
        }
        Ok(ModuleState::Absent)
    }

    /// Writes module source atomically: a temporary sibling is written and
    /// synced, then renamed over the final path.
    ///
    /// # Errors
    /// Returns an IO error if the directory, the temporary file, or the rename
    /// fails. The temporary file is removed on failure.
    pub async fn write_atomic(&self, tool_name: &str, source: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(tool_name);
        let temp = self.dir.join(format!(
            "{}{}.tmp",
            self.temp_prefix(tool_name),
            uuid::Uuid::new_v4().simple()
        ));

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(source.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, &target).await
        }
        .await;

        if let Err(err) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err);
        }
        Ok(target)
    }

    /// Removes a module file if present. Returns whether one existed.
    ///
    /// # Errors
    /// Returns an IO error if removal fails for a reason other than absence.
    pub async fn remove(&self, tool_name: &str) -> std::io::Result<bool> {
        match tokio::fs::remove_file(self.path_for(tool_name)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Why a module could not be produced for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Absent,
    Building,
    Unreadable(String),
    ContractMissing(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "module file is missing"),
            Self::Building => write!(f, "module is still being written"),
            Self::Unreadable(message) => write!(f, "module cannot be read: {message}"),
            Self::ContractMissing(member) => write!(f, "module does not define `{member}`"),
        }
    }
}

impl Error for LoadError {}

/// Failure reported by a running module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleFailure {
    /// The module could not be imported.
    Load(String),
    /// The module imported but lacks a required entry point.
    Contract(String),
    /// The entry point raised.
    Raised { message: String, line: Option<u32> },
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(message) => write!(f, "module failed to load: {message}"),
            Self::Contract(message) => write!(f, "module contract violated: {message}"),
            Self::Raised {
                message,
                line: Some(line),
            } => write!(f, "{message} (line {line})"),
            Self::Raised { message, line: None } => write!(f, "{message}"),
        }
    }
}

impl Error for ModuleFailure {}

/// A loaded module exposing the generated-module contract.
pub trait ToolModule: Send + Sync {
    /// Runs `execute(**params)`.
    fn execute(&self, params: JsonObject) -> BoxFuture<'static, Result<Value, ModuleFailure>>;

    /// Runs the module's own `test()`.
    fn self_test(&self) -> BoxFuture<'static, Result<Value, ModuleFailure>>;
}

/// Resolves a tool name to a runnable module.
pub trait ModuleLoader: Send + Sync {
    /// # Errors
    /// Returns `LoadError` if the module is absent, still being written,
    /// unreadable, or lacks `execute`.
    fn load(&self, tool_name: &str) -> BoxFuture<'_, Result<Arc<dyn ToolModule>, LoadError>>;
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs module work on its own task, bounded by `limit`.
///
/// The task is aborted when the limit elapses or when the returned future is
/// dropped, so a script runtime's child process is killed with it. A panic or
/// timeout is reported as [`ModuleFailure::Raised`] without a line.
///
/// # Errors
/// Returns the work's own `ModuleFailure`, or `Raised` on panic or timeout.
pub async fn run_bounded(
    work: BoxFuture<'static, Result<Value, ModuleFailure>>,
    limit: Duration,
) -> Result<Value, ModuleFailure> {
    let mut task = AbortOnDrop(tokio::spawn(work));
    match tokio::time::timeout(limit, &mut task.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => {
            warn!(error = %join, "module task failed");
            Err(ModuleFailure::Raised {
                message: format!("module task failed: {join}"),
                line: None,
            })
        }
        Err(_) => {
            task.0.abort();
            warn!(limit = ?limit, "module task timed out");
            Err(ModuleFailure::Raised {
                message: format!("timed out after {limit:?}"),
                line: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn bounded_run_reports_sub_second_limits() {
        let work: BoxFuture<'static, Result<Value, ModuleFailure>> =
            Box::pin(futures::future::pending());
        let failure = run_bounded(work, Duration::from_millis(20))
            .await
            .expect_err("pending work times out");
        assert_eq!(
            failure,
            ModuleFailure::Raised {
                message: "timed out after 20ms".to_string(),
                line: None,
            }
        );
    }

    #[tokio::test]
    async fn timed_out_work_never_finishes() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let work: BoxFuture<'static, Result<Value, ModuleFailure>> = Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(Value::Array(Vec::new()))
        });
        assert!(run_bounded(work, Duration::from_millis(20)).await.is_err());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn atomic_write_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ModuleLayout::new(dir.path().join("apis"), ".py");
        assert_eq!(layout.state("x").await.expect("state"), ModuleState::Absent);

        let path = layout.write_atomic("x", "old").await.expect("first write");
        layout.write_atomic("x", "new").await.expect("second write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "new");
        assert_eq!(path, dir.path().join("apis").join("x.py"));
        assert_eq!(layout.state("x").await.expect("state"), ModuleState::Built);

        let leftovers = std::fs::read_dir(dir.path().join("apis"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn temp_file_alone_means_building() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ModuleLayout::with_default_extension(dir.path());
        std::fs::write(dir.path().join(".x.py.abc.tmp"), "partial").expect("write");
        assert_eq!(layout.state("x").await.expect("state"), ModuleState::Building);
        assert_eq!(layout.state("y").await.expect("state"), ModuleState::Absent);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ModuleLayout::with_default_extension(dir.path());
        layout.write_atomic("x", "code").await.expect("write");
        assert!(layout.remove("x").await.expect("remove"));
        assert!(!layout.remove("x").await.expect("remove again"));
    }
}
