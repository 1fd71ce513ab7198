use std::{
    path::PathBuf,
    process::Stdio,
    sync::{Arc, LazyLock},
};

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use super::{
    JsonObject,
    LoadError,
    ModuleFailure,
    ModuleLayout,
    ModuleLoader,
    ModuleState,
    ToolModule,
};

pub const DEFAULT_INTERPRETER: &str = "python3";

const BOOTSTRAP: &str = include_str!("bootstrap.py");

static EXECUTE_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:async\s+)?def\s+execute\s*\(").expect("valid execute pattern")
});

static TRACE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"line (\d+)").expect("valid trace pattern"));

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    stage: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    result: Value,
}

/// Loads generated scripts from a [`ModuleLayout`] and runs them through an
/// interpreter subprocess.
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    layout: ModuleLayout,
    interpreter: Arc<str>,
}

impl ScriptLoader {
    #[must_use]
    pub fn new(layout: ModuleLayout, interpreter: impl Into<String>) -> Self {
        Self {
            layout,
            interpreter: Arc::from(interpreter.into()),
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &ModuleLayout {
        &self.layout
    }
}

impl ModuleLoader for ScriptLoader {
    fn load(&self, tool_name: &str) -> BoxFuture<'_, Result<Arc<dyn ToolModule>, LoadError>> {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            match self.layout.state(&tool_name).await {
                Ok(ModuleState::Built) => {}
                Ok(ModuleState::Absent) => return Err(LoadError::Absent),
                Ok(ModuleState::Building) => return Err(LoadError::Building),
                Err(err) => return Err(LoadError::Unreadable(err.to_string())),
            }
            let path = self.layout.path_for(&tool_name);
            let source = tokio::fs::read_to_string(&path)
                .await
                .map_err(|err| LoadError::Unreadable(err.to_string()))?;
            if !EXECUTE_DEF.is_match(&source) {
                return Err(LoadError::ContractMissing("execute".to_string()));
            }
            let module: Arc<dyn ToolModule> = Arc::new(ScriptModule {
                path,
                interpreter: self.interpreter.clone(),
            });
            Ok(module)
        })
    }
}

struct ScriptModule {
    path: PathBuf,
    interpreter: Arc<str>,
}

impl ToolModule for ScriptModule {
    fn execute(&self, params: JsonObject) -> BoxFuture<'static, Result<Value, ModuleFailure>> {
        Box::pin(run_script(self.interpreter.clone(), self.path.clone(), "execute", params))
    }

    fn self_test(&self) -> BoxFuture<'static, Result<Value, ModuleFailure>> {
        Box::pin(run_script(self.interpreter.clone(), self.path.clone(), "test", JsonObject::new()))
    }
}

async fn run_script(
    interpreter: Arc<str>,
    path: PathBuf,
    mode: &'static str,
    params: JsonObject,
) -> Result<Value, ModuleFailure> {
    let input = serde_json::to_vec(&params)
        .map_err(|err| ModuleFailure::Load(format!("arguments are not serializable: {err}")))?;

    let mut child = Command::new(&*interpreter)
        .arg("-c")
        .arg(BOOTSTRAP)
        .arg(&path)
        .arg(mode)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| ModuleFailure::Load(format!("cannot start {interpreter}: {err}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&input)
            .await
            .map_err(|err| ModuleFailure::Load(format!("cannot pass arguments: {err}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|err| ModuleFailure::Load(format!("interpreter failed: {err}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(path = %path.display(), mode, status = %output.status, "module run finished");

    match stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| serde_json::from_str::<Envelope>(line).ok())
    {
        Some(envelope) => envelope_result(envelope),
        None => Err(unframed_failure(&stderr)),
    }
}

fn envelope_result(envelope: Envelope) -> Result<Value, ModuleFailure> {
    if envelope.ok {
        return Ok(envelope.result);
    }
    let message = envelope
        .message
        .unwrap_or_else(|| "module failed without a message".to_string());
    Err(match envelope.stage.as_str() {
        "load" => ModuleFailure::Load(match envelope.line {
            Some(line) => format!("{message} (line {line})"),
            None => message,
        }),
        "contract" => ModuleFailure::Contract(message),
        _ => ModuleFailure::Raised {
            message,
            line: envelope.line,
        },
    })
}

/// Failure for a run that produced no envelope, read from stderr.
fn unframed_failure(stderr: &str) -> ModuleFailure {
    let message = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("interpreter exited without a result")
        .trim()
        .to_string();
    let line = TRACE_LINE
        .captures_iter(stderr)
        .last()
        .and_then(|captures| captures[1].parse().ok());
    ModuleFailure::Raised { message, line }
}
