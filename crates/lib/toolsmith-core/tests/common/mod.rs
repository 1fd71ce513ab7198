#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use toolsmith_core::clock::Clock;
use toolsmith_core::control::ToolsmithControlPlane;
use toolsmith_core::generation::{CodeGenerator, GenerationError, SynthesisPrompt};
use toolsmith_core::modules::{
    JsonObject,
    LoadError,
    ModuleFailure,
    ModuleLayout,
    ModuleLoader,
    ToolModule,
};

pub async fn build_db(db_name: &str) -> Surreal<Db> {
    let db = Surreal::new::<Mem>(())
        .await
        .expect("failed to create in-memory surrealdb instance");
    db.use_ns("toolsmith")
        .use_db(db_name)
        .await
        .expect("failed to select surrealdb namespace/db");
    db
}

pub async fn build_control_plane(
    db_name: &str,
    layout: ModuleLayout,
    clock: Arc<dyn Clock>,
) -> ToolsmithControlPlane<Db> {
    let control = ToolsmithControlPlane::new(build_db(db_name).await, layout).with_clock(clock);
    control
        .store()
        .ensure_schema()
        .await
        .expect("schema should apply");
    control
}

pub fn fixture(name: &str) -> String {
    let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read fixture at {}: {err}", path.display()))
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0)
        .single()
        .expect("valid start time")
}

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().expect("clock lock");
        *now += chrono::Duration::from_std(by).expect("duration fits");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock lock")
    }
}

/// Generator that returns canned source and records every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: names.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn source_for(tool_name: &str) -> String {
        format!(
            "import asyncio\n\n\nasync def execute(**params):\n    return [{{\"tool\": \"{tool_name}\", \"params\": params}}]\n\n\ndef test():\n    return asyncio.run(execute(p1=\"v\"))\n"
        )
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a SynthesisPrompt,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        Box::pin(async move {
            self.calls
                .lock()
                .expect("calls lock")
                .push(prompt.tool_name.clone());
            if self.failing.contains(&prompt.tool_name) {
                return Err(GenerationError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            Ok(Self::source_for(&prompt.tool_name))
        })
    }
}

/// Behavior of a fake module.
#[derive(Clone)]
pub enum FakeBehavior {
    Returns(Value),
    Raises { message: String, line: Option<u32> },
    Panics,
    Hangs,
    /// Sleeps, then raises `finished` and returns no records.
    Slow {
        delay: Duration,
        finished: Arc<AtomicBool>,
    },
    Unloadable(LoadError),
}

/// Loader backed by a fixed table of behaviors.
#[derive(Default)]
pub struct FakeLoader {
    modules: HashMap<String, FakeBehavior>,
}

impl FakeLoader {
    #[must_use]
    pub fn with(mut self, name: &str, behavior: FakeBehavior) -> Self {
        self.modules.insert(name.to_string(), behavior);
        self
    }
}

struct FakeModule(FakeBehavior);

impl ToolModule for FakeModule {
    fn execute(&self, params: JsonObject) -> BoxFuture<'static, Result<Value, ModuleFailure>> {
        let behavior = self.0.clone();
        Box::pin(async move {
            match behavior {
                FakeBehavior::Returns(Value::String(marker)) if marker == "echo" => {
                    Ok(Value::Array(vec![Value::Object(params)]))
                }
                FakeBehavior::Returns(value) => Ok(value),
                FakeBehavior::Raises { message, line } => {
                    Err(ModuleFailure::Raised { message, line })
                }
                FakeBehavior::Panics => panic!("module adapter panicked"),
                FakeBehavior::Hangs => futures::future::pending().await,
                FakeBehavior::Slow { delay, finished } => {
                    tokio::time::sleep(delay).await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(Value::Array(Vec::new()))
                }
                FakeBehavior::Unloadable(err) => Err(ModuleFailure::Load(err.to_string())),
            }
        })
    }

    fn self_test(&self) -> BoxFuture<'static, Result<Value, ModuleFailure>> {
        self.execute(JsonObject::new())
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&self, tool_name: &str) -> BoxFuture<'_, Result<Arc<dyn ToolModule>, LoadError>> {
        let behavior = self.modules.get(tool_name).cloned();
        Box::pin(async move {
            match behavior {
                None => Err(LoadError::Absent),
                Some(FakeBehavior::Unloadable(err)) => Err(err),
                Some(behavior) => {
                    let module: Arc<dyn ToolModule> = Arc::new(FakeModule(behavior));
                    Ok(module)
                }
            }
        })
    }
}

pub fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}
