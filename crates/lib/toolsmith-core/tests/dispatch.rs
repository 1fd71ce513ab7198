mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde_json::{Map, json};
use surrealdb::engine::local::Db;
use toolsmith_core::dispatch::{DispatchOutcome, Dispatcher};
use toolsmith_core::modules::LoadError;
use toolsmith_core::store::SurrealToolStore;
use toolsmith_store::models::{InputSchema, ToolDescriptor};

use common::{FakeBehavior, FakeLoader, build_db, start_time};

async fn registry_with(db_name: &str, names: &[&str]) -> SurrealToolStore<Db> {
    let store = SurrealToolStore::new(build_db(db_name).await);
    store.ensure_schema().await.expect("schema");
    for name in names {
        store
            .registry()
            .upsert(ToolDescriptor::new(
                *name,
                format!("{name} tool"),
                InputSchema::default(),
                start_time(),
            ))
            .await
            .expect("register");
    }
    store
}

fn loader() -> Arc<FakeLoader> {
    Arc::new(
        FakeLoader::default()
            .with("echo", FakeBehavior::Returns(json!("echo")))
            .with("raises", FakeBehavior::Raises {
                message: "ValueError: bad symbol".to_string(),
                line: Some(17),
            })
            .with("scalar", FakeBehavior::Returns(json!({"not": "a list"})))
            .with("panics", FakeBehavior::Panics)
            .with("hangs", FakeBehavior::Hangs)
            .with("building", FakeBehavior::Unloadable(LoadError::Building))
            .with(
                "contractless",
                FakeBehavior::Unloadable(LoadError::ContractMissing("execute".to_string())),
            ),
    )
}

#[tokio::test]
async fn list_tools_returns_registry_verbatim() {
    let store = registry_with("list", &["echo", "raises"]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    let tools = dispatcher.list_tools().await.expect("list");
    assert_eq!(tools, store.registry().list_all().await.expect("registry"));
    assert_eq!(tools[0].description, "echo tool");
}

#[tokio::test]
async fn success_serializes_records() {
    let store = registry_with("success", &["echo"]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    let mut args = Map::new();
    args.insert("symbol".to_string(), json!("000001"));

    let outcome = dispatcher.call_tool("echo", Some(args)).await.expect("call");
    let DispatchOutcome::Success(payload) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    let value: serde_json::Value = serde_json::from_str(&payload).expect("json payload");
    assert_eq!(value, json!([{"symbol": "000001"}]));
    assert!(payload.contains('\n'), "payload is pretty printed");
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let store = registry_with("missing", &[]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    assert_eq!(
        dispatcher.call_tool("nope", None).await.expect("call"),
        DispatchOutcome::NotFound {
            name: "nope".to_string()
        }
    );
}

#[tokio::test]
async fn registered_without_module_is_malformed() {
    let store = registry_with("malformed", &["ghost", "building", "contractless", "scalar"]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    for name in ["ghost", "building", "contractless", "scalar"] {
        let outcome = dispatcher.call_tool(name, None).await.expect("call");
        assert!(
            matches!(&outcome, DispatchOutcome::MalformedTool { name: tool, .. } if tool == name),
            "{name}: {outcome:?}"
        );
    }
}

#[tokio::test]
async fn raised_errors_carry_the_line() {
    let store = registry_with("raised", &["raises"]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    let outcome = dispatcher.call_tool("raises", None).await.expect("call");
    assert_eq!(
        outcome,
        DispatchOutcome::Execution {
            name: "raises".to_string(),
            message: "ValueError: bad symbol".to_string(),
            line: Some(17),
        }
    );
    assert_eq!(
        outcome.to_string(),
        "Error executing tool raises at line 17: ValueError: bad symbol"
    );
}

#[tokio::test]
async fn panics_and_timeouts_are_execution_errors() {
    let store = registry_with("panics", &["panics", "hangs"]).await;
    let dispatcher =
        Dispatcher::new(store.registry(), loader()).with_invoke_timeout(Duration::from_millis(50));

    let panicked = dispatcher.call_tool("panics", None).await.expect("call");
    assert!(matches!(panicked, DispatchOutcome::Execution { line: None, .. }));

    let timed_out = dispatcher.call_tool("hangs", None).await.expect("call");
    let DispatchOutcome::Execution { message, .. } = timed_out else {
        panic!("expected execution error");
    };
    assert!(message.contains("timed out"));

    let still_serving = dispatcher.call_tool("panics", None).await;
    assert!(still_serving.is_ok(), "dispatcher survives a panicking module");
}

#[tokio::test]
async fn timed_out_tool_is_cancelled() {
    let store = registry_with("cancelled", &["slow"]).await;
    let finished = Arc::new(AtomicBool::new(false));
    let loader = Arc::new(FakeLoader::default().with(
        "slow",
        FakeBehavior::Slow {
            delay: Duration::from_millis(200),
            finished: Arc::clone(&finished),
        },
    ));
    let dispatcher =
        Dispatcher::new(store.registry(), loader).with_invoke_timeout(Duration::from_millis(50));

    let outcome = dispatcher.call_tool("slow", None).await.expect("call");
    assert_eq!(
        outcome,
        DispatchOutcome::Execution {
            name: "slow".to_string(),
            message: "timed out after 50ms".to_string(),
            line: None,
        }
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        !finished.load(Ordering::SeqCst),
        "work past the timeout must not run to completion"
    );
}

#[tokio::test]
async fn table_miss_refreshes_from_registry() {
    let store = registry_with("refresh", &[]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    assert!(dispatcher.list_tools().await.expect("list").is_empty());

    store
        .registry()
        .upsert(ToolDescriptor::new("echo", "late", InputSchema::default(), start_time()))
        .await
        .expect("register late");
    let outcome = dispatcher.call_tool("echo", None).await.expect("call");
    assert!(outcome.is_success());
}

#[tokio::test]
async fn deleted_tools_are_not_served_from_the_table() {
    let store = registry_with("evicted", &["echo"]).await;
    let dispatcher = Dispatcher::new(store.registry(), loader());
    assert!(dispatcher.call_tool("echo", None).await.expect("call").is_success());

    assert!(store.registry().delete_by_name("echo").await.expect("delete"));
    assert_eq!(
        dispatcher.call_tool("echo", None).await.expect("call after delete"),
        DispatchOutcome::NotFound {
            name: "echo".to_string()
        }
    );

    store
        .registry()
        .upsert(ToolDescriptor::new("echo", "rebuilt", InputSchema::default(), start_time()))
        .await
        .expect("register again");
    assert!(dispatcher.call_tool("echo", None).await.expect("call after rebuild").is_success());
    assert_eq!(dispatcher.list_tools().await.expect("list")[0].description, "rebuilt");
}
