use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use toolsmith_core::control::{SynthesisOrchestrator, ToolsmithControlPlane};
use toolsmith_core::generation::{CodeGenerator, GenerationError, SynthesisPrompt};
use toolsmith_core::modules::ModuleLayout;
use toolsmith_ingest::{AppState, build_router};
use tower::ServiceExt;

const DOCUMENT: &str = "\
## Stocks

### A shares

#### Spot

Interface: stock_spot

Description: spot quotes

Input parameters

| name | type | description |
|------|------|-------------|
| symbol | str | required |

#### History

Interface: stock_hist

Description: daily history
";

struct CannedGenerator;

impl CodeGenerator for CannedGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a SynthesisPrompt,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        let source = format!(
            "async def execute(**params):\n    return [{{\"tool\": \"{}\"}}]\n\n\n\
             def test():\n    return []\n",
            prompt.tool_name
        );
        Box::pin(async move { Ok(source) })
    }
}

async fn build_app(db_name: &str, modules: &std::path::Path) -> axum::Router {
    let db = Surreal::new::<Mem>(())
        .await
        .expect("failed to create in-memory surrealdb instance");
    db.use_ns("toolsmith")
        .use_db(db_name)
        .await
        .expect("failed to select surrealdb namespace/db");
    let control: ToolsmithControlPlane<Db> =
        ToolsmithControlPlane::new(db, ModuleLayout::with_default_extension(modules));
    control
        .store()
        .ensure_schema()
        .await
        .expect("schema should apply");
    let orchestrator = SynthesisOrchestrator::new(control, Arc::new(CannedGenerator));
    build_router(AppState::new(Arc::new(orchestrator)), 1024 * 1024)
}

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

#[tokio::test]
async fn health_answers_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = build_app("health", dir.path()).await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn ingest_requires_exactly_one_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = build_app("ingest_inputs", dir.path()).await;

    let (status, body) = send(&app, Method::POST, "/ingest", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|err| err.contains("required")));

    let (status, _) = send(
        &app,
        Method::POST,
        "/ingest",
        Some(json!({"document": DOCUMENT, "source": "docs.md"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_local_source_is_a_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = build_app("ingest_missing", dir.path()).await;
    let missing = dir.path().join("absent.md");
    let (status, _) = send(
        &app,
        Method::POST,
        "/ingest",
        Some(json!({"source": missing.display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingest_synthesize_list_and_delete() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = build_app("full_cycle", dir.path()).await;

    let (status, report) =
        send(&app, Method::POST, "/ingest", Some(json!({"document": DOCUMENT}))).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["record_count"], json!(2));

    let (status, report) =
        send(&app, Method::POST, "/synthesize", Some(json!({"max_records": 5}))).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["attempted"], json!(2));
    assert_eq!(report["failures"], json!([]));

    let (status, tools) = send(&app, Method::GET, "/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = tools
        .as_array()
        .expect("tool list")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, vec!["stock_hist", "stock_spot"]);
    assert_eq!(tools[1]["input_schema"]["required"], json!(["symbol"]));

    let (status, statuses) = send(&app, Method::GET, "/tools/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        statuses
            .as_array()
            .expect("status list")
            .iter()
            .all(|entry| entry["servable"] == json!(true))
    );

    let (status, second) = send(&app, Method::POST, "/synthesize", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["attempted"], json!(0));
    assert_eq!(second["skipped_recent"].as_array().map(Vec::len), Some(2));

    let (status, deleted) =
        send(&app, Method::DELETE, "/tools/stock_hist?remove_module=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!({"descriptor_removed": true, "module_removed": true}));
    assert!(!dir.path().join("stock_hist.py").exists());

    let (status, _) = send(&app, Method::DELETE, "/tools/stock_hist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_staleness_is_a_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = build_app("staleness_overflow", dir.path()).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/synthesize",
        Some(json!({"staleness_minutes": u64::MAX})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["error"].as_str().is_some_and(|err| err.contains("staleness_minutes")));

    let (status, report) = send(
        &app,
        Method::POST,
        "/synthesize",
        Some(json!({"staleness_minutes": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{report}");
}
