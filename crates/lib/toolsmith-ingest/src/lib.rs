//! HTTP control surface for toolsmith.
//!
//! Provides endpoints for ingesting interface documentation, running a
//! synthesis batch, and inspecting or deleting registered tools.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use surrealdb::Connection;
use toolsmith_core::control::{
    ControlError,
    DeleteReport,
    IngestReport,
    IngestRequest,
    SynthesisOrchestrator,
    SynthesisReport,
    ToolStatus,
    ToolsmithControlPlane,
};
use toolsmith_core::parsers::InterfaceParseOptions;
use toolsmith_core::source::SourceError;
use toolsmith_core::store::StoreError;
use toolsmith_store::models::ToolDescriptor;
use toolsmith_store::schema::{DEFAULT_MAX_RECORDS, DEFAULT_STALENESS_MINUTES};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Configuration for the control HTTP server.
#[derive(Debug, Clone)]
pub struct IngestServerConfig {
    pub addr: SocketAddr,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    /// Upper bound for one `/synthesize` batch; generator calls are slow.
    pub synthesis_timeout: Duration,
}

impl IngestServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            max_body_bytes: 25 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(30 * 60),
        }
    }

    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub const fn with_synthesis_timeout(mut self, synthesis_timeout: Duration) -> Self {
        self.synthesis_timeout = synthesis_timeout;
        self
    }
}

impl Default for IngestServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:4010".parse().expect("valid default address"))
    }
}

/// HTTP control server wrapper.
pub struct IngestServer<C: Connection> {
    config: IngestServerConfig,
    state: AppState<C>,
}

impl<C: Connection> IngestServer<C> {
    #[must_use]
    pub fn new(orchestrator: Arc<SynthesisOrchestrator<C>>, config: IngestServerConfig) -> Self {
        let state = AppState::new(orchestrator)
            .with_request_timeout(config.request_timeout)
            .with_synthesis_timeout(config.synthesis_timeout);
        Self { config, state }
    }

    #[must_use]
    pub fn with_parse_options(mut self, options: InterfaceParseOptions) -> Self {
        self.state.parse_options = options;
        self
    }

    #[must_use]
    pub const fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.state.fetch_timeout = fetch_timeout;
        self
    }

    #[must_use]
    pub const fn with_staleness(mut self, staleness: Duration) -> Self {
        self.state.staleness = staleness;
        self
    }
}

impl<C> IngestServer<C>
where
    C: Connection + Send + Sync + 'static,
{
    /// Runs the HTTP server until shutdown.
    ///
    /// # Errors
    /// Returns any listener or server error.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = build_router(self.state, self.config.max_body_bytes);

        info!("toolsmith control server listening on {addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Shared handler state.
pub struct AppState<C: Connection> {
    orchestrator: Arc<SynthesisOrchestrator<C>>,
    batch_lock: Arc<Mutex<()>>,
    parse_options: InterfaceParseOptions,
    fetch_timeout: Duration,
    request_timeout: Duration,
    synthesis_timeout: Duration,
    staleness: Duration,
}

impl<C: Connection> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            batch_lock: self.batch_lock.clone(),
            parse_options: self.parse_options.clone(),
            fetch_timeout: self.fetch_timeout,
            request_timeout: self.request_timeout,
            synthesis_timeout: self.synthesis_timeout,
            staleness: self.staleness,
        }
    }
}

impl<C: Connection> AppState<C> {
    #[must_use]
    pub fn new(orchestrator: Arc<SynthesisOrchestrator<C>>) -> Self {
        Self {
            orchestrator,
            batch_lock: Arc::new(Mutex::new(())),
            parse_options: InterfaceParseOptions::default(),
            fetch_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(30 * 60),
            staleness: Duration::from_secs(DEFAULT_STALENESS_MINUTES * 60),
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub const fn with_synthesis_timeout(mut self, synthesis_timeout: Duration) -> Self {
        self.synthesis_timeout = synthesis_timeout;
        self
    }

    #[must_use]
    pub const fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    fn control(&self) -> &ToolsmithControlPlane<C> {
        self.orchestrator.control()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn timeout() -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            message: "request timed out".to_string(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::InvalidRequest(message)
            | ControlError::Store(StoreError::InvalidInput(message)) => Self::bad_request(message),
            ControlError::Store(StoreError::Surreal(err)) => Self::internal(err.to_string()),
            ControlError::Parse(err) => Self::internal(err.to_string()),
            ControlError::Source(err @ SourceError::Io(_)) => Self::bad_request(err.to_string()),
            ControlError::Source(err) => Self::bad_gateway(err.to_string()),
            ControlError::Io(err) => Self::internal(err.to_string()),
            ControlError::Report(err) => Self::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::from(ControlError::Store(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse { error: self.message });
        (self.status, payload).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SynthesizePayload {
    #[serde(default)]
    max_records: Option<usize>,
    #[serde(default)]
    staleness_minutes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    remove_module: bool,
}

/// Builds the control router over `state`.
#[must_use]
pub fn build_router<C>(state: AppState<C>, max_body_bytes: usize) -> Router
where
    C: Connection + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest::<C>))
        .route("/synthesize", post(synthesize::<C>))
        .route("/tools", get(list_tools::<C>))
        .route("/tools/status", get(tool_status::<C>))
        .route("/tools/:name", delete(delete_tool::<C>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn ingest<C>(
    State(state): State<AppState<C>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError>
where
    C: Connection + Send + Sync + 'static,
{
    let report = tokio::time::timeout(
        state.request_timeout,
        state
            .control()
            .ingest(request, state.parse_options.clone(), state.fetch_timeout),
    )
    .await
    .map_err(|_| ApiError::timeout())??;

    Ok(Json(report))
}

fn staleness_from_minutes(minutes: u64) -> Option<Duration> {
    minutes.checked_mul(60).map(Duration::from_secs)
}

async fn synthesize<C>(
    State(state): State<AppState<C>>,
    Json(payload): Json<SynthesizePayload>,
) -> Result<Json<SynthesisReport>, ApiError>
where
    C: Connection + Send + Sync + 'static,
{
    let staleness = match payload.staleness_minutes {
        None => state.staleness,
        Some(minutes) => staleness_from_minutes(minutes).ok_or_else(|| {
            ApiError::bad_request(format!("staleness_minutes {minutes} is out of range"))
        })?,
    };
    let max_records = payload.max_records.unwrap_or(DEFAULT_MAX_RECORDS);

    let Ok(_guard) = state.batch_lock.try_lock() else {
        return Err(ApiError::conflict("a synthesis batch is already running"));
    };

    let report = tokio::time::timeout(
        state.synthesis_timeout,
        state.orchestrator.synthesize_batch(max_records, staleness),
    )
    .await
    .map_err(|_| ApiError::timeout())??;

    if !report.failures.is_empty() {
        warn!(failures = report.failures.len(), "synthesis batch finished with failures");
    }
    Ok(Json(report))
}

async fn list_tools<C>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<ToolDescriptor>>, ApiError>
where
    C: Connection + Send + Sync + 'static,
{
    let tools = state.control().registry().list_all().await?;
    Ok(Json(tools))
}

async fn tool_status<C>(State(state): State<AppState<C>>) -> Result<Json<Vec<ToolStatus>>, ApiError>
where
    C: Connection + Send + Sync + 'static,
{
    let statuses = state.control().status(state.staleness).await?;
    Ok(Json(statuses))
}

async fn delete_tool<C>(
    State(state): State<AppState<C>>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteReport>, ApiError>
where
    C: Connection + Send + Sync + 'static,
{
    let report = state.control().delete_tool(&name, query.remove_module).await?;
    if !report.descriptor_removed && !report.module_removed {
        return Err(ApiError::not_found(format!("unknown tool: {name}")));
    }
    Ok(Json(report))
}
