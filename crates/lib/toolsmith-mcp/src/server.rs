//! Transports for the toolsmith MCP server.
//!
//! [`serve`] loads the tool table once before accepting requests, so a
//! broken registry fails the start instead of the first `tools/list`, and then
//! runs until the transport closes or the shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use rmcp::serve_server;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig,
    StreamableHttpService,
    session::local::LocalSessionManager,
};
use surrealdb::Connection;
use toolsmith_core::dispatch::Dispatcher;
use tracing::info;

use crate::ToolsmithMcp;

pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// Where the tool catalog is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransport {
    /// JSON-RPC over stdin and stdout. Logs must go to stderr.
    Stdio,
    /// Streamable HTTP under `/mcp`, with `/health` beside it.
    Http(SocketAddr),
}

/// Serves the dispatcher's tools on `transport`.
///
/// # Errors
/// Returns `ServeError` if the registry cannot be read at startup, or on any
/// transport or listener error.
pub async fn serve<C, F>(
    dispatcher: Arc<Dispatcher<C>>,
    transport: McpTransport,
    shutdown: F,
) -> Result<(), ServeError>
where
    C: Connection + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let tools = dispatcher.refresh().await?;
    info!(tools = tools.len(), transport = ?transport, "tool table loaded");

    match transport {
        McpTransport::Stdio => serve_stdio(dispatcher, shutdown).await,
        McpTransport::Http(addr) => serve_http(dispatcher, addr, shutdown).await,
    }
}

async fn serve_stdio<C, F>(dispatcher: Arc<Dispatcher<C>>, shutdown: F) -> Result<(), ServeError>
where
    C: Connection + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let service = ToolsmithMcp::with_dispatcher(dispatcher);
    let (stdin, stdout) = stdio();
    let running = serve_server(service, (stdin, stdout)).await?;

    tokio::select! {
        quit = running.waiting() => {
            let _ = quit?;
            info!("MCP stdio session closed");
        }
        () = shutdown => info!("MCP stdio session stopped"),
    }
    Ok(())
}

async fn serve_http<C, F>(
    dispatcher: Arc<Dispatcher<C>>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), ServeError>
where
    C: Connection + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let service: StreamableHttpService<ToolsmithMcp<C>, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(ToolsmithMcp::with_dispatcher(Arc::clone(&dispatcher))),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig::default(),
        );

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "MCP HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("MCP HTTP server stopped");
    Ok(())
}
