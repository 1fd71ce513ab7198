//! Daemon entry point for toolsmith.
//!
//! Loads configuration from flags and the environment, connects the store,
//! and runs one subcommand: ingest, synthesize, serve, verify, status or
//! delete. Logs go to stderr so the MCP stdio stream stays clean.

mod config;
mod database;

use std::sync::Arc;

use surrealdb::engine::any::Any;
use tokio::task::JoinError;
use toolsmith_core::control::{
    SynthesisOrchestrator,
    ToolStatus,
    ToolsmithControlPlane,
    VerifyOptions,
};
use toolsmith_core::dispatch::Dispatcher;
use toolsmith_core::generation::ChatCompletionsGenerator;
use toolsmith_core::modules::{ModuleLoader, ScriptLoader};
use toolsmith_core::parsers::InterfaceParseOptions;
use toolsmith_core::source::DocumentSource;
use toolsmith_ingest::{IngestServer, IngestServerConfig};
use toolsmith_mcp::server::{self as mcp_server, McpTransport};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Command, ServeConfig, ToolsmithConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TOOLSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ToolsmithConfig::from_args()?;
    let db = database::connect(&config.database).await?;
    let control = ToolsmithControlPlane::new(db, config.module_layout());

    match config.command.clone() {
        Command::Ingest {
            source,
            every,
            fetch_timeout,
        } => {
            let source = DocumentSource::parse(&source);
            let options = InterfaceParseOptions::default();
            let Some(every) = every else {
                let report = control.ingest_source(&source, options, fetch_timeout).await?;
                print_json(&report)?;
                return Ok(());
            };

            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match control.ingest_source(&source, options.clone(), fetch_timeout).await {
                    Ok(report) => info!(
                        source = %source,
                        records = report.record_count,
                        skipped = report.skipped.len(),
                        "scheduled ingest finished"
                    ),
                    Err(err) => error!(source = %source, error = %err, "scheduled ingest failed"),
                }
            }
        }
        Command::Synthesize {
            max_records,
            staleness,
            force,
            call_interval,
        } => {
            let orchestrator = build_orchestrator(&config, control)?
                .with_force(force)
                .with_call_interval(call_interval);
            let report = orchestrator.synthesize_batch(max_records, staleness).await?;
            print_json(&report)?;
        }
        Command::Serve(serve) => run_serve(&config, control, serve).await?,
        Command::Verify {
            report_dir,
            keep_reports,
        } => {
            let loader = ScriptLoader::new(config.module_layout(), config.interpreter.clone());
            let mut options = VerifyOptions::default().with_report_dir(report_dir);
            options.keep_reports = keep_reports;
            options.timeout = config.invoke_timeout;
            let report = control.verify_tools(&loader, &options).await?;
            if let Some(path) = report.report_path.as_ref() {
                info!(path = %path.display(), "verification report written");
            }
            print_json(&report.summary)?;
        }
        Command::Status { staleness } => {
            let statuses = control.status(staleness).await?;
            print_status(&statuses);
        }
        Command::Delete {
            name,
            remove_module,
        } => {
            let report = control.delete_tool(&name, remove_module).await?;
            print_json(&report)?;
        }
    }
    Ok(())
}

fn build_orchestrator(
    config: &ToolsmithConfig,
    control: ToolsmithControlPlane<Any>,
) -> Result<SynthesisOrchestrator<Any>, BoxError> {
    let generator = ChatCompletionsGenerator::new(config.generator.clone())?;
    Ok(SynthesisOrchestrator::new(control, Arc::new(generator)))
}

async fn run_serve(
    config: &ToolsmithConfig,
    control: ToolsmithControlPlane<Any>,
    serve: ServeConfig,
) -> Result<(), BoxError> {
    let loader: Arc<dyn ModuleLoader> =
        Arc::new(ScriptLoader::new(config.module_layout(), config.interpreter.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(control.registry(), loader).with_invoke_timeout(config.invoke_timeout),
    );

    let ingest_task = if serve.ingest_serve {
        let orchestrator = Arc::new(build_orchestrator(config, control)?);
        let server_config = IngestServerConfig::new(serve.ingest_addr)
            .with_max_body_bytes(serve.ingest_max_body_bytes)
            .with_request_timeout(serve.ingest_timeout);
        let server = IngestServer::new(orchestrator, server_config).with_staleness(serve.staleness);
        Some(tokio::spawn(server.serve()))
    } else {
        None
    };

    let transport = if serve.enable_stdio {
        Some(McpTransport::Stdio)
    } else if serve.mcp_serve {
        Some(McpTransport::Http(serve.mcp_http_addr))
    } else {
        None
    };

    match (transport, ingest_task) {
        (Some(transport), Some(mut ingest)) => {
            let mcp = mcp_server::serve(dispatcher, transport, shutdown_signal());
            tokio::select! {
                served = mcp => {
                    ingest.abort();
                    served
                }
                joined = &mut ingest => ingest_finished(joined),
            }
        }
        (Some(transport), None) => {
            mcp_server::serve(dispatcher, transport, shutdown_signal()).await
        }
        (None, Some(ingest)) => tokio::select! {
            joined = ingest => ingest_finished(joined),
            () = shutdown_signal() => Ok(()),
        },
        (None, None) => {
            warn!("serve has neither MCP nor the control surface enabled");
            Ok(())
        }
    }
}

/// Maps the end of the control-surface task onto the serve result.
fn ingest_finished(joined: Result<Result<(), BoxError>, JoinError>) -> Result<(), BoxError> {
    match joined {
        Ok(Ok(())) => {
            warn!("control surface stopped");
            Ok(())
        }
        Ok(Err(err)) => {
            error!(error = %err, "control surface failed");
            Err(err)
        }
        Err(join) => {
            error!(error = %join, "control surface task aborted");
            Err(join.into())
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_status(statuses: &[ToolStatus]) {
    println!("{:<40} {:<8} {:<9} {:<9} INTERFACE", "TOOL", "STATE", "MODULE", "SERVABLE");
    for status in statuses {
        let descriptor = format!("{:?}", status.descriptor).to_lowercase();
        let module = format!("{:?}", status.module).to_lowercase();
        println!(
            "{:<40} {descriptor:<8} {module:<9} {:<9} {}",
            status.name,
            status.servable,
            status.interface_name.as_deref().unwrap_or("-"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_control_surface_fails_serve() {
        let failed = ingest_finished(Ok(Err("address already in use".into())));
        let err = failed.expect_err("a failed control surface ends serve with its error");
        assert_eq!(err.to_string(), "address already in use");

        assert!(ingest_finished(Ok(Ok(()))).is_ok());
    }

    #[tokio::test]
    async fn panicked_control_surface_fails_serve() {
        let joined: Result<Result<(), BoxError>, JoinError> =
            tokio::spawn(async { panic!("control surface crashed") }).await;
        assert!(ingest_finished(joined).is_err());
    }
}
