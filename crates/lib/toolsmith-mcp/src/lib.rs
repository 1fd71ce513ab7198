//! MCP server for toolsmith.
//!
//! The tool list is not fixed at compile time: every `tools/list` reads the
//! registry through the [`Dispatcher`] and every `tools/call` is resolved by
//! name against it, so newly synthesized tools appear without a restart.

mod helpers;
pub mod server;

use std::sync::Arc;

#[allow(deprecated)]
use rmcp::model::{CallToolRequestParam, PaginatedRequestParam};
use rmcp::model::{CallToolResult, ListToolsResult, ServerCapabilities, ServerInfo};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use surrealdb::Connection;
use toolsmith_core::dispatch::Dispatcher;
use tracing::{info, warn};

const SERVER_INSTRUCTIONS: &str = r"toolsmith serves data tools synthesized from interface documentation.

Workflow:
1. Call `tools/list` to see the available tools. Each tool carries the input schema inferred
   from its documented parameter table.
2. Call a tool by name with arguments matching its schema. Successful calls return the
   records as a JSON array of objects.

Notes:
- Failed calls return an error result whose text names the tool and, when known, the line
  of the generated module that raised.
- The tool list is read from the registry on every request and may grow between calls.";

/// MCP server wrapper around a shared dispatcher.
pub struct ToolsmithMcp<C: Connection> {
    dispatcher: Arc<Dispatcher<C>>,
}

impl<C: Connection> Clone for ToolsmithMcp<C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<C: Connection> ToolsmithMcp<C> {
    #[must_use]
    pub fn new(dispatcher: Dispatcher<C>) -> Self {
        Self::with_dispatcher(Arc::new(dispatcher))
    }

    #[must_use]
    pub const fn with_dispatcher(dispatcher: Arc<Dispatcher<C>>) -> Self {
        Self { dispatcher }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }
}

#[allow(deprecated)]
impl<C: Connection> ServerHandler for ToolsmithMcp<C> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let descriptors = self
            .dispatcher
            .list_tools()
            .await
            .map_err(|err| helpers::store_err(&err))?;
        let tools = descriptors.into_iter().map(helpers::descriptor_tool).collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let name = request.name.to_string();
        let outcome = self
            .dispatcher
            .call_tool(&name, request.arguments)
            .await
            .map_err(|err| helpers::store_err(&err))?;
        if outcome.is_success() {
            info!(tool = %name, "tool call succeeded");
        } else {
            warn!(tool = %name, outcome = %outcome, "tool call failed");
        }
        Ok(helpers::outcome_result(&outcome))
    }
}
