use std::borrow::Cow;
use std::sync::Arc;

use rmcp::ErrorData;
use rmcp::model::{CallToolResult, Content, ErrorCode, Tool};
use toolsmith_core::dispatch::DispatchOutcome;
use toolsmith_core::store::StoreError;
use toolsmith_store::models::ToolDescriptor;

pub fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

pub fn store_err(err: &StoreError) -> ErrorData {
    mcp_err(ErrorCode::INTERNAL_ERROR, format!("tool registry unavailable: {err}"))
}

/// Advertised form of a registry descriptor.
pub fn descriptor_tool(descriptor: ToolDescriptor) -> Tool {
    Tool::new(
        descriptor.name,
        descriptor.description,
        Arc::new(descriptor.input_schema.to_json_object()),
    )
}

/// Success carries the JSON records; every other outcome is an `isError`
/// text diagnostic.
pub fn outcome_result(outcome: &DispatchOutcome) -> CallToolResult {
    match outcome {
        DispatchOutcome::Success(payload) => {
            CallToolResult::success(vec![Content::text(payload.clone())])
        }
        other => CallToolResult::error(vec![Content::text(other.to_string())]),
    }
}
