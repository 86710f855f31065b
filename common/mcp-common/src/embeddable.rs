//! In-process tool dispatch
//!
//! [`EmbeddableMcp`] lets a host call a server's tools by name with a JSON
//! argument object, without going through a transport. Tests use the same
//! path to drive a server end to end.
//!
//! ```rust,ignore
//! use mcp_common::EmbeddableMcp;
//!
//! let tools = server.list_tools();
//! let result = server.call_tool("query_database", serde_json::json!({ "sql": "SELECT 1" })).await?;
//! ```

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments did not deserialize into the tool's parameter type
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("mcp error: {0}")]
    McpError(String),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        EmbeddableError::McpError(err.message.to_string())
    }
}

impl From<serde_json::Error> for EmbeddableError {
    fn from(err: serde_json::Error) -> Self {
        EmbeddableError::InvalidParams(err.to_string())
    }
}

pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// A server whose tools can be executed in-process
///
/// Implementations are `Send + Sync` so concurrent tasks may share one
/// server. Servers built on `#[tool_router]` list tools via
/// `self.tool_router.list_all()` and dispatch `call_tool` by matching the
/// name and deserializing `params` into the tool's parameter struct.
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Name used in MCP configuration files
    fn server_name(&self) -> &str;

    fn list_tools(&self) -> Vec<Tool>;

    /// Execute a tool by name
    ///
    /// Fails with [`EmbeddableError::ToolNotFound`] for unknown names and
    /// [`EmbeddableError::InvalidParams`] when `params` does not match the
    /// tool's schema. Domain failures come back as an `Ok` result with
    /// `is_error` set.
    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }

    fn server_version(&self) -> Option<&str> {
        None
    }
}
