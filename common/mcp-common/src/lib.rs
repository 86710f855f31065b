//! Shared building blocks for the MCP servers in this workspace
//!
//! - **Envelopes**: uniform `**Success**` / `**Error**` tool responses
//! - **Monitor**: [`ToolMonitor`], the per-call interceptor (timing, outcome, stats)
//! - **Init**: [`init_tracing`] for stderr logging
//! - **Errors**: conversions into protocol errors
//! - **Embeddable**: [`EmbeddableMcp`] for in-process dispatch
//!
//! ```rust,ignore
//! use mcp_common::{success_envelope, error_message};
//!
//! fn answer(rows: &[serde_json::Value]) -> Result<CallToolResult, McpError> {
//!     if rows.is_empty() {
//!         return Ok(error_message("No rows"));
//!     }
//!     success_envelope(format!("Rows returned: {}", rows.len()), Some(&rows))
//! }
//! ```

pub mod embeddable;
pub mod error;
pub mod init;
pub mod monitor;
pub mod result;

pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::{IntoMcpError, McpResult, ResultExt};
pub use init::init_tracing;
pub use monitor::{CallOutcome, ToolMonitor, ToolStats};
pub use result::{
    envelope_payload, envelope_text, error_envelope, error_message, success_envelope, text_success,
};

pub use rmcp::{
    model::{CallToolResult, Content, Tool},
    ErrorData as McpError,
};

pub use async_trait::async_trait;
