//! Protocol-level error helpers
//!
//! Tool failures that the caller should read (validation, permission,
//! driver errors) travel as error envelopes, see [`crate::result`]. The
//! helpers here cover the remaining cases where a call cannot be answered
//! at all and an [`McpError`] is returned instead.

use rmcp::ErrorData as McpError;

/// Type alias for MCP tool results
pub type McpResult<T> = Result<T, McpError>;

/// Conversion of a domain error into a protocol error
///
/// ```rust,ignore
/// impl IntoMcpError for GateError {
///     fn into_mcp_error(self) -> McpError {
///         McpError::internal_error(self.to_string(), None)
///     }
/// }
/// ```
pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("JSON error: {}", self), None)
    }
}

impl IntoMcpError for anyhow::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(self.to_string(), None)
    }
}

/// `?`-friendly conversion for any `Result` whose error implements [`IntoMcpError`]
pub trait ResultExt<T> {
    fn to_mcp_err(self) -> McpResult<T>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> McpResult<T> {
        self.map_err(IntoMcpError::into_mcp_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_error_converts() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err = result.to_mcp_err().unwrap_err();
        assert!(err.message.starts_with("JSON error"));
    }

    #[test]
    fn test_anyhow_error_converts() {
        let err = anyhow::anyhow!("pool closed").into_mcp_error();
        assert_eq!(err.message, "pool closed");
    }
}
