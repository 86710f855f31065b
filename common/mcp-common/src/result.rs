//! Response envelopes for MCP tool results
//!
//! Every tool answer crosses the protocol boundary as a single text content
//! block. Success and failure share one shape so clients can render them
//! uniformly:
//!
//! ````text
//! **Success**
//!
//! <summary>
//!
//! **Result:**
//! ```json
//! { ... }
//! ```
//! ````
//!
//! Failures use `**Error**` / `**Details:**` and set `is_error`.

use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;

use crate::error::ResultExt;

/// Create a successful envelope with a summary and an optional JSON payload
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::success_envelope;
///
/// let result = success_envelope("Query Results", Some(&serde_json::json!({ "row_count": 3 })))?;
/// ```
pub fn success_envelope<T: Serialize>(
    message: impl AsRef<str>,
    data: Option<&T>,
) -> Result<CallToolResult, McpError> {
    let mut text = format!("**Success**\n\n{}", message.as_ref());
    if let Some(data) = data {
        let json = serde_json::to_string_pretty(data).to_mcp_err()?;
        text.push_str(&format!("\n\n**Result:**\n```json\n{}\n```", json));
    }
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Create an error envelope flagged with `is_error`
///
/// Details that fail to serialize are dropped rather than masking the
/// original error.
pub fn error_envelope<T: Serialize>(message: impl AsRef<str>, details: Option<&T>) -> CallToolResult {
    let mut text = format!("**Error**\n\n{}", message.as_ref());
    if let Some(json) = details.and_then(|d| serde_json::to_string_pretty(d).ok()) {
        text.push_str(&format!("\n\n**Details:**\n```json\n{}\n```", json));
    }
    CallToolResult::error(vec![Content::text(text)])
}

/// Shorthand for an error envelope without details
pub fn error_message(message: impl AsRef<str>) -> CallToolResult {
    error_envelope::<()>(message, None)
}

/// Create a successful plain text response
pub fn text_success(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Extract the text of the first content block, if any
pub fn envelope_text(result: &CallToolResult) -> Option<&str> {
    result.content.first().and_then(|c| match &c.raw {
        rmcp::model::RawContent::Text(t) => Some(t.text.as_str()),
        _ => None,
    })
}

/// Parse the JSON payload embedded in an envelope's fenced block
///
/// Useful for in-process callers and tests that need the structured result.
pub fn envelope_payload(result: &CallToolResult) -> Option<serde_json::Value> {
    let text = envelope_text(result)?;
    let start = text.find("```json\n")? + "```json\n".len();
    let end = text[start..].rfind("\n```")? + start;
    serde_json::from_str(&text[start..end]).ok()
}
