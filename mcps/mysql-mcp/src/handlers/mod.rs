//! Tool handlers
//!
//! Each handler resolves the caller from the session, runs the gate checks
//! in order (identifiers, SQL validation, permissions) and only then touches
//! the database. Handlers never return protocol errors for gate failures;
//! every failure becomes an error envelope.

mod data;
mod query;
mod routines;
mod schema;
mod status;
mod transaction;

pub use data::*;
pub use query::*;
pub use routines::*;
pub use schema::*;
pub use status::*;
pub use transaction::*;

use mcp_common::{success_envelope, CallToolResult, McpError};
use serde_json::Value;

use crate::db::SqlParam;
use crate::error::GateError;
use crate::executor::param_for;
use crate::format::error_to_envelope;
use crate::identifier;

/// Successful handler result before it is wrapped in an envelope
#[derive(Debug)]
pub struct Reply {
    pub message: String,
    pub data: Option<Value>,
}

impl Reply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Wrap a handler result; failures are prefixed with `context`
pub(crate) fn finish(
    context: &str,
    result: Result<Reply, GateError>,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(reply) => success_envelope(reply.message, reply.data.as_ref()),
        Err(err) => {
            tracing::debug!(kind = err.kind(), error = %err, "{}", context);
            Ok(error_to_envelope(&err, context))
        }
    }
}

/// Require an optional argument
pub(crate) fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, GateError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GateError::Validation(format!("{} is required", what)))
}

/// Turn `{column: value}` conditions into `` `col` = ? `` clauses
///
/// A null value matches with `IS NULL` and binds nothing.
pub(crate) fn equality_clauses(
    conditions: &serde_json::Map<String, Value>,
) -> Result<(Vec<String>, Vec<SqlParam>), GateError> {
    let mut clauses = Vec::with_capacity(conditions.len());
    let mut params = Vec::with_capacity(conditions.len());
    for (column, value) in conditions {
        let quoted = identifier::quote(column)?;
        match param_for(column, value)? {
            SqlParam::Null => clauses.push(format!("{} IS NULL", quoted)),
            param => {
                clauses.push(format!("{} = ?", quoted));
                params.push(param);
            }
        }
    }
    Ok((clauses, params))
}
