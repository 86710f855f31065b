//! Result and response formatting
//!
//! Converts driver-neutral [`SqlValue`]s into plain JSON and wraps tool
//! results in the shared `mcp-common` envelope.

use bigdecimal::ToPrimitive;
use chrono::SecondsFormat;
use mcp_common::{error_envelope, CallToolResult};
use serde::Serialize;
use serde_json::{json, Map, Number, Value};

use crate::db::{DbRow, SqlValue};
use crate::error::GateError;
use crate::executor::QueryOutcome;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Convert one cell to JSON
///
/// - date/time values become ISO-8601 strings
/// - decimals become floats; precision beyond an `f64` is lost, so
///   `10.10` comes back as the nearest binary float
/// - binary values are decoded as UTF-8 with replacement characters
pub fn serialize_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::UInt(u) => Value::from(*u),
        SqlValue::Float(f) => float(*f),
        SqlValue::Decimal(d) => d.to_f64().map_or(Value::Null, float),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        SqlValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        SqlValue::Time(t) => Value::String(t.format(TIME_FORMAT).to_string()),
        SqlValue::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
        SqlValue::Timestamp(ts) => {
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        SqlValue::Json(v) => v.clone(),
    }
}

// NaN and infinities have no JSON form
fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Convert a row to a JSON object, keeping column order
pub fn serialize_row(row: &DbRow) -> Map<String, Value> {
    row.columns
        .iter()
        .map(|(name, value)| (name.clone(), serialize_value(value)))
        .collect()
}

pub fn rows_to_json(rows: &[DbRow]) -> Vec<Value> {
    rows.iter().map(|r| Value::Object(serialize_row(r))).collect()
}

/// Structured payload summarizing a successful statement
pub fn outcome_payload(outcome: &QueryOutcome) -> Value {
    let mut payload = Map::new();
    if let Some(rows) = &outcome.rows {
        payload.insert("row_count".into(), json!(rows.len()));
        payload.insert("rows".into(), Value::Array(rows_to_json(rows)));
    }
    if let Some(affected) = outcome.rows_affected {
        payload.insert("rows_affected".into(), json!(affected));
    }
    if let Some(id) = outcome.last_insert_id {
        payload.insert("last_insert_id".into(), json!(id));
    }
    payload.insert(
        "duration_ms".into(),
        json!((outcome.duration_ms * 100.0).round() / 100.0),
    );
    Value::Object(payload)
}

#[derive(Serialize)]
struct ErrorDetails<'a> {
    kind: &'a str,
}

/// Error envelope for a gate failure; `context` prefixes the message
pub fn error_to_envelope(err: &GateError, context: &str) -> CallToolResult {
    let message = if context.is_empty() {
        err.to_string()
    } else {
        format!("{}: {}", context, err)
    };
    error_envelope(message, Some(&ErrorDetails { kind: err.kind() }))
}

/// Milliseconds with two decimals, for summaries
pub fn millis(duration_ms: f64) -> String {
    format!("{:.2}ms", duration_ms)
}
