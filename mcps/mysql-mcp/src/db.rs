//! Database seam
//!
//! The gate talks to the engine only through [`Database`] (pooled,
//! one-statement calls) and [`TxConnection`] (one connection held for a
//! transaction). [`crate::mysql::MySqlDatabase`] is the production
//! implementation; tests substitute an in-memory double.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use crate::error::DriverError;

// ============================================================================
// Values
// ============================================================================

/// A bound statement parameter; only scalars are accepted
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl SqlParam {
    /// Convert a JSON scalar; arrays and objects yield `None`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(SqlParam::Null),
            Value::Bool(b) => Some(SqlParam::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(SqlParam::Int)
                .or_else(|| n.as_u64().map(SqlParam::UInt))
                .or_else(|| n.as_f64().map(SqlParam::Float)),
            Value::String(s) => Some(SqlParam::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// A decoded cell, independent of the driver
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Textual view for string-like and numeric cells
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::UInt(u) => Some(u.to_string()),
            SqlValue::Decimal(d) => Some(d.to_string()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::UInt(u) => i64::try_from(*u).ok(),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        use bigdecimal::ToPrimitive;
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Decimal(d) => d.to_f64(),
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::UInt(u) => Some(*u as f64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbRow {
    pub columns: Vec<(String, SqlValue)>,
}

impl DbRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, handy for test fixtures
    pub fn with(mut self, name: impl Into<String>, value: SqlValue) -> Self {
        self.columns.push((name.into(), value));
        self
    }

    /// Look up a column by name, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(SqlValue::as_text)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SqlValue::as_i64)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(SqlValue::as_f64)
    }
}

// ============================================================================
// Statements
// ============================================================================

/// What to bring back from a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Execute only
    None,
    /// First row, if any
    One,
    All,
    /// At most this many rows; the driver stops reading after the last one
    Many(usize),
    /// Rows affected and last insert id, no rows
    CursorInfo,
}

/// Driver-level result of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub rows: Vec<DbRow>,
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

impl RawResult {
    pub fn rows(rows: Vec<DbRow>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows,
            rows_affected,
            last_insert_id: None,
        }
    }

    /// Result of a statement that returns no rows; MySQL reports a last
    /// insert id of 0 when none was generated
    pub fn affected(rows_affected: u64, last_insert_id: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
            last_insert_id: (last_insert_id != 0).then_some(last_insert_id),
        }
    }
}

/// Pooled access to the configured database
///
/// Every call leases a connection only for its own duration.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run one statement; parameters are bound positionally, and a
    /// statement without parameters goes over the text protocol
    async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        mode: FetchMode,
    ) -> Result<RawResult, DriverError>;

    /// Lease a connection and start a transaction on it
    async fn begin(&self) -> Result<Box<dyn TxConnection>, DriverError>;

    async fn ping(&self) -> Result<(), DriverError>;

    /// Close the pool; later calls fail with a disconnected error
    async fn close(&self);
}

/// One leased connection with an open transaction
///
/// Commit and rollback consume the handle and return the connection to
/// the pool. Dropping it without either rolls back.
#[async_trait]
pub trait TxConnection: Send {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        mode: FetchMode,
    ) -> Result<RawResult, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}
