//! Query executor
//!
//! Times every statement, maps driver failures through
//! [`crate::error::format_database_error`] and produces a [`QueryOutcome`].
//! Parameters are always bound, never interpolated.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::db::{Database, DbRow, FetchMode, RawResult, SqlParam};
use crate::error::{DriverError, GateError};
use crate::identifier;
use crate::validator::preview;

/// Result of one statement, successful or not
#[derive(Debug)]
pub struct QueryOutcome {
    pub success: bool,
    pub rows: Option<Vec<DbRow>>,
    /// Formatted, redacted failure
    pub error: Option<GateError>,
    pub duration_ms: f64,
    pub rows_affected: Option<u64>,
    pub last_insert_id: Option<u64>,
}

impl QueryOutcome {
    pub fn from_raw(raw: RawResult, mode: FetchMode, duration_ms: f64) -> Self {
        let rows = match mode {
            FetchMode::One | FetchMode::All | FetchMode::Many(_) => Some(raw.rows),
            FetchMode::None | FetchMode::CursorInfo => None,
        };
        Self {
            success: true,
            rows,
            error: None,
            duration_ms,
            rows_affected: Some(raw.rows_affected),
            last_insert_id: raw.last_insert_id,
        }
    }

    pub fn failed(error: GateError, duration_ms: f64) -> Self {
        Self {
            success: false,
            rows: None,
            error: Some(error),
            duration_ms,
            rows_affected: None,
            last_insert_id: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }

    /// Turn a failed outcome into its error
    pub fn into_result(mut self) -> Result<Self, GateError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    db: Arc<dyn Database>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Run one statement on a connection leased for this call only
    pub async fn execute(&self, sql: &str, params: &[SqlParam], mode: FetchMode) -> QueryOutcome {
        self.timed(sql, mode, self.db.execute(sql, params, mode)).await
    }

    /// Time a driver call and normalize its result
    ///
    /// Used for both pooled calls and calls on a transaction's connection.
    pub async fn timed<F>(&self, sql: &str, mode: FetchMode, call: F) -> QueryOutcome
    where
        F: Future<Output = Result<RawResult, DriverError>>,
    {
        let start = Instant::now();
        let result = call.await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(raw) => {
                tracing::debug!(sql_preview = %preview(sql), duration_ms, "Query executed");
                QueryOutcome::from_raw(raw, mode, duration_ms)
            }
            Err(e) => {
                tracing::error!(
                    sql_preview = %preview(sql),
                    duration_ms,
                    error = %e,
                    "Query execution failed"
                );
                QueryOutcome::failed(e.into(), duration_ms)
            }
        }
    }
}

/// Build one multi-row `INSERT` for a fixed column list
///
/// Every row must supply exactly one value per column. With
/// `on_duplicate_key_update`, conflicting rows overwrite every listed column.
pub fn build_batch_insert(
    table: &str,
    columns: &[String],
    rows: &[Vec<SqlParam>],
    on_duplicate_key_update: bool,
) -> Result<(String, Vec<SqlParam>), GateError> {
    if columns.is_empty() {
        return Err(GateError::Validation("No columns to insert".to_string()));
    }
    if rows.is_empty() {
        return Err(GateError::Validation("No data to insert".to_string()));
    }

    let table = identifier::quote(table)?;
    let quoted = identifier::quote_all(columns)?;

    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let mut values = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * columns.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(GateError::Validation(format!(
                "Row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        values.push(placeholders.as_str());
        params.extend(row.iter().cloned());
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        quoted.join(", "),
        values.join(", ")
    );
    if on_duplicate_key_update {
        let updates: Vec<String> = quoted
            .iter()
            .map(|col| format!("{col} = VALUES({col})"))
            .collect();
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&updates.join(", "));
    }

    Ok((sql, params))
}

/// Convert `{column: value}` objects into a column list and value rows
///
/// The first object fixes the column set; later objects must use the same
/// keys (in any order).
pub fn rows_from_objects(
    objects: &[Map<String, Value>],
) -> Result<(Vec<String>, Vec<Vec<SqlParam>>), GateError> {
    let Some(first) = objects.first() else {
        return Err(GateError::Validation("No data to insert".to_string()));
    };
    let columns: Vec<String> = first.keys().cloned().collect();

    let rows = objects
        .iter()
        .enumerate()
        .map(|(i, object)| {
            if object.len() != columns.len() {
                return Err(GateError::Validation(format!(
                    "Row {} has different columns than the first row",
                    i
                )));
            }
            columns
                .iter()
                .map(|col| {
                    let value = object.get(col).ok_or_else(|| {
                        GateError::Validation(format!(
                            "Row {} has different columns than the first row",
                            i
                        ))
                    })?;
                    param_for(col, value)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((columns, rows))
}

/// Scalar JSON value for a named column
pub fn param_for(column: &str, value: &Value) -> Result<SqlParam, GateError> {
    SqlParam::from_json(value).ok_or_else(|| {
        GateError::Validation(format!(
            "Value for column '{}' must be a string, number, boolean or null",
            column
        ))
    })
}
