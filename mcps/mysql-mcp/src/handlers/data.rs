//! Structured data tools
//!
//! These build their own SQL, so every table and column name goes through
//! [`identifier`] and every value is bound.

use std::sync::LazyLock;

use mcp_common::{CallToolResult, McpError};
use regex::Regex;
use serde_json::{json, Map, Value};

use super::query::resolve_limit;
use super::{equality_clauses, finish, Reply};
use crate::db::{FetchMode, SqlParam};
use crate::error::GateError;
use crate::executor::{param_for, rows_from_objects};
use crate::format::{millis, outcome_payload};
use crate::gate::Gate;
use crate::identifier;
use crate::params::{CreateTableParams, DeleteParams, InsertParams, SelectParams, UpdateParams};
use crate::validator::SqlClass;

static COLUMN_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\s(),]+$").expect("valid column definition regex"));

// ============================================================================
// select_table_data
// ============================================================================

pub async fn select_table_data(
    gate: &Gate,
    session: &str,
    params: SelectParams,
) -> Result<CallToolResult, McpError> {
    finish("Failed to select data", run_select(gate, session, params).await)
}

async fn run_select(gate: &Gate, session: &str, params: SelectParams) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let table = identifier::sanitize(&params.table)?;
    let limit = resolve_limit(params.limit, gate.config().security.max_rows)?;
    let (sql, bound) = build_select(&table, &params, limit)?;
    gate.authorize_class(&caller, SqlClass::Read)?;

    let outcome = gate
        .run(session, &sql, &bound, FetchMode::All)
        .await
        .into_result()?;

    let message = format!(
        "**Query Results**\n\nTable: `{}`\nRows returned: {}\nExecution time: {}",
        table,
        outcome.row_count(),
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(outcome_payload(&outcome)))
}

/// Build a bound `SELECT` for a sanitized table
pub fn build_select(
    table: &str,
    params: &SelectParams,
    limit: usize,
) -> Result<(String, Vec<SqlParam>), GateError> {
    let columns = match params.columns.as_deref() {
        Some(cols) if !cols.is_empty() => identifier::quote_all(cols)?.join(", "),
        _ => "*".to_string(),
    };
    let mut sql = format!("SELECT {} FROM {}", columns, identifier::quote(table)?);

    let mut bound = Vec::new();
    if let Some(conditions) = params.where_conditions.as_ref().filter(|c| !c.is_empty()) {
        let (clauses, values) = equality_clauses(conditions)?;
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
        bound = values;
    }

    if let Some(order_by) = params.order_by.as_deref() {
        let direction = if params.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {} {}", identifier::quote(order_by)?, direction));
    }

    sql.push_str(&format!(" LIMIT {}", limit));
    if let Some(offset) = params.offset.filter(|o| *o > 0) {
        sql.push_str(&format!(" OFFSET {}", offset));
    }
    Ok((sql, bound))
}

// ============================================================================
// insert_table_data
// ============================================================================

pub async fn insert_table_data(
    gate: &Gate,
    session: &str,
    params: InsertParams,
) -> Result<CallToolResult, McpError> {
    finish("Failed to insert data", run_insert(gate, session, params).await)
}

async fn run_insert(gate: &Gate, session: &str, params: InsertParams) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let table = identifier::sanitize(&params.table)?;
    let objects = params.data.into_rows();
    let (columns, rows) = rows_from_objects(&objects)?;
    identifier::quote_all(&columns)?;
    gate.authorize_class(&caller, SqlClass::Write)?;

    tracing::info!(
        user = %caller.login,
        table = %table,
        rows = rows.len(),
        "Inserting rows"
    );
    let outcome = gate
        .execute_many(session, &table, &columns, &rows, params.on_duplicate_key_update)
        .await?;

    let mut message = format!(
        "**Data Inserted**\n\nTable: `{}`\nRows Affected: {}\n",
        table,
        outcome.rows_affected.unwrap_or(0)
    );
    if let Some(id) = outcome.last_insert_id.filter(|id| *id > 0) {
        message.push_str(&format!("Last Insert ID: {}\n", id));
    }
    message.push_str(&format!("Execution Time: {}", millis(outcome.duration_ms)));
    Ok(Reply::new(message).with_data(outcome_payload(&outcome)))
}

// ============================================================================
// update_table_data / delete_table_data
// ============================================================================

pub async fn update_table_data(
    gate: &Gate,
    session: &str,
    params: UpdateParams,
) -> Result<CallToolResult, McpError> {
    finish("Failed to update data", run_update(gate, session, params).await)
}

async fn run_update(gate: &Gate, session: &str, params: UpdateParams) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let table = identifier::sanitize(&params.table)?;
    let (sql, bound) = build_update(&table, &params.data, &params.where_conditions)?;
    gate.authorize_class(&caller, SqlClass::Write)?;

    let outcome = gate
        .run(session, &sql, &bound, FetchMode::CursorInfo)
        .await
        .into_result()?;
    tracing::info!(user = %caller.login, table = %table, rows = ?outcome.rows_affected, "Rows updated");

    let message = format!(
        "**Data Updated**\n\nTable: `{}`\nRows Affected: {}\nExecution Time: {}",
        table,
        outcome.rows_affected.unwrap_or(0),
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(outcome_payload(&outcome)))
}

pub fn build_update(
    table: &str,
    data: &Map<String, Value>,
    conditions: &Map<String, Value>,
) -> Result<(String, Vec<SqlParam>), GateError> {
    if data.is_empty() {
        return Err(GateError::Validation("No data to update".to_string()));
    }
    if conditions.is_empty() {
        return Err(GateError::Validation(
            "WHERE conditions required for UPDATE".to_string(),
        ));
    }

    let mut assignments = Vec::with_capacity(data.len());
    let mut bound = Vec::with_capacity(data.len() + conditions.len());
    for (column, value) in data {
        assignments.push(format!("{} = ?", identifier::quote(column)?));
        bound.push(param_for(column, value)?);
    }
    let (clauses, values) = equality_clauses(conditions)?;
    bound.extend(values);

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        identifier::quote(table)?,
        assignments.join(", "),
        clauses.join(" AND ")
    );
    Ok((sql, bound))
}

pub async fn delete_table_data(
    gate: &Gate,
    session: &str,
    params: DeleteParams,
) -> Result<CallToolResult, McpError> {
    finish("Failed to delete data", run_delete(gate, session, params).await)
}

async fn run_delete(gate: &Gate, session: &str, params: DeleteParams) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let table = identifier::sanitize(&params.table)?;
    let (sql, bound) = build_delete(&table, &params.where_conditions)?;
    gate.authorize_class(&caller, SqlClass::Write)?;

    let outcome = gate
        .run(session, &sql, &bound, FetchMode::CursorInfo)
        .await
        .into_result()?;
    tracing::info!(user = %caller.login, table = %table, rows = ?outcome.rows_affected, "Rows deleted");

    let message = format!(
        "**Data Deleted**\n\nTable: `{}`\nRows Affected: {}\nExecution Time: {}",
        table,
        outcome.rows_affected.unwrap_or(0),
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(outcome_payload(&outcome)))
}

pub fn build_delete(
    table: &str,
    conditions: &Map<String, Value>,
) -> Result<(String, Vec<SqlParam>), GateError> {
    if conditions.is_empty() {
        return Err(GateError::Validation(
            "WHERE conditions required for DELETE".to_string(),
        ));
    }
    let (clauses, bound) = equality_clauses(conditions)?;
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        identifier::quote(table)?,
        clauses.join(" AND ")
    );
    Ok((sql, bound))
}

// ============================================================================
// create_table_secure
// ============================================================================

pub async fn create_table_secure(
    gate: &Gate,
    session: &str,
    params: CreateTableParams,
) -> Result<CallToolResult, McpError> {
    finish("Failed to create table", run_create(gate, session, params).await)
}

async fn run_create(
    gate: &Gate,
    session: &str,
    params: CreateTableParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let table = identifier::sanitize(&params.table)?;
    let sql = build_create_table(&table, &params)?;
    gate.authorize_class(&caller, SqlClass::Ddl)?;

    let outcome = gate
        .run(session, &sql, &[], FetchMode::None)
        .await
        .into_result()?;
    tracing::info!(user = %caller.login, table = %table, "Table created");

    let message = format!(
        "**Table Created**\n\nTable: `{}`\nColumns: {}\nExecution Time: {}\n\n\
         **Note:** DDL operations are auto-committed and cannot be rolled back.",
        table,
        params.columns.len(),
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(json!({
        "table": table,
        "columns": params.columns.keys().collect::<Vec<_>>(),
        "engine": params.engine,
        "charset": params.charset,
    })))
}

/// Build `CREATE TABLE` from checked column definitions
pub fn build_create_table(table: &str, params: &CreateTableParams) -> Result<String, GateError> {
    if params.columns.is_empty() {
        return Err(GateError::Validation("Column definitions required".to_string()));
    }

    let mut parts = Vec::with_capacity(params.columns.len() + 2);
    for (column, definition) in &params.columns {
        let definition = definition
            .as_str()
            .map(str::trim)
            .filter(|d| COLUMN_DEFINITION.is_match(d))
            .ok_or_else(|| {
                GateError::Validation(format!("Invalid column definition for {}", column))
            })?;
        parts.push(format!("{} {}", identifier::quote(column)?, definition));
    }

    if let Some(pk) = params.primary_key.as_deref() {
        parts.push(format!("PRIMARY KEY ({})", identifier::quote(pk)?));
    }
    for column in params.indexes.iter().flatten() {
        let column = identifier::sanitize(column)?;
        parts.push(format!(
            "INDEX {} ({})",
            identifier::quote(&format!("idx_{}", column))?,
            identifier::quote(&column)?
        ));
    }

    Ok(format!(
        "CREATE TABLE {} ({}) ENGINE={} DEFAULT CHARSET={}",
        identifier::quote(table)?,
        parts.join(", "),
        identifier::sanitize(&params.engine)?,
        identifier::sanitize(&params.charset)?
    ))
}
