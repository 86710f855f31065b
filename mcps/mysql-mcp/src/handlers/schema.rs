//! Read-only schema introspection tools

use mcp_common::{CallToolResult, McpError};
use serde_json::{json, Map, Value};

use super::{finish, Reply};
use crate::db::{DbRow, FetchMode, SqlParam};
use crate::error::GateError;
use crate::format::{millis, rows_to_json, serialize_row, serialize_value};
use crate::gate::Gate;
use crate::identifier;
use crate::params::{DescribeTableParams, ListTablesParams, TableParams};
use crate::validator::SqlClass;

const SYSTEM_SCHEMAS: [&str; 4] = ["mysql", "information_schema", "performance_schema", "sys"];

const TABLES_SQL: &str = "SELECT table_name AS table_name, table_schema AS table_schema, \
     table_type AS table_type, engine AS engine, table_rows AS table_rows, \
     data_length AS data_length, index_length AS index_length, \
     create_time AS create_time, update_time AS update_time \
     FROM information_schema.tables";

const COLUMNS_SQL: &str = "SELECT column_name AS column_name, column_type AS column_type, \
     is_nullable AS is_nullable, column_default AS column_default, column_key AS column_key, \
     extra AS extra, column_comment AS column_comment \
     FROM information_schema.columns \
     WHERE table_schema = DATABASE() AND table_name = ? \
     ORDER BY ordinal_position";

const INDEXES_SQL: &str = "SELECT index_name AS index_name, non_unique AS non_unique, \
     seq_in_index AS seq_in_index, column_name AS column_name, collation AS collation, \
     cardinality AS cardinality, index_type AS index_type \
     FROM information_schema.statistics \
     WHERE table_schema = DATABASE() AND table_name = ? \
     ORDER BY index_name, seq_in_index";

const FOREIGN_KEYS_SQL: &str = "SELECT constraint_name AS constraint_name, \
     column_name AS column_name, referenced_table_schema AS referenced_table_schema, \
     referenced_table_name AS referenced_table_name, \
     referenced_column_name AS referenced_column_name \
     FROM information_schema.key_column_usage \
     WHERE table_schema = DATABASE() AND table_name = ? \
     AND referenced_table_name IS NOT NULL \
     ORDER BY constraint_name, ordinal_position";

const SCHEMA_SQL: &str = "SELECT table_name AS table_name, column_name AS column_name, \
     data_type AS data_type, is_nullable AS is_nullable, column_default AS column_default, \
     column_key AS column_key, extra AS extra, column_comment AS column_comment \
     FROM information_schema.columns \
     WHERE table_schema = DATABASE() \
     ORDER BY table_name, ordinal_position";

const STATS_SQL: &str = "SELECT COUNT(*) AS table_count, SUM(table_rows) AS total_rows, \
     SUM(data_length + index_length) AS total_size, SUM(data_length) AS data_size, \
     SUM(index_length) AS index_size, AVG(avg_row_length) AS avg_row_length \
     FROM information_schema.tables \
     WHERE table_schema = DATABASE()";

/// Resolve the caller and check read access
async fn authorize_read(gate: &Gate, session: &str) -> Result<(), GateError> {
    let caller = gate.caller(session).await?;
    gate.authorize_class(&caller, SqlClass::Read)
}

async fn fetch(
    gate: &Gate,
    session: &str,
    sql: &str,
    params: &[SqlParam],
) -> Result<Vec<DbRow>, GateError> {
    let outcome = gate.run(session, sql, params, FetchMode::All).await.into_result()?;
    Ok(outcome.rows.unwrap_or_default())
}

fn cell(row: &DbRow, name: &str) -> Value {
    row.get(name).map_or(Value::Null, serialize_value)
}

// ============================================================================
// list_tables
// ============================================================================

pub async fn list_tables(
    gate: &Gate,
    session: &str,
    params: ListTablesParams,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to retrieve database tables",
        run_list_tables(gate, session, params).await,
    )
}

async fn run_list_tables(
    gate: &Gate,
    session: &str,
    params: ListTablesParams,
) -> Result<Reply, GateError> {
    authorize_read(gate, session).await?;

    let rows = match params.schema.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(schema) => {
            let sql = format!("{} WHERE table_schema = ? ORDER BY table_name", TABLES_SQL);
            fetch(gate, session, &sql, &[SqlParam::Text(schema.to_string())]).await?
        }
        None => {
            let sql = format!("{} WHERE table_schema = DATABASE() ORDER BY table_name", TABLES_SQL);
            fetch(gate, session, &sql, &[]).await?
        }
    };

    let grouped = group_tables(&rows);
    let user_count = grouped["user_tables"].as_array().map_or(0, Vec::len);
    let view_count = grouped["views"].as_array().map_or(0, Vec::len);
    let message = format!(
        "**Database Tables and Schema**\n\nUser tables: {}\nViews: {}\nTotal tables found: {}\n\n\
         **Note:** Use `query_database` to run SELECT queries, or `describe_table` to see detailed table structure.",
        user_count,
        view_count,
        rows.len()
    );
    Ok(Reply::new(message).with_data(grouped))
}

/// Split table rows into user tables, views and system tables
pub fn group_tables(rows: &[DbRow]) -> Value {
    let mut user_tables = Vec::new();
    let mut views = Vec::new();
    let mut system_tables = Vec::new();

    for row in rows {
        let table_type = row.text("table_type").unwrap_or_default();
        let schema = row.text("table_schema").unwrap_or_default();
        let info = json!({
            "name": cell(row, "table_name"),
            "type": &table_type,
            "engine": cell(row, "engine"),
            "rows": cell(row, "table_rows"),
            "data_size": cell(row, "data_length"),
            "index_size": cell(row, "index_length"),
            "created": cell(row, "create_time"),
            "updated": cell(row, "update_time"),
        });

        if table_type.eq_ignore_ascii_case("VIEW") {
            views.push(info);
        } else if SYSTEM_SCHEMAS.contains(&schema.to_lowercase().as_str()) {
            system_tables.push(info);
        } else {
            user_tables.push(info);
        }
    }

    json!({
        "user_tables": user_tables,
        "views": views,
        "system_tables": system_tables,
        "total_count": rows.len(),
    })
}

// ============================================================================
// describe_table
// ============================================================================

pub async fn describe_table(
    gate: &Gate,
    session: &str,
    params: DescribeTableParams,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to describe table",
        run_describe(gate, session, params).await,
    )
}

async fn run_describe(
    gate: &Gate,
    session: &str,
    params: DescribeTableParams,
) -> Result<Reply, GateError> {
    let table = identifier::sanitize(&params.table)?;
    authorize_read(gate, session).await?;

    let name = [SqlParam::Text(table.clone())];
    let columns = fetch(gate, session, COLUMNS_SQL, &name).await?;
    if columns.is_empty() {
        return Err(GateError::Validation(format!(
            "Table '{}' does not exist.",
            table
        )));
    }
    let indexes = if params.include_indexes {
        fetch(gate, session, INDEXES_SQL, &name).await?
    } else {
        Vec::new()
    };
    let foreign_keys = if params.include_foreign_keys {
        fetch(gate, session, FOREIGN_KEYS_SQL, &name).await?
    } else {
        Vec::new()
    };

    let columns: Vec<Value> = columns
        .iter()
        .map(|col| {
            json!({
                "name": cell(col, "column_name"),
                "type": cell(col, "column_type"),
                "nullable": col.text("is_nullable").is_some_and(|v| v.eq_ignore_ascii_case("YES")),
                "default": cell(col, "column_default"),
                "key": cell(col, "column_key"),
                "extra": cell(col, "extra"),
                "comment": cell(col, "column_comment"),
            })
        })
        .collect();

    let mut data = json!({
        "table": table,
        "columns": columns,
    });
    if params.include_indexes {
        data["indexes"] = group_indexes(&indexes);
    }
    if params.include_foreign_keys {
        data["foreign_keys"] = group_foreign_keys(&foreign_keys);
    }

    let message = format!(
        "**Table Structure: `{}`**\n\nColumns: {}",
        table,
        columns.len()
    );
    Ok(Reply::new(message).with_data(data))
}

/// Group index rows (one per indexed column) by index name
pub fn group_indexes(rows: &[DbRow]) -> Value {
    let mut indexes: Map<String, Value> = Map::new();
    for row in rows {
        let name = row.text("index_name").unwrap_or_default();
        let entry = indexes.entry(name.clone()).or_insert_with(|| {
            json!({
                "name": name,
                "unique": row.int("non_unique") == Some(0),
                "type": cell(row, "index_type"),
                "columns": [],
            })
        });
        if let Some(cols) = entry["columns"].as_array_mut() {
            cols.push(json!({
                "column": cell(row, "column_name"),
                "sequence": cell(row, "seq_in_index"),
                "collation": cell(row, "collation"),
            }));
        }
    }
    Value::Array(indexes.into_iter().map(|(_, v)| v).collect())
}

/// Group foreign key rows by constraint name
pub fn group_foreign_keys(rows: &[DbRow]) -> Value {
    let mut keys: Map<String, Value> = Map::new();
    for row in rows {
        let name = row.text("constraint_name").unwrap_or_default();
        let entry = keys.entry(name.clone()).or_insert_with(|| {
            json!({
                "name": name,
                "referenced_table": cell(row, "referenced_table_name"),
                "columns": [],
                "referenced_columns": [],
            })
        });
        if let Some(cols) = entry["columns"].as_array_mut() {
            cols.push(cell(row, "column_name"));
        }
        if let Some(cols) = entry["referenced_columns"].as_array_mut() {
            cols.push(cell(row, "referenced_column_name"));
        }
    }
    Value::Array(keys.into_iter().map(|(_, v)| v).collect())
}

// ============================================================================
// get_table_structure / discover_database_schema / get_database_statistics
// ============================================================================

pub async fn get_table_structure(
    gate: &Gate,
    session: &str,
    params: TableParams,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to get table structure",
        run_table_structure(gate, session, params).await,
    )
}

async fn run_table_structure(
    gate: &Gate,
    session: &str,
    params: TableParams,
) -> Result<Reply, GateError> {
    let table = identifier::quote(&params.table)?;
    authorize_read(gate, session).await?;

    let outcome = gate
        .run(session, &format!("DESCRIBE {}", table), &[], FetchMode::All)
        .await
        .into_result()?;
    let rows = outcome.rows.as_deref().unwrap_or_default();
    let message = format!(
        "**Table Structure: {}**\n\nColumns: {}\nExecution time: {}",
        table,
        rows.len(),
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(json!({ "columns": rows_to_json(rows) })))
}

pub async fn discover_database_schema(
    gate: &Gate,
    session: &str,
) -> Result<CallToolResult, McpError> {
    finish(
        "Schema discovery failed",
        run_discover(gate, session).await,
    )
}

async fn run_discover(gate: &Gate, session: &str) -> Result<Reply, GateError> {
    authorize_read(gate, session).await?;
    let rows = fetch(gate, session, SCHEMA_SQL, &[]).await?;

    let mut tables: Map<String, Value> = Map::new();
    for row in &rows {
        let table = row.text("table_name").unwrap_or_default();
        let mut column = serialize_row(row);
        column.remove("table_name");
        let entry = tables
            .entry(table)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(cols) = entry.as_array_mut() {
            cols.push(Value::Object(column));
        }
    }

    let message = format!(
        "**Database Schema**\n\nTables: {}\nColumns: {}",
        tables.len(),
        rows.len()
    );
    Ok(Reply::new(message).with_data(json!({ "tables": tables })))
}

pub async fn get_database_statistics(
    gate: &Gate,
    session: &str,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to get database statistics",
        run_statistics(gate, session).await,
    )
}

async fn run_statistics(gate: &Gate, session: &str) -> Result<Reply, GateError> {
    authorize_read(gate, session).await?;
    let outcome = gate
        .run(session, STATS_SQL, &[], FetchMode::One)
        .await
        .into_result()?;
    let stats = outcome
        .rows
        .as_deref()
        .and_then(<[DbRow]>::first)
        .map_or_else(|| json!({}), |row| Value::Object(serialize_row(row)));

    let table_count = stats.get("table_count").cloned().unwrap_or(json!(0));
    let message = format!("**Database Statistics**\n\nTables: {}", table_count);
    Ok(Reply::new(message).with_data(stats))
}
