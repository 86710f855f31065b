//! Stored procedures, functions, triggers and indexes
//!
//! Creating, modifying and dropping objects needs admin access; showing
//! them needs a writer. Definitions are checked by
//! [`SqlValidator::validate_routine_definition`](crate::validator::SqlValidator::validate_routine_definition)
//! and may contain internal semicolons.

use mcp_common::{CallToolResult, McpError};
use serde_json::{json, Map, Value};

use super::{finish, required, Reply};
use crate::db::{DbRow, FetchMode, SqlParam};
use crate::error::GateError;
use crate::format::{millis, outcome_payload, rows_to_json};
use crate::gate::Gate;
use crate::identifier;
use crate::identity::CallerIdentity;
use crate::params::{
    CallProcedureParams, IndexAction, IndexParams, IndexType, RoutineAction, RoutineParams,
    TriggerAction, TriggerParams,
};
use crate::permissions::Role;
use crate::validator::{validate_params, RoutineKind, SqlClass};

const TRIGGERS_FOR_TABLE_SQL: &str = "SELECT trigger_name AS trigger_name, \
     event_manipulation AS event, event_object_table AS table_name, \
     action_timing AS timing, action_statement AS statement, created AS created \
     FROM information_schema.triggers \
     WHERE trigger_schema = DATABASE() AND event_object_table = ? \
     ORDER BY trigger_name";

fn kind_label(kind: RoutineKind) -> &'static str {
    match kind {
        RoutineKind::Procedure => "stored procedure",
        RoutineKind::Function => "function",
        RoutineKind::Trigger => "trigger",
    }
}

/// `Create` -> "Created", for summaries
fn past_tense(action: &str) -> String {
    let done = match action {
        "create" => "created",
        "drop" => "dropped",
        "modify" => "modified",
        "analyze" => "analyzed",
        other => other,
    };
    let mut chars = done.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn execute_checked(
    gate: &Gate,
    session: &str,
    sql: &str,
    params: &[SqlParam],
    mode: FetchMode,
) -> Result<Vec<DbRow>, GateError> {
    let outcome = gate.run(session, sql, params, mode).await.into_result()?;
    Ok(outcome.rows.unwrap_or_default())
}

// ============================================================================
// Procedures and functions
// ============================================================================

pub async fn manage_stored_procedure(
    gate: &Gate,
    session: &str,
    params: RoutineParams,
) -> Result<CallToolResult, McpError> {
    manage_routine(gate, session, RoutineKind::Procedure, params).await
}

pub async fn manage_function(
    gate: &Gate,
    session: &str,
    params: RoutineParams,
) -> Result<CallToolResult, McpError> {
    manage_routine(gate, session, RoutineKind::Function, params).await
}

async fn manage_routine(
    gate: &Gate,
    session: &str,
    kind: RoutineKind,
    params: RoutineParams,
) -> Result<CallToolResult, McpError> {
    let action = match params.action {
        RoutineAction::Create => "create",
        RoutineAction::Drop => "drop",
        RoutineAction::Show => "show",
        RoutineAction::Modify => "modify",
    };
    let context = format!("Failed to {} {}", action, kind_label(kind));
    finish(&context, run_routine(gate, session, kind, action, params).await)
}

async fn run_routine(
    gate: &Gate,
    session: &str,
    kind: RoutineKind,
    action: &str,
    params: RoutineParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    match params.action {
        RoutineAction::Show => show_object(gate, session, &caller, kind, params.name.as_deref()).await,
        RoutineAction::Drop => {
            let name = required(&params.name, "Name")?;
            drop_object(gate, session, &caller, kind, name).await
        }
        RoutineAction::Create | RoutineAction::Modify => {
            let name = required(&params.name, "Name")?;
            let definition = required(&params.definition, "Definition")?;
            define_object(gate, session, &caller, kind, action, name, definition).await
        }
    }
}

async fn show_object(
    gate: &Gate,
    session: &str,
    caller: &CallerIdentity,
    kind: RoutineKind,
    name: Option<&str>,
) -> Result<Reply, GateError> {
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    let name = name.map(identifier::quote).transpose()?;
    gate.require(caller, Role::Writer)?;

    let (sql, key) = match (&name, kind) {
        (Some(name), _) => (format!("SHOW CREATE {} {}", kind.keyword(), name), "definition"),
        (None, RoutineKind::Trigger) => ("SHOW TRIGGERS".to_string(), "triggers"),
        (None, _) => (
            format!("SHOW {} STATUS WHERE Db = DATABASE()", kind.keyword()),
            "routines",
        ),
    };
    let mode = if name.is_some() { FetchMode::One } else { FetchMode::All };
    let rows = execute_checked(gate, session, &sql, &[], mode).await?;

    let data = match name {
        Some(_) => json!({ key: rows_to_json(&rows).into_iter().next() }),
        None => json!({ key: rows_to_json(&rows) }),
    };
    let title = match kind {
        RoutineKind::Procedure => "Stored Procedures",
        RoutineKind::Function => "Functions",
        RoutineKind::Trigger => "Database Triggers",
    };
    Ok(Reply::new(format!("**{}**", title)).with_data(data))
}

async fn drop_object(
    gate: &Gate,
    session: &str,
    caller: &CallerIdentity,
    kind: RoutineKind,
    name: &str,
) -> Result<Reply, GateError> {
    let quoted = identifier::quote(name)?;
    gate.require(caller, Role::Admin)?;

    let sql = format!("DROP {} IF EXISTS {}", kind.keyword(), quoted);
    execute_checked(gate, session, &sql, &[], FetchMode::None).await?;
    tracing::info!(user = %caller.login, kind = kind.keyword(), name, "Object dropped");
    Ok(object_reply(kind, "drop", name))
}

/// Create (or drop and recreate, for modify) from a full definition
async fn define_object(
    gate: &Gate,
    session: &str,
    caller: &CallerIdentity,
    kind: RoutineKind,
    action: &str,
    name: &str,
    definition: &str,
) -> Result<Reply, GateError> {
    let quoted = identifier::quote(name)?;
    gate.validator()
        .validate_routine_definition(kind, name, definition)?;
    gate.require(caller, Role::Admin)?;

    if action == "modify" {
        let sql = format!("DROP {} IF EXISTS {}", kind.keyword(), quoted);
        execute_checked(gate, session, &sql, &[], FetchMode::None).await?;
    }
    execute_checked(gate, session, definition.trim(), &[], FetchMode::None).await?;
    tracing::info!(user = %caller.login, kind = kind.keyword(), name, action, "Object defined");
    Ok(object_reply(kind, action, name))
}

fn object_reply(kind: RoutineKind, action: &str, name: &str) -> Reply {
    let label = kind_label(kind);
    let mut title = label.to_string();
    if let Some(first) = title.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    Reply::new(format!(
        "**{} {}**\n\nName: `{}`\nStatus: Success",
        title,
        past_tense(action),
        name
    ))
    .with_data(json!({
        "action": past_tense(action).to_lowercase(),
        "name": name,
        "success": true,
    }))
}

pub async fn execute_stored_procedure(
    gate: &Gate,
    session: &str,
    params: CallProcedureParams,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to execute stored procedure",
        run_call(gate, session, params).await,
    )
}

async fn run_call(
    gate: &Gate,
    session: &str,
    params: CallProcedureParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let name = identifier::quote(&params.name)?;
    let bound = validate_params(params.params.as_deref().unwrap_or_default())?;
    gate.authorize_class(&caller, SqlClass::Procedure)?;

    let placeholders = vec!["?"; bound.len()].join(", ");
    let sql = format!("CALL {}({})", name, placeholders);
    let outcome = gate
        .run(session, &sql, &bound, FetchMode::All)
        .await
        .into_result()?;

    let message = format!(
        "**Stored Procedure Executed**\n\nProcedure: {}\nExecution Time: {}",
        name,
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(outcome_payload(&outcome)))
}

// ============================================================================
// Triggers
// ============================================================================

pub async fn manage_trigger(
    gate: &Gate,
    session: &str,
    params: TriggerParams,
) -> Result<CallToolResult, McpError> {
    let action = match params.action {
        TriggerAction::Create => "create",
        TriggerAction::Drop => "drop",
        TriggerAction::Show => "show",
        TriggerAction::Modify => "modify",
        TriggerAction::Enable => "enable",
        TriggerAction::Disable => "disable",
    };
    let context = format!("Failed to {} trigger", action);
    finish(&context, run_trigger(gate, session, action, params).await)
}

async fn run_trigger(
    gate: &Gate,
    session: &str,
    action: &str,
    params: TriggerParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let kind = RoutineKind::Trigger;
    match params.action {
        TriggerAction::Show => match params.table.as_deref().map(str::trim) {
            Some(table) if !table.is_empty() && params.name.is_none() => {
                show_table_triggers(gate, session, &caller, table).await
            }
            _ => show_object(gate, session, &caller, kind, params.name.as_deref()).await,
        },
        TriggerAction::Drop => {
            let name = required(&params.name, "Name")?;
            drop_object(gate, session, &caller, kind, name).await
        }
        TriggerAction::Create | TriggerAction::Modify => {
            let name = required(&params.name, "Name")?;
            let definition = required(&params.definition, "Definition")?;
            define_object(gate, session, &caller, kind, action, name, definition).await
        }
        TriggerAction::Enable | TriggerAction::Disable => Err(GateError::Validation(format!(
            "MySQL does not support {} trigger directly",
            action
        ))),
    }
}

async fn show_table_triggers(
    gate: &Gate,
    session: &str,
    caller: &CallerIdentity,
    table: &str,
) -> Result<Reply, GateError> {
    let table = identifier::sanitize(table)?;
    gate.require(caller, Role::Writer)?;

    let rows = execute_checked(
        gate,
        session,
        TRIGGERS_FOR_TABLE_SQL,
        &[SqlParam::Text(table.clone())],
        FetchMode::All,
    )
    .await?;
    Ok(Reply::new(format!("**Triggers on `{}`**", table))
        .with_data(json!({ "table": table, "triggers": rows_to_json(&rows) })))
}

// ============================================================================
// Indexes
// ============================================================================

pub async fn manage_index(
    gate: &Gate,
    session: &str,
    params: IndexParams,
) -> Result<CallToolResult, McpError> {
    let action = match params.action {
        IndexAction::Create => "create",
        IndexAction::Drop => "drop",
        IndexAction::Show => "show",
        IndexAction::Analyze => "analyze",
    };
    let context = format!("Failed to {} index", action);
    finish(&context, run_index(gate, session, action, params).await)
}

async fn run_index(
    gate: &Gate,
    session: &str,
    action: &str,
    params: IndexParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let table = identifier::sanitize(&params.table)?;
    let quoted_table = identifier::quote(&table)?;

    match params.action {
        IndexAction::Show => {
            gate.require(&caller, Role::Writer)?;
            let sql = format!("SHOW INDEX FROM {}", quoted_table);
            let rows = execute_checked(gate, session, &sql, &[], FetchMode::All).await?;
            Ok(Reply::new(format!("**Indexes for table `{}`**", table))
                .with_data(json!({ "table": table, "indexes": group_show_index(&rows) })))
        }
        IndexAction::Analyze => {
            gate.require(&caller, Role::Writer)?;
            let sql = format!("ANALYZE TABLE {}", quoted_table);
            let rows = execute_checked(gate, session, &sql, &[], FetchMode::All).await?;
            Ok(Reply::new(format!("**Index Analyzed**\n\nTable: `{}`", table))
                .with_data(json!({ "table": table, "result": rows_to_json(&rows) })))
        }
        IndexAction::Create => {
            let index = required(&params.index_name, "Index name")?;
            let columns = params
                .columns
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    GateError::Validation("Index name and columns required for create".to_string())
                })?;
            let sql = create_index_sql(&quoted_table, index, columns, params.index_type)?;
            gate.require(&caller, Role::Admin)?;
            execute_checked(gate, session, &sql, &[], FetchMode::None).await?;
            tracing::info!(user = %caller.login, table = %table, index, "Index created");
            Ok(index_reply(action, &table, index))
        }
        IndexAction::Drop => {
            let index = required(&params.index_name, "Index name")?;
            let sql = format!(
                "DROP INDEX {} ON {}",
                identifier::quote(index)?,
                quoted_table
            );
            gate.require(&caller, Role::Admin)?;
            execute_checked(gate, session, &sql, &[], FetchMode::None).await?;
            tracing::info!(user = %caller.login, table = %table, index, "Index dropped");
            Ok(index_reply(action, &table, index))
        }
    }
}

/// Build a `CREATE INDEX` statement from sanitized parts
pub fn create_index_sql(
    quoted_table: &str,
    index: &str,
    columns: &[String],
    index_type: Option<IndexType>,
) -> Result<String, GateError> {
    let prefix = match index_type {
        Some(IndexType::Fulltext) => "FULLTEXT ",
        Some(IndexType::Unique) => "UNIQUE ",
        _ => "",
    };
    let mut sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        prefix,
        identifier::quote(index)?,
        quoted_table,
        identifier::quote_all(columns)?.join(", ")
    );
    match index_type {
        Some(IndexType::Hash) => sql.push_str(" USING HASH"),
        Some(IndexType::Btree) => sql.push_str(" USING BTREE"),
        _ => {}
    }
    Ok(sql)
}

fn index_reply(action: &str, table: &str, index: &str) -> Reply {
    Reply::new(format!(
        "**Index {}**\n\nTable: `{}`\nIndex: `{}`\nStatus: Success",
        past_tense(action),
        table,
        index
    ))
    .with_data(json!({
        "action": past_tense(action).to_lowercase(),
        "table": table,
        "index": index,
        "success": true,
    }))
}

/// Group `SHOW INDEX` rows by `Key_name`
pub fn group_show_index(rows: &[DbRow]) -> Value {
    let mut indexes: Map<String, Value> = Map::new();
    for row in rows {
        let name = row.text("Key_name").unwrap_or_default();
        let entry = indexes.entry(name.clone()).or_insert_with(|| {
            json!({
                "name": name,
                "unique": row.int("Non_unique") == Some(0),
                "type": row.text("Index_type"),
                "columns": [],
            })
        });
        if let Some(cols) = entry["columns"].as_array_mut() {
            cols.push(json!({
                "column": row.text("Column_name"),
                "sequence": row.int("Seq_in_index"),
                "cardinality": row.int("Cardinality"),
            }));
        }
    }
    Value::Array(indexes.into_iter().map(|(_, v)| v).collect())
}
