//! Free-form SQL tools

use mcp_common::{CallToolResult, McpError};
use serde_json::{json, Value};

use super::{finish, Reply};
use crate::analysis;
use crate::db::FetchMode;
use crate::error::GateError;
use crate::format::{millis, outcome_payload, rows_to_json};
use crate::gate::Gate;
use crate::params::{ComplexQueryParams, ExecuteParams, QueryParams};
use crate::permissions::Role;
use crate::validator::{extract_table_names, preview, validate_params, SqlClass};

/// Upper bound for a caller-supplied row limit
pub const MAX_QUERY_LIMIT: usize = 10_000;

const READ_ONLY_TOOL: &str = "Write operations are not allowed with this tool. \
     Use the `execute_database` tool if you have write permissions.";

const USE_TRANSACTION_TOOL: &str =
    "Transaction control statements are not allowed here. Use the `manage_transaction` tool.";

// ============================================================================
// query_database
// ============================================================================

pub async fn query_database(
    gate: &Gate,
    session: &str,
    params: QueryParams,
) -> Result<CallToolResult, McpError> {
    finish("Query execution failed", run_query(gate, session, params).await)
}

async fn run_query(gate: &Gate, session: &str, params: QueryParams) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let class = read_only_class(gate, &params.sql)?;
    gate.authorize_class(&caller, class)?;
    let limit = resolve_limit(params.limit, gate.config().security.max_rows)?;

    tracing::info!(user = %caller.login, sql_preview = %preview(&params.sql), "Executing query");

    // one row past the limit tells us whether the result was cut off
    let mut outcome = gate
        .run(session, &params.sql, &[], FetchMode::Many(limit.saturating_add(1)))
        .await
        .into_result()?;

    let truncated = outcome.row_count() > limit;
    if let Some(rows) = outcome.rows.as_mut() {
        rows.truncate(limit);
    }

    let mut payload = outcome_payload(&outcome);
    if truncated {
        payload["truncated"] = json!(true);
        payload["limit"] = json!(limit);
    }

    let message = format!(
        "**Query Results**\n\nRows returned: {}\nExecution time: {}",
        outcome.row_count(),
        millis(outcome.duration_ms)
    );
    Ok(Reply::new(message).with_data(payload))
}

/// Validate and require a read-class statement
fn read_only_class(gate: &Gate, sql: &str) -> Result<SqlClass, GateError> {
    let class = gate.validator().validate(sql).into_result()?;
    if class != SqlClass::Read {
        return Err(GateError::Validation(READ_ONLY_TOOL.to_string()));
    }
    Ok(class)
}

pub(crate) fn resolve_limit(limit: Option<usize>, default: usize) -> Result<usize, GateError> {
    match limit {
        None => Ok(default),
        Some(n) if (1..=MAX_QUERY_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(GateError::Validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_QUERY_LIMIT, n
        ))),
    }
}

// ============================================================================
// execute_database
// ============================================================================

pub async fn execute_database(
    gate: &Gate,
    session: &str,
    params: ExecuteParams,
) -> Result<CallToolResult, McpError> {
    finish("Write operation failed", run_execute(gate, session, params).await)
}

async fn run_execute(gate: &Gate, session: &str, params: ExecuteParams) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let class = gate.validator().validate(&params.sql).into_result()?;
    let bound = validate_params(params.params.as_deref().unwrap_or_default())?;
    if class == SqlClass::Transaction {
        return Err(GateError::Validation(USE_TRANSACTION_TOOL.to_string()));
    }
    gate.require(&caller, Role::Writer)?;
    gate.authorize_class(&caller, class)?;

    let tables = extract_table_names(&params.sql);
    tracing::info!(
        user = %caller.login,
        operation_type = %class,
        tables = ?tables,
        has_params = !bound.is_empty(),
        "Executing write operation"
    );

    let in_transaction = gate.transactions().is_active(session).await;
    let outcome = gate
        .run(session, &params.sql, &bound, FetchMode::CursorInfo)
        .await
        .into_result()?;

    let mut message = format!(
        "**Operation Completed Successfully**\n\nOperation Type: {}\n",
        class.as_str().to_uppercase()
    );
    if !tables.is_empty() {
        message.push_str(&format!("Tables Affected: {}\n", tables.join(", ")));
    }
    message.push_str(&format!(
        "Rows Affected: {}\n",
        outcome.rows_affected.unwrap_or(0)
    ));
    if let (Some(id), SqlClass::Write) = (outcome.last_insert_id, class) {
        message.push_str(&format!("Last Insert ID: {}\n", id));
    }
    message.push_str(&format!("Execution Time: {}\n", millis(outcome.duration_ms)));

    match class {
        SqlClass::Ddl => message.push_str(
            "\n**Note:** DDL operations are auto-committed and cannot be rolled back.",
        ),
        _ if in_transaction => message.push_str(
            "\n**Note:** Changes are part of the active transaction and take effect on commit.",
        ),
        SqlClass::Write => message.push_str(
            "\n**Note:** Use `manage_transaction` to control transaction boundaries for multiple operations.",
        ),
        _ => {}
    }

    let mut payload = outcome_payload(&outcome);
    payload["operation_type"] = json!(class);
    Ok(Reply::new(message).with_data(payload))
}

// ============================================================================
// execute_complex_query
// ============================================================================

pub async fn execute_complex_query(
    gate: &Gate,
    session: &str,
    params: ComplexQueryParams,
) -> Result<CallToolResult, McpError> {
    finish(
        "Complex query execution failed",
        run_complex(gate, session, params).await,
    )
}

async fn run_complex(
    gate: &Gate,
    session: &str,
    params: ComplexQueryParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let class = read_only_class(gate, &params.sql)?;
    gate.authorize_class(&caller, class)?;

    let mut report = serde_json::Map::new();
    if params.explain || params.optimize_hints {
        if let Some(statement) = explainable(&params.sql) {
            let explained = gate
                .run(session, &format!("EXPLAIN {}", statement), &[], FetchMode::All)
                .await
                .into_result();

            match explained {
                Ok(plan) => {
                    let plan = plan.rows.unwrap_or_default();
                    if params.explain {
                        report.insert("explain".into(), Value::Array(rows_to_json(&plan)));
                    }
                    if params.optimize_hints {
                        report.insert("suggestions".into(), json!(analysis::suggestions(&plan)));
                    }
                }
                // the query still runs without a plan
                Err(e) => {
                    tracing::warn!(error = %e, "EXPLAIN failed, running query without a plan");
                    report.insert("error".into(), json!(e.to_string()));
                }
            }
        }
    }

    let outcome = gate
        .run(session, &params.sql, &[], FetchMode::All)
        .await
        .into_result()?;

    let mut message = format!(
        "**Complex Query Results**\n\nRows returned: {}\nExecution time: {}",
        outcome.row_count(),
        millis(outcome.duration_ms)
    );
    if let Some(Value::Array(hints)) = report.get("suggestions") {
        if !hints.is_empty() {
            message.push_str("\n\n**Optimization Suggestions:**");
            for hint in hints.iter().filter_map(Value::as_str) {
                message.push_str(&format!("\n- {}", hint));
            }
        }
    }

    let mut payload = outcome_payload(&outcome);
    if !report.is_empty() {
        payload["analysis"] = Value::Object(report);
    }
    Ok(Reply::new(message).with_data(payload))
}

/// Statement text EXPLAIN accepts; SHOW, DESCRIBE and EXPLAIN itself are skipped
fn explainable(sql: &str) -> Option<&str> {
    let statement = sql.trim().trim_end_matches(';').trim_end();
    let first: String = statement
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    let explainable = matches!(first.as_str(), "select" | "with" | "table" | "values")
        || statement.starts_with('(');
    explainable.then_some(statement)
}
