//! Transaction tools

use mcp_common::{CallToolResult, McpError};
use serde_json::json;

use super::{finish, required, Reply};
use crate::error::GateError;
use crate::gate::Gate;
use crate::params::{TransactionAction, TransactionParams};
use crate::validator::SqlClass;

pub async fn manage_transaction(
    gate: &Gate,
    session: &str,
    params: TransactionParams,
) -> Result<CallToolResult, McpError> {
    let context = format!("Transaction {} failed", action_name(params.action));
    finish(&context, run_manage(gate, session, params).await)
}

fn action_name(action: TransactionAction) -> &'static str {
    match action {
        TransactionAction::Begin => "begin",
        TransactionAction::Commit => "commit",
        TransactionAction::Rollback => "rollback",
        TransactionAction::Savepoint => "savepoint",
        TransactionAction::ReleaseSavepoint => "release_savepoint",
        TransactionAction::RollbackToSavepoint => "rollback_to_savepoint",
    }
}

async fn run_manage(
    gate: &Gate,
    session: &str,
    params: TransactionParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    gate.authorize_class(&caller, SqlClass::Transaction)?;
    let transactions = gate.transactions();

    let reply = match params.action {
        TransactionAction::Begin => {
            transactions.begin(session).await?;
            Reply::new("Transaction started successfully").with_data(json!({
                "status": "active",
                "isolation_level": "REPEATABLE READ",
            }))
        }
        TransactionAction::Commit => {
            transactions.commit(session).await?;
            Reply::new("Transaction committed successfully")
                .with_data(json!({ "status": "committed" }))
        }
        TransactionAction::Rollback => {
            transactions.rollback(session).await?;
            Reply::new("Transaction rolled back successfully")
                .with_data(json!({ "status": "rolled_back" }))
        }
        TransactionAction::Savepoint => {
            let name = required(&params.savepoint_name, "Savepoint name")?;
            let savepoints = transactions.savepoint(session, name).await?;
            tracing::info!(savepoint = name, "Savepoint created");
            Reply::new(format!("Savepoint '{}' created successfully", name)).with_data(json!({
                "savepoint": name,
                "active_savepoints": savepoints,
            }))
        }
        TransactionAction::ReleaseSavepoint => {
            let name = required(&params.savepoint_name, "Savepoint name")?;
            let savepoints = transactions.release_savepoint(session, name).await?;
            tracing::info!(savepoint = name, "Savepoint released");
            Reply::new(format!("Savepoint '{}' released successfully", name)).with_data(json!({
                "released_savepoint": name,
                "remaining_savepoints": savepoints,
            }))
        }
        TransactionAction::RollbackToSavepoint => {
            let name = required(&params.savepoint_name, "Savepoint name")?;
            let savepoints = transactions.rollback_to_savepoint(session, name).await?;
            tracing::info!(savepoint = name, "Rolled back to savepoint");
            Reply::new(format!("Rolled back to savepoint '{}'", name)).with_data(json!({
                "savepoint": name,
                "active_savepoints": savepoints,
            }))
        }
    };
    Ok(reply)
}

pub async fn get_transaction_status(
    gate: &Gate,
    session: &str,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to get transaction status",
        run_status(gate, session).await,
    )
}

async fn run_status(gate: &Gate, session: &str) -> Result<Reply, GateError> {
    gate.caller(session).await?;
    let status = gate.transactions().status(session).await;
    if !status.active {
        return Ok(Reply::new("No active transaction").with_data(json!({ "status": "none" })));
    }
    Ok(Reply::new("Transaction is active").with_data(json!({
        "status": "active",
        "savepoints": status.savepoints,
        "started_at": status.started_at,
    })))
}
