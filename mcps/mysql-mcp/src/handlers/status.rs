//! Permission lookup and liveness

use mcp_common::{CallToolResult, McpError, ToolMonitor};
use serde_json::json;

use super::{finish, Reply};
use crate::error::GateError;
use crate::gate::Gate;
use crate::params::UserPermissionsParams;

pub async fn check_user_permissions(
    gate: &Gate,
    session: &str,
    params: UserPermissionsParams,
) -> Result<CallToolResult, McpError> {
    finish(
        "Failed to check permissions",
        run_check(gate, session, params).await,
    )
}

async fn run_check(
    gate: &Gate,
    session: &str,
    params: UserPermissionsParams,
) -> Result<Reply, GateError> {
    let caller = gate.caller(session).await?;
    let user = params
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(&caller.login);

    let permission = gate.permissions().permission(user).ok_or_else(|| {
        GateError::PermissionDenied("User not found or no permissions".to_string())
    })?;

    let message = format!(
        "**User Permissions**\n\nUser: {}\nRole: {}\nRead: {}\nWrite: {}\nAdmin: {}",
        permission.username,
        permission.role,
        permission.can_read,
        permission.can_write,
        permission.can_admin
    );
    Ok(Reply::new(message).with_data(json!(permission)))
}

pub async fn health_check(
    gate: &Gate,
    session: &str,
    monitor: &ToolMonitor,
) -> Result<CallToolResult, McpError> {
    finish("Health check failed", run_health(gate, session, monitor).await)
}

async fn run_health(gate: &Gate, session: &str, monitor: &ToolMonitor) -> Result<Reply, GateError> {
    gate.caller(session).await?;
    gate.ping().await?;

    let mut data = json!({
        "status": "healthy",
        "database": "connected",
        "active_transactions": gate.transactions().active_count().await,
        "active_sessions": gate.sessions().len().await,
    });
    if monitor.is_enabled() {
        data["tools"] = json!(monitor.snapshot().await);
    }
    Ok(Reply::new("**Health Check**\n\nDatabase: connected").with_data(data))
}
