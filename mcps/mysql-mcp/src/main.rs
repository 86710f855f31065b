//! MySQL MCP - SQL safety and access-control gate over a MySQL database
//!
//! Serves the tool surface over stdio for the caller configured in the
//! environment.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mysql_mcp::config::Config;
use mysql_mcp::db::Database;
use mysql_mcp::mysql::MySqlDatabase;
use mysql_mcp::MysqlMcpServer;
use rmcp::{transport::io::stdio, ServiceExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_common::init_tracing("mysql_mcp")?;

    tracing::info!("Starting MySQL MCP server");

    let config = Config::load().context("Failed to load configuration")?;
    let db: Arc<dyn Database> = Arc::new(
        MySqlDatabase::connect_with_retry(&config.database, 3, Duration::from_secs(1))
            .await
            .context("Failed to connect to MySQL")?,
    );

    let server = MysqlMcpServer::with_database(config, db)
        .await
        .context("Failed to initialize server")?;
    let service = server.clone().serve(stdio()).await?;

    tracing::info!("MySQL MCP server running");

    // cleanup runs whichever way the service ends; its error is reported after
    let served = tokio::select! {
        result = service.waiting() => result.map(|_| ()).context("MCP service failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    };

    let abandoned = server.shutdown().await;
    if abandoned > 0 {
        tracing::warn!(abandoned, "Rolled back open transactions on shutdown");
    }

    match &served {
        Ok(()) => tracing::info!("MySQL MCP server stopped"),
        Err(e) => tracing::error!(error = %e, "MySQL MCP server stopped after a service error"),
    }
    served
}
