//! MCP Server implementation for MySQL access
//!
//! Every tool resolves the configured caller through the session store and
//! delegates to its handler; the handler runs the gate checks before any
//! statement reaches the database.

use std::sync::Arc;

use mcp_common::{
    async_trait, EmbeddableError, EmbeddableMcp, EmbeddableResult, McpError, ToolMonitor,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::Database;
use crate::error::GateError;
use crate::gate::Gate;
use crate::handlers;
use crate::identity::CallerIdentity;
use crate::params::*;

const INSTRUCTIONS: &str = "MySQL MCP server with SQL validation and role-based access control. \
     Reads require reader access, writes and transactions require writer access, \
     schema changes require admin access. Statements are checked against a deny-list \
     and multiple statements per call are rejected.";

/// The MySQL MCP Server
#[derive(Clone)]
pub struct MysqlMcpServer {
    gate: Arc<Gate>,
    caller: CallerIdentity,
    session_id: Arc<Mutex<String>>,
    monitor: ToolMonitor,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl MysqlMcpServer {
    /// Create a server over an open database and start a session for the
    /// configured caller
    pub async fn with_database(config: Config, db: Arc<dyn Database>) -> Result<Self, GateError> {
        let caller = CallerIdentity::from_config(&config.caller);
        let monitor = ToolMonitor::new(config.monitoring.enabled);
        let gate = Gate::new(config, db)?;

        if gate.permissions().role_of(&caller.login).is_none() {
            tracing::warn!(user = %caller.login, "Configured caller has no role; every tool will be denied");
        } else {
            tracing::info!(
                user = %caller.login,
                write_access = caller.has_write_access(&gate.config().access),
                "Caller identified"
            );
        }
        let session = gate.open_session(caller.clone()).await;

        Ok(Self {
            gate: Arc::new(gate),
            caller,
            session_id: Arc::new(Mutex::new(session)),
            monitor,
            tool_router: Self::tool_router(),
        })
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Session id for this call; an expired session is replaced, and any
    /// transaction it held has already been rolled back
    pub async fn current_session(&self) -> String {
        self.gate.reap_expired_sessions().await;
        let mut session = self.session_id.lock().await;
        if self.gate.sessions().get(&session).await.is_none() {
            // a session can lapse between the reap and the lookup
            self.gate.transactions().abandon(&session).await;
            *session = self.gate.open_session(self.caller.clone()).await;
            tracing::info!(user = %self.caller.login, "Session expired, opened a new one");
        }
        session.clone()
    }

    /// Roll back open transactions and close the pool
    pub async fn shutdown(&self) -> usize {
        self.gate.shutdown().await
    }

    // ========================================================================
    // Query tools
    // ========================================================================

    #[tool(
        description = "List tables and views in the current database (or the given schema), grouped into user tables, views and system tables"
    )]
    async fn list_tables(
        &self,
        Parameters(params): Parameters<ListTablesParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument("list_tables", handlers::list_tables(&self.gate, &session, params))
            .await
    }

    #[tool(
        description = "Run a single read-only SQL statement (SELECT, SHOW, DESCRIBE, EXPLAIN). Write statements are rejected."
    )]
    async fn query_database(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument("query_database", handlers::query_database(&self.gate, &session, params))
            .await
    }

    #[tool(description = "Describe a table: columns, indexes and foreign keys")]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument("describe_table", handlers::describe_table(&self.gate, &session, params))
            .await
    }

    #[tool(
        description = "Run a single write or DDL statement with optional positional parameters. Requires write access; DDL requires admin access."
    )]
    async fn execute_database(
        &self,
        Parameters(params): Parameters<ExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "execute_database",
                handlers::execute_database(&self.gate, &session, params),
            )
            .await
    }

    #[tool(
        description = "Run a read-only query with an optional EXPLAIN plan and optimization suggestions"
    )]
    async fn execute_complex_query(
        &self,
        Parameters(params): Parameters<ComplexQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "execute_complex_query",
                handlers::execute_complex_query(&self.gate, &session, params),
            )
            .await
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    #[tool(
        description = "Begin, commit or roll back a transaction, or create, release and roll back to savepoints"
    )]
    async fn manage_transaction(
        &self,
        Parameters(params): Parameters<TransactionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "manage_transaction",
                handlers::manage_transaction(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Show whether a transaction is active and its savepoints")]
    async fn get_transaction_status(&self) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "get_transaction_status",
                handlers::get_transaction_status(&self.gate, &session),
            )
            .await
    }

    // ========================================================================
    // Routines, triggers, indexes
    // ========================================================================

    #[tool(description = "Create, drop, show or modify stored procedures")]
    async fn manage_stored_procedure(
        &self,
        Parameters(params): Parameters<RoutineParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "manage_stored_procedure",
                handlers::manage_stored_procedure(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Call a stored procedure with positional parameters")]
    async fn execute_stored_procedure(
        &self,
        Parameters(params): Parameters<CallProcedureParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "execute_stored_procedure",
                handlers::execute_stored_procedure(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Create, drop, show or modify stored functions")]
    async fn manage_function(
        &self,
        Parameters(params): Parameters<RoutineParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument("manage_function", handlers::manage_function(&self.gate, &session, params))
            .await
    }

    #[tool(description = "Create, drop, show or modify triggers")]
    async fn manage_trigger(
        &self,
        Parameters(params): Parameters<TriggerParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument("manage_trigger", handlers::manage_trigger(&self.gate, &session, params))
            .await
    }

    #[tool(description = "Create, drop, show or analyze table indexes")]
    async fn manage_index(
        &self,
        Parameters(params): Parameters<IndexParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument("manage_index", handlers::manage_index(&self.gate, &session, params))
            .await
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    #[tool(description = "Show the role and capabilities of a user (defaults to the caller)")]
    async fn check_user_permissions(
        &self,
        Parameters(params): Parameters<UserPermissionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "check_user_permissions",
                handlers::check_user_permissions(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Table count, row count and storage size of the current database")]
    async fn get_database_statistics(&self) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "get_database_statistics",
                handlers::get_database_statistics(&self.gate, &session),
            )
            .await
    }

    #[tool(description = "Every table of the current database with its columns")]
    async fn discover_database_schema(&self) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "discover_database_schema",
                handlers::discover_database_schema(&self.gate, &session),
            )
            .await
    }

    #[tool(description = "Column layout of a table as reported by DESCRIBE")]
    async fn get_table_structure(
        &self,
        Parameters(params): Parameters<TableParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "get_table_structure",
                handlers::get_table_structure(&self.gate, &session, params),
            )
            .await
    }

    // ========================================================================
    // Structured data
    // ========================================================================

    #[tool(
        description = "Select rows from a table with optional columns, equality filters, ordering, limit and offset"
    )]
    async fn select_table_data(
        &self,
        Parameters(params): Parameters<SelectParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "select_table_data",
                handlers::select_table_data(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Insert one or more rows into a table")]
    async fn insert_table_data(
        &self,
        Parameters(params): Parameters<InsertParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "insert_table_data",
                handlers::insert_table_data(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Update rows matching equality conditions; conditions are required")]
    async fn update_table_data(
        &self,
        Parameters(params): Parameters<UpdateParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "update_table_data",
                handlers::update_table_data(&self.gate, &session, params),
            )
            .await
    }

    #[tool(description = "Delete rows matching equality conditions; conditions are required")]
    async fn delete_table_data(
        &self,
        Parameters(params): Parameters<DeleteParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "delete_table_data",
                handlers::delete_table_data(&self.gate, &session, params),
            )
            .await
    }

    #[tool(
        description = "Create a table from checked column definitions, with optional primary key and indexes. Requires admin access."
    )]
    async fn create_table_secure(
        &self,
        Parameters(params): Parameters<CreateTableParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "create_table_secure",
                handlers::create_table_secure(&self.gate, &session, params),
            )
            .await
    }

    #[tool(
        description = "Check database connectivity and report active transactions and tool statistics"
    )]
    async fn health_check(&self) -> Result<CallToolResult, McpError> {
        let session = self.current_session().await;
        self.monitor
            .instrument(
                "health_check",
                handlers::health_check(&self.gate, &session, &self.monitor),
            )
            .await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for MysqlMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// EmbeddableMcp Implementation
// ============================================================================

#[async_trait]
impl EmbeddableMcp for MysqlMcpServer {
    fn server_name(&self) -> &str {
        "mysql"
    }

    fn server_description(&self) -> Option<&str> {
        Some(INSTRUCTIONS)
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        match name {
            "list_tables" => {
                let params: ListTablesParams = serde_json::from_value(params)?;
                self.list_tables(Parameters(params)).await.map_err(Into::into)
            }
            "query_database" => {
                let params: QueryParams = serde_json::from_value(params)?;
                self.query_database(Parameters(params)).await.map_err(Into::into)
            }
            "describe_table" => {
                let params: DescribeTableParams = serde_json::from_value(params)?;
                self.describe_table(Parameters(params)).await.map_err(Into::into)
            }
            "execute_database" => {
                let params: ExecuteParams = serde_json::from_value(params)?;
                self.execute_database(Parameters(params)).await.map_err(Into::into)
            }
            "execute_complex_query" => {
                let params: ComplexQueryParams = serde_json::from_value(params)?;
                self.execute_complex_query(Parameters(params))
                    .await
                    .map_err(Into::into)
            }
            "manage_transaction" => {
                let params: TransactionParams = serde_json::from_value(params)?;
                self.manage_transaction(Parameters(params)).await.map_err(Into::into)
            }
            "get_transaction_status" => self.get_transaction_status().await.map_err(Into::into),
            "manage_stored_procedure" => {
                let params: RoutineParams = serde_json::from_value(params)?;
                self.manage_stored_procedure(Parameters(params))
                    .await
                    .map_err(Into::into)
            }
            "execute_stored_procedure" => {
                let params: CallProcedureParams = serde_json::from_value(params)?;
                self.execute_stored_procedure(Parameters(params))
                    .await
                    .map_err(Into::into)
            }
            "manage_function" => {
                let params: RoutineParams = serde_json::from_value(params)?;
                self.manage_function(Parameters(params)).await.map_err(Into::into)
            }
            "manage_trigger" => {
                let params: TriggerParams = serde_json::from_value(params)?;
                self.manage_trigger(Parameters(params)).await.map_err(Into::into)
            }
            "manage_index" => {
                let params: IndexParams = serde_json::from_value(params)?;
                self.manage_index(Parameters(params)).await.map_err(Into::into)
            }
            "check_user_permissions" => {
                let params: UserPermissionsParams = serde_json::from_value(params)?;
                self.check_user_permissions(Parameters(params))
                    .await
                    .map_err(Into::into)
            }
            "get_database_statistics" => self.get_database_statistics().await.map_err(Into::into),
            "discover_database_schema" => {
                self.discover_database_schema().await.map_err(Into::into)
            }
            "get_table_structure" => {
                let params: TableParams = serde_json::from_value(params)?;
                self.get_table_structure(Parameters(params)).await.map_err(Into::into)
            }
            "select_table_data" => {
                let params: SelectParams = serde_json::from_value(params)?;
                self.select_table_data(Parameters(params)).await.map_err(Into::into)
            }
            "insert_table_data" => {
                let params: InsertParams = serde_json::from_value(params)?;
                self.insert_table_data(Parameters(params)).await.map_err(Into::into)
            }
            "update_table_data" => {
                let params: UpdateParams = serde_json::from_value(params)?;
                self.update_table_data(Parameters(params)).await.map_err(Into::into)
            }
            "delete_table_data" => {
                let params: DeleteParams = serde_json::from_value(params)?;
                self.delete_table_data(Parameters(params)).await.map_err(Into::into)
            }
            "create_table_secure" => {
                let params: CreateTableParams = serde_json::from_value(params)?;
                self.create_table_secure(Parameters(params))
                    .await
                    .map_err(Into::into)
            }
            "health_check" => self.health_check().await.map_err(Into::into),
            _ => Err(EmbeddableError::ToolNotFound(name.to_string())),
        }
    }
}
