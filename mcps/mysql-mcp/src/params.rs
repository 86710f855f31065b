//! Parameter types for MySQL MCP tools

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

fn default_true() -> bool {
    true
}

// ============================================================================
// Core query tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTablesParams {
    /// Schema to list tables from (defaults to the connected database)
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// Read-only SQL statement (SELECT, SHOW, DESCRIBE, EXPLAIN, WITH ...)
    pub sql: String,
    /// Maximum number of rows to return (1-10000)
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteParams {
    /// SQL statement to execute (INSERT, UPDATE, DELETE, DDL, CALL)
    pub sql: String,
    /// Positional values bound to `?` placeholders; scalars only
    #[serde(default)]
    pub params: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    /// Table name
    pub table: String,
    /// Include index information (default: true)
    #[serde(default = "default_true")]
    pub include_indexes: bool,
    /// Include foreign key information (default: true)
    #[serde(default = "default_true")]
    pub include_foreign_keys: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TableParams {
    /// Table name
    pub table: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UserPermissionsParams {
    /// Username to look up (defaults to the current caller)
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ComplexQueryParams {
    /// Read-only SQL with joins, subqueries, CTEs or window functions
    pub sql: String,
    /// Include the EXPLAIN execution plan
    #[serde(default)]
    pub explain: bool,
    /// Include optimization suggestions derived from the plan
    #[serde(default)]
    pub optimize_hints: bool,
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAction {
    Begin,
    Commit,
    Rollback,
    Savepoint,
    ReleaseSavepoint,
    RollbackToSavepoint,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransactionParams {
    /// Transaction action to perform
    pub action: TransactionAction,
    /// Savepoint name for savepoint actions
    #[serde(default)]
    pub savepoint_name: Option<String>,
}

// ============================================================================
// Routines, triggers, indexes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoutineAction {
    Create,
    Drop,
    Show,
    Modify,
}

/// Stored procedure or function management
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RoutineParams {
    pub action: RoutineAction,
    /// Routine name (optional for show, which then lists all)
    #[serde(default)]
    pub name: Option<String>,
    /// Full CREATE statement for create/modify
    #[serde(default)]
    pub definition: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CallProcedureParams {
    /// Stored procedure name
    pub name: String,
    /// Positional arguments; scalars only
    #[serde(default)]
    pub params: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Create,
    Drop,
    Show,
    Modify,
    Enable,
    Disable,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TriggerParams {
    pub action: TriggerAction,
    /// Trigger name
    #[serde(default)]
    pub name: Option<String>,
    /// Restrict `show` to triggers on this table
    #[serde(default)]
    pub table: Option<String>,
    /// Full CREATE TRIGGER statement for create/modify
    #[serde(default)]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexAction {
    Create,
    Drop,
    Show,
    Analyze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Btree,
    Hash,
    Fulltext,
    Unique,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IndexParams {
    pub action: IndexAction,
    /// Table the index belongs to
    pub table: String,
    /// Index name (required for create/drop)
    #[serde(default)]
    pub index_name: Option<String>,
    /// Indexed columns, in order (required for create)
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Index type for create (default: btree)
    #[serde(default)]
    pub index_type: Option<IndexType>,
}

// ============================================================================
// Structured data tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SelectParams {
    pub table: String,
    /// Columns to return (default: all)
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Equality conditions, combined with AND
    #[serde(default)]
    pub where_conditions: Option<Map<String, Value>>,
    /// Column to sort by
    #[serde(default)]
    pub order_by: Option<String>,
    /// Sort descending instead of ascending
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// One row or a list of rows, as `{column: value}` objects
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RowData {
    One(Map<String, Value>),
    Many(Vec<Map<String, Value>>),
}

impl RowData {
    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        match self {
            RowData::One(row) => vec![row],
            RowData::Many(rows) => rows,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InsertParams {
    pub table: String,
    /// Row or rows to insert; all rows must use the same columns
    pub data: RowData,
    /// Overwrite existing rows on duplicate key
    #[serde(default)]
    pub on_duplicate_key_update: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateParams {
    pub table: String,
    /// Columns to set
    pub data: Map<String, Value>,
    /// Equality conditions, combined with AND (required)
    pub where_conditions: Map<String, Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteParams {
    pub table: String,
    /// Equality conditions, combined with AND (required)
    pub where_conditions: Map<String, Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTableParams {
    pub table: String,
    /// Column name to definition, e.g. {"id": "INT NOT NULL AUTO_INCREMENT"}
    pub columns: Map<String, Value>,
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Columns to index individually
    #[serde(default)]
    pub indexes: Option<Vec<String>>,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_engine() -> String {
    "InnoDB".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}
