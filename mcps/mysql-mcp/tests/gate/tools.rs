//! Tool surface: dispatch, structured data, routines and liveness

use mcp_common::{EmbeddableError, EmbeddableMcp};
use mysql_mcp::db::{DbRow, SqlValue};
use serde_json::json;

use crate::mock::{call, is_error, payload, server_for, text, MockDatabase};

const PROCEDURE: &str = "CREATE PROCEDURE add_one(IN x INT)\nBEGIN\n  SELECT x + 1;\nEND";

#[tokio::test]
async fn test_lists_every_tool() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let tools = server.list_tools();
    assert_eq!(tools.len(), 22);

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
    for expected in [
        "list_tables",
        "query_database",
        "describe_table",
        "execute_database",
        "manage_transaction",
        "get_transaction_status",
        "manage_stored_procedure",
        "execute_stored_procedure",
        "manage_function",
        "manage_trigger",
        "manage_index",
        "execute_complex_query",
        "check_user_permissions",
        "get_database_statistics",
        "discover_database_schema",
        "get_table_structure",
        "select_table_data",
        "insert_table_data",
        "update_table_data",
        "delete_table_data",
        "create_table_secure",
        "health_check",
    ] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }
    assert_eq!(server.server_name(), "mysql");
}

#[tokio::test]
async fn test_dispatch_errors() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let err = server.call_tool("drop_everything", json!({})).await.unwrap_err();
    assert!(matches!(err, EmbeddableError::ToolNotFound(_)));

    let err = server
        .call_tool("query_database", json!({"limit": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, EmbeddableError::InvalidParams(_)));
}

#[tokio::test]
async fn test_list_tables_groups_rows() {
    let table = |name: &str, schema: &str, kind: &str| {
        DbRow::new()
            .with("table_name", SqlValue::Text(name.into()))
            .with("table_schema", SqlValue::Text(schema.into()))
            .with("table_type", SqlValue::Text(kind.into()))
    };
    let db = MockDatabase::with_rows(vec![
        table("orders", "shop", "BASE TABLE"),
        table("order_totals", "shop", "VIEW"),
    ]);
    let server = server_for("rita", &db).await;

    let result = call(&server, "list_tables", json!({})).await;
    let data = payload(&result);
    assert_eq!(data["user_tables"][0]["name"], "orders");
    assert_eq!(data["views"][0]["name"], "order_totals");
    assert_eq!(data["total_count"], 2);
}

#[tokio::test]
async fn test_select_binds_values() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let result = call(
        &server,
        "select_table_data",
        json!({
            "table": "orders",
            "columns": ["id"],
            "where_conditions": {"status": "open"},
            "order_by": "id"
        }),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("SELECT `id` FROM `orders` WHERE `status` = ? ORDER BY `id` ASC LIMIT 1000"));
}

#[tokio::test]
async fn test_insert_batches_rows() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    let result = call(
        &server,
        "insert_table_data",
        json!({
            "table": "people",
            "data": [{"name": "Ada", "age": 36}, {"age": 41, "name": "Grace"}]
        }),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    assert_eq!(
        db.statements(),
        vec!["INSERT INTO `people` (`name`, `age`) VALUES (?, ?), (?, ?)"]
    );

    let reader = server_for("rita", &db).await;
    let result = call(
        &reader,
        "insert_table_data",
        json!({"table": "people", "data": {"name": "Eve"}}),
    )
    .await;
    assert!(is_error(&result));
    assert_eq!(db.calls(), 1);
}

#[tokio::test]
async fn test_update_and_delete_need_conditions() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    let result = call(
        &server,
        "update_table_data",
        json!({"table": "people", "data": {"age": 37}, "where_conditions": {}}),
    )
    .await;
    assert!(text(&result).contains("WHERE conditions required for UPDATE"));

    let result = call(
        &server,
        "delete_table_data",
        json!({"table": "people", "where_conditions": {}}),
    )
    .await;
    assert!(text(&result).contains("WHERE conditions required for DELETE"));
    assert_eq!(db.calls(), 0);

    let result = call(
        &server,
        "delete_table_data",
        json!({"table": "people", "where_conditions": {"id": 4}}),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("DELETE FROM `people` WHERE `id` = ?"));
}

#[tokio::test]
async fn test_create_table_needs_admin() {
    let db = MockDatabase::new();
    let args = json!({
        "table": "notes",
        "columns": {"id": "INT NOT NULL", "body": "TEXT"},
        "primary_key": "id"
    });

    let writer = server_for("wendy", &db).await;
    let result = call(&writer, "create_table_secure", args.clone()).await;
    assert!(is_error(&result));
    assert_eq!(db.calls(), 0);

    let admin = server_for("ada", &db).await;
    let result = call(&admin, "create_table_secure", args).await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("CREATE TABLE `notes` (`id` INT NOT NULL, `body` TEXT, PRIMARY KEY (`id`))"));
}

#[tokio::test]
async fn test_stored_procedure_lifecycle() {
    let db = MockDatabase::new();
    let admin = server_for("ada", &db).await;

    let result = call(
        &admin,
        "manage_stored_procedure",
        json!({"action": "create", "name": "add_one", "definition": PROCEDURE}),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert_eq!(db.statements(), vec![PROCEDURE]);

    let result = call(
        &admin,
        "manage_stored_procedure",
        json!({"action": "modify", "name": "add_one", "definition": PROCEDURE}),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("DROP PROCEDURE IF EXISTS `add_one`"));

    let writer = server_for("wendy", &db).await;
    let result = call(
        &writer,
        "execute_stored_procedure",
        json!({"name": "add_one", "params": [41]}),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("CALL `add_one`(?)"));

    let before = db.calls();
    let result = call(
        &writer,
        "manage_stored_procedure",
        json!({"action": "drop", "name": "add_one"}),
    )
    .await;
    assert!(is_error(&result));
    assert_eq!(db.calls(), before);
}

#[tokio::test]
async fn test_routine_definition_must_match_name() {
    let db = MockDatabase::new();
    let admin = server_for("ada", &db).await;

    let result = call(
        &admin,
        "manage_function",
        json!({"action": "create", "name": "other", "definition": PROCEDURE}),
    )
    .await;
    assert!(is_error(&result));
    assert!(text(&result).contains("Definition must start with CREATE FUNCTION other"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_trigger_enable_unsupported() {
    let db = MockDatabase::new();
    let admin = server_for("ada", &db).await;

    let result = call(
        &admin,
        "manage_trigger",
        json!({"action": "disable", "name": "audit_orders"}),
    )
    .await;
    assert!(is_error(&result));
    assert!(text(&result).contains("does not support disable trigger"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_manage_index_create() {
    let db = MockDatabase::new();
    let admin = server_for("ada", &db).await;

    let result = call(
        &admin,
        "manage_index",
        json!({
            "action": "create",
            "table": "users",
            "index_name": "idx_email",
            "columns": ["email"],
            "index_type": "unique"
        }),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("CREATE UNIQUE INDEX `idx_email` ON `users` (`email`)"));
}

#[tokio::test]
async fn test_complex_query_reports_plan() {
    let plan = DbRow::new()
        .with("table", SqlValue::Text("orders".into()))
        .with("type", SqlValue::Text("ALL".into()))
        .with("Extra", SqlValue::Text("Using filesort".into()));
    let db = MockDatabase::with_rows(vec![plan]);
    let server = server_for("rita", &db).await;

    let result = call(
        &server,
        "execute_complex_query",
        json!({
            "sql": "SELECT * FROM orders ORDER BY total;",
            "explain": true,
            "optimize_hints": true
        }),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    assert!(db.saw("EXPLAIN SELECT * FROM orders ORDER BY total"));
    let data = payload(&result);
    assert_eq!(data["analysis"]["explain"][0]["type"], "ALL");
    let hints = data["analysis"]["suggestions"].as_array().unwrap();
    assert_eq!(hints.len(), 2);
    assert!(text(&result).contains("Full table scan on table 'orders'"));
}

#[tokio::test]
async fn test_complex_query_runs_when_explain_fails() {
    let db = MockDatabase::with_rows(vec![DbRow::new().with("id", SqlValue::Int(1))]);
    db.fail_statements_starting("EXPLAIN");
    let server = server_for("rita", &db).await;

    let result = call(
        &server,
        "execute_complex_query",
        json!({"sql": "SELECT id FROM orders", "explain": true}),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    let data = payload(&result);
    assert_eq!(data["row_count"], 1);
    assert!(data["analysis"]["error"].as_str().unwrap().contains("syntax"));
    assert!(db.saw("SELECT id FROM orders"));
}

#[tokio::test]
async fn test_complex_query_skips_explain_for_show() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let result = call(
        &server,
        "execute_complex_query",
        json!({"sql": "SHOW TABLES", "explain": true, "optimize_hints": true}),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    assert!(!db.saw("EXPLAIN"));
    assert_eq!(db.calls(), 1);
    assert!(payload(&result).get("analysis").is_none());
}

#[tokio::test]
async fn test_health_check_reports_stats() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    call(&server, "list_tables", json!({})).await;
    let result = call(&server, "health_check", json!({})).await;

    assert!(!is_error(&result), "{}", text(&result));
    let data = payload(&result);
    assert_eq!(data["status"], "healthy");
    assert_eq!(data["active_transactions"], 0);
    assert_eq!(data["tools"]["list_tables"]["calls"], 1);
}
