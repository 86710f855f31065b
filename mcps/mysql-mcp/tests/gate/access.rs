//! Validation and permission checks run before any database call

use mysql_mcp::db::{DbRow, FetchMode, SqlValue};
use serde_json::json;

use crate::mock::{call, is_error, payload, server_for, text, MockDatabase};

fn numbered_rows(n: i64) -> Vec<DbRow> {
    (1..=n)
        .map(|i| {
            DbRow::new()
                .with("id", SqlValue::Int(i))
                .with("name", SqlValue::Text(format!("row {}", i)))
        })
        .collect()
}

#[tokio::test]
async fn test_reader_cannot_delete() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let result = call(&server, "execute_database", json!({"sql": "DELETE FROM t"})).await;

    assert!(is_error(&result));
    assert!(text(&result).contains("Permission denied"));
    assert!(text(&result).contains("writer access"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_writer_reads_limited_rows() {
    let db = MockDatabase::with_rows(numbered_rows(5));
    let server = server_for("wendy", &db).await;

    let result = call(
        &server,
        "query_database",
        json!({"sql": "SELECT * FROM t LIMIT 5"}),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    let data = payload(&result);
    assert_eq!(data["row_count"], 5);
    assert_eq!(data["rows"].as_array().unwrap().len(), 5);
    assert_eq!(data["rows"][0]["id"], 1);
    assert!(data["duration_ms"].as_f64().unwrap() >= 0.0);
    assert_eq!(db.calls(), 1);
}

#[tokio::test]
async fn test_query_limit_truncates() {
    let db = MockDatabase::with_rows(numbered_rows(8));
    let server = server_for("rita", &db).await;

    let result = call(
        &server,
        "query_database",
        json!({"sql": "SELECT * FROM t", "limit": 3}),
    )
    .await;

    let data = payload(&result);
    assert_eq!(data["row_count"], 3);
    assert_eq!(data["truncated"], true);
    assert_eq!(data["limit"], 3);
    // only one row past the limit is read from the driver
    assert_eq!(db.last_mode(), Some(FetchMode::Many(4)));
}

#[tokio::test]
async fn test_query_within_limit_is_not_truncated() {
    let db = MockDatabase::with_rows(numbered_rows(3));
    let server = server_for("rita", &db).await;

    let result = call(
        &server,
        "query_database",
        json!({"sql": "SELECT * FROM t", "limit": 3}),
    )
    .await;

    let data = payload(&result);
    assert_eq!(data["row_count"], 3);
    assert!(data.get("truncated").is_none());
}

#[tokio::test]
async fn test_query_tool_rejects_writes_for_admin() {
    let db = MockDatabase::new();
    let server = server_for("ada", &db).await;

    let result = call(
        &server,
        "query_database",
        json!({"sql": "UPDATE t SET a = 1"}),
    )
    .await;

    assert!(is_error(&result));
    assert!(text(&result).contains("Write operations are not allowed"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_unknown_user_denied() {
    let db = MockDatabase::new();
    let server = server_for("mallory", &db).await;

    let result = call(&server, "list_tables", json!({})).await;

    assert!(is_error(&result));
    assert!(text(&result).contains("User not found or no permissions"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_role_lists_ignore_case() {
    let db = MockDatabase::new();
    let server = server_for("WENDY", &db).await;

    let result = call(
        &server,
        "execute_database",
        json!({"sql": "INSERT INTO t (a) VALUES (?)", "params": [1]}),
    )
    .await;

    assert!(!is_error(&result), "{}", text(&result));
    assert!(text(&result).contains("Operation Type: WRITE"));
    assert_eq!(db.calls(), 1);
}

#[tokio::test]
async fn test_dangerous_sql_never_reaches_database() {
    let db = MockDatabase::new();
    let server = server_for("ada", &db).await;

    for sql in [
        "SELECT * FROM t; DROP TABLE t",
        "SELECT * FROM t INTO OUTFILE '/tmp/x'",
        "SELECT LOAD_FILE('/etc/passwd')",
        "GRANT ALL ON *.* TO 'x'@'%'",
    ] {
        let result = call(&server, "execute_database", json!({"sql": sql})).await;
        assert!(is_error(&result), "accepted: {}", sql);
    }
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_reader_cannot_write_through_cte() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    for sql in [
        "WITH x AS (SELECT 1 AS id) DELETE t FROM t JOIN x ON t.id = x.id",
        "WITH x AS (SELECT 1 AS id) UPDATE t JOIN x ON t.id = x.id SET t.a = 1",
        "WITH x AS (SELECT 1 AS id) DELETE IGNORE FROM t",
    ] {
        let result = call(&server, "query_database", json!({"sql": sql})).await;
        assert!(is_error(&result), "accepted: {}", sql);
        assert!(text(&result).contains("Write operations are not allowed"));

        let result = call(&server, "execute_database", json!({"sql": sql})).await;
        assert!(is_error(&result), "accepted: {}", sql);
        assert!(text(&result).contains("Permission denied"));
    }
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_executable_comment_never_reaches_database() {
    let db = MockDatabase::new();
    let server = server_for("ada", &db).await;

    let result = call(
        &server,
        "query_database",
        json!({"sql": "SELECT 1 /*!; UPDATE users SET role = 'admin' -- */"}),
    )
    .await;

    assert!(is_error(&result));
    assert!(text(&result).contains("Executable comments"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_ddl_requires_admin() {
    let db = MockDatabase::new();
    let writer = server_for("wendy", &db).await;

    let result = call(
        &writer,
        "execute_database",
        json!({"sql": "CREATE TABLE x (id INT)"}),
    )
    .await;
    assert!(is_error(&result));
    assert!(text(&result).contains("admin access"));
    assert_eq!(db.calls(), 0);

    let admin = server_for("ada", &db).await;
    let result = call(
        &admin,
        "execute_database",
        json!({"sql": "CREATE TABLE x (id INT)"}),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(text(&result).contains("auto-committed"));
    assert_eq!(db.calls(), 1);
}

#[tokio::test]
async fn test_bad_identifier_rejected_first() {
    let db = MockDatabase::new();
    let server = server_for("mallory", &db).await;

    let result = call(
        &server,
        "describe_table",
        json!({"table": "users; DROP TABLE users"}),
    )
    .await;

    assert!(is_error(&result));
    assert!(text(&result).contains("Invalid identifier"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_structured_params_rejected() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    let result = call(
        &server,
        "execute_database",
        json!({"sql": "INSERT INTO t (a) VALUES (?)", "params": [[1, 2]]}),
    )
    .await;

    assert!(is_error(&result));
    assert!(text(&result).contains("Parameter at index 0"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_check_user_permissions() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let result = call(&server, "check_user_permissions", json!({})).await;
    let data = payload(&result);
    assert_eq!(data["role"], "reader");
    assert_eq!(data["can_read"], true);
    assert_eq!(data["can_write"], false);

    let result = call(&server, "check_user_permissions", json!({"user": "Ada"})).await;
    assert_eq!(payload(&result)["can_admin"], true);

    let result = call(&server, "check_user_permissions", json!({"user": "nobody"})).await;
    assert!(is_error(&result));
    assert_eq!(db.calls(), 0);
}
