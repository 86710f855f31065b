//! Transaction lifecycle and connection leasing

use chrono::{Duration, Utc};
use serde_json::json;

use crate::mock::{call, is_error, payload, server_for, text, MockDatabase};

async fn tx(server: &mysql_mcp::MysqlMcpServer, action: &str) -> mcp_common::CallToolResult {
    call(server, "manage_transaction", json!({"action": action})).await
}

async fn savepoint(
    server: &mysql_mcp::MysqlMcpServer,
    action: &str,
    name: &str,
) -> mcp_common::CallToolResult {
    call(
        server,
        "manage_transaction",
        json!({"action": action, "savepoint_name": name}),
    )
    .await
}

#[tokio::test]
async fn test_rollback_releases_connection() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    assert!(!is_error(&tx(&server, "begin").await));
    assert_eq!(db.leased(), 1);

    let result = savepoint(&server, "savepoint", "sp1").await;
    assert!(!is_error(&result), "{}", text(&result));
    assert_eq!(payload(&result)["active_savepoints"], json!(["sp1"]));

    assert!(!is_error(&tx(&server, "rollback").await));
    assert_eq!(db.leased(), 0);
    assert_eq!(server.gate().transactions().active_count().await, 0);
    assert!(db.saw("[tx] SAVEPOINT `sp1`"));
    assert!(db.saw("ROLLBACK"));
}

#[tokio::test]
async fn test_double_begin_rejected() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    assert!(!is_error(&tx(&server, "begin").await));
    let result = tx(&server, "begin").await;
    assert!(is_error(&result));
    assert!(text(&result).contains("A transaction is already active"));
    assert_eq!(db.leased(), 1);

    assert_eq!(server.shutdown().await, 1);
    assert_eq!(db.leased(), 0);
    assert!(db.is_closed());
}

#[tokio::test]
async fn test_commit_and_rollback_need_transaction() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    for action in ["commit", "rollback"] {
        let result = tx(&server, action).await;
        assert!(is_error(&result));
        assert!(text(&result).contains("No active transaction found"));
    }
    let result = savepoint(&server, "savepoint", "sp1").await;
    assert!(is_error(&result));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_release_savepoint() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    tx(&server, "begin").await;
    savepoint(&server, "savepoint", "sp1").await;
    let result = savepoint(&server, "release_savepoint", "sp1").await;
    assert!(!is_error(&result), "{}", text(&result));
    assert_eq!(payload(&result)["remaining_savepoints"], json!([]));

    let status = call(&server, "get_transaction_status", json!({})).await;
    assert_eq!(payload(&status)["status"], "active");
    assert_eq!(payload(&status)["savepoints"], json!([]));

    tx(&server, "commit").await;
    let status = call(&server, "get_transaction_status", json!({})).await;
    assert_eq!(payload(&status)["status"], "none");
}

#[tokio::test]
async fn test_unknown_savepoint_lists_current() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    tx(&server, "begin").await;
    savepoint(&server, "savepoint", "sp1").await;
    savepoint(&server, "savepoint", "sp2").await;

    let result = savepoint(&server, "release_savepoint", "nope").await;
    assert!(is_error(&result));
    let message = text(&result);
    assert!(message.contains("Savepoint 'nope' not found"));
    assert!(message.contains("sp1") && message.contains("sp2"));

    let result = savepoint(&server, "rollback_to_savepoint", "sp1").await;
    assert!(!is_error(&result), "{}", text(&result));
    assert_eq!(payload(&result)["active_savepoints"], json!(["sp1"]));
    server.shutdown().await;
}

#[tokio::test]
async fn test_statements_join_active_transaction() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    tx(&server, "begin").await;
    let result = call(
        &server,
        "execute_database",
        json!({"sql": "UPDATE t SET a = ? WHERE id = ?", "params": [1, 2]}),
    )
    .await;
    assert!(!is_error(&result), "{}", text(&result));
    assert!(text(&result).contains("active transaction"));

    // only the BEGIN went through the pool
    assert_eq!(db.calls(), 1);
    assert!(db.saw("[tx] UPDATE t SET a = ? WHERE id = ?"));

    tx(&server, "commit").await;
    assert_eq!(db.leased(), 0);
}

#[tokio::test]
async fn test_failed_commit_clears_record() {
    let db = MockDatabase::new();
    db.fail_commits();
    let server = server_for("wendy", &db).await;

    tx(&server, "begin").await;
    let result = tx(&server, "commit").await;
    assert!(is_error(&result));
    assert!(text(&result).contains("Transaction commit failed"));

    assert_eq!(server.gate().transactions().active_count().await, 0);
    assert_eq!(db.leased(), 0);
    assert!(!is_error(&tx(&server, "begin").await));
    server.shutdown().await;
}

#[tokio::test]
async fn test_transaction_statements_blocked_in_execute() {
    let db = MockDatabase::new();
    let server = server_for("ada", &db).await;

    let result = call(&server, "execute_database", json!({"sql": "START TRANSACTION"})).await;
    assert!(is_error(&result));
    assert!(text(&result).contains("manage_transaction"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_reader_cannot_begin() {
    let db = MockDatabase::new();
    let server = server_for("rita", &db).await;

    let result = tx(&server, "begin").await;
    assert!(is_error(&result));
    assert_eq!(db.calls(), 0);
    assert_eq!(db.leased(), 0);
}

#[tokio::test]
async fn test_expired_session_releases_transaction() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    assert!(!is_error(&tx(&server, "begin").await));
    let expired = server.current_session().await;
    assert_eq!(db.leased(), 1);

    let reaped = server
        .gate()
        .reap_sessions_expired_at(Utc::now() + Duration::hours(2))
        .await;
    assert_eq!(reaped, 1);
    assert_eq!(db.leased(), 0);
    assert!(db.saw("ROLLBACK"));
    assert_eq!(server.gate().transactions().active_count().await, 0);

    // the next call runs under a fresh session without a transaction
    let result = call(&server, "get_transaction_status", json!({})).await;
    assert!(!is_error(&result), "{}", text(&result));
    assert_eq!(payload(&result)["status"], "none");
    assert_ne!(server.current_session().await, expired);
}

#[tokio::test]
async fn test_lapsed_session_transaction_is_rolled_back() {
    let db = MockDatabase::new();
    let server = server_for("wendy", &db).await;

    assert!(!is_error(&tx(&server, "begin").await));
    let session = server.current_session().await;
    assert!(server.gate().sessions().destroy(&session).await);

    let result = tx(&server, "commit").await;
    assert!(is_error(&result));
    assert!(text(&result).contains("No active transaction"));
    assert!(!db.saw("COMMIT"));
    assert!(db.saw("ROLLBACK"));
    assert_eq!(db.leased(), 0);
}
