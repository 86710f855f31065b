//! In-memory `Database` and server helpers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mcp_common::{envelope_payload, envelope_text, CallToolResult, EmbeddableMcp};
use mysql_mcp::config::{AccessConfig, Config};
use mysql_mcp::db::{Database, DbRow, FetchMode, RawResult, SqlParam, TxConnection};
use mysql_mcp::error::DriverError;
use mysql_mcp::MysqlMcpServer;
use serde_json::Value;

/// Records every statement and hands out scripted rows
#[derive(Default)]
pub struct MockDatabase {
    /// Pool-level calls: execute and begin
    calls: AtomicUsize,
    leased: Arc<AtomicUsize>,
    fail_commit: Arc<AtomicBool>,
    closed: AtomicBool,
    log: Arc<Mutex<Vec<String>>>,
    rows: Mutex<Vec<DbRow>>,
    last_mode: Mutex<Option<FetchMode>>,
    /// Pooled statements starting with this prefix fail
    fail_prefix: Mutex<Option<String>>,
}

impl MockDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_rows(rows: Vec<DbRow>) -> Arc<Self> {
        let db = Self::default();
        *db.rows.lock().unwrap() = rows;
        Arc::new(db)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn leased(&self) -> usize {
        self.leased.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fetch mode of the most recent pooled statement
    pub fn last_mode(&self) -> Option<FetchMode> {
        *self.last_mode.lock().unwrap()
    }

    pub fn fail_statements_starting(&self, prefix: &str) {
        *self.fail_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn fail_commits(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Every statement seen, pooled or transactional, in order
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn saw(&self, fragment: &str) -> bool {
        self.statements().iter().any(|s| s.contains(fragment))
    }

    fn respond(&self, mode: FetchMode) -> RawResult {
        let rows = self.rows.lock().unwrap();
        match mode {
            FetchMode::All => RawResult::rows(rows.clone()),
            FetchMode::One => RawResult::rows(rows.iter().take(1).cloned().collect()),
            FetchMode::Many(n) => RawResult::rows(rows.iter().take(n).cloned().collect()),
            FetchMode::None | FetchMode::CursorInfo => RawResult::affected(1, 0),
        }
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn execute(
        &self,
        sql: &str,
        _params: &[SqlParam],
        mode: FetchMode,
    ) -> Result<RawResult, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(sql.to_string());
        *self.last_mode.lock().unwrap() = Some(mode);
        if let Some(prefix) = self.fail_prefix.lock().unwrap().as_deref() {
            if sql.starts_with(prefix) {
                return Err(DriverError::Other(
                    "You have an error in your SQL syntax near 'EXPLAIN'".to_string(),
                ));
            }
        }
        Ok(self.respond(mode))
    }

    async fn begin(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.leased.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("BEGIN".to_string());
        Ok(Box::new(MockTx {
            leased: self.leased.clone(),
            fail_commit: self.fail_commit.clone(),
            log: self.log.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One leased connection; releases its lease when dropped
pub struct MockTx {
    leased: Arc<AtomicUsize>,
    fail_commit: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TxConnection for MockTx {
    async fn execute(
        &mut self,
        sql: &str,
        _params: &[SqlParam],
        mode: FetchMode,
    ) -> Result<RawResult, DriverError> {
        self.log.lock().unwrap().push(format!("[tx] {}", sql));
        Ok(match mode {
            FetchMode::One | FetchMode::All | FetchMode::Many(_) => RawResult::rows(Vec::new()),
            FetchMode::None | FetchMode::CursorInfo => RawResult::affected(1, 0),
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.log.lock().unwrap().push("COMMIT".to_string());
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::Other("Lost connection to MySQL server".to_string()));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.log.lock().unwrap().push("ROLLBACK".to_string());
        Ok(())
    }
}

impl Drop for MockTx {
    fn drop(&mut self) {
        self.leased.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Config with one user per role; membership checks ignore case
pub fn config_for(login: &str) -> Config {
    let mut config = Config::default();
    config.access = AccessConfig {
        admins: vec!["ada".to_string()],
        writers: vec!["Wendy".to_string()],
        readers: vec!["rita".to_string()],
    };
    config.caller.login = login.to_string();
    config.monitoring.enabled = true;
    config
}

pub async fn server_for(login: &str, db: &Arc<MockDatabase>) -> MysqlMcpServer {
    MysqlMcpServer::with_database(config_for(login), db.clone())
        .await
        .unwrap()
}

pub async fn call(server: &MysqlMcpServer, tool: &str, args: Value) -> CallToolResult {
    server.call_tool(tool, args).await.unwrap()
}

pub fn is_error(result: &CallToolResult) -> bool {
    result.is_error.unwrap_or(false)
}

pub fn text(result: &CallToolResult) -> String {
    envelope_text(result).unwrap_or_default().to_string()
}

pub fn payload(result: &CallToolResult) -> Value {
    envelope_payload(result).unwrap_or(Value::Null)
}
