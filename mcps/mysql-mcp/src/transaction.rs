//! Transaction manager
//!
//! One transaction per session. A transaction owns a single leased
//! connection from `begin` until exactly one terminal action (commit,
//! rollback, or forced rollback at shutdown). The record is always removed
//! before the terminal statement runs, so a failing commit never leaves a
//! stuck "active" entry behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{Database, FetchMode, SqlParam, TxConnection};
use crate::error::GateError;
use crate::executor::{QueryExecutor, QueryOutcome};
use crate::identifier;

const NO_ACTIVE: &str = "No active transaction found. Use 'begin' to start a transaction.";
const ALREADY_ACTIVE: &str =
    "A transaction is already active. Please commit or rollback before starting a new one.";

struct ActiveTransaction {
    /// `None` only after the connection has been lost mid-transaction
    conn: Option<Box<dyn TxConnection>>,
    savepoints: Vec<String>,
    started_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<ActiveTransaction>>;

/// Snapshot of a session's transaction
#[derive(Debug, Clone, Serialize)]
pub struct TransactionStatus {
    pub active: bool,
    pub savepoints: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl TransactionStatus {
    fn none() -> Self {
        Self {
            active: false,
            savepoints: Vec::new(),
            started_at: None,
        }
    }
}

pub struct TransactionManager {
    db: Arc<dyn Database>,
    active: Mutex<HashMap<String, Slot>>,
}

impl TransactionManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Lease a connection and start a transaction for `session`
    pub async fn begin(&self, session: &str) -> Result<(), GateError> {
        // the map stays locked across the lease so two begins cannot race
        let mut active = self.active.lock().await;
        if active.contains_key(session) {
            return Err(GateError::TransactionState(ALREADY_ACTIVE.to_string()));
        }

        let conn = self.db.begin().await?;
        active.insert(
            session.to_string(),
            Arc::new(Mutex::new(ActiveTransaction {
                conn: Some(conn),
                savepoints: Vec::new(),
                started_at: Utc::now(),
            })),
        );
        tracing::info!(session, "Transaction started");
        Ok(())
    }

    pub async fn commit(&self, session: &str) -> Result<(), GateError> {
        let conn = self.take(session).await?;
        conn.commit().await?;
        tracing::info!(session, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(&self, session: &str) -> Result<(), GateError> {
        let conn = self.take(session).await?;
        conn.rollback().await?;
        tracing::info!(session, "Transaction rolled back");
        Ok(())
    }

    /// Create a savepoint; reusing a name moves it to the top
    pub async fn savepoint(&self, session: &str, name: &str) -> Result<Vec<String>, GateError> {
        let name = identifier::sanitize(name)?;
        let slot = self.slot(session).await?;
        let mut tx = slot.lock().await;

        run_on(&mut tx, &format!("SAVEPOINT `{}`", name)).await?;
        tx.savepoints.retain(|s| s != &name);
        tx.savepoints.push(name);
        Ok(tx.savepoints.clone())
    }

    /// Release a tracked savepoint; later savepoints go with it
    pub async fn release_savepoint(
        &self,
        session: &str,
        name: &str,
    ) -> Result<Vec<String>, GateError> {
        let name = identifier::sanitize(name)?;
        let slot = self.slot(session).await?;
        let mut tx = slot.lock().await;

        let idx = position(&tx.savepoints, &name)?;
        run_on(&mut tx, &format!("RELEASE SAVEPOINT `{}`", name)).await?;
        tx.savepoints.truncate(idx);
        Ok(tx.savepoints.clone())
    }

    /// Roll back to a tracked savepoint; it stays, later ones are dropped
    pub async fn rollback_to_savepoint(
        &self,
        session: &str,
        name: &str,
    ) -> Result<Vec<String>, GateError> {
        let name = identifier::sanitize(name)?;
        let slot = self.slot(session).await?;
        let mut tx = slot.lock().await;

        let idx = position(&tx.savepoints, &name)?;
        run_on(&mut tx, &format!("ROLLBACK TO SAVEPOINT `{}`", name)).await?;
        tx.savepoints.truncate(idx + 1);
        Ok(tx.savepoints.clone())
    }

    pub async fn status(&self, session: &str) -> TransactionStatus {
        let slot = self.active.lock().await.get(session).cloned();
        match slot {
            Some(slot) => {
                let tx = slot.lock().await;
                TransactionStatus {
                    active: true,
                    savepoints: tx.savepoints.clone(),
                    started_at: Some(tx.started_at),
                }
            }
            None => TransactionStatus::none(),
        }
    }

    pub async fn is_active(&self, session: &str) -> bool {
        self.active.lock().await.contains_key(session)
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Run a statement on the session's transaction connection
    ///
    /// Returns `None` when the session has no active transaction.
    pub async fn execute_in(
        &self,
        session: &str,
        executor: &QueryExecutor,
        sql: &str,
        params: &[SqlParam],
        mode: FetchMode,
    ) -> Option<QueryOutcome> {
        let slot = self.active.lock().await.get(session).cloned()?;
        let mut tx = slot.lock().await;
        let outcome = match tx.conn.as_mut() {
            Some(conn) => {
                executor
                    .timed(sql, mode, conn.execute(sql, params, mode))
                    .await
            }
            None => QueryOutcome::failed(
                GateError::TransactionState("Transaction is no longer active".to_string()),
                0.0,
            ),
        };
        Some(outcome)
    }

    /// Roll back a session's transaction, if any, without reporting errors
    pub async fn abandon(&self, session: &str) {
        let slot = self.active.lock().await.remove(session);
        if let Some(slot) = slot {
            tracing::warn!(session, "Rolling back transaction of expired session");
            force_rollback(session, slot).await;
        }
    }

    /// Force-roll back every open transaction; returns how many there were
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(String, Slot)> = self.active.lock().await.drain().collect();
        let count = drained.len();
        for (session, slot) in drained {
            tracing::warn!(session = %session, "Cleaning up abandoned transaction");
            force_rollback(&session, slot).await;
        }
        count
    }

    async fn slot(&self, session: &str) -> Result<Slot, GateError> {
        self.active
            .lock()
            .await
            .get(session)
            .cloned()
            .ok_or_else(|| GateError::TransactionState(NO_ACTIVE.to_string()))
    }

    /// Remove the record and hand back its connection
    async fn take(&self, session: &str) -> Result<Box<dyn TxConnection>, GateError> {
        let slot = self
            .active
            .lock()
            .await
            .remove(session)
            .ok_or_else(|| GateError::TransactionState(NO_ACTIVE.to_string()))?;
        let conn = slot.lock().await.conn.take();
        conn.ok_or_else(|| GateError::TransactionState("Transaction is no longer active".to_string()))
    }
}

async fn run_on(tx: &mut ActiveTransaction, sql: &str) -> Result<(), GateError> {
    let conn = tx
        .conn
        .as_mut()
        .ok_or_else(|| GateError::TransactionState("Transaction is no longer active".to_string()))?;
    conn.execute(sql, &[], FetchMode::None).await?;
    Ok(())
}

fn position(savepoints: &[String], name: &str) -> Result<usize, GateError> {
    savepoints.iter().position(|s| s == name).ok_or_else(|| {
        GateError::TransactionState(format!(
            "Savepoint '{}' not found. Active savepoints: {:?}",
            name, savepoints
        ))
    })
}

async fn force_rollback(session: &str, slot: Slot) {
    let conn = slot.lock().await.conn.take();
    if let Some(conn) = conn {
        if let Err(e) = conn.rollback().await {
            tracing::error!(session, error = %e, "Forced rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use crate::db::RawResult;
    use crate::error::DriverError;

    /// Pool that counts leased connections and logs transaction statements
    #[derive(Default)]
    struct Pool {
        leased: Arc<AtomicUsize>,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl Pool {
        fn leased(&self) -> usize {
            self.leased.load(Ordering::SeqCst)
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn count(&self, statement: &str) -> usize {
            self.log().iter().filter(|s| s.as_str() == statement).count()
        }
    }

    #[async_trait]
    impl Database for Pool {
        async fn execute(
            &self,
            _sql: &str,
            _params: &[SqlParam],
            _mode: FetchMode,
        ) -> Result<RawResult, DriverError> {
            Ok(RawResult::default())
        }

        async fn begin(&self) -> Result<Box<dyn TxConnection>, DriverError> {
            // give a competing begin the chance to interleave
            tokio::task::yield_now().await;
            self.leased.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Conn {
                leased: self.leased.clone(),
                log: self.log.clone(),
            }))
        }

        async fn ping(&self) -> Result<(), DriverError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    struct Conn {
        leased: Arc<AtomicUsize>,
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TxConnection for Conn {
        async fn execute(
            &mut self,
            sql: &str,
            _params: &[SqlParam],
            _mode: FetchMode,
        ) -> Result<RawResult, DriverError> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(RawResult::default())
        }

        async fn commit(self: Box<Self>) -> Result<(), DriverError> {
            self.log.lock().unwrap().push("COMMIT".to_string());
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
            self.log.lock().unwrap().push("ROLLBACK".to_string());
            Ok(())
        }
    }

    impl Drop for Conn {
        fn drop(&mut self) {
            self.leased.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn manager() -> (Arc<Pool>, TransactionManager) {
        let pool = Arc::new(Pool::default());
        (pool.clone(), TransactionManager::new(pool))
    }

    #[tokio::test]
    async fn test_concurrent_begin_on_one_session() {
        let (pool, manager) = manager();

        let (first, second) = tokio::join!(manager.begin("s1"), manager.begin("s1"));

        assert!(first.is_ok() != second.is_ok());
        let err = first.err().or(second.err()).unwrap();
        assert_eq!(err.to_string(), ALREADY_ACTIVE);
        assert_eq!(pool.leased(), 1);
        assert_eq!(manager.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_hold_separate_transactions() {
        let (pool, manager) = manager();

        assert_ok!(manager.begin("s1").await);
        assert_ok!(manager.begin("s2").await);
        assert_eq!(pool.leased(), 2);

        assert_ok!(manager.commit("s1").await);
        assert!(!manager.is_active("s1").await);
        assert!(manager.is_active("s2").await);
        assert_eq!(pool.leased(), 1);

        assert_ok!(manager.rollback("s2").await);
        assert_eq!(pool.leased(), 0);
    }

    #[tokio::test]
    async fn test_terminal_actions_need_transaction() {
        let (_, manager) = manager();

        let err = assert_err!(manager.commit("s1").await);
        assert_eq!(err.to_string(), NO_ACTIVE);
        assert_err!(manager.rollback("s1").await);
        assert_err!(manager.savepoint("s1", "a").await);

        assert_ok!(manager.begin("s1").await);
        assert_ok!(manager.commit("s1").await);
        // the record is gone after the first commit
        assert_err!(manager.commit("s1").await);
    }

    #[tokio::test]
    async fn test_savepoint_bookkeeping() {
        let (pool, manager) = manager();
        assert_ok!(manager.begin("s1").await);

        for name in ["a", "b", "c"] {
            assert_ok!(manager.savepoint("s1", name).await);
        }

        let remaining = assert_ok!(manager.rollback_to_savepoint("s1", "b").await);
        assert_eq!(remaining, vec!["a", "b"]);
        assert!(pool.log().contains(&"ROLLBACK TO SAVEPOINT `b`".to_string()));

        // reusing a name moves it to the top
        let active = assert_ok!(manager.savepoint("s1", "a").await);
        assert_eq!(active, vec!["b", "a"]);

        let remaining = assert_ok!(manager.release_savepoint("s1", "b").await);
        assert!(remaining.is_empty());
        assert!(pool.log().contains(&"RELEASE SAVEPOINT `b`".to_string()));

        let err = assert_err!(manager.release_savepoint("s1", "b").await);
        assert!(err.to_string().contains("Savepoint 'b' not found"));
        assert_err!(manager.savepoint("s1", "bad name").await);

        assert_eq!(manager.status("s1").await.savepoints, Vec::<String>::new());
        assert_ok!(manager.rollback("s1").await);
    }

    #[tokio::test]
    async fn test_abandon_rolls_back_and_releases() {
        let (pool, manager) = manager();
        assert_ok!(manager.begin("expired").await);
        assert_ok!(manager.begin("live").await);

        manager.abandon("expired").await;
        manager.abandon("never-started").await;

        assert!(!manager.is_active("expired").await);
        assert!(manager.is_active("live").await);
        assert_eq!(pool.count("ROLLBACK"), 1);
        assert_eq!(pool.leased(), 1);
        assert_ok!(manager.commit("live").await);
    }

    #[tokio::test]
    async fn test_shutdown_rolls_back_everything() {
        let (pool, manager) = manager();
        for session in ["s1", "s2", "s3"] {
            assert_ok!(manager.begin(session).await);
        }
        assert_ok!(manager.savepoint("s2", "sp").await);

        assert_eq!(manager.shutdown().await, 3);
        assert_eq!(pool.count("ROLLBACK"), 3);
        assert_eq!(pool.leased(), 0);
        assert_eq!(manager.active_count().await, 0);
        assert_eq!(manager.shutdown().await, 0);
    }

    #[tokio::test]
    async fn test_execute_in_needs_transaction() {
        let (pool, manager) = manager();
        let executor = QueryExecutor::new(pool.clone());

        assert!(manager
            .execute_in("s1", &executor, "UPDATE t SET a = 1", &[], FetchMode::CursorInfo)
            .await
            .is_none());

        assert_ok!(manager.begin("s1").await);
        let outcome = manager
            .execute_in("s1", &executor, "UPDATE t SET a = 1", &[], FetchMode::CursorInfo)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(pool.log().contains(&"UPDATE t SET a = 1".to_string()));
        assert_ok!(manager.rollback("s1").await);
    }
}
