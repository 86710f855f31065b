//! The safety and access-control gate
//!
//! Owns every piece of shared state (validator, permission table, executor,
//! transactions, sessions) and offers the checks in the order tool handlers
//! must apply them: identifiers, then SQL validation, then permissions, and
//! only then the database.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db::{Database, FetchMode, SqlParam};
use crate::error::GateError;
use crate::executor::{build_batch_insert, QueryExecutor, QueryOutcome};
use crate::identity::CallerIdentity;
use crate::permissions::{PermissionEvaluator, Role};
use crate::session::SessionStore;
use crate::transaction::TransactionManager;
use crate::validator::{SqlClass, SqlValidator};

pub struct Gate {
    config: Config,
    validator: SqlValidator,
    permissions: PermissionEvaluator,
    executor: QueryExecutor,
    transactions: TransactionManager,
    sessions: SessionStore,
    db: Arc<dyn Database>,
}

impl Gate {
    pub fn new(config: Config, db: Arc<dyn Database>) -> Result<Self, GateError> {
        Ok(Self {
            validator: SqlValidator::new(&config.security)?,
            permissions: PermissionEvaluator::new(&config.access),
            executor: QueryExecutor::new(db.clone()),
            transactions: TransactionManager::new(db.clone()),
            sessions: SessionStore::new(config.session.lifetime_minutes),
            config,
            db,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ========================================================================
    // Callers
    // ========================================================================

    pub async fn open_session(&self, identity: CallerIdentity) -> String {
        self.sessions.create(identity).await
    }

    /// Identity behind a live session
    pub async fn caller(&self, session: &str) -> Result<CallerIdentity, GateError> {
        self.sessions.get(session).await.ok_or_else(|| {
            GateError::PermissionDenied("Session expired or not found".to_string())
        })
    }

    /// Drop expired sessions and roll back any transaction they held
    pub async fn reap_expired_sessions(&self) -> usize {
        self.reap_sessions_expired_at(Utc::now()).await
    }

    /// [`reap_expired_sessions`](Self::reap_expired_sessions) against a given clock
    pub async fn reap_sessions_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expired = self.sessions.cleanup_expired_at(now).await;
        for session in &expired {
            self.transactions.abandon(session).await;
        }
        expired.len()
    }

    // ========================================================================
    // Checks
    // ========================================================================

    /// Validate free-form SQL and check the caller may run its class
    pub fn authorize_sql(&self, identity: &CallerIdentity, sql: &str) -> Result<SqlClass, GateError> {
        let class = self.validator.validate(sql).into_result()?;
        self.permissions.can_execute(identity, class)?;
        Ok(class)
    }

    pub fn authorize_class(&self, identity: &CallerIdentity, class: SqlClass) -> Result<(), GateError> {
        self.permissions.can_execute(identity, class)
    }

    pub fn require(&self, identity: &CallerIdentity, role: Role) -> Result<(), GateError> {
        self.permissions.require(identity, role)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a statement, on the session's transaction if it has one
    pub async fn run(
        &self,
        session: &str,
        sql: &str,
        params: &[SqlParam],
        mode: FetchMode,
    ) -> QueryOutcome {
        if let Some(outcome) = self
            .transactions
            .execute_in(session, &self.executor, sql, params, mode)
            .await
        {
            return outcome;
        }
        self.executor.execute(sql, params, mode).await
    }

    /// Insert many rows with one batched statement
    pub async fn execute_many(
        &self,
        session: &str,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlParam>],
        on_duplicate_key_update: bool,
    ) -> Result<QueryOutcome, GateError> {
        let (sql, params) = build_batch_insert(table, columns, rows, on_duplicate_key_update)?;
        self.run(session, &sql, &params, FetchMode::CursorInfo)
            .await
            .into_result()
    }

    pub async fn ping(&self) -> Result<(), GateError> {
        self.db.ping().await.map_err(GateError::from)
    }

    /// Roll back every open transaction, then close the pool; returns how
    /// many transactions were abandoned
    pub async fn shutdown(&self) -> usize {
        let abandoned = self.transactions.shutdown().await;
        self.db.close().await;
        abandoned
    }
}
