//! In-memory session store
//!
//! Sessions live for the process lifetime only. Expiry is sliding: each
//! successful [`SessionStore::get`] moves the deadline forward.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::identity::CallerIdentity;

#[derive(Debug, Clone)]
struct Session {
    identity: CallerIdentity,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime_minutes: u64) -> Self {
        let minutes = i64::try_from(lifetime_minutes)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 60_000);
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime: Duration::minutes(minutes),
        }
    }

    /// Register a session and return its id
    pub async fn create(&self, identity: CallerIdentity) -> String {
        self.create_at(identity, Utc::now()).await
    }

    /// Identity behind a live session; expired sessions are dropped
    pub async fn get(&self, session_id: &str) -> Option<CallerIdentity> {
        self.get_at(session_id, Utc::now()).await
    }

    pub async fn destroy(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Drop all expired sessions, returning their ids
    pub async fn cleanup_expired(&self) -> Vec<String> {
        self.cleanup_expired_at(Utc::now()).await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn create_at(&self, identity: CallerIdentity, now: DateTime<Utc>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(user = %identity.login, "Session created");
        self.sessions.write().await.insert(
            id.clone(),
            Session {
                identity,
                created_at: now,
                last_accessed: now,
            },
        );
        id
    }

    async fn get_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<CallerIdentity> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        if self.is_expired(session, now) {
            tracing::debug!(
                user = %session.identity.login,
                age_secs = (now - session.created_at).num_seconds(),
                "Session expired"
            );
            sessions.remove(session_id);
            return None;
        }
        session.last_accessed = now;
        Some(session.identity.clone())
    }

    /// [`cleanup_expired`](Self::cleanup_expired) against a given clock
    pub async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| self.is_expired(s, now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired sessions removed");
        }
        expired
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_accessed >= self.lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> CallerIdentity {
        CallerIdentity::new("alice", "", "", "")
    }

    #[tokio::test]
    async fn test_create_get_destroy() {
        let store = SessionStore::new(60);
        let id = store.create(alice()).await;
        assert_eq!(store.get(&id).await.unwrap().login, "alice");
        assert!(store.get("missing").await.is_none());
        assert!(store.destroy(&id).await);
        assert!(!store.destroy(&id).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sliding_expiry() {
        let store = SessionStore::new(10);
        let start = Utc::now();
        let id = store.create_at(alice(), start).await;

        // each access pushes the deadline out
        assert!(store.get_at(&id, start + Duration::minutes(9)).await.is_some());
        assert!(store.get_at(&id, start + Duration::minutes(18)).await.is_some());
        assert!(store.get_at(&id, start + Duration::minutes(28)).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_returns_expired_ids() {
        let store = SessionStore::new(5);
        let start = Utc::now();
        let old = store.create_at(alice(), start).await;
        let fresh = store
            .create_at(alice(), start + Duration::minutes(4))
            .await;

        let removed = store.cleanup_expired_at(start + Duration::minutes(6)).await;
        assert_eq!(removed, vec![old]);
        assert_eq!(store.len().await, 1);
        assert!(store
            .get_at(&fresh, start + Duration::minutes(6))
            .await
            .is_some());
    }
}
