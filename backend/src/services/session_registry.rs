use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use crate::{
    models::session::{CreatedSession, NewSession, SessionRecord},
    utils::time::{short_id, Clock},
};

const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to generate session identifier: {0}")]
    IdGeneration(#[from] rand::Error),
}

/// Keyed store of authoritative session records.
///
/// Absent, destroyed and expired sessions all read as `None`; callers turn
/// that into an authentication failure.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, new_session: NewSession) -> Result<CreatedSession, SessionError>;
    async fn get_session(&self, session_id: &str) -> Option<SessionRecord>;
    /// Best effort: a missing session is silently ignored.
    async fn update_session_metadata(&self, session_id: &str, patch: Map<String, Value>);
    async fn destroy_session(&self, session_id: &str);
    /// Pushes `expires_at` out by a full session TTL.
    async fn extend_session(&self, session_id: &str) -> Option<DateTime<Utc>>;
    async fn sweep_expired(&self) -> usize;
    async fn session_count(&self) -> usize;
}

pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl InMemorySessionRegistry {
    pub fn new(clock: Arc<dyn Clock>, session_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            session_ttl,
        }
    }
}

fn generate_session_id() -> Result<String, SessionError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

#[async_trait]
impl SessionStore for InMemorySessionRegistry {
    async fn create_session(&self, new_session: NewSession) -> Result<CreatedSession, SessionError> {
        let session_id = generate_session_id()?;
        let now = self.clock.now();
        let expires_at = now + self.session_ttl;

        let record = SessionRecord {
            session_id: session_id.clone(),
            user_id: new_session.user_id,
            user_email: new_session.user_email,
            user_role: new_session.user_role,
            permissions: new_session.permissions,
            created_at: now,
            expires_at,
            last_activity: now,
            client_ip: new_session.client_ip,
            user_agent: new_session.user_agent,
            metadata: Map::new(),
        };

        tracing::info!(
            session_id = %short_id(&session_id),
            user_id = %record.user_id,
            %expires_at,
            "Session created"
        );
        self.sessions.write().await.insert(session_id.clone(), record);

        Ok(CreatedSession {
            session_id,
            expires_at,
        })
    }

    async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                None => return None,
                Some(record) if !record.is_expired_at(now) => return Some(record.clone()),
                Some(_) => {}
            }
        }

        // Expired: purge lazily, re-checking under the write guard.
        let mut sessions = self.sessions.write().await;
        if let Some(record) = sessions.get(session_id) {
            if !record.is_expired_at(now) {
                return Some(record.clone());
            }
            sessions.remove(session_id);
            tracing::debug!(session_id = %short_id(session_id), "Purged expired session on read");
        }
        None
    }

    async fn update_session_metadata(&self, session_id: &str, patch: Map<String, Value>) {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(record) if !record.is_expired_at(now) => {
                record.merge_metadata(patch);
                record.last_activity = now;
            }
            _ => {
                tracing::debug!(
                    session_id = %short_id(session_id),
                    "Skipping metadata update for unknown session"
                );
            }
        }
    }

    async fn destroy_session(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            tracing::info!(session_id = %short_id(session_id), "Session destroyed");
        }
    }

    async fn extend_session(&self, session_id: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .filter(|record| !record.is_expired_at(now))?;
        record.expires_at = now + self.session_ttl;
        record.last_activity = now;
        Some(record.expires_at)
    }

    async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired_at(now));
        before - sessions.len()
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn registry() -> (Arc<ManualClock>, InMemorySessionRegistry) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = InMemorySessionRegistry::new(clock.clone(), Duration::minutes(30));
        (clock, registry)
    }

    fn new_session() -> NewSession {
        NewSession {
            user_id: "user-1".into(),
            user_email: "teller@bank.test".into(),
            user_role: "teller".into(),
            permissions: BTreeSet::from(["accounts:read".to_string()]),
            client_ip: Some("10.0.0.1".into()),
            user_agent: Some("test-agent".into()),
        }
    }

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn create_then_get_returns_full_record() {
        let (clock, registry) = registry();
        let created = registry.create_session(new_session()).await.expect("create");
        assert_eq!(created.session_id.len(), SESSION_ID_BYTES * 2);
        assert_eq!(created.expires_at, clock.now() + Duration::minutes(30));

        let record = registry.get_session(&created.session_id).await.expect("session");
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.created_at, clock.now());
        assert_eq!(record.last_activity, clock.now());
        assert_eq!(record.client_ip.as_deref(), Some("10.0.0.1"));
        assert!(record.metadata.is_empty());
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let (_clock, registry) = registry();
        let a = registry.create_session(new_session()).await.expect("create");
        let b = registry.create_session(new_session()).await.expect("create");
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(registry.session_count().await, 2);
    }

    #[tokio::test]
    async fn unknown_session_operations_are_quiet() {
        let (_clock, registry) = registry();
        assert!(registry.get_session("unknown-id").await.is_none());
        registry.destroy_session("unknown-id").await;
        registry
            .update_session_metadata("unknown-id", patch(json!({"lastHeartbeat": 1})))
            .await;
        assert!(registry.get_session("unknown-id").await.is_none());
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn metadata_is_merged_and_touches_last_activity() {
        let (clock, registry) = registry();
        let created = registry.create_session(new_session()).await.expect("create");

        registry
            .update_session_metadata(&created.session_id, patch(json!({"lastHeartbeat": "a", "keep": 1})))
            .await;
        clock.advance(Duration::seconds(30));
        registry
            .update_session_metadata(&created.session_id, patch(json!({"lastHeartbeat": "b"})))
            .await;

        let record = registry.get_session(&created.session_id).await.expect("session");
        assert_eq!(record.metadata["lastHeartbeat"], "b");
        assert_eq!(record.metadata["keep"], 1);
        assert_eq!(record.last_activity, clock.now());
        assert_eq!(record.expires_at, created.expires_at);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let (_clock, registry) = registry();
        let created = registry.create_session(new_session()).await.expect("create");
        registry.destroy_session(&created.session_id).await;
        registry.destroy_session(&created.session_id).await;
        assert!(registry.get_session(&created.session_id).await.is_none());
    }

    #[tokio::test]
    async fn expired_session_reads_as_absent_and_is_purged() {
        let (clock, registry) = registry();
        let created = registry.create_session(new_session()).await.expect("create");
        clock.advance(Duration::minutes(30));
        assert!(registry.get_session(&created.session_id).await.is_none());
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn extend_moves_expiry_from_now() {
        let (clock, registry) = registry();
        let created = registry.create_session(new_session()).await.expect("create");
        clock.advance(Duration::minutes(20));
        let extended = registry.extend_session(&created.session_id).await.expect("extend");
        assert_eq!(extended, clock.now() + Duration::minutes(30));
        clock.advance(Duration::minutes(20));
        assert!(registry.get_session(&created.session_id).await.is_some());
        assert!(registry.extend_session("unknown-id").await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_sessions() {
        let (clock, registry) = registry();
        let old = registry.create_session(new_session()).await.expect("create");
        clock.advance(Duration::minutes(20));
        let fresh = registry.create_session(new_session()).await.expect("create");
        clock.advance(Duration::minutes(15));

        assert_eq!(registry.sweep_expired().await, 1);
        assert!(registry.get_session(&old.session_id).await.is_none());
        assert!(registry.get_session(&fresh.session_id).await.is_some());
    }
}
