//! Models for server-side authentication sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Authoritative record of an authenticated principal's grant.
pub struct SessionRecord {
    /// Opaque random identifier carried by the session cookie.
    pub session_id: String,
    /// Identity snapshot taken at login.
    pub user_id: String,
    pub user_email: String,
    pub user_role: String,
    /// Capabilities granted at login; fixed for the session's lifetime.
    pub permissions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    /// Only moved by an explicit extension, never by token refresh.
    pub expires_at: DateTime<Utc>,
    /// Advisory timestamp touched by heartbeat/metadata calls.
    pub last_activity: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Auxiliary fields, merge-updated.
    pub metadata: Map<String, Value>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Shallow merge: keys in `patch` overwrite, all others are kept.
    pub fn merge_metadata(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.metadata.insert(key, value);
        }
    }
}

/// Identity and client details captured when a session is opened.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub user_email: String,
    pub user_role: String,
    pub permissions: BTreeSet<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub success: bool,
    pub session_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// Session snapshot returned to the owning client.
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub user_role: String,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        Self {
            session_id: record.session_id,
            user_id: record.user_id,
            user_role: record.user_role,
            permissions: record.permissions.into_iter().collect(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_activity: record.last_activity,
            metadata: record.metadata,
        }
    }
}
