//! Models that represent back-office users, authentication payloads, and role metadata.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use validator::Validate;

#[derive(Debug, Clone)]
/// In-memory representation of a back-office account.
pub struct User {
    /// Unique identifier for the user.
    pub id: String,
    /// Immutable username used for login.
    pub username: String,
    /// Contact address captured in the session snapshot.
    pub email: String,
    /// Argon2 hash of the user's password.
    pub password_hash: String,
    /// Role describing the user's privileges.
    pub role: UserRole,
}

impl User {
    pub fn permissions(&self) -> BTreeSet<String> {
        self.role
            .permissions()
            .iter()
            .map(|permission| permission.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Back-office roles.
pub enum UserRole {
    /// Branch teller handling customer accounts.
    #[default]
    Teller,
    /// Supervisor approving teller operations.
    Supervisor,
    /// Read-only compliance auditor.
    Auditor,
    /// Administrator managing users and configuration.
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Teller => "teller",
            UserRole::Supervisor => "supervisor",
            UserRole::Auditor => "auditor",
            UserRole::Admin => "admin",
        }
    }

    /// Capabilities granted at login for this role.
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            UserRole::Teller => &["accounts:read", "transactions:create"],
            UserRole::Supervisor => &[
                "accounts:read",
                "transactions:create",
                "transactions:approve",
            ],
            UserRole::Auditor => &["accounts:read", "audit:read"],
            UserRole::Admin => &[
                "accounts:read",
                "accounts:write",
                "audit:read",
                "transactions:approve",
                "users:manage",
            ],
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "teller" => Some(UserRole::Teller),
            "supervisor" => Some(UserRole::Supervisor),
            "auditor" => Some(UserRole::Auditor),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UserRole::parse(&s).ok_or_else(|| {
            serde::de::Error::unknown_variant(&s, &["teller", "supervisor", "auditor", "admin"])
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Identity snapshot returned to clients.
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Tokens returned after a successful login.
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub user: UserResponse,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Tokens returned after a successful refresh.
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub user: UserResponse,
}
