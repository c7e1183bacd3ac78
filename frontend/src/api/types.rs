use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::tokens::TokenPair;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub user: UserResponse,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl LoginResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: Some(self.expires_at.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

impl From<RefreshResponse> for TokenPair {
    fn from(response: RefreshResponse) -> Self {
        TokenPair {
            access_token: response.token,
            refresh_token: response.refresh_token,
            expires_at: Some(response.expires_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub success: bool,
    pub session_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub user_role: String,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Error body returned by the server, or synthesized for transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{error}")]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// HTTP status of the response this error came from; not part of the body.
    #[serde(skip)]
    pub status: Option<u16>,
}

pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const CODE_REQUEST_FAILED: &str = "REQUEST_FAILED";

impl From<ApiError> for String {
    fn from(error: ApiError) -> Self {
        error.error
    }
}

impl ApiError {
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::with_code(msg, "UNKNOWN")
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::with_code(msg, CODE_REQUEST_FAILED)
    }

    /// Fallback for error responses without a JSON body.
    pub fn from_status(status: u16) -> Self {
        let code = match status {
            400 => CODE_BAD_REQUEST,
            401 => CODE_UNAUTHORIZED,
            403 => "FORBIDDEN",
            404 => "NOT_FOUND",
            500..=599 => "INTERNAL_SERVER_ERROR",
            _ => "UNKNOWN",
        };
        Self::with_code(format!("Request failed with status {}", status), code).with_status(status)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn with_code(msg: impl Into<String>, code: &str) -> Self {
        Self {
            error: msg.into(),
            code: code.to_string(),
            details: None,
            status: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == CODE_UNAUTHORIZED
    }

    pub fn is_request_failure(&self) -> bool {
        self.code == CODE_REQUEST_FAILED
    }

    /// 4xx responses; errors without a status fall back to the code.
    pub fn is_client_error(&self) -> bool {
        match self.status {
            Some(status) => (400..=499).contains(&status),
            None => matches!(
                self.code.as_str(),
                CODE_UNAUTHORIZED | CODE_BAD_REQUEST | CODE_VALIDATION_ERROR
            ),
        }
    }
}
