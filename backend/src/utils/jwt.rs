use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::session::SessionRecord;

pub const REFRESH_TOKEN_PREFIX: &str = "refresh_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    /// Session the token was minted for.
    pub sid: String,
    pub exp: i64, // expiration time, epoch seconds
    pub iat: i64, // issued at
    pub jti: String,
}

impl Claims {
    pub fn for_session(session: &SessionRecord, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            user_id: session.user_id.clone(),
            email: session.user_email.clone(),
            role: session.user_role.clone(),
            permissions: session.permissions.iter().cloned().collect(),
            sid: session.session_id.clone(),
            exp: (issued_at + ttl).timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Mints an access token from the identity snapshot held by the session.
pub fn create_access_token(
    session: &SessionRecord,
    secret: &str,
    issued_at: DateTime<Utc>,
    ttl: Duration,
) -> anyhow::Result<(String, Claims)> {
    let claims = Claims::for_session(session, issued_at, ttl);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok((token, claims))
}

pub fn verify_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Refresh tokens are the session id behind a fixed prefix; the refresh
/// endpoint uses them purely as a session lookup key.
pub fn refresh_token_for(session_id: &str) -> String {
    format!("{}{}", REFRESH_TOKEN_PREFIX, session_id)
}

pub fn session_id_from_refresh_token(token: &str) -> Option<&str> {
    token
        .strip_prefix(REFRESH_TOKEN_PREFIX)
        .filter(|session_id| !session_id.is_empty())
}
