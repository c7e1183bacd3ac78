//! Unverified decoding of JWT access tokens.
//!
//! The client never checks signatures; it only needs the claims to schedule
//! refreshes and to show who is logged in.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Payload,
    Signature,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Header => "header",
            Segment::Payload => "payload",
            Segment::Signature => "signature",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Expected 3 token segments, found {0}")]
    SegmentCount(usize),
    #[error("Token {segment} is not valid base64url")]
    Base64 { segment: Segment },
    #[error("Token {segment} is not a JSON object")]
    Json { segment: Segment },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    pub header: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Missing claim: {0}")]
    MissingClaim(&'static str),
    #[error("Invalid claim: {0}")]
    InvalidClaim(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
}

pub fn parse(token: &str) -> Result<ParsedToken, ParseError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ParseError::SegmentCount(segments.len()));
    }
    Ok(ParsedToken {
        header: decode_object(segments[0], Segment::Header)?,
        payload: decode_object(segments[1], Segment::Payload)?,
        signature: decode_segment(segments[2], Segment::Signature)?,
    })
}

fn decode_segment(raw: &str, segment: Segment) -> Result<Vec<u8>, ParseError> {
    URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| ParseError::Base64 { segment })
}

fn decode_object(raw: &str, segment: Segment) -> Result<Map<String, Value>, ParseError> {
    let bytes = decode_segment(raw, segment)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ParseError::Json { segment }),
    }
}

pub fn extract_identity(payload: &Map<String, Value>) -> Result<Identity, IdentityError> {
    let user_id = string_claim(payload, "userId")?;
    let role = string_claim(payload, "role")?;
    let permissions = match payload.get("permissions") {
        None | Some(Value::Null) => return Err(IdentityError::MissingClaim("permissions")),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(IdentityError::InvalidClaim("permissions"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(IdentityError::InvalidClaim("permissions")),
    };
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Identity {
        user_id,
        email,
        role,
        permissions,
    })
}

fn string_claim(payload: &Map<String, Value>, name: &'static str) -> Result<String, IdentityError> {
    match payload.get(name) {
        None | Some(Value::Null) => Err(IdentityError::MissingClaim(name)),
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(_) => Err(IdentityError::InvalidClaim(name)),
    }
}

/// `exp` in epoch seconds, when present and numeric.
pub fn expiry_seconds(payload: &Map<String, Value>) -> Option<i64> {
    let exp = payload.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs.floor() as i64))
}

pub fn expires_at(payload: &Map<String, Value>) -> Option<DateTime<Utc>> {
    expiry_seconds(payload).and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// A token without `exp` counts as expired.
pub fn is_expired(payload: &Map<String, Value>, now: DateTime<Utc>) -> bool {
    match expiry_seconds(payload) {
        Some(exp) => now.timestamp() >= exp,
        None => true,
    }
}

/// Negative once the token has expired; `0` when there is no `exp` claim.
pub fn seconds_until_expiry(payload: &Map<String, Value>, now: DateTime<Utc>) -> i64 {
    expiry_seconds(payload)
        .map(|exp| exp - now.timestamp())
        .unwrap_or(0)
}
