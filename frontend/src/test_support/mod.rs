//! Shared fixtures for the client's unit tests.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use jsonwebtoken::{EncodingKey, Header};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use tokio::{sync::Semaphore, time::Instant};

use crate::{
    auth::{
        coordinator::{RefreshError, RefreshTransport},
        tokens::TokenPair,
    },
    utils::time::Clock,
};

pub const BASE_TIMESTAMP: i64 = 1_700_000_000;
pub const FAR_FUTURE: i64 = BASE_TIMESTAMP + 86_400;
pub const TEST_SECRET: &str = "frontend-test-secret";
pub const TEST_REFRESH_TOKEN: &str = "refresh_session-1";

/// Wall clock driven by tokio's (possibly paused) clock, starting at
/// [`BASE_TIMESTAMP`].
pub struct TestClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            base: Utc
                .timestamp_opt(BASE_TIMESTAMP, 0)
                .single()
                .expect("base timestamp"),
            started: Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.started);
        self.base + chrono::Duration::from_std(elapsed).expect("elapsed fits")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub sid: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl TokenClaims {
    pub fn teller(exp: i64) -> Self {
        Self {
            user_id: "user-teller".into(),
            email: "teller@bank.test".into(),
            role: "teller".into(),
            permissions: vec!["accounts:read".into(), "transactions:create".into()],
            sid: "session-1".into(),
            exp,
            iat: exp - 1800,
            jti: format!("jti-{}", exp),
        }
    }
}

pub fn issue_token(claims: &TokenClaims) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode token")
}

/// Token pair for the teller session whose access token expires at `exp`.
pub fn token_pair(exp: i64) -> TokenPair {
    TokenPair {
        access_token: issue_token(&TokenClaims::teller(exp)),
        refresh_token: TEST_REFRESH_TOKEN.into(),
        expires_at: Utc
            .timestamp_opt(exp, 0)
            .single()
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Lets spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance_secs(secs: u64) {
    tokio::time::advance(Duration::from_secs(secs)).await;
    settle().await;
}

type Responder = Box<dyn Fn(usize) -> Result<TokenPair, RefreshError> + Send + Sync>;

/// Scripted refresh endpoint. The responder receives the 1-based call number.
pub struct FakeTransport {
    respond: Responder,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl FakeTransport {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(usize) -> Result<TokenPair, RefreshError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Holds every call until [`FakeTransport::release`] is called once for it.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen.lock().expect("seen tokens").clone()
    }
}

#[async_trait]
impl RefreshTransport for FakeTransport {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen
            .lock()
            .expect("seen tokens")
            .push(refresh_token.to_string());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        (self.respond)(call)
    }
}
