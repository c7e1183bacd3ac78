use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use thiserror::Error;

use super::tokens::{TokenPair, TokenStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("Refresh token rejected")]
    InvalidRefreshToken,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl RefreshError {
    /// Whether a later attempt with the same refresh token may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RefreshError::InvalidRefreshToken)
    }
}

/// Exchanges a refresh token for a fresh pair.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;
}

type RefreshOutcome = Result<TokenPair, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    id: u64,
    future: SharedRefresh,
}

/// Single-flight wrapper around the refresh endpoint. Concurrent callers join
/// the call already on the wire; successful pairs are written to the
/// [`TokenStore`] before anyone observes them.
pub struct RefreshCoordinator {
    transport: Arc<dyn RefreshTransport>,
    tokens: TokenStore,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
    /// Bumped by [`RefreshCoordinator::invalidate`]. Held while a finished
    /// refresh checks it and writes the store.
    epoch: Arc<Mutex<u64>>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn RefreshTransport>, tokens: TokenStore) -> Self {
        Self {
            transport,
            tokens,
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(1),
            epoch: Arc::new(Mutex::new(0)),
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> RefreshOutcome {
        let (id, future) = self.join_or_start(refresh_token);
        let outcome = future.await;

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.as_ref().is_some_and(|current| current.id == id) {
            *in_flight = None;
        }
        outcome
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|current| current.future.peek().is_none())
    }

    /// Detaches any call on the wire: its outcome is still returned to the
    /// callers already waiting, but it no longer touches the token store and
    /// later callers start a new call.
    pub fn invalidate(&self) {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn join_or_start(&self, refresh_token: &str) -> (u64, SharedRefresh) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = in_flight.as_ref() {
            if current.future.peek().is_none() {
                log::debug!("Joining in-flight token refresh");
                return (current.id, current.future.clone());
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::clone(&self.transport);
        let tokens = self.tokens.clone();
        let epoch = Arc::clone(&self.epoch);
        let started_in = *epoch.lock().unwrap_or_else(PoisonError::into_inner);
        let refresh_token = refresh_token.to_string();

        let future = async move {
            let pair = transport.refresh(&refresh_token).await?;
            {
                let current = epoch.lock().unwrap_or_else(PoisonError::into_inner);
                if *current != started_in {
                    log::debug!("Refresh finished after invalidation; tokens left untouched");
                    return Ok(pair);
                }
                tokens.save(&pair).map_err(|err| {
                    RefreshError::ServerError(format!("Failed to store tokens: {}", err))
                })?;
            }
            Ok(pair)
        }
        .boxed()
        .shared();

        *in_flight = Some(InFlight {
            id,
            future: future.clone(),
        });
        (id, future)
    }
}
