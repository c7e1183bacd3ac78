use std::sync::Arc;
use thiserror::Error;

use crate::{
    api::{ApiClient, ApiError, HeartbeatResponse, LoginRequest, LoginResponse},
    auth::{
        activity::ActivityTracker,
        coordinator::RefreshCoordinator,
        scheduler::{RefreshScheduler, RefreshTiming, SchedulerState, SessionEndCallback},
        token_codec::{self, Identity, ParseError},
        tokens::TokenStore,
    },
    config::ClientConfig,
    utils::{
        storage::{KeyValueStorage, StorageError},
        time::Clock,
    },
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Server issued an unreadable token: {0}")]
    Token(#[from] ParseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub identity: Option<Identity>,
    pub is_authenticated: bool,
}

/// Ties login and logout to the refresh scheduler and the token store.
pub struct AuthSession {
    api: Arc<ApiClient>,
    tokens: TokenStore,
    activity: ActivityTracker,
    scheduler: RefreshScheduler,
    clock: Arc<dyn Clock>,
}

impl AuthSession {
    pub fn new(
        config: &ClientConfig,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        on_session_end: SessionEndCallback,
    ) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::from_config(config)?);
        Ok(Self::with_client(
            api,
            config.refresh_timing(),
            storage,
            clock,
            on_session_end,
        ))
    }

    pub fn with_client(
        api: Arc<ApiClient>,
        timing: RefreshTiming,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        on_session_end: SessionEndCallback,
    ) -> Self {
        let tokens = TokenStore::new(storage.clone());
        let activity = ActivityTracker::new(storage);
        let coordinator = Arc::new(RefreshCoordinator::new(api.clone(), tokens.clone()));
        let scheduler = RefreshScheduler::new(
            coordinator,
            activity.clone(),
            tokens.clone(),
            clock.clone(),
            timing,
            on_session_end,
        );
        Self {
            api,
            tokens,
            activity,
            scheduler,
            clock,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let response = self
            .api
            .login(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        self.activity.record_activity(self.clock.now());
        self.scheduler.start_session(response.token_pair())?;
        log::info!("Logged in as {}", response.user.id);
        Ok(response)
    }

    /// Resumes the session persisted by an earlier run. Returns whether a
    /// usable token pair was found; unreadable leftovers are wiped.
    pub fn restore(&self) -> Result<bool, AuthError> {
        let Some(pair) = self.tokens.load()? else {
            return Ok(false);
        };
        match self.scheduler.start_session(pair) {
            Ok(()) => Ok(true),
            Err(err) => {
                log::warn!("Discarding stored tokens: {}", err);
                self.tokens.clear()?;
                Ok(false)
            }
        }
    }

    /// Forwarded user interaction.
    pub fn record_activity(&self) {
        self.scheduler.update_activity();
    }

    pub async fn heartbeat(&self) -> Result<HeartbeatResponse, ApiError> {
        self.api.heartbeat().await
    }

    /// Stops refreshing before telling the server, and clears local tokens
    /// even when the server call fails.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.scheduler.destroy();
        let result = self.api.logout().await;
        self.tokens.clear()?;
        if let Err(err) = &result {
            log::warn!("Server logout failed: {}", err);
        }
        result.map_err(AuthError::from)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.scheduler.state(),
            SchedulerState::Armed | SchedulerState::Refreshing
        ) && self.scheduler.current_tokens().is_some()
    }

    pub fn identity(&self) -> Option<Identity> {
        let pair = self.scheduler.current_tokens()?;
        let parsed = token_codec::parse(&pair.access_token).ok()?;
        token_codec::extract_identity(&parsed.payload).ok()
    }

    pub fn snapshot(&self) -> AuthState {
        AuthState {
            identity: self.identity(),
            is_authenticated: self.is_authenticated(),
        }
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Bearer token for authenticated API calls.
    pub fn access_token(&self) -> Option<String> {
        self.tokens.access_token()
    }
}
