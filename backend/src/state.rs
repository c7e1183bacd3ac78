use std::sync::Arc;

use crate::{
    config::Config,
    services::{
        session_registry::{InMemorySessionRegistry, SessionStore},
        user_directory::UserDirectory,
    },
    utils::{
        cookies::CookieOptions,
        time::{Clock, SystemClock},
    },
};

/// Everything a request handler needs, constructed once and injected.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            sessions,
            users,
            clock,
        }
    }

    /// Wires an in-memory registry on the system clock.
    pub fn in_memory(config: Config, users: Arc<dyn UserDirectory>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sessions = Arc::new(InMemorySessionRegistry::new(
            clock.clone(),
            config.session_ttl(),
        ));
        Self::new(config, sessions, users, clock)
    }

    /// Flags for the bearer-token cookie.
    pub fn auth_cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.production,
        }
    }
}
