//! Client side of the back-office session lifecycle: token decoding, idle
//! tracking and proactive access-token refresh.

pub mod api;
pub mod auth;
pub mod config;
pub mod state;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use state::AuthSession;
