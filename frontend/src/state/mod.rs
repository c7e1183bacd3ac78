pub mod auth;

pub use auth::{AuthError, AuthSession, AuthState};
