//! Data models shared across the session registry and API handlers.

pub mod session;
pub mod user;
