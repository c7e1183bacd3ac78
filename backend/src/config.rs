use anyhow::anyhow;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

/// Lifetime of an access token. Both the login and the refresh path issue
/// tokens through [`Config::access_token_ttl`], so they always agree.
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 30;
pub const SESSION_TTL_HOURS: i64 = 8;
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub session_ttl_hours: i64,
    pub session_sweep_interval_secs: u64,
    pub production: bool,
    pub host: String,
    pub port: u16,
    pub bootstrap_users: Vec<BootstrapUser>,
}

/// User account seeded into the in-memory directory at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapUser {
    pub username: String,
    pub email: String,
    pub role: String,
    pub password: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-this-in-production".to_string());

        let access_token_ttl_minutes =
            parse_env("ACCESS_TOKEN_TTL_MINUTES", ACCESS_TOKEN_TTL_MINUTES)?;
        let session_ttl_hours = parse_env("SESSION_TTL_HOURS", SESSION_TTL_HOURS)?;
        let session_sweep_interval_secs =
            parse_env("SESSION_SWEEP_INTERVAL_SECS", SESSION_SWEEP_INTERVAL_SECS)?;

        if session_ttl_hours * 60 <= access_token_ttl_minutes {
            return Err(anyhow!(
                "SESSION_TTL_HOURS ({}) must outlive ACCESS_TOKEN_TTL_MINUTES ({})",
                session_ttl_hours,
                access_token_ttl_minutes
            ));
        }

        let production = env::var("APP_ENV")
            .map(|value| value.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("SERVER_PORT", 3000u16)?;

        let bootstrap_users = match env::var("BOOTSTRAP_USERS") {
            Ok(raw) => parse_bootstrap_users(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Config {
            jwt_secret,
            access_token_ttl_minutes,
            session_ttl_hours,
            session_sweep_interval_secs,
            production,
            host,
            port,
            bootstrap_users,
        })
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::minutes(self.access_token_ttl_minutes)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jwt_secret: "your-secret-key-change-this-in-production".to_string(),
            access_token_ttl_minutes: ACCESS_TOKEN_TTL_MINUTES,
            session_ttl_hours: SESSION_TTL_HOURS,
            session_sweep_interval_secs: SESSION_SWEEP_INTERVAL_SECS,
            production: false,
            host: "0.0.0.0".to_string(),
            port: 3000,
            bootstrap_users: Vec::new(),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Parses `username:email:role:password` entries separated by `;`.
pub fn parse_bootstrap_users(raw: &str) -> anyhow::Result<Vec<BootstrapUser>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(4, ':');
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(username), Some(email), Some(role), Some(password))
                    if !username.is_empty() && !password.is_empty() =>
                {
                    Ok(BootstrapUser {
                        username: username.to_string(),
                        email: email.to_string(),
                        role: role.to_string(),
                        password: password.to_string(),
                    })
                }
                _ => Err(anyhow!("Invalid BOOTSTRAP_USERS entry: {}", entry)),
            }
        })
        .collect()
}
