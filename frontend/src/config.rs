use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use crate::{
    auth::scheduler::RefreshTiming,
    utils::storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError},
};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
/// How long before `exp` the scheduler tries to refresh.
pub const DEFAULT_REFRESH_LOOKAHEAD_SECS: u64 = 60;
pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_RETRY_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub refresh_lookahead_secs: u64,
    pub idle_threshold_secs: u64,
    pub refresh_retry_secs: u64,
    /// Where tokens and activity are persisted; in-memory when unset.
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_lookahead_secs: DEFAULT_REFRESH_LOOKAHEAD_SECS,
            idle_threshold_secs: DEFAULT_IDLE_THRESHOLD_SECS,
            refresh_retry_secs: DEFAULT_REFRESH_RETRY_SECS,
            storage_path: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source; unset names fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("BACKOFFICE_API_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        Ok(Self {
            api_base_url,
            refresh_lookahead_secs: parse_var(
                &lookup,
                "BACKOFFICE_REFRESH_LOOKAHEAD_SECS",
                DEFAULT_REFRESH_LOOKAHEAD_SECS,
            )?,
            idle_threshold_secs: parse_var(
                &lookup,
                "BACKOFFICE_IDLE_THRESHOLD_SECS",
                DEFAULT_IDLE_THRESHOLD_SECS,
            )?,
            refresh_retry_secs: parse_var(
                &lookup,
                "BACKOFFICE_REFRESH_RETRY_SECS",
                DEFAULT_REFRESH_RETRY_SECS,
            )?,
            storage_path: lookup("BACKOFFICE_STORAGE_PATH")
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn refresh_timing(&self) -> RefreshTiming {
        RefreshTiming {
            lookahead: Duration::from_secs(self.refresh_lookahead_secs),
            idle_threshold: Duration::from_secs(self.idle_threshold_secs),
            retry_interval: Duration::from_secs(self.refresh_retry_secs.max(1)),
        }
    }

    pub fn open_storage(&self) -> Result<Arc<dyn KeyValueStorage>, StorageError> {
        match &self.storage_path {
            Some(path) => Ok(Arc::new(FileStorage::open(path.clone())?)),
            None => Ok(Arc::new(MemoryStorage::new())),
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, raw)),
        None => Ok(default),
    }
}
