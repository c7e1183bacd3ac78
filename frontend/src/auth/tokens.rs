use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::utils::storage::{KeyValueStorage, StorageError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRES_AT_KEY: &str = "token_expires_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// RFC 3339 copy of the access token's `exp`, as sent by the server.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Persists the current token pair under fixed storage keys.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn save(&self, pair: &TokenPair) -> Result<(), StorageError> {
        self.storage.set_item(ACCESS_TOKEN_KEY, &pair.access_token)?;
        self.storage.set_item(REFRESH_TOKEN_KEY, &pair.refresh_token)?;
        match &pair.expires_at {
            Some(expires_at) => self.storage.set_item(TOKEN_EXPIRES_AT_KEY, expires_at),
            None => self.storage.remove_item(TOKEN_EXPIRES_AT_KEY),
        }
    }

    /// Returns a pair only when both tokens are present.
    pub fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let access_token = self.storage.get_item(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.storage.get_item(REFRESH_TOKEN_KEY)?;
        let expires_at = self.storage.get_item(TOKEN_EXPIRES_AT_KEY)?;
        Ok(match (access_token, refresh_token) {
            (Some(access_token), Some(refresh_token)) => Some(TokenPair {
                access_token,
                refresh_token,
                expires_at,
            }),
            _ => None,
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get_item(ACCESS_TOKEN_KEY).ok().flatten()
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_item(ACCESS_TOKEN_KEY)?;
        self.storage.remove_item(REFRESH_TOKEN_KEY)?;
        self.storage.remove_item(TOKEN_EXPIRES_AT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::storage::MemoryStorage;

    #[test]
    fn save_load_and_clear() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone());
        assert_eq!(store.load().expect("load"), None);

        let pair = TokenPair {
            access_token: "a.b.c".into(),
            refresh_token: "refresh_s1".into(),
            expires_at: Some("2024-01-01T00:30:00Z".into()),
        };
        store.save(&pair).expect("save");
        assert_eq!(store.load().expect("load"), Some(pair.clone()));
        assert_eq!(store.access_token().as_deref(), Some("a.b.c"));

        store
            .save(&TokenPair {
                expires_at: None,
                ..pair
            })
            .expect("save without expiry");
        assert_eq!(storage.get_item(TOKEN_EXPIRES_AT_KEY).expect("get"), None);

        store.clear().expect("clear");
        assert!(storage.is_empty());
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn half_written_pair_is_not_loaded() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(ACCESS_TOKEN_KEY, "a.b.c").expect("set");
        assert_eq!(TokenStore::new(storage).load().expect("load"), None);
    }
}
