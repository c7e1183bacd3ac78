use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to write {key}: {reason}")]
    Write { key: String, reason: String },
}

/// String key/value slot store, shaped after the browser's `localStorage`.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// JSON-file backed storage so a session survives process restarts. The
/// whole map is rewritten on every change; a failed write leaves both the
/// file and the in-memory view untouched.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let items = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                StorageError::Unavailable(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                StorageError::Unavailable(format!("Corrupt storage file {}: {}", path.display(), e))
            })?
        } else {
            HashMap::new()
        };
        log::debug!("Opened token storage at {}", path.display());
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<F>(&self, key: &str, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = items.clone();
        change(&mut next);
        persist(&self.path, &next).map_err(|reason| StorageError::Write {
            key: key.to_string(),
            reason,
        })?;
        *items = next;
        Ok(())
    }
}

fn persist(path: &Path, items: &HashMap<String, String>) -> Result<(), String> {
    let body = serde_json::to_string(items).map_err(|e| e.to_string())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::write(path, body).map_err(|e| e.to_string())?;

    // Tokens are credentials: owner read/write only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| e.to_string())?;
    }
    Ok(())
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(key, |items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.update(key, |items| {
            items.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_storage_round_trips_items() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        storage.set_item("access_token", "abc").expect("set");
        assert_eq!(
            storage.get_item("access_token").expect("get").as_deref(),
            Some("abc")
        );
        storage.set_item("access_token", "def").expect("overwrite");
        assert_eq!(storage.len(), 1);
        storage.remove_item("access_token").expect("remove");
        assert_eq!(storage.get_item("access_token").expect("get"), None);
        storage.remove_item("access_token").expect("remove twice");
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("session").join("tokens.json");

        let storage = FileStorage::open(&path).expect("open");
        assert_eq!(storage.get_item("refresh_token").expect("get"), None);
        storage.set_item("refresh_token", "refresh_s1").expect("set");
        storage.set_item("access_token", "a.b.c").expect("set");
        storage.remove_item("access_token").expect("remove");

        let reopened = FileStorage::open(&path).expect("reopen");
        assert_eq!(
            reopened.get_item("refresh_token").expect("get").as_deref(),
            Some("refresh_s1")
        );
        assert_eq!(reopened.get_item("access_token").expect("get"), None);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn corrupt_file_is_unavailable() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").expect("write");

        let err = FileStorage::open(&path).expect_err("corrupt");
        assert!(matches!(err, StorageError::Unavailable(ref msg) if msg.contains("Corrupt")));
    }

    #[test]
    fn failed_write_reports_key_and_keeps_previous_view() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").expect("write");

        let storage = FileStorage::open(blocker.join("tokens.json")).expect("open");
        let err = storage
            .set_item("access_token", "a.b.c")
            .expect_err("parent is a file");
        assert!(matches!(err, StorageError::Write { ref key, .. } if key == "access_token"));
        assert_eq!(storage.get_item("access_token").expect("get"), None);
    }
}
