use chrono::{DateTime, TimeZone, Utc};
use std::{sync::Arc, time::Duration};

use crate::utils::storage::KeyValueStorage;

pub const LAST_ACTIVITY_KEY: &str = "last_activity_at";

/// Remembers when the user last interacted, as epoch milliseconds in a
/// storage slot shared with every tab of the application.
#[derive(Clone)]
pub struct ActivityTracker {
    storage: Arc<dyn KeyValueStorage>,
}

impl ActivityTracker {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn record_activity(&self, now: DateTime<Utc>) {
        let millis = now.timestamp_millis().to_string();
        if let Err(err) = self.storage.set_item(LAST_ACTIVITY_KEY, &millis) {
            log::warn!("Failed to record activity: {}", err);
        }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        let raw = match self.storage.get_item(LAST_ACTIVITY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("Failed to read last activity: {}", err);
                return None;
            }
        };
        let millis = raw.trim().parse::<i64>().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Fails open: with no usable record the user counts as active.
    pub fn is_active(&self, now: DateTime<Utc>, idle_threshold: Duration) -> bool {
        let Some(last) = self.last_activity() else {
            return true;
        };
        let idle_for = now.signed_duration_since(last);
        match chrono::Duration::from_std(idle_threshold) {
            Ok(threshold) => idle_for <= threshold,
            Err(_) => true,
        }
    }
}
