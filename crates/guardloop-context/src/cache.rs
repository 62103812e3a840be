//! TTL cache for assembled policy bodies.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// String cache with per-entry TTL.
///
/// Expired entries are purged lazily on access; get/set each hold the lock
/// for a short critical section, so concurrent readers are safe after a
/// write completes.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl TtlCache {
    /// Cache with the given time-to-live.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache with the default 5-minute TTL.
    #[must_use]
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    /// Get a live entry; an expired one is removed and `None` returned.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, stored_at)) if stored_at.elapsed() <= self.ttl => Some(value.clone()),
            Some(_) => {
                let _ = entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with the current timestamp.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self
            .entries
            .lock()
            .insert(key.into(), (value.into(), Instant::now()));
    }

    /// Remove one entry.
    pub fn invalidate(&self, key: &str) {
        let _ = self.entries.lock().remove(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries currently held (including not-yet-purged expired).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
