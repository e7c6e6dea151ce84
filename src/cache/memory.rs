use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::CacheProvider;
use crate::error::GraphResult;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Process-local cache provider; a TTL of 0 never expires
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live entry count; expired entries are purged first
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, e| e.is_live(now));
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheProvider for MemoryCache {
    fn exists(&self, key: &str) -> GraphResult<bool> {
        let now = Instant::now();
        Ok(self.entries().get(key).is_some_and(|e| e.is_live(now)))
    }

    fn get(&self, key: &str) -> GraphResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> GraphResult<bool> {
        let now = Instant::now();
        let expires_at = (ttl_seconds > 0)
            .then(|| now.checked_add(Duration::from_secs(ttl_seconds)))
            .flatten();
        let mut entries = self.entries();
        // Keys that are never read again would otherwise stay forever
        entries.retain(|_, e| e.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }
}
