use async_trait::async_trait;
use common::clock::Clock;
use common::models::WeatherRecord;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheError, CacheTier};

struct CacheEntry {
    data: WeatherRecord,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process LRU tier with per-entry expiry
pub struct LocalTier {
    entries: Mutex<LruCache<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl LocalTier {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            clock,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<WeatherRecord> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: &str, data: WeatherRecord, ttl: Duration) {
        let expires_at = self.clock.now().checked_add(ttl);
        self.entries
            .lock()
            .put(key.to_string(), CacheEntry { data, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    async fn get(&self, key: &str) -> Result<Option<WeatherRecord>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn set(
        &self,
        key: &str,
        record: &WeatherRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.insert(key, record.clone(), ttl);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
