//! Two-tier weather cache.
//!
//! Reads check the in-process [`LocalTier`] first, then the optional remote
//! tier. A remote hit is copied back into the local tier. Remote failures are
//! logged and treated as a miss; they never reach the caller.

mod local;
mod redis_impl;

pub use local::LocalTier;
pub use redis_impl::RedisTier;

use async_trait::async_trait;
use common::models::{CacheTier as ServedBy, WeatherRecord};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("operation timed out")]
    Timeout,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A key/value store for weather records with per-write expiry.
///
/// Keys handed to a tier are already normalized by the gateway.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<WeatherRecord>, CacheError>;

    async fn set(&self, key: &str, record: &WeatherRecord, ttl: Duration)
    -> Result<(), CacheError>;

    /// Human-readable name for log events.
    fn name(&self) -> &'static str;
}

/// Result of a gateway read
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub record: Option<WeatherRecord>,
    pub tier: ServedBy,
}

pub struct CacheGateway {
    local: LocalTier,
    remote: Option<Arc<dyn CacheTier>>,
    local_ttl: Duration,
    remote_ttl: Duration,
}

/// Keys are case-insensitive.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

impl CacheGateway {
    pub fn new(
        local: LocalTier,
        remote: Option<Arc<dyn CacheTier>>,
        local_ttl: Duration,
        remote_ttl: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            local_ttl,
            remote_ttl,
        }
    }

    pub async fn get(&self, key: &str) -> CacheLookup {
        let key = normalize_key(key);

        if let Some(record) = self.local.lookup(&key) {
            debug!(key = %key, "Local cache hit");
            return CacheLookup {
                record: Some(record),
                tier: ServedBy::Local,
            };
        }

        if let Some(remote) = &self.remote {
            match remote.get(&key).await {
                Ok(Some(record)) => {
                    debug!(key = %key, tier = remote.name(), "Remote cache hit, repopulating local tier");
                    self.local.insert(&key, record.clone(), self.local_ttl);
                    return CacheLookup {
                        record: Some(record),
                        tier: ServedBy::Remote,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, tier = remote.name(), error = %e, "Remote cache get failed");
                }
            }
        }

        CacheLookup {
            record: None,
            tier: ServedBy::None,
        }
    }

    /// Write to both tiers with their default TTLs.
    pub async fn set(&self, key: &str, record: &WeatherRecord) {
        self.write(key, record, self.local_ttl, self.remote_ttl)
            .await
    }

    /// Write to both tiers with one explicit TTL.
    pub async fn set_with_ttl(&self, key: &str, record: &WeatherRecord, ttl: Duration) {
        self.write(key, record, ttl, ttl).await
    }

    async fn write(
        &self,
        key: &str,
        record: &WeatherRecord,
        local_ttl: Duration,
        remote_ttl: Duration,
    ) {
        let key = normalize_key(key);
        self.local.insert(&key, record.clone(), local_ttl);

        if let Some(remote) = &self.remote
            && let Err(e) = remote.set(&key, record, remote_ttl).await
        {
            warn!(key = %key, tier = remote.name(), error = %e, "Remote cache set failed");
        }
    }
}
