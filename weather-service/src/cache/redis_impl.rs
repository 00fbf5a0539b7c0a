//! Redis-backed remote tier.
//!
//! The connection is opened lazily on first use. A failed connect leaves the
//! tier unconnected and the next operation tries again, so the service starts
//! and serves traffic while Redis is down.

use async_trait::async_trait;
use common::models::WeatherRecord;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use super::{CacheError, CacheTier};

const KEY_PREFIX: &str = "weather:";

/// Maps Redis errors to CacheError.
fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
        CacheError::ConnectionFailed(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}

pub struct RedisTier {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisTier {
    /// Validates the URL without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            timeout,
        })
    }

    fn key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self
                    .bounded(async {
                        ConnectionManager::new(self.client.clone())
                            .await
                            .map_err(map_redis_error)
                    })
                    .await?;
                info!("Redis connected");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<WeatherRecord>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = self
            .bounded(async {
                conn.get::<_, Option<String>>(Self::key(key))
                    .await
                    .map_err(map_redis_error)
            })
            .await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn set(
        &self,
        key: &str,
        record: &WeatherRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(record)?;
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.connection().await?;

        self.bounded(async {
            conn.set_ex::<_, _, ()>(Self::key(key), json, seconds)
                .await
                .map_err(map_redis_error)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
