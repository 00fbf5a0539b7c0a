use common::http_client::RetryPolicy;
use common::tracing::LogFormat;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct Config {
    pub port: u16,
    pub openweather_url: String,
    pub openweather_api_key: String,
    pub cache_ttl_seconds: u64,
    pub remote_cache_ttl_seconds: u64,
    pub local_cache_capacity: usize,
    pub redis_url: Option<String>,
    pub remote_cache_timeout_ms: u64,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
    pub frontend_origin: String,
    pub http_timeout_ms: u64,
    pub http_max_retries: u32,
    pub http_retry_base_ms: u64,
    pub http_retry_max_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_open_ms: u64,
    pub log_format: LogFormat,
}

/// Parse an environment variable, falling back when unset or invalid.
fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let cache_ttl_seconds = parsed("CACHE_TTL_SECONDS", 300u64).max(1);

        Self {
            port: parsed("PORT", 4000),
            openweather_url: non_empty("OPENWEATHER_URL")
                .unwrap_or_else(|| DEFAULT_OPENWEATHER_URL.to_string()),
            openweather_api_key: non_empty("OPENWEATHER_API_KEY").unwrap_or_default(),
            cache_ttl_seconds,
            remote_cache_ttl_seconds: parsed("REMOTE_CACHE_TTL_SECONDS", cache_ttl_seconds).max(1),
            local_cache_capacity: parsed("LOCAL_CACHE_CAPACITY", 500usize).max(1),
            redis_url: non_empty("REDIS_URL"),
            remote_cache_timeout_ms: parsed("REMOTE_CACHE_TIMEOUT_MS", 1000),
            rate_limit_window_ms: parsed("RATE_LIMIT_WINDOW_MS", 60_000u64).max(1),
            rate_limit_max: parsed("RATE_LIMIT_MAX", 60),
            frontend_origin: non_empty("FRONTEND_ORIGIN").unwrap_or_else(|| "*".to_string()),
            http_timeout_ms: parsed("HTTP_TIMEOUT_MS", 5000),
            http_max_retries: parsed("HTTP_MAX_RETRIES", 3),
            http_retry_base_ms: parsed("HTTP_RETRY_BASE_MS", 100),
            http_retry_max_ms: parsed("HTTP_RETRY_MAX_MS", 1000),
            breaker_failure_threshold: parsed("BREAKER_FAILURE_THRESHOLD", 5u32).max(1),
            breaker_open_ms: parsed("BREAKER_OPEN_MS", 30_000),
            log_format: parsed("LOG_FORMAT", LogFormat::Pretty),
        }
    }

    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn remote_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_cache_ttl_seconds)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_cache_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http_max_retries,
            Duration::from_millis(self.http_retry_base_ms),
            Duration::from_millis(self.http_retry_max_ms),
        )
    }

    pub fn breaker_open_window(&self) -> Duration {
        Duration::from_millis(self.breaker_open_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}
