#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use common::clock::Clock;
use common::http_client::{HttpClient, RetryPolicy};
use common::models::{Coordinates, WeatherRecord};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use weather_service::breaker::CircuitBreaker;
use weather_service::cache::{CacheError, CacheGateway, CacheTier, LocalTier};
use weather_service::lookup::WeatherLookup;
use weather_service::upstream::UpstreamGate;

pub const API_KEY: &str = "test-key";
pub const LOCAL_TTL: Duration = Duration::from_secs(60);
pub const REMOTE_TTL: Duration = Duration::from_secs(300);
pub const OPEN_WINDOW: Duration = Duration::from_secs(30);

pub fn record(city: &str) -> WeatherRecord {
    WeatherRecord {
        city: city.to_string(),
        country: Some("FR".into()),
        coords: Coordinates {
            lat: Some(48.85),
            lon: Some(2.35),
        },
        temp_c: Some(21.5),
        feels_like: Some(20.9),
        humidity: Some(40.0),
        wind_speed: Some(3.6),
        weather_main: Some("Clear".into()),
        weather_desc: Some("clear sky".into()),
        icon_url: None,
        fetched_at: Utc::now(),
        source: "openweathermap".into(),
    }
}

pub fn paris_payload() -> serde_json::Value {
    json!({
        "name": "Paris",
        "sys": { "country": "FR" },
        "coord": { "lat": 48.85, "lon": 2.35 },
        "main": { "temp": 21.5, "feels_like": 20.9, "humidity": 40 },
        "wind": { "speed": 3.6 },
        "weather": [{ "main": "Clear", "description": "clear sky", "icon": "01d" }]
    })
}

/// Remote tier that is never reachable
#[derive(Default)]
pub struct FailingTier {
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

#[async_trait]
impl CacheTier for FailingTier {
    async fn get(&self, _key: &str) -> Result<Option<WeatherRecord>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::ConnectionFailed("connection refused".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _record: &WeatherRecord,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Timeout)
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn gateway(clock: Arc<dyn Clock>, remote: Option<Arc<dyn CacheTier>>) -> CacheGateway {
    CacheGateway::new(LocalTier::new(16, clock), remote, LOCAL_TTL, REMOTE_TTL)
}

/// Gate pointed at a mock provider with millisecond backoff.
pub fn gate(base_url: String, clock: Arc<dyn Clock>, max_retries: u32, threshold: u32) -> UpstreamGate {
    let policy = RetryPolicy::new(
        max_retries,
        Duration::from_millis(1),
        Duration::from_millis(4),
    );
    let http_client = HttpClient::new(Duration::from_secs(2), policy).unwrap();
    let breaker = CircuitBreaker::new(threshold, OPEN_WINDOW, clock);
    UpstreamGate::new(http_client, breaker, base_url, API_KEY.to_string())
}

pub fn lookup(base_url: String, clock: Arc<dyn Clock>) -> WeatherLookup {
    let remote: Arc<dyn CacheTier> = Arc::new(LocalTier::new(16, clock.clone()));
    WeatherLookup::new(
        gateway(clock.clone(), Some(remote)),
        gate(base_url, clock, 3, 5),
    )
}
