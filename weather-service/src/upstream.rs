use chrono::{DateTime, Utc};
use common::errors::AppError;
use common::http_client::HttpClient;
use common::models::{Coordinates, WeatherRecord};
use serde::Deserialize;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::breaker::CircuitBreaker;

pub const SOURCE: &str = "openweathermap";

const CIRCUIT_OPEN_MESSAGE: &str =
    "Upstream weather provider temporarily unavailable (circuit open). Please try again later.";

/// Subset of the OpenWeather current-weather payload.
///
/// Everything is optional so a sparse payload normalizes instead of failing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenWeatherPayload {
    name: Option<String>,
    sys: Option<OwSys>,
    coord: Option<OwCoord>,
    main: Option<OwMain>,
    wind: Option<OwWind>,
    weather: Option<Vec<Option<OwCondition>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwSys {
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwCoord {
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwWind {
    speed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwCondition {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

/// Map a provider payload into the canonical record.
pub fn normalize(
    requested_city: &str,
    payload: OpenWeatherPayload,
    fetched_at: DateTime<Utc>,
) -> WeatherRecord {
    let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
    let main = payload.main.unwrap_or_default();
    let coord = payload.coord.unwrap_or_default();
    let condition = payload
        .weather
        .and_then(|conditions| conditions.into_iter().next())
        .flatten()
        .unwrap_or_default();

    WeatherRecord {
        city: non_empty(payload.name).unwrap_or_else(|| requested_city.to_string()),
        country: non_empty(payload.sys.and_then(|s| s.country)),
        coords: Coordinates {
            lat: coord.lat,
            lon: coord.lon,
        },
        temp_c: main.temp,
        feels_like: main.feels_like,
        humidity: main.humidity,
        wind_speed: payload.wind.and_then(|w| w.speed),
        weather_main: non_empty(condition.main),
        weather_desc: non_empty(condition.description),
        icon_url: non_empty(condition.icon)
            .map(|icon| format!("https://openweathermap.org/img/wn/{icon}@2x.png")),
        fetched_at,
        source: SOURCE.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub record: WeatherRecord,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct FetchFailure {
    pub error: AppError,
    pub attempts: u32,
}

/// Breaker-guarded, retrying access to the weather provider
pub struct UpstreamGate {
    http_client: HttpClient,
    breaker: CircuitBreaker,
    base_url: String,
    api_key: String,
}

impl UpstreamGate {
    pub fn new(
        http_client: HttpClient,
        breaker: CircuitBreaker,
        base_url: String,
        api_key: String,
    ) -> Self {
        Self {
            http_client,
            breaker,
            base_url,
            api_key,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[instrument(skip(self), fields(city = %city))]
    pub async fn fetch(&self, city: &str) -> Result<Fetched, FetchFailure> {
        if let Err(remaining) = self.breaker.check() {
            warn!(
                circuit_open_for_ms = remaining.as_millis() as u64,
                "Circuit open, failing fast"
            );
            return Err(FetchFailure {
                error: AppError::service_unavailable(CIRCUIT_OPEN_MESSAGE, remaining),
                attempts: 0,
            });
        }

        let start = Instant::now();
        let query = [
            ("q", city),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ];
        let outcome = self
            .http_client
            .get_json::<OpenWeatherPayload>(&self.base_url, &query)
            .await;

        match outcome.result {
            Ok(payload) => {
                self.breaker.record_success();
                let record = normalize(city, payload, Utc::now());
                info!(
                    attempts = outcome.attempts,
                    ms = elapsed_ms(start),
                    "Fetched weather from upstream"
                );
                Ok(Fetched {
                    record,
                    attempts: outcome.attempts,
                })
            }
            Err(e) => {
                // A request that never left says nothing about the provider
                if outcome.attempts > 0 {
                    self.breaker.record_failure();
                }
                let error = AppError::from(e);
                warn!(
                    attempts = outcome.attempts,
                    status = error.status_code().as_u16(),
                    ms = elapsed_ms(start),
                    error = %error,
                    "Upstream weather fetch failed"
                );
                Err(FetchFailure {
                    error,
                    attempts: outcome.attempts,
                })
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
