use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use common::errors::AppError;
use common::models::{CacheTier, HealthResponse, WeatherRecord};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use utoipa::IntoParams;

use crate::lookup::WeatherLookup;

pub const MAX_CITY_LEN: usize = 80;

pub const CACHE_STATUS_HEADER: &str = "x-cache-status";
pub const CACHE_TIER_HEADER: &str = "x-cache-tier";
pub const ATTEMPTS_HEADER: &str = "x-upstream-attempts";
pub const RETRY_COUNT_HEADER: &str = "retry-count";

#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<WeatherLookup>,
    pub started_at: Instant,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WeatherQuery {
    /// City name: letters, spaces, commas, periods and hyphens, at most 80 characters
    pub city: Option<String>,
}

/// Trim and check a user-supplied city name.
pub fn validate_city(raw: Option<&str>) -> Result<String, AppError> {
    let city = raw.unwrap_or_default().trim();

    if city.is_empty() {
        return Err(AppError::validation(
            "Missing required query parameter: city",
        ));
    }
    if city.chars().count() > MAX_CITY_LEN {
        return Err(AppError::validation(
            "City name is too long (max 80 characters).",
        ));
    }
    let allowed =
        |c: char| c.is_ascii_alphabetic() || c.is_whitespace() || matches!(c, ',' | '.' | '-');
    if !city.chars().all(allowed) {
        return Err(AppError::validation(
            "City name contains invalid characters. Allowed: letters, spaces, , . -",
        ));
    }

    Ok(city.to_string())
}

pub async fn root() -> &'static str {
    "Weather API: see /health and /api/weather?city=CityName"
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
    })
}

pub async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}

fn lookup_headers(cache_status: &'static str, tier: CacheTier, attempts: u32) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
    headers.insert(CACHE_TIER_HEADER, HeaderValue::from_static(tier.as_str()));
    headers.insert(ATTEMPTS_HEADER, HeaderValue::from(attempts));
    headers.insert(
        RETRY_COUNT_HEADER,
        HeaderValue::from(attempts.saturating_sub(1)),
    );
    headers
}

#[utoipa::path(
    get,
    path = "/api/weather",
    params(WeatherQuery),
    responses(
        (status = 200, description = "Current weather for the city", body = WeatherRecord),
        (status = 400, description = "Missing or invalid city"),
        (status = 404, description = "City not found at the provider"),
        (status = 429, description = "Too many requests"),
        (status = 502, description = "Provider unreachable or malformed response"),
        (status = 503, description = "Circuit open, provider temporarily skipped")
    ),
    tag = "weather"
)]
pub async fn get_weather(
    State(state): State<AppState>,
    params: Result<Query<WeatherQuery>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return AppError::validation(format!(
                "Invalid query string: {}",
                rejection.body_text()
            ))
            .into_response();
        }
    };
    let city = match validate_city(params.city.as_deref()) {
        Ok(city) => city,
        Err(e) => return e.into_response(),
    };

    match state.lookup.lookup(&city).await {
        Ok(found) => {
            let cache_status = if found.tier.is_hit() { "HIT" } else { "MISS" };
            info!(
                city = %city,
                cache = cache_status,
                tier = %found.tier,
                attempts = found.attempts,
                "Handled weather request"
            );
            (
                lookup_headers(cache_status, found.tier, found.attempts),
                Json(found.record),
            )
                .into_response()
        }
        Err(failure) => {
            let cache_status = if matches!(failure.error, AppError::ServiceUnavailable { .. }) {
                "BYPASS"
            } else {
                "MISS"
            };
            info!(
                city = %city,
                cache = cache_status,
                attempts = failure.attempts,
                "Handled weather request"
            );
            (
                lookup_headers(cache_status, CacheTier::None, failure.attempts),
                failure.error,
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_trims_valid_names() {
        assert_eq!(validate_city(Some("  New York ")).unwrap(), "New York");
        assert!(validate_city(Some("St. John's")).is_err());
        assert_eq!(
            validate_city(Some("Stratford-upon-Avon, GB")).unwrap(),
            "Stratford-upon-Avon, GB"
        );
    }

    #[test]
    fn rejects_missing_long_and_invalid_names() {
        assert!(matches!(validate_city(None), Err(AppError::ValidationError(_))));
        assert!(matches!(validate_city(Some("   ")), Err(AppError::ValidationError(_))));
        assert!(validate_city(Some("a".repeat(81).as_str())).is_err());
        assert!(validate_city(Some("a".repeat(80).as_str())).is_ok());
        assert!(validate_city(Some("Paris1")).is_err());
        assert!(validate_city(Some("<script>")).is_err());
    }
}
