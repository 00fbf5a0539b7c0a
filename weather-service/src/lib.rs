pub mod breaker;
pub mod cache;
pub mod config;
pub mod handlers;
pub mod lookup;
pub mod openapi;
pub mod rate_limit;
pub mod upstream;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method},
    middleware,
    routing::get,
};
use common::clock::Clock;
use common::errors::AppError;
use common::http_client::HttpClient;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::breaker::CircuitBreaker;
use crate::cache::{CacheGateway, CacheTier, LocalTier, RedisTier};
use crate::config::Config;
use crate::handlers::AppState;
use crate::lookup::WeatherLookup;
use crate::rate_limit::RateLimiter;
use crate::upstream::UpstreamGate;

/// Wire the cache tiers, breaker and upstream client from configuration.
pub fn build_lookup(config: &Config, clock: Arc<dyn Clock>) -> Result<WeatherLookup, AppError> {
    let local = LocalTier::new(config.local_cache_capacity, clock.clone());

    let remote: Option<Arc<dyn CacheTier>> = match &config.redis_url {
        Some(url) => match RedisTier::new(url, config.remote_timeout()) {
            Ok(tier) => {
                info!("Remote cache tier enabled");
                Some(Arc::new(tier))
            }
            Err(e) => {
                warn!(error = %e, "Invalid REDIS_URL, running with the local tier only");
                None
            }
        },
        None => {
            info!("REDIS_URL not set, running with the local tier only");
            None
        }
    };

    let cache = CacheGateway::new(local, remote, config.local_ttl(), config.remote_ttl());
    let http_client = HttpClient::new(config.http_timeout(), config.retry_policy())?;
    let breaker = CircuitBreaker::new(
        config.breaker_failure_threshold,
        config.breaker_open_window(),
        clock,
    );
    let gate = UpstreamGate::new(
        http_client,
        breaker,
        config.openweather_url.clone(),
        config.openweather_api_key.clone(),
    );

    Ok(WeatherLookup::new(cache, gate))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let exposed = [
        HeaderName::from_static(handlers::CACHE_STATUS_HEADER),
        HeaderName::from_static(handlers::CACHE_TIER_HEADER),
        HeaderName::from_static(handlers::ATTEMPTS_HEADER),
        HeaderName::from_static(handlers::RETRY_COUNT_HEADER),
        HeaderName::from_static("ratelimit-limit"),
        HeaderName::from_static("ratelimit-remaining"),
        HeaderName::from_static("ratelimit-reset"),
    ];
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers(exposed);

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!(origin = %origin, "Invalid FRONTEND_ORIGIN, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}

pub fn router(state: AppState, limiter: Arc<RateLimiter>, frontend_origin: &str) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/weather", get(handlers::get_weather))
        .merge(openapi::swagger_ui())
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(frontend_origin))
        .with_state(state)
}
