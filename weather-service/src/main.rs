use common::clock::{Clock, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};

use weather_service::config::Config;
use weather_service::handlers::AppState;
use weather_service::rate_limit::RateLimiter;
use weather_service::{build_lookup, router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    common::tracing::init(config.log_format);

    if config.openweather_api_key.is_empty() {
        warn!("OPENWEATHER_API_KEY is not set, the provider will reject lookups");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let lookup = Arc::new(build_lookup(&config, clock.clone())?);
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_window(),
        config.rate_limit_max,
        clock,
    ));

    let state = AppState {
        lookup,
        started_at: Instant::now(),
    };
    let app = router(state, limiter, &config.frontend_origin);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Weather service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Weather service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
