//! Fixed-window inbound rate limiting keyed by client IP.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::clock::Clock;
use common::errors::AppError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Windows are only swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 1024;

struct Window {
    started: Instant,
    count: u32,
}

/// Quota left in the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: Duration,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: Duration,
    max_requests: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max_requests,
            clock,
        }
    }

    /// Count one request for `client`. `Err` carries the time until the window resets.
    pub fn check(&self, client: &str) -> Result<Quota, Duration> {
        let now = self.clock.now();
        let mut windows = self.windows.lock();

        if windows.len() >= SWEEP_THRESHOLD && !windows.contains_key(client) {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let entry = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        let reset_in = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started));
        if entry.count >= self.max_requests {
            return Err(reset_in);
        }

        entry.count += 1;
        Ok(Quota {
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_in,
        })
    }
}

fn client_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_quota_headers(response: &mut Response, limit: u32, remaining: u32, reset_in: Duration) {
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert(
        "ratelimit-reset",
        HeaderValue::from(reset_in.as_secs_f64().ceil() as u64),
    );
}

/// Middleware enforcing the global per-client request budget
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&request);
    match limiter.check(&client) {
        Ok(quota) => {
            let mut response = next.run(request).await;
            set_quota_headers(&mut response, quota.limit, quota.remaining, quota.reset_in);
            response
        }
        Err(retry_after) => {
            let mut response = AppError::RateLimited { retry_after }.into_response();
            set_quota_headers(&mut response, limiter.max_requests, 0, retry_after);
            response
        }
    }
}
