//! Consecutive-failure circuit breaker for the upstream provider.
//!
//! ```text
//! Closed   -> Open:     failures reach the threshold
//! Open     -> HalfOpen: open window elapsed, next check lets one call through
//! HalfOpen -> Closed:   that call succeeds
//! HalfOpen -> Open:     that call fails (counter sits at threshold - 1)
//! ```

use common::clock::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open: bool,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    open_window: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            failure_threshold: failure_threshold.max(1),
            open_window,
            clock,
        }
    }

    /// Returns the remaining open duration when calls must fail fast.
    pub fn check(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let Some(opened_at) = inner.opened_at else {
            return Ok(());
        };

        let elapsed = now.saturating_duration_since(opened_at);
        if elapsed < self.open_window {
            return Err(self.open_window - elapsed);
        }

        inner.opened_at = None;
        inner.half_open = true;
        inner.consecutive_failures = self.failure_threshold - 1;
        info!("Circuit breaker half-open, allowing a probe request upstream");
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.half_open || inner.consecutive_failures > 0 {
            info!(
                previous_failures = inner.consecutive_failures,
                "Circuit breaker closed after successful upstream call"
            );
        }
        *inner = Inner::default();
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.half_open = false;

        if inner.consecutive_failures >= self.failure_threshold && inner.opened_at.is_none() {
            inner.opened_at = Some(now);
            warn!(
                failures = inner.consecutive_failures,
                open_ms = self.open_window.as_millis() as u64,
                "Circuit breaker opened due to repeated upstream failures"
            );
        }
    }

    pub fn state(&self) -> BreakerState {
        let now = self.clock.now();
        let inner = self.inner.lock();

        match inner.opened_at {
            Some(opened_at) if now.saturating_duration_since(opened_at) < self.open_window => {
                BreakerState::Open
            }
            Some(_) => BreakerState::HalfOpen,
            None if inner.half_open => BreakerState::HalfOpen,
            None => BreakerState::Closed,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }
}
