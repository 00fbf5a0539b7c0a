use crate::errors::{AppError, UpstreamError};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Bounded exponential backoff between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the given retry (1-based): `base * 2^(retry - 1)`, capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_millis(1000))
    }
}

/// Outcome of a retried call together with how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, UpstreamError>,
    pub attempts: u32,
}

/// HTTP client with retry logic and timeout
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy,
            timeout,
        })
    }

    /// GET `url` with `query` and decode the JSON body, retrying transient
    /// failures with exponential backoff.
    ///
    /// Only the base URL is logged; the query may carry credentials.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_json<T>(&self, url: &str, query: &[(&str, &str)]) -> Attempted<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let target = match Url::parse_with_params(url, query) {
            Ok(target) => target,
            Err(e) => {
                return Attempted {
                    result: Err(UpstreamError::InvalidUrl(e.to_string())),
                    attempts: 0,
                };
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.fetch_with_timeout(target.clone(), attempt).await {
                Ok(value) => {
                    info!(attempt, "Upstream request successful");
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let retries_used = attempt - 1;
                    if e.is_retryable() && retries_used < self.policy.max_retries {
                        let backoff = self.policy.delay_for_retry(attempt);
                        warn!(
                            attempt,
                            reason = e.reason(),
                            status = ?e.status(),
                            backoff_ms = backoff.as_millis() as u64,
                            "Upstream request failed, retrying with exponential backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    error!(
                        attempts = attempt,
                        reason = e.reason(),
                        status = ?e.status(),
                        retryable = e.is_retryable(),
                        "Upstream request failed"
                    );
                    return Attempted {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn fetch_with_timeout<T>(&self, url: Url, attempt: u32) -> Result<T, UpstreamError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut request = self.client.get(url);
        if attempt > 1 {
            request = request.header("X-Retry-Count", (attempt - 1).to_string());
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| UpstreamError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Network(e)
            }
        })?;
        let json: T = serde_json::from_str(&text)?;

        Ok(json)
    }
}
