//! # Retry executor and call guard
//!
//! [`retry_with_backoff`] re-runs a fallible async operation up to `max_retries` extra
//! times, sleeping `base_delay * 2^attempt` between attempts, and hands back the last
//! error unchanged once the budget is spent.
//!
//! [`CallGuard`] binds one external resource to its rate-limit budget and retry policy.
//! Every attempt waits on the shared [`RateLimiter`] first and records exactly one call,
//! whether the attempt succeeds or not.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use metrics::counter;
use tracing::{error, warn};

use crate::config::{AppConfig, RateLimitConfig, RetryConfig};
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that tries exactly once.
    pub const fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff before attempt `attempt + 1` (attempt index starts at 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(c: RetryConfig) -> Self {
        Self::new(c.max_retries, Duration::from_millis(c.base_delay_ms))
    }
}

/// Run `op` until it succeeds or `policy.max_retries` retries are used up.
/// `op` receives the zero-based attempt index.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    resource = label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    resource = label,
                    attempts = attempt + 1,
                    error = %e,
                    "giving up after exhausting retries"
                );
                return Err(e);
            }
        }
    }
}

/// Rate limit + retry around one named external resource.
#[derive(Debug, Clone)]
pub struct CallGuard {
    limiter: Arc<RateLimiter>,
    resource: String,
    limit: RateLimitConfig,
    retry: RetryPolicy,
}

impl CallGuard {
    pub fn new(
        limiter: Arc<RateLimiter>,
        resource: impl Into<String>,
        limit: RateLimitConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            limiter,
            resource: resource.into(),
            limit,
            retry,
        }
    }

    /// Budget and policy for `resource` as configured under `[rate_limits.*]` / `[retry.*]`.
    pub fn from_config(limiter: Arc<RateLimiter>, cfg: &AppConfig, resource: &str) -> Self {
        Self::new(
            limiter,
            resource,
            cfg.rate_limit_for(resource),
            cfg.retry_for(resource).into(),
        )
    }

    /// Same budget, different retry policy (publishing is never retried).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn call<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let limiter: &RateLimiter = &self.limiter;
        let resource: &str = &self.resource;
        let max_calls = self.limit.max_calls;
        let window = self.limit.window();

        retry_with_backoff(&self.retry, resource, |_attempt| {
            let fut = op();
            async move {
                limiter.wait_if_needed(resource, max_calls, window).await;
                limiter.record_call(resource);
                let res = fut.await;
                let outcome = if res.is_ok() { "ok" } else { "error" };
                counter!(
                    "external_calls_total",
                    "resource" => resource.to_string(),
                    "outcome" => outcome
                )
                .increment(1);
                res
            }
        })
        .await
    }
}
