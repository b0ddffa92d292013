//! # Rate Limiter
//! Sliding window of call instants per named resource ("gemini", "ollama", "hatena").
//!
//! A resource is allowed another call while fewer than `max_calls` calls were recorded
//! during the trailing `window`. This is a sliding log, not a token bucket: a burst of
//! `max_calls` is fine, the next call waits until the oldest one ages out.
//!
//! Time comes from `tokio::time::Instant`, so a paused test clock drives it. The `*_at`
//! variants take an explicit `now` and never sleep.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use metrics::histogram;
use tokio::time::Instant;
use tracing::debug;

/// Thread-safe per-resource call log.
#[derive(Debug, Default)]
pub struct RateLimiter {
    inner: Mutex<HashMap<String, VecDeque<Instant>>>,
}

/// Drop entries at least `window` old. Instants are appended in order, so the front is oldest.
fn prune(buf: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&t) = buf.front() {
        if now.saturating_duration_since(t) >= window {
            buf.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, name: &str, max_calls: usize, window: Duration) -> bool {
        self.is_allowed_at(name, max_calls, window, Instant::now())
    }

    pub fn is_allowed_at(&self, name: &str, max_calls: usize, window: Duration, now: Instant) -> bool {
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");
        let buf = inner.entry(name.to_string()).or_default();
        prune(buf, window, now);
        buf.len() < max_calls
    }

    pub fn record_call(&self, name: &str) {
        self.record_call_at(name, Instant::now());
    }

    pub fn record_call_at(&self, name: &str, now: Instant) {
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");
        inner.entry(name.to_string()).or_default().push_back(now);
    }

    /// How long a caller must wait before the next call fits the budget.
    /// `None` when a call is allowed right now.
    pub fn wait_duration_at(
        &self,
        name: &str,
        max_calls: usize,
        window: Duration,
        now: Instant,
    ) -> Option<Duration> {
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");
        let buf = inner.entry(name.to_string()).or_default();
        prune(buf, window, now);
        if buf.len() < max_calls {
            return None;
        }
        let oldest = *buf.front()?;
        let wait = (oldest + window).saturating_duration_since(now);
        (!wait.is_zero()).then_some(wait)
    }

    /// Sleep until a call is allowed. Returns the total time waited.
    ///
    /// The lock is never held across the sleep; the budget is re-checked after every wake-up.
    pub async fn wait_if_needed(&self, name: &str, max_calls: usize, window: Duration) -> Duration {
        let mut waited = Duration::ZERO;
        while let Some(wait) = self.wait_duration_at(name, max_calls, window, Instant::now()) {
            debug!(resource = name, wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
            waited += wait;
        }
        if !waited.is_zero() {
            histogram!("rate_limit_wait_ms", "resource" => name.to_string())
                .record(waited.as_millis() as f64);
        }
        waited
    }

    /// Calls recorded for `name` inside the trailing window (diagnostics).
    pub fn calls_in_window_at(&self, name: &str, window: Duration, now: Instant) -> usize {
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");
        match inner.get_mut(name) {
            Some(buf) => {
                prune(buf, window, now);
                buf.len()
            }
            None => 0,
        }
    }
}
