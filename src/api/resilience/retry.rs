//! Retry policy for Business Central requests
//!
//! Classifies HTTP outcomes, computes backoff waits and models a single
//! attempt as an explicit transition so the client loop stays flat.

use super::config::RetryConfig;
use crate::api::error::ApiError;
use log::debug;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a response status is handled by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 401, token may have been revoked or expired early
    Unauthorized,
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Every other status, never retried
    ClientError,
}

impl StatusClass {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=299 => StatusClass::Success,
            401 => StatusClass::Unauthorized,
            429 => StatusClass::RateLimited,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::ClientError,
        }
    }
}

/// Result of one attempt of the retry loop.
///
/// `Attempt → {Success, AuthRetry, RetryableFailure, TerminalFailure}`.
/// `AuthRetry` replays the request once with a fresh token inside the same
/// attempt, so it never consumes a retry slot.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    AuthRetry,
    RetryableFailure { error: ApiError, wait: Duration },
    TerminalFailure(ApiError),
}

/// Backoff policy shared by every request of a client
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Wait before the attempt following a failed attempt `attempt` (0-based):
    /// 2s, 4s, 8s, ... with the default base.
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        self.cap(exponential(self.config.transient_base_delay, attempt))
    }

    /// Wait after a 429 on attempt `attempt` (0-based): the server's
    /// `Retry-After` when usable, otherwise 5s, 10s, 20s, ...
    pub fn rate_limit_delay(&self, attempt: u32, headers: &HeaderMap) -> Duration {
        let delay = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after)
            .unwrap_or_else(|| exponential(self.config.rate_limit_base_delay, attempt));
        self.cap(delay)
    }

    fn cap(&self, delay: Duration) -> Duration {
        delay.min(self.config.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

fn exponential(base: Duration, exponent: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(exponent.min(16)))
}

/// Parse a `Retry-After` value given either as integer seconds or as a
/// duration such as `1.5`, `500ms` or `2s`.
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let (number, unit) = match value.find(|c: char| !(c.is_ascii_digit() || c == '.')) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let amount: f64 = number.parse().ok()?;
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }

    let secs = match unit.trim() {
        "ms" => amount / 1000.0,
        "s" => amount,
        "m" => amount * 60.0,
        "h" => amount * 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(secs).ok()
}

/// Sleep for `delay` unless the token is cancelled first
pub async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), ApiError> {
    if delay.is_zero() {
        return if cancel.is_cancelled() { Err(ApiError::Cancelled) } else { Ok(()) };
    }

    debug!("Waiting {:?} before next request", delay);
    tokio::select! {
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
