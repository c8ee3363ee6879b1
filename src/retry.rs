//! Resend policy for transient failures.
//!
//! A logical call moves through `Attempt(1) .. Attempt(retries + 1)`. After
//! each attempt the policy returns a [`RetryDecision`]:
//!
//! - transport failures that [`ClientError::is_transient`] accepts, and
//!   responses with status 408, 429, 500, 502, 503 or 504, are retried while
//!   budget remains;
//! - everything else (2xx, other 4xx, cancellation, argument errors) is
//!   terminal and handed back as-is.
//!
//! When the budget runs out the last outcome is terminal: a transient
//! response is returned to the caller as a normal envelope, a transient
//! transport error is returned as the error.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;

use crate::client::ClientError;
use crate::http::HttpResponse;

/// Exponential delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for any single delay, including server-requested ones.
    pub max: Duration,
    /// Growth factor applied per retry.
    pub multiplier: u32,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(8),
            multiplier: 2,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Retry immediately. Mostly useful in tests.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        let delay = self.initial.saturating_mul(factor).min(self.max);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        Duration::from_millis(fastrand::u64(millis / 2..=millis))
    }
}

/// Outcome of consulting the policy after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send again after the delay.
    Retry(Duration),
    /// Hand the outcome of this attempt to the caller.
    Stop,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Total attempts a logical call may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_transient_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }

    /// Decide after `attempt` (1-based) produced a response.
    pub fn on_response(&self, attempt: u32, response: &HttpResponse) -> RetryDecision {
        if !Self::is_transient_status(response.status) || attempt >= self.max_attempts() {
            return RetryDecision::Stop;
        }
        let delay = retry_after(response)
            .map(|d| d.min(self.backoff.max))
            .unwrap_or_else(|| self.backoff.delay(attempt));
        RetryDecision::Retry(delay)
    }

    /// Decide after `attempt` (1-based) failed without a response.
    pub fn on_error(&self, attempt: u32, error: &ClientError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts() {
            return RetryDecision::Stop;
        }
        RetryDecision::Retry(self.backoff.delay(attempt))
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    let value = response.headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
