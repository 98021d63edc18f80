//! Retry policy for upstream calls, plus the fault and outcome types every
//! resolution stage speaks.
//!
//! Every external call runs through [`RetryPolicy::run`]. Transient faults are
//! retried with exponential backoff. Permanent faults stop at once. Neither
//! kind ever escapes as a panic or an `Err`: the caller always gets an
//! [`Outcome`].

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::TARGET_WEB_REQUEST;

pub const MAX_ATTEMPTS: u32 = 3;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an upstream call did not produce a payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceFault {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed")]
    Unauthorized,

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceFault {
    /// Network, timeout, rate-limit and 5xx faults are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceFault::Network(_)
                | ServiceFault::Timeout(_)
                | ServiceFault::RateLimited
                | ServiceFault::Unavailable(_)
        )
    }
}

/// Result of one resolution call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The service answered with a usable payload.
    Found(T),
    /// The service answered, but had nothing to say.
    Absent,
    /// The service could not be reached or refused the request.
    Failed(ServiceFault),
}

impl<T> Outcome<T> {
    /// Collapses `Absent` and `Failed` into `None`.
    pub fn found(self) -> Option<T> {
        match self {
            Outcome::Found(value) => Some(value),
            Outcome::Absent | Outcome::Failed(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Found(value) => Outcome::Found(f(value)),
            Outcome::Absent => Outcome::Absent,
            Outcome::Failed(fault) => Outcome::Failed(fault),
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Outcome::Found(value),
            None => Outcome::Absent,
        }
    }
}

/// Attempt budget, backoff bounds and per-attempt timeout for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::scaled(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Three attempts, waits between 2 and 10 units, 30 second attempt timeout.
    pub fn scaled(unit: Duration) -> Self {
        RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            multiplier: unit,
            min_wait: unit * 2,
            max_wait: unit * 10,
            call_timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Wait after the `failed_attempt`-th failure (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }

    /// Runs `call` until it succeeds, fails permanently, or the attempt budget
    /// is spent. `Ok(None)` from the call is an answer, not a failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ServiceFault>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let fault = match timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return value.into(),
                Ok(Err(fault)) => fault,
                Err(_) => ServiceFault::Timeout(self.call_timeout),
            };

            if !fault.is_retryable() {
                info!(target: TARGET_WEB_REQUEST, "{}: giving up after attempt {}: {}", operation, attempt, fault);
                return Outcome::Failed(fault);
            }

            if attempt >= max_attempts {
                info!(target: TARGET_WEB_REQUEST, "{}: failed after {} attempts: {}", operation, attempt, fault);
                return Outcome::Failed(fault);
            }

            let delay = self.delay_for(attempt);
            debug!(target: TARGET_WEB_REQUEST, "{}: attempt {}/{} failed ({}), backing off for {:?}", operation, attempt, max_attempts, fault, delay);
            sleep(delay).await;
        }
    }
}
