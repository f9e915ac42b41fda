//! Retry policy for API requests
//!
//! The policy is a pure function of the last outcome and the attempt number, so
//! it can be tested without any I/O.
//!
//! | Outcome | Action |
//! |---------|--------|
//! | Success | Done |
//! | RateLimited(n) | Retry after exactly n seconds |
//! | ServerError | Retry after the fixed server-error delay |
//! | ClientError | Never retried |
//!
//! No retry is scheduled once `max_attempts` requests have been made.

use crate::api::FetchOutcome;
use crate::config::CrawlerConfig;
use std::time::Duration;

/// Retry settings for API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before retrying a server error
    pub server_error_delay: Duration,
    /// Hint used for 429 responses without a usable retry-after header
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    const STOP: Self = Self {
        retry: false,
        delay: Duration::ZERO,
    };

    fn after(delay: Duration) -> Self {
        Self { retry: true, delay }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            server_error_delay: Duration::from_secs(config.server_error_delay_secs),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
        }
    }

    /// Decides whether attempt number `attempt` (1-based) should be followed by another
    pub fn decide(&self, outcome: &FetchOutcome, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::STOP;
        }

        match outcome {
            FetchOutcome::Success(_) | FetchOutcome::ClientError(_) => RetryDecision::STOP,
            FetchOutcome::RateLimited(secs) => RetryDecision::after(Duration::from_secs(*secs)),
            FetchOutcome::ServerError(_) => RetryDecision::after(self.server_error_delay),
        }
    }
}
