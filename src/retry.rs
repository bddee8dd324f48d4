//! Backoff policies for failed page fetches.
//!
//! The pipeline asks the policy what to do after each consecutive failure of
//! the same page. `Some(delay)` means sleep and retry at the same offset;
//! `None` means give up and abort the run.
//!
//! The default is [`FixedBackoff`] with no ceiling: wait a fixed interval and
//! retry forever. An operator has to kill a run that is stuck on a dead feed.

use std::time::Duration;

use crate::config::FeedConfig;
use crate::error::FetchError;

pub trait RetryPolicy: Send + Sync {
    /// Delay before retry number `attempt` (1-based), or `None` to give up.
    fn next_delay(&self, attempt: u32, error: &FetchError) -> Option<Duration>;
}

/// Constant delay between attempts, optionally capped.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedBackoff {
    /// Retry forever with a constant delay.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_ceiling(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }
}

impl RetryPolicy for FixedBackoff {
    fn next_delay(&self, attempt: u32, _error: &FetchError) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(self.delay),
        }
    }
}

/// Doubling delay: base, 2×base, 4×base, ... capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, _error: &FetchError) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(1u32 << exp);
        Some(delay.min(self.max_delay))
    }
}

/// Build the policy described by `[feed]` configuration.
pub fn policy_from_config(feed: &FeedConfig) -> Box<dyn RetryPolicy> {
    let delay = feed.retry_delay();
    match feed.backoff.as_str() {
        "exponential" => Box::new(ExponentialBackoff::new(
            delay,
            delay.saturating_mul(32),
            feed.max_retries,
        )),
        _ => match feed.max_retries {
            Some(max) => Box::new(FixedBackoff::with_ceiling(delay, max)),
            None => Box::new(FixedBackoff::unbounded(delay)),
        },
    }
}
