//! Retry policy with exponential backoff
//!
//! Only the request phase is retried. Once a stream has delivered its first
//! event the call is never repeated.

use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for computed delays
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::default().with_max_retries(0)
    }

    /// Set the number of retries
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Whether `error` after `retries_done` retries warrants another attempt
    ///
    /// A server asking for a longer wait than `max_delay` is not retried;
    /// the error goes back to the caller with the hint intact.
    pub fn should_retry(&self, error: &Error, retries_done: u32) -> bool {
        if retries_done >= self.max_retries || !error.is_retryable() {
            return false;
        }
        match error.retry_after() {
            Some(seconds) => Duration::from_secs(seconds) <= self.max_delay,
            None => true,
        }
    }

    /// Delay before retry number `retries_done + 1`
    ///
    /// A server-provided retry-after wins over the computed backoff.
    pub fn delay_for(&self, retries_done: u32, error: &Error) -> Duration {
        match error.retry_after() {
            Some(seconds) => Duration::from_secs(seconds),
            None => self.backoff(retries_done),
        }
    }

    /// Exponential backoff for `retries_done`, capped and jittered
    pub fn backoff(&self, retries_done: u32) -> Duration {
        let exponent = i32::try_from(retries_done).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay = Duration::from_millis(capped as u64);

        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let range = delay.as_millis() as f64 * self.jitter_factor.clamp(0.0, 1.0);
        if range <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(-range..=range);
        let jittered = (delay.as_millis() as f64 + jitter).max(0.0);
        Duration::from_millis(jittered as u64).min(self.max_delay)
    }
}
