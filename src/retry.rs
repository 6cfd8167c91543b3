//! Backoff between generation attempts.
//!
//! The attempt budget itself is `retries + 1` and is owned by the generation
//! effect; this module only decides how long to wait before an ordinary
//! retry. The default waits not at all, which matches a plain retry loop.
//! Falling back to another model never waits.
//!
//! # Examples
//!
//! ```rust
//! use chat_engine::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::exponential()
//!     .with_initial_delay(Duration::from_millis(250))
//!     .with_jitter_factor(0.0);
//! assert_eq!(config.delay_for(0), Duration::from_millis(250));
//! assert_eq!(config.delay_for(1), Duration::from_millis(500));
//! ```

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Configuration for the delay between retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Add random jitter to prevent thundering herd (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// No delay between attempts
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Exponential backoff starting at one second, capped at a minute
    pub fn exponential() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        if self.max_delay < delay {
            self.max_delay = delay;
        }
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry` (0-based), with exponential backoff
    /// and jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(retry as i32);

        // Cap at max delay
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        // Add jitter
        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }

    /// Sleep before retry number `retry`. Returns `false` if `cancel` fired
    /// first.
    pub async fn wait(&self, retry: u32, cancel: &CancellationToken) -> bool {
        let delay = self.delay_for(retry);
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }
}
