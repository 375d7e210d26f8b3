//! Reconnection Policy
//!
//! Fixed-delay retry with a bounded attempt budget for the upstream feed.
//! Once the budget is spent the policy reports exhaustion and automatic
//! retries stop until [`ReconnectPolicy::reset`] is called.

use std::time::Duration;

use crate::FeedSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait between consecutive attempts.
    pub delay: Duration,
    /// Consecutive failures allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &FeedSettings) -> Self {
        Self {
            delay: settings.reconnect_delay,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Counts consecutive connection failures against a budget.
///
/// # Example
///
/// ```rust
/// use market_relay::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     delay: Duration::from_millis(100),
///     max_attempts: 2,
/// });
///
/// assert_eq!(policy.record_failure(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.record_failure(), None);
/// assert!(policy.is_exhausted());
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Count one failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the budget
    /// is spent.
    pub const fn record_failure(&mut self) -> Option<Duration> {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.is_exhausted() {
            None
        } else {
            Some(self.config.delay)
        }
    }

    /// Reset after a successful connection or a manual reconnect.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Consecutive failures so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether the attempt budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts
    }

    /// Fixed wait between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.config.delay
    }

    /// Configured attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
