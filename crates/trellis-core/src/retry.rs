// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Exponential backoff for restart loops.
//!
//! # Example
//!
//! ```
//! use trellis_core::retry::{BackoffTracker, RetryConfig, RetryDecision};
//! use std::time::Duration;
//!
//! let tracker = BackoffTracker::new(RetryConfig {
//!     initial_delay: Duration::from_millis(100),
//!     max_delay: Duration::from_millis(350),
//!     ..Default::default()
//! });
//!
//! assert_eq!(tracker.record_failure(), RetryDecision::Retry(Duration::from_millis(100)));
//! assert_eq!(tracker.record_failure(), RetryDecision::Retry(Duration::from_millis(200)));
//! assert_eq!(tracker.record_failure(), RetryDecision::Retry(Duration::from_millis(350)));
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Retry Configuration
// =============================================================================

/// Configuration for exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of consecutive failures before giving up (0 = never).
    #[serde(default)]
    pub max_attempts: u32,

    /// Delay after the first failure.
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound for any delay.
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// A run at least this long resets the failure counter.
    #[serde(default = "default_reset_after", with = "duration_millis")]
    pub reset_after: Duration,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_reset_after() -> Duration {
    Duration::from_secs(60)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            reset_after: default_reset_after(),
        }
    }
}

impl RetryConfig {
    /// Sets the maximum number of consecutive failures.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the run length that resets the failure counter.
    pub fn with_reset_after(mut self, duration: Duration) -> Self {
        self.reset_after = duration;
        self
    }
}

// Duration serialization helper
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// =============================================================================
// Retry Decision
// =============================================================================

/// Decision on whether to retry an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Do not retry.
    DoNotRetry,
}

// =============================================================================
// Exponential Backoff
// =============================================================================

/// Exponentially increasing delays.
///
/// Delay formula: `min(initial_delay * multiplier^(attempt-1), max_delay)`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff strategy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calculates the delay for a given attempt (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64;
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplied = base_delay * self.config.multiplier.powi(exponent);
        let capped = multiplied.min(self.config.max_delay.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }

    /// Decides whether attempt number `attempt` (1-based) may be retried.
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if self.config.max_attempts > 0 && attempt >= self.config.max_attempts {
            return RetryDecision::DoNotRetry;
        }
        RetryDecision::Retry(self.calculate_delay(attempt))
    }
}

// =============================================================================
// BackoffTracker
// =============================================================================

/// Counts consecutive failures of a long-running task.
///
/// The counter survives individual restarts and is reset only by
/// [`record_run`](Self::record_run) after a sustained run, so a task that
/// keeps failing shortly after starting keeps backing off.
#[derive(Debug)]
pub struct BackoffTracker {
    backoff: ExponentialBackoff,
    failures: AtomicU32,
}

impl BackoffTracker {
    /// Creates a tracker with no recorded failures.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            backoff: ExponentialBackoff::new(config),
            failures: AtomicU32::new(0),
        }
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn record_failure(&self) -> RetryDecision {
        let attempt = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let decision = self.backoff.should_retry(attempt);
        if let RetryDecision::Retry(delay) = &decision {
            tracing::debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before restart"
            );
        }
        decision
    }

    /// Records a completed run; resets the counter if it lasted long enough.
    ///
    /// Returns `true` if the counter was reset.
    pub fn record_run(&self, duration: Duration) -> bool {
        if duration >= self.backoff.config().reset_after {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Resets the failure counter.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
    }

    /// Returns the number of consecutive failures.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_reset_after(Duration::from_secs(10))
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let backoff = ExponentialBackoff::new(config());
        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(backoff.calculate_delay(4), Duration::from_millis(800));
        assert_eq!(backoff.calculate_delay(5), Duration::from_secs(1));
        assert_eq!(backoff.calculate_delay(500), Duration::from_secs(1));
    }

    #[test]
    fn test_max_attempts() {
        let backoff = ExponentialBackoff::new(config().with_max_attempts(3));
        assert!(matches!(backoff.should_retry(2), RetryDecision::Retry(_)));
        assert_eq!(backoff.should_retry(3), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_tracker_resets_after_sustained_run() {
        let tracker = BackoffTracker::new(config());
        tracker.record_failure();
        tracker.record_failure();
        assert_eq!(tracker.failures(), 2);

        assert!(!tracker.record_run(Duration::from_secs(1)));
        assert_eq!(tracker.failures(), 2);
        assert_eq!(
            tracker.record_failure(),
            RetryDecision::Retry(Duration::from_millis(400))
        );

        assert!(tracker.record_run(Duration::from_secs(10)));
        assert_eq!(tracker.failures(), 0);
        assert_eq!(
            tracker.record_failure(),
            RetryDecision::Retry(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_config_serde_millis() {
        let json = r#"{"initial_delay": 250, "max_delay": 4000}"#;
        let config: RetryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(4));
        assert_eq!(config.reset_after, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 0);
    }
}
