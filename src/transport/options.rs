//! Reconnection and timeout configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use linkbox_client::ChannelOptions;
//!
//! let options = ChannelOptions::new()
//!     .with_reconnect_interval(Duration::from_millis(500))
//!     .with_max_reconnect_attempts(10);
//!
//! // Or from the JSON option object
//! let options = ChannelOptions::from_json(r#"{"reconnectDecay": 2}"#)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default base backoff delay.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default backoff ceiling.
pub const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default multiplicative backoff growth.
pub const DEFAULT_RECONNECT_DECAY: f64 = 1.5;

/// Default connect-attempt timeout.
pub const DEFAULT_TIMEOUT_INTERVAL: Duration = Duration::from_millis(2000);

// ============================================================================
// ChannelOptions
// ============================================================================

/// Construction-time options for a [`ResilientChannel`](super::ResilientChannel).
///
/// Deserializes from camelCase JSON with durations in milliseconds; every
/// key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelOptions {
    /// Base backoff delay.
    #[serde(with = "millis")]
    pub reconnect_interval: Duration,

    /// Backoff ceiling.
    #[serde(with = "millis")]
    pub max_reconnect_interval: Duration,

    /// Multiplicative backoff growth factor.
    pub reconnect_decay: f64,

    /// Connect-attempt timeout.
    #[serde(with = "millis")]
    pub timeout_interval: Duration,

    /// Retry cap; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChannelOptions {
    /// Creates options with the default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_interval: DEFAULT_MAX_RECONNECT_INTERVAL,
            reconnect_decay: DEFAULT_RECONNECT_DECAY,
            timeout_interval: DEFAULT_TIMEOUT_INTERVAL,
            max_reconnect_attempts: None,
        }
    }

    /// Parses options from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed input and [`Error::Config`] if
    /// the parsed values fail [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChannelOptions {
    /// Sets the base backoff delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the backoff ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval = interval;
        self
    }

    /// Sets the backoff growth factor.
    #[inline]
    #[must_use]
    pub fn with_reconnect_decay(mut self, decay: f64) -> Self {
        self.reconnect_decay = decay;
        self
    }

    /// Sets the connect-attempt timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout_interval(mut self, timeout: Duration) -> Self {
        self.timeout_interval = timeout;
        self
    }

    /// Caps the number of consecutive retries.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }
}

// ============================================================================
// Backoff
// ============================================================================

impl ChannelOptions {
    /// Delay before the retry that follows `attempts` consecutive failed
    /// retries.
    ///
    /// `min(reconnect_interval * reconnect_decay^attempts, max_reconnect_interval)`,
    /// rounded to whole milliseconds.
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let base_ms = self.reconnect_interval.as_secs_f64() * 1000.0;
        let ceiling_ms = self.max_reconnect_interval.as_secs_f64() * 1000.0;
        let delay_ms = (base_ms * self.reconnect_decay.powi(exponent)).min(ceiling_ms);

        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Returns `true` if another retry is allowed after `attempts` retries.
    #[inline]
    #[must_use]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_reconnect_attempts.is_none_or(|max| attempts < max)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_interval.is_zero() {
            return Err(Error::config("reconnectInterval must be greater than zero"));
        }
        if !self.reconnect_decay.is_finite() || self.reconnect_decay < 1.0 {
            return Err(Error::config(format!(
                "reconnectDecay must be a finite number >= 1.0, got {}",
                self.reconnect_decay
            )));
        }
        if self.max_reconnect_interval < self.reconnect_interval {
            return Err(Error::config(
                "maxReconnectInterval must not be less than reconnectInterval",
            ));
        }
        if self.timeout_interval.is_zero() {
            return Err(Error::config("timeoutInterval must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Durations as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let options = ChannelOptions::new();
        assert_eq!(options.reconnect_interval, Duration::from_millis(1000));
        assert_eq!(options.max_reconnect_interval, Duration::from_millis(30_000));
        assert_eq!(options.reconnect_decay, 1.5);
        assert_eq!(options.timeout_interval, Duration::from_millis(2000));
        assert!(options.max_reconnect_attempts.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_default_backoff_sequence() {
        let options = ChannelOptions::new();
        assert_eq!(options.delay_for(0), Duration::from_millis(1000));
        assert_eq!(options.delay_for(1), Duration::from_millis(1500));
        assert_eq!(options.delay_for(2), Duration::from_millis(2250));
        assert_eq!(options.delay_for(100), Duration::from_millis(30_000));
    }

    #[test]
    fn test_clamped_doubling() {
        let options = ChannelOptions::new()
            .with_reconnect_interval(Duration::from_millis(1000))
            .with_reconnect_decay(2.0)
            .with_max_reconnect_interval(Duration::from_millis(5000));

        let delays: Vec<_> = (0..4).map(|n| options.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(5000),
            ]
        );
    }

    #[test]
    fn test_huge_attempt_count_hits_ceiling() {
        let options = ChannelOptions::new().with_reconnect_decay(10.0);
        assert_eq!(options.delay_for(u32::MAX), options.max_reconnect_interval);
    }

    #[test]
    fn test_allows_retry() {
        let unlimited = ChannelOptions::new();
        assert!(unlimited.allows_retry(u32::MAX));

        let capped = ChannelOptions::new().with_max_reconnect_attempts(2);
        assert!(capped.allows_retry(0));
        assert!(capped.allows_retry(1));
        assert!(!capped.allows_retry(2));
    }

    #[test]
    fn test_from_json_partial() {
        let options =
            ChannelOptions::from_json(r#"{"reconnectDecay": 2, "maxReconnectAttempts": 5}"#)
                .expect("valid options");
        assert_eq!(options.reconnect_decay, 2.0);
        assert_eq!(options.max_reconnect_attempts, Some(5));
        assert_eq!(options.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
    }

    #[test]
    fn test_from_json_millis_and_null_cap() {
        let options = ChannelOptions::from_json(
            r#"{"reconnectInterval": 250, "maxReconnectInterval": 4000,
                "timeoutInterval": 800, "maxReconnectAttempts": null}"#,
        )
        .unwrap();
        assert_eq!(options.reconnect_interval, Duration::from_millis(250));
        assert_eq!(options.max_reconnect_interval, Duration::from_millis(4000));
        assert_eq!(options.timeout_interval, Duration::from_millis(800));
        assert!(options.max_reconnect_attempts.is_none());
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        let err = ChannelOptions::from_json(r#"{"reconnectDecay": 0.5}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_validate_zero_interval() {
        let options = ChannelOptions::new().with_reconnect_interval(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_ceiling_below_base() {
        let options = ChannelOptions::new()
            .with_reconnect_interval(Duration::from_secs(10))
            .with_max_reconnect_interval(Duration::from_secs(1));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_decay_boundary() {
        let flat = ChannelOptions::new().with_reconnect_decay(1.0);
        assert!(flat.validate().is_ok());
        assert_eq!(flat.delay_for(0), flat.delay_for(10));

        let shrinking = ChannelOptions::new().with_reconnect_decay(0.99);
        assert!(matches!(shrinking.validate(), Err(Error::Config { .. })));

        let equal = ChannelOptions::new()
            .with_reconnect_interval(Duration::from_secs(3))
            .with_max_reconnect_interval(Duration::from_secs(3));
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_validate_nan_decay() {
        let options = ChannelOptions::new().with_reconnect_decay(f64::NAN);
        assert!(options.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_backoff_non_decreasing_and_bounded(
            base_ms in 1u64..10_000,
            extra_ms in 0u64..100_000,
            decay in 1.0f64..4.0,
            attempts in 0u32..64,
        ) {
            let options = ChannelOptions::new()
                .with_reconnect_interval(Duration::from_millis(base_ms))
                .with_max_reconnect_interval(Duration::from_millis(base_ms + extra_ms))
                .with_reconnect_decay(decay);

            let current = options.delay_for(attempts);
            let next = options.delay_for(attempts + 1);

            prop_assert!(current <= next);
            prop_assert!(next <= options.max_reconnect_interval);
            prop_assert_eq!(options.delay_for(0), options.reconnect_interval);
        }
    }
}
