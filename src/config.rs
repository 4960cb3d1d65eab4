//! Engine tuning knobs.

use core::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Default interval between expiry checks.
const DEFAULT_EXPIRY_CHECK_MS: u64 = 30_000;

/// Default remaining time below which the guest is warned.
const DEFAULT_WARNING_THRESHOLD_SECS: i64 = 300;

/// Default minimum spacing between two expiry warnings.
const DEFAULT_WARNING_COOLDOWN_SECS: i64 = 60;

/// Default pause on the "paid" state before showing the confirmation.
const DEFAULT_CONFIRMATION_DELAY_MS: u64 = 2_000;

/// Default interval of the payment polling source.
const DEFAULT_PAYMENT_POLL_MS: u64 = 3_000;

/// Shortest interval any recurring check runs at.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing configuration for the session engine.
///
/// Deserializes from any serde format; absent fields take their defaults.
///
/// # Examples
///
/// ```
/// use selforder_rs::config::EngineConfig;
///
/// let config: EngineConfig =
///     serde_json::from_str(r#"{"expiry_check_interval_ms": 1000}"#).unwrap();
/// assert_eq!(config.expiry_check_interval().as_millis(), 1000);
/// assert_eq!(config.warning_threshold().num_seconds(), 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between expiry checks, in milliseconds.
    pub expiry_check_interval_ms: u64,
    /// Warn when less than this many seconds remain.
    pub warning_threshold_secs: i64,
    /// Minimum seconds between two warnings.
    pub warning_cooldown_secs: i64,
    /// Visual confirmation pause after payment, in milliseconds.
    pub confirmation_delay_ms: u64,
    /// Payment polling interval, in milliseconds.
    pub payment_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    #[inline]
    fn default() -> Self {
        Self {
            expiry_check_interval_ms: DEFAULT_EXPIRY_CHECK_MS,
            warning_threshold_secs: DEFAULT_WARNING_THRESHOLD_SECS,
            warning_cooldown_secs: DEFAULT_WARNING_COOLDOWN_SECS,
            confirmation_delay_ms: DEFAULT_CONFIRMATION_DELAY_MS,
            payment_poll_interval_ms: DEFAULT_PAYMENT_POLL_MS,
        }
    }
}

impl EngineConfig {
    /// Interval between expiry checks (never zero).
    #[inline]
    #[must_use]
    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_check_interval_ms).max(MIN_INTERVAL)
    }

    /// Remaining time below which warnings fire.
    #[inline]
    #[must_use]
    pub fn warning_threshold(&self) -> TimeDelta {
        TimeDelta::seconds(self.warning_threshold_secs)
    }

    /// Minimum spacing between warnings.
    #[inline]
    #[must_use]
    pub fn warning_cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.warning_cooldown_secs)
    }

    /// Pause between a confirmed payment and the confirmation view.
    #[inline]
    #[must_use]
    pub const fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }

    /// Payment polling interval (never zero).
    #[inline]
    #[must_use]
    pub fn payment_poll_interval(&self) -> Duration {
        Duration::from_millis(self.payment_poll_interval_ms).max(MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.expiry_check_interval(), Duration::from_secs(30));
        assert_eq!(config.warning_threshold(), TimeDelta::minutes(5));
        assert_eq!(config.warning_cooldown(), TimeDelta::seconds(60));
        assert_eq!(config.confirmation_delay(), Duration::from_secs(2));
        assert_eq!(config.payment_poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"warning_threshold_secs": 120}"#).unwrap();
        assert_eq!(config.warning_threshold(), TimeDelta::minutes(2));
        assert_eq!(config.warning_cooldown_secs, DEFAULT_WARNING_COOLDOWN_SECS);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = EngineConfig {
            expiry_check_interval_ms: 0,
            payment_poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.expiry_check_interval(), Duration::from_millis(1));
        assert_eq!(config.payment_poll_interval(), Duration::from_millis(1));
    }
}
