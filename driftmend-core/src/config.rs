//! Configuration types.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// RETRY CONFIGURATION
// ============================================================================

/// Retry configuration for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff
    pub max_backoff: Duration,
    /// Multiplier applied to the backoff after each retry
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    /// Backoff to wait before retry number `retry` (1-based), exponential
    /// and capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32 - 1);
        let backoff = self.initial_backoff.mul_f32(factor);
        backoff.min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

// ============================================================================
// RECONCILER CONFIGURATION
// ============================================================================

/// Configuration for the reconciliation orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Interval between drift checks (default: 60 seconds)
    pub check_interval: Duration,

    /// Whether the diff engine infers column renames (default: true)
    pub detect_renames: bool,

    /// Name-similarity threshold a rename candidate must exceed, 0.0 to 1.0
    /// (default: 0.5)
    pub rename_threshold: f64,

    /// Apply validated updates without external approval (default: false)
    pub auto_apply: bool,

    /// Timeout for a single proposal collaborator call (default: 30 seconds)
    pub proposal_timeout: Duration,

    /// Retry policy for the proposal collaborator
    pub proposal_retry: RetryConfig,

    /// Retry policy for snapshot capture and mapping store IO
    pub capture_retry: RetryConfig,

    /// Timeout for a single mapping store read or write (default: 10 seconds)
    pub store_timeout: Duration,

    /// Timeout for the reload signal (default: 10 seconds)
    pub reload_timeout: Duration,

    /// Timeout for alert emission; alerts never block past this
    /// (default: 10 seconds)
    pub alert_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            detect_renames: true,
            rename_threshold: 0.5,
            auto_apply: false,
            proposal_timeout: Duration::from_secs(30),
            proposal_retry: RetryConfig::default(),
            capture_retry: RetryConfig::default(),
            store_timeout: Duration::from_secs(10),
            reload_timeout: Duration::from_secs(10),
            alert_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized variables:
    /// - `DRIFTMEND_CHECK_INTERVAL_SECS`
    /// - `DRIFTMEND_DETECT_RENAMES` ("false" disables)
    /// - `DRIFTMEND_RENAME_THRESHOLD`
    /// - `DRIFTMEND_AUTO_APPLY` ("true" enables)
    /// - `DRIFTMEND_PROPOSAL_TIMEOUT_SECS`
    /// - `DRIFTMEND_PROPOSAL_MAX_RETRIES`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let check_interval = std::env::var("DRIFTMEND_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.check_interval);

        let detect_renames = std::env::var("DRIFTMEND_DETECT_RENAMES")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.detect_renames);

        let rename_threshold = std::env::var("DRIFTMEND_RENAME_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rename_threshold);

        let auto_apply = std::env::var("DRIFTMEND_AUTO_APPLY")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.auto_apply);

        let proposal_timeout = std::env::var("DRIFTMEND_PROPOSAL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.proposal_timeout);

        let proposal_retry = RetryConfig {
            max_retries: std::env::var("DRIFTMEND_PROPOSAL_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.proposal_retry.max_retries),
            ..defaults.proposal_retry.clone()
        };

        Self {
            check_interval,
            detect_renames,
            rename_threshold,
            auto_apply,
            proposal_timeout,
            proposal_retry,
            ..defaults
        }
    }

    /// Short intervals for development and testing.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            proposal_timeout: Duration::from_secs(10),
            proposal_retry: RetryConfig {
                max_retries: 1,
                initial_backoff: Duration::from_millis(50),
                max_backoff: Duration::from_millis(500),
                backoff_multiplier: 2.0,
            },
            capture_retry: RetryConfig {
                max_retries: 1,
                initial_backoff: Duration::from_millis(50),
                max_backoff: Duration::from_millis(500),
                backoff_multiplier: 2.0,
            },
            store_timeout: Duration::from_secs(2),
            reload_timeout: Duration::from_secs(2),
            alert_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Conservative production settings.
    pub fn production() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            proposal_retry: RetryConfig {
                max_retries: 5,
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.rename_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "rename_threshold".to_string(),
                value: self.rename_threshold.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "check_interval".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.proposal_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "proposal_timeout".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
        assert_eq!(retry.backoff_for(4), Duration::from_millis(350));
    }

    #[test]
    fn test_config_default_is_valid() {
        let config = ReconcilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.rename_threshold, 0.5);
        assert!(config.detect_renames);
        assert!(!config.auto_apply);
    }

    #[test]
    fn test_config_development_shortens_intervals() {
        let config = ReconcilerConfig::development();
        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.proposal_retry.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_out_of_range_threshold() {
        let config = ReconcilerConfig {
            rename_threshold: 1.5,
            ..ReconcilerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let config = ReconcilerConfig {
            check_interval: Duration::ZERO,
            ..ReconcilerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
