//! Agreement engine configuration.
//!
//! Defines quorum overrides, phase timeouts, and retry limits for the
//! three-phase agreement protocol.

use std::time::Duration;

/// Configuration for the agreement engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Override for the maximum tolerated faulty replicas. When `None`,
    /// derived as `(n - 1) / 3` from the replica count at engine
    /// construction time.
    pub f_override: Option<usize>,

    /// Per-phase deadline for collecting PREPARE/COMMIT votes.
    /// Default: 5s.
    pub timeout: Duration,

    /// Maximum number of view-rotation retries before a round fails.
    /// Default: 3.
    pub max_retries: u32,

    /// Pacing delay applied after a failed round, before bumping the view
    /// and retrying. Default: 500ms.
    pub view_change_delay: Duration,

    /// Whether to record per-phase/per-vote timing via the latency tracker.
    /// Default: false.
    pub enable_latency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            f_override: None,
            timeout: Duration::from_secs(5),
            max_retries: 3,
            view_change_delay: Duration::from_millis(500),
            enable_latency: false,
        }
    }
}

impl EngineConfig {
    /// The bounded grace window admitted after a phase deadline before the
    /// tally is closed: `min(5s, timeout)`.
    pub fn grace_window(&self) -> Duration {
        self.timeout.min(Duration::from_secs(5))
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries);
        }
        if let Some(f) = self.f_override {
            if f == 0 {
                return Err(ConfigError::InvalidFaultTolerance);
            }
        }
        Ok(())
    }
}

/// Errors in engine configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("timeout must be > 0")]
    InvalidTimeout,
    #[error("max_retries must be > 0")]
    InvalidMaxRetries,
    #[error("f_override must be > 0 when set")]
    InvalidFaultTolerance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.view_change_delay, Duration::from_millis(500));
        assert!(!config.enable_latency);
    }

    #[test]
    fn test_grace_window_caps_at_five_seconds() {
        let mut config = EngineConfig::default();
        config.timeout = Duration::from_secs(30);
        assert_eq!(config.grace_window(), Duration::from_secs(5));

        config.timeout = Duration::from_secs(2);
        assert_eq!(config.grace_window(), Duration::from_secs(2));
    }

    #[test]
    fn test_valid_config() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout() {
        let mut config = EngineConfig::default();
        config.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_invalid_max_retries() {
        let mut config = EngineConfig::default();
        config.max_retries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxRetries)
        ));
    }

    #[test]
    fn test_invalid_fault_tolerance_override() {
        let mut config = EngineConfig::default();
        config.f_override = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFaultTolerance)
        ));
    }
}
