//! Reaper configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReaperError;

/// Default time the worker sleeps between passes (one second).
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Default worker thread name.
pub const DEFAULT_THREAD_NAME: &str = "reaper";

/// Configuration for a [`Reaper`](crate::Reaper).
///
/// Every field has a default, so a JSON document only needs to name what it
/// overrides:
///
/// ```ignore
/// let config: ReaperConfig = serde_json::from_str(r#"{ "idle_interval_ms": 100 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Sleep between passes, in milliseconds. Also the default join timeout
    /// of `terminate`.
    pub idle_interval_ms: u64,

    /// Whether the process-wide reaper is terminated at process exit.
    pub terminate_at_exit: bool,

    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: DEFAULT_IDLE_INTERVAL.as_millis() as u64,
            terminate_at_exit: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl ReaperConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Reject values the worker cannot run with.
    ///
    /// A zero interval would turn the idle sleep into a busy loop.
    pub fn validate(&self) -> Result<(), ReaperError> {
        if self.idle_interval_ms == 0 {
            return Err(ReaperError::InvalidConfig(
                "idle_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(ReaperError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_config_has_reasonable_values() {
        let config = ReaperConfig::default();
        assert_eq!(config.idle_interval(), Duration::from_secs(1));
        assert!(config.terminate_at_exit);
        assert_eq!(config.thread_name, "reaper");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ReaperConfig =
            serde_json::from_str(r#"{ "idle_interval_ms": 100 }"#).unwrap();
        assert_eq!(config.idle_interval(), Duration::from_millis(100));
        assert!(config.terminate_at_exit);
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
    }

    #[rstest]
    #[case::zero_interval(r#"{ "idle_interval_ms": 0 }"#)]
    #[case::empty_thread_name(r#"{ "thread_name": "" }"#)]
    fn invalid_configs_are_rejected(#[case] json: &str) {
        let config: ReaperConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ReaperError::InvalidConfig(_))
        ));
    }

    #[test]
    fn with_idle_interval_overrides_millis() {
        let config = ReaperConfig::default().with_idle_interval(Duration::from_millis(250));
        assert_eq!(config.idle_interval_ms, 250);
    }
}
