//! ReaperBuilder - Reaper の構築
//!
//! 起動時に設定を検証する（Fail-fast）。不正な設定では worker を起動しない。

use std::sync::Arc;
use std::time::Duration;

use super::Reaper;
use crate::clock::{Clock, SystemClock};
use crate::config::ReaperConfig;
use crate::error::ReaperError;

/// # 使用例
/// ```ignore
/// let reaper = Reaper::builder()
///     .idle_interval(Duration::from_millis(100))
///     .thread_name("spotify-reaper")
///     .spawn()?;
/// ```
pub struct ReaperBuilder {
    config: ReaperConfig,
    clock: Arc<dyn Clock>,
}

impl ReaperBuilder {
    pub fn new() -> Self {
        Self {
            config: ReaperConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Start from a whole config (e.g. one loaded from JSON).
    pub fn config(mut self, config: ReaperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_idle_interval(interval);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Clock used to timestamp worker failures.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate the config and start the worker.
    pub fn spawn(self) -> Result<Reaper, ReaperError> {
        self.config.validate()?;
        Reaper::start(self.config, self.clock)
    }
}

impl Default for ReaperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
