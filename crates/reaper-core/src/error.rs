use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaperError {
    /// The OS refused to start the worker thread.
    #[error("failed to spawn reaper worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// A handle's release operation failed.
    #[error("release failed: {0}")]
    Release(String),

    #[error("invalid reaper config: {0}")]
    InvalidConfig(String),
}

impl ReaperError {
    /// Shorthand for `Release` implementors.
    pub fn release(message: impl Into<String>) -> Self {
        Self::Release(message.into())
    }
}
