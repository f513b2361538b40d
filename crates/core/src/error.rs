// Central Error Type for process supervision

use std::time::Duration;
use thiserror::Error;

/// Errors raised while supervising a child process
///
/// Propagation policy:
/// - `Spawn` and `Write` are surfaced to the caller
/// - `TimeoutExceeded` is handled by teardown (forced kill), never fatal
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn '{executable}': {reason}")]
    Spawn { executable: String, reason: String },

    #[error("Write to child stdin failed: {0}")]
    Write(String),

    #[error("Child did not exit within {}ms", .0.as_millis())]
    TimeoutExceeded(Duration),

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream unavailable: {0}")]
    StreamUnavailable(&'static str),

    #[error("Message error: {0}")]
    Message(#[from] crate::domain::MessageError),
}

impl SupervisorError {
    /// True for errors that only mean "the child is slow", not broken
    pub fn is_timeout(&self) -> bool {
        matches!(self, SupervisorError::TimeoutExceeded(_))
    }
}

/// Result type alias using SupervisorError
pub type Result<T> = std::result::Result<T, SupervisorError>;
