// Line Reader outcomes

use serde::{Deserialize, Serialize};

/// Result of a single read attempt on the child's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line (or the unterminated tail before EOF)
    Line(String),
    EndOfStream,
    ReadError(String),
}

/// Why the reader stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEnd {
    EndOfStream,
    ReadError(String),
    /// Single-shot policy satisfied
    Captured,
    /// Supervisor released the streams
    Cancelled,
}

/// How many structured messages the reader hands to its sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// Stop after the first decoded message
    #[default]
    SingleShot,
    /// Deliver every decoded message until the stream ends
    Continuous,
}

/// Final accounting of one reader run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSummary {
    pub lines_read: usize,
    pub delivered: usize,
    pub discarded: usize,
    pub end: ReaderEnd,
}

impl ReadSummary {
    pub fn new() -> Self {
        Self {
            lines_read: 0,
            delivered: 0,
            discarded: 0,
            end: ReaderEnd::EndOfStream,
        }
    }

    pub fn captured_any(&self) -> bool {
        self.delivered > 0
    }
}

impl Default for ReadSummary {
    fn default() -> Self {
        Self::new()
    }
}
