// Line Sink Port
// Consumer of structured messages decoded by the Line Reader

use crate::domain::OutputLine;

/// Receives decoded lines, in the order the child wrote them
pub trait LineSink: Send {
    fn deliver(&mut self, line: &OutputLine);
}

impl<F> LineSink for F
where
    F: FnMut(&OutputLine) + Send,
{
    fn deliver(&mut self, line: &OutputLine) {
        self(line)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Collects every delivered line; clones share the same buffer
    #[derive(Clone, Default)]
    pub struct CollectingSink {
        lines: Arc<Mutex<Vec<OutputLine>>>,
    }

    impl CollectingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<OutputLine> {
            self.lines.lock().unwrap().clone()
        }

        pub fn payloads(&self) -> Vec<serde_json::Value> {
            self.lines()
                .into_iter()
                .filter_map(|line| line.payload)
                .collect()
        }
    }

    impl LineSink for CollectingSink {
        fn deliver(&mut self, line: &OutputLine) {
            self.lines.lock().unwrap().push(line.clone());
        }
    }
}
