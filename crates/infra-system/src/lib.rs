// pipewarden Infrastructure - System Adapters
// Implements: ManagedProcess (ChildProcess), Line Reader

pub mod line_reader;
mod output;
mod stderr;
pub mod supervisor;

pub use line_reader::{read_next, LineReader, ReaderHandle};
pub use output::ChildOutput;
pub use supervisor::{ChildProcess, ProcessSupervisor, SharedOutput};
