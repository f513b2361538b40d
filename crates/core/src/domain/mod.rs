// Domain Layer - Pure data types for supervised processes and their traffic

pub mod error;
pub mod message;
pub mod output;
pub mod process;

// Re-exports
pub use error::MessageError;
pub use message::{MessageKind, OutputLine, RequestId, RequestMessage, JSONRPC_VERSION};
pub use output::{CapturePolicy, ReadOutcome, ReadSummary, ReaderEnd};
pub use process::{ProcessSpec, ProcessState};
