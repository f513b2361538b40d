// Port Layer - Interfaces for external dependencies

pub mod line_sink;
pub mod managed_process;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use line_sink::LineSink;
pub use managed_process::ManagedProcess;
pub use time_provider::TimeProvider;
