// Application Layer - Use Cases

pub mod probe;
pub mod supervision;

// Re-exports
pub use probe::{mcp_handshake, run_probe, ProbeConfig, ProbeOutcome};
pub use supervision::{
    shutdown_channel, supervise, teardown, BoxFuture, ShutdownSender, ShutdownToken, Supervised,
    TeardownReport, TeardownStep,
};
