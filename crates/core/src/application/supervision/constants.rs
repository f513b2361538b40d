// Supervision constants (No magic values)
use std::time::Duration;

/// Bounded wait after SIGTERM before escalating to SIGKILL (5s)
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the probe waits for the child to answer one request (10s)
/// Safety net only: the reader's progress signal normally fires first
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// MCP protocol revision announced in the default handshake
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced in the default handshake
pub const CLIENT_NAME: &str = "pipewarden";

/// Log target for lines the child writes to stderr
pub const CHILD_STDERR_TARGET: &str = "pipewarden::child_stderr";
