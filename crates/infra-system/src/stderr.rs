// Child stderr drain
//
// A child that writes diagnostics to a pipe nobody reads eventually blocks
// once the pipe buffer fills, so stderr is always drained into tracing.
use pipewarden_core::application::supervision::constants::CHILD_STDERR_TARGET;
use pipewarden_core::application::ShutdownToken;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::line_reader::MAX_LINE_BYTES;

/// Spawn a task logging each stderr line; resolves to the number of lines
pub(crate) fn spawn_stderr_drain(
    stderr: ChildStderr,
    pid: Option<u32>,
    mut token: ShutdownToken,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut lines = 0usize;

        loop {
            if token.is_shutdown() {
                break;
            }
            buf.clear();
            let mut bounded = (&mut reader).take(MAX_LINE_BYTES as u64);
            tokio::select! {
                biased;
                read = bounded.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break,
                    Ok(_) => {
                        lines += 1;
                        let text = String::from_utf8_lossy(&buf);
                        debug!(target: CHILD_STDERR_TARGET, pid = ?pid, "{}", text.trim_end());
                    }
                    Err(e) => {
                        debug!(pid = ?pid, error = %e, "Stderr read failed");
                        break;
                    }
                },
                _ = token.wait() => break,
            }
        }

        lines
    })
}
