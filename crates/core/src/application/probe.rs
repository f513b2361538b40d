// Probe exchange: write requests to a supervised child and wait for the
// reader to report decoded output instead of sleeping.
use crate::application::supervision::constants::{
    CLIENT_NAME, DEFAULT_RESPONSE_TIMEOUT, MCP_PROTOCOL_VERSION,
};
use crate::domain::{CapturePolicy, RequestMessage};
use crate::error::Result;
use crate::port::ManagedProcess;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Probe tuning
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Upper bound on waiting for one answer
    pub response_timeout: Duration,
    /// Must match the policy the reader was started with
    pub policy: CapturePolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            policy: CapturePolicy::SingleShot,
        }
    }
}

/// What the probe observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub sent: usize,
    /// Requests followed by a decoded message within the timeout
    pub acknowledged: usize,
    /// Methods whose wait timed out or whose reader ended first
    pub unanswered: Vec<String>,
}

/// Default MCP handshake: initialize, initialized notification, tools/list
pub fn mcp_handshake() -> Vec<RequestMessage> {
    vec![
        RequestMessage::new(1, "initialize").with_params(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": crate::VERSION,
            }
        })),
        RequestMessage::notification("notifications/initialized"),
        RequestMessage::new(2, "tools/list"),
    ]
}

/// Send `requests` in order, pacing on the reader's delivered-message count
///
/// `progress` carries the number of messages the reader has delivered so
/// far. Notifications are never waited on. Under the single-shot policy only
/// the first request is waited on, since the reader stops after one message.
///
/// Ids are not correlated: any decoded message counts as an answer.
///
/// # Errors
/// - SupervisorError::Write as soon as one request cannot be written
/// - SupervisorError::Message if a request cannot be encoded
pub async fn run_probe<P>(
    process: &mut P,
    requests: &[RequestMessage],
    progress: &mut watch::Receiver<usize>,
    config: &ProbeConfig,
) -> Result<ProbeOutcome>
where
    P: ManagedProcess + ?Sized,
{
    let mut outcome = ProbeOutcome::default();
    let mut expected = 0usize;
    let mut reader_open = true;

    for request in requests {
        let line = request.to_line()?;
        info!(
            method = %request.method,
            id = ?request.id,
            bytes = line.len(),
            "Sending request"
        );
        process.send(&line).await?;
        outcome.sent += 1;

        if request.id.is_none() {
            continue;
        }
        expected += 1;

        let target = match config.policy {
            CapturePolicy::SingleShot if expected > 1 => continue,
            CapturePolicy::SingleShot => 1,
            CapturePolicy::Continuous => expected,
        };

        if !reader_open {
            outcome.unanswered.push(request.method.clone());
            continue;
        }

        let waited =
            tokio::time::timeout(config.response_timeout, progress.wait_for(|n| *n >= target))
                .await
                .map(|r| r.is_ok());

        match waited {
            Ok(true) => {
                debug!(method = %request.method, delivered = target, "Request acknowledged");
                outcome.acknowledged += 1;
            }
            Ok(false) => {
                // Reader ended; it may still have delivered enough before closing
                reader_open = false;
                if *progress.borrow() >= target {
                    outcome.acknowledged += 1;
                } else {
                    warn!(method = %request.method, "Reader ended before an answer arrived");
                    outcome.unanswered.push(request.method.clone());
                }
            }
            Err(_) => {
                warn!(
                    method = %request.method,
                    timeout_ms = %config.response_timeout.as_millis(),
                    "No answer within timeout"
                );
                outcome.unanswered.push(request.method.clone());
            }
        }
    }

    info!(
        sent = outcome.sent,
        acknowledged = outcome.acknowledged,
        unanswered = outcome.unanswered.len(),
        "Probe finished"
    );
    Ok(outcome)
}
