// Teardown sequence: terminate -> bounded wait -> kill (if needed) -> release
use crate::domain::ProcessState;
use crate::port::ManagedProcess;
use std::time::Duration;
use tracing::{error, info, warn};

/// One step of the teardown sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Terminate,
    Wait,
    Kill,
    Release,
}

/// What teardown did and how the child ended
#[derive(Debug, Clone)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
    pub final_state: ProcessState,
    /// The child outlived the graceful wait and had to be killed
    pub timed_out: bool,
    /// Step failures; none of them abort the sequence
    pub errors: Vec<String>,
    /// Streams were already released, nothing was done
    pub skipped: bool,
}

impl TeardownReport {
    pub fn was_killed(&self) -> bool {
        self.steps.contains(&TeardownStep::Kill)
    }
}

/// Run the teardown sequence against a child
///
/// Never fails: every step error is logged and recorded, and the remaining
/// steps still run. A process whose streams were already released is left
/// untouched, so the sequence runs at most once per child.
pub async fn teardown<P>(process: &mut P, grace: Duration) -> TeardownReport
where
    P: ManagedProcess + ?Sized,
{
    if process.is_released() {
        return TeardownReport {
            steps: Vec::new(),
            final_state: process.state(),
            timed_out: false,
            errors: Vec::new(),
            skipped: true,
        };
    }

    let pid = process.pid();
    let mut steps = Vec::with_capacity(4);
    let mut errors = Vec::new();
    let mut timed_out = false;

    info!(pid = ?pid, grace_ms = %grace.as_millis(), "Tearing down child process");

    steps.push(TeardownStep::Terminate);
    if let Err(e) = process.terminate() {
        warn!(pid = ?pid, error = %e, "Graceful termination request failed");
        errors.push(e.to_string());
    }

    steps.push(TeardownStep::Wait);
    let needs_kill = match process.wait(grace).await {
        Ok(state) => {
            info!(pid = ?pid, state = %state, "Child exited after termination request");
            false
        }
        Err(e) if e.is_timeout() => {
            warn!(pid = ?pid, "Child ignored termination request, sending SIGKILL");
            timed_out = true;
            true
        }
        Err(e) => {
            warn!(pid = ?pid, error = %e, "Waiting for child failed, escalating to kill");
            errors.push(e.to_string());
            true
        }
    };

    if needs_kill {
        steps.push(TeardownStep::Kill);
        if let Err(e) = process.kill().await {
            error!(pid = ?pid, error = %e, "Forced kill failed");
            errors.push(e.to_string());
        }
    }

    steps.push(TeardownStep::Release);
    process.release_streams().await;

    let final_state = process.state();
    info!(pid = ?pid, state = %final_state, "Teardown complete");

    TeardownReport {
        steps,
        final_state,
        timed_out,
        errors,
        skipped: false,
    }
}
