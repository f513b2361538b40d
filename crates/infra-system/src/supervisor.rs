// Process Supervisor: spawns a child with three piped streams and owns it
// until teardown.
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pipewarden_core::application::supervision::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use pipewarden_core::application::{
    shutdown_channel, supervise, BoxFuture, ShutdownSender, ShutdownToken, Supervised,
};
use pipewarden_core::domain::{ProcessSpec, ProcessState};
use pipewarden_core::port::ManagedProcess;
use pipewarden_core::{Result, SupervisorError};

use crate::output::ChildOutput;
use crate::stderr::spawn_stderr_drain;

/// Child stdout, shared between the supervisor and one reader
///
/// Only the supervisor closes the pipe, at release. Clones that outlive the
/// release see end-of-stream.
pub type SharedOutput = Arc<Mutex<ChildOutput>>;

/// Upper bound on waiting for the stderr drain after cancellation
const STDERR_DRAIN_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on waiting for a cancelled reader to give stdout back
const READER_RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Starts children and runs scoped sessions against them
pub struct ProcessSupervisor {
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(GRACEFUL_SHUTDOWN_TIMEOUT)
    }
}

impl ProcessSupervisor {
    /// # Arguments
    /// * `grace` - How long teardown waits after SIGTERM before SIGKILL
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Launch `spec` with stdin, stdout and stderr piped
    ///
    /// Must be called from within a tokio runtime (stderr is drained by a
    /// background task).
    ///
    /// # Errors
    /// - SupervisorError::Spawn if the executable is missing or the OS
    ///   refuses to create the process
    pub fn start(&self, spec: &ProcessSpec) -> Result<ChildProcess> {
        let executable = shellexpand::tilde(&spec.executable).into_owned();

        let mut cmd = Command::new(&executable);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            executable: executable.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        info!(
            pid = ?pid,
            command = %spec.display_command(),
            "Child process started"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or(SupervisorError::StreamUnavailable("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SupervisorError::StreamUnavailable("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SupervisorError::StreamUnavailable("stderr"))?;

        let (shutdown, token) = shutdown_channel();
        let stderr_task = spawn_stderr_drain(stderr, pid, token);

        Ok(ChildProcess {
            child,
            executable,
            args: spec.args.clone(),
            stdin: Some(stdin),
            stdout: Some(Arc::new(Mutex::new(ChildOutput::new(stdout)))),
            stderr_task: Some(stderr_task),
            shutdown,
            state: ProcessState::Running,
            released: false,
        })
    }

    /// Run `body` against `child`, then tear it down exactly once
    pub async fn scoped<T, F>(&self, child: ChildProcess, body: F) -> Supervised<T>
    where
        F: for<'a> FnOnce(&'a mut ChildProcess) -> BoxFuture<'a, T>,
    {
        supervise(child, self.grace, body).await
    }
}

/// A running child, exclusively owned by the supervisor
pub struct ChildProcess {
    child: Child,
    executable: String,
    args: Vec<String>,
    stdin: Option<ChildStdin>,
    stdout: Option<SharedOutput>,
    stderr_task: Option<JoinHandle<usize>>,
    shutdown: ShutdownSender,
    state: ProcessState,
    released: bool,
}

impl ChildProcess {
    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Borrow the stdout handle for a reader, with its cancellation token
    ///
    /// # Errors
    /// - SupervisorError::StreamUnavailable once streams were released
    pub fn output(&self) -> Result<(SharedOutput, ShutdownToken)> {
        let stdout = self
            .stdout
            .as_ref()
            .ok_or(SupervisorError::StreamUnavailable("stdout"))?;
        Ok((stdout.clone(), self.shutdown.token()))
    }

    /// Poll for exit without blocking
    fn refresh_state(&mut self) -> ProcessState {
        if self.state.is_running() {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(code = ?status.code(), "Child exit observed");
                    self.state = ProcessState::Exited(status.code());
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to poll child status"),
            }
        }
        self.state
    }

    #[cfg(unix)]
    fn send_sigterm(&self, pid: u32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        info!(pid = %pid, "Sending SIGTERM for graceful shutdown");
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            // Exited between the status poll and the signal
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(SupervisorError::Signal(format!("SIGTERM failed: {}", e))),
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&mut self, pid: u32) -> Result<()> {
        // No cooperative signal available, fall back to an immediate kill
        info!(pid = %pid, "Requesting process termination");
        self.child
            .start_kill()
            .map_err(|e| SupervisorError::Signal(e.to_string()))
    }
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn state(&mut self) -> ProcessState {
        self.refresh_state()
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.refresh_state().is_running() {
            return Err(SupervisorError::Write(format!(
                "child has exited ({})",
                self.state
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SupervisorError::Write("stdin is closed".to_string()))?;

        stdin
            .write_all(bytes)
            .await
            .map_err(|e| SupervisorError::Write(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SupervisorError::Write(e.to_string()))?;

        debug!(bytes = bytes.len(), "Wrote to child stdin");
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        if !self.refresh_state().is_running() {
            debug!("Terminate skipped, child already exited");
            return Ok(());
        }
        match self.child.id() {
            Some(pid) => self.send_sigterm(pid),
            None => Ok(()),
        }
    }

    async fn wait(&mut self, timeout: Duration) -> Result<ProcessState> {
        if !self.refresh_state().is_running() {
            return Ok(self.state);
        }
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.state = ProcessState::Exited(status.code());
                Ok(self.state)
            }
            Ok(Err(e)) => Err(SupervisorError::Io(e)),
            Err(_) => Err(SupervisorError::TimeoutExceeded(timeout)),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        if !self.refresh_state().is_running() {
            debug!(state = %self.state, "Kill skipped, child already exited");
            return Ok(());
        }
        let pid = self.child.id();
        warn!(pid = ?pid, "Force killing child process");

        match self.child.kill().await {
            Ok(()) => {
                self.state = ProcessState::Killed;
                Ok(())
            }
            Err(e) => {
                // Lost a race with a natural exit
                if !self.refresh_state().is_running() {
                    return Ok(());
                }
                Err(SupervisorError::Signal(format!("SIGKILL failed: {}", e)))
            }
        }
    }

    async fn release_streams(&mut self) {
        if self.released {
            return;
        }
        // Dropping stdin closes it, which is EOF for the child
        self.stdin.take();
        self.shutdown.shutdown();

        // Readers hold the lock for their whole run, so getting it means
        // they have stopped; the pipe is then closed here and not by them
        if let Some(stdout) = self.stdout.take() {
            match tokio::time::timeout(READER_RELEASE_TIMEOUT, stdout.lock()).await {
                Ok(mut out) => {
                    if out.close() {
                        debug!("Child stdout closed");
                    }
                }
                Err(_) => warn!(
                    timeout_ms = %READER_RELEASE_TIMEOUT.as_millis(),
                    "Reader still holds stdout, leaving the pipe to close when it ends"
                ),
            }
        }

        if let Some(task) = self.stderr_task.take() {
            match tokio::time::timeout(STDERR_DRAIN_JOIN_TIMEOUT, task).await {
                Ok(Ok(lines)) => debug!(lines = lines, "Stderr drain finished"),
                Ok(Err(e)) => warn!(error = %e, "Stderr drain task failed"),
                Err(_) => warn!("Stderr drain did not stop in time"),
            }
        }
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.released && self.state.is_running() {
            // kill_on_drop(true) delivers the actual SIGKILL
            warn!(
                pid = ?self.child.id(),
                executable = %self.executable,
                "Child dropped without teardown, killing"
            );
        }
    }
}
