// Managed Process Port
// Abstraction over a live child process owned by the supervisor

use crate::domain::ProcessState;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Lifecycle operations on a spawned child
///
/// Implementations:
/// - ChildProcess (infra-system): tokio child + nix signals
/// - mocks::RecordingProcess: scripted, records every call
#[async_trait]
pub trait ManagedProcess: Send {
    /// OS process id, `None` once the child has been reaped
    fn pid(&self) -> Option<u32>;

    /// Current liveness, polled without blocking
    fn state(&mut self) -> ProcessState;

    /// Write raw bytes to stdin and flush
    ///
    /// # Errors
    /// - SupervisorError::Write if stdin is closed or the child has exited
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Request graceful shutdown without blocking
    ///
    /// A no-op on a child that already exited.
    fn terminate(&mut self) -> Result<()>;

    /// Wait for exit, bounded by `timeout`
    ///
    /// # Errors
    /// - SupervisorError::TimeoutExceeded if the child is still running
    async fn wait(&mut self, timeout: Duration) -> Result<ProcessState>;

    /// Force termination. Idempotent: a no-op on an exited child.
    async fn kill(&mut self) -> Result<()>;

    /// Close stdin, cancel readers and drop the stdout handle
    async fn release_streams(&mut self);

    fn is_released(&self) -> bool;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::SupervisorError;
    use std::sync::{Arc, Mutex};

    /// Calls observed by RecordingProcess, in order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProcessCall {
        Send(Vec<u8>),
        Terminate,
        Wait,
        Kill,
        Release,
    }

    /// How the scripted child reacts to SIGTERM
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TermBehavior {
        /// Exits as soon as it is asked to
        Cooperative,
        /// Ignores graceful termination, only kill ends it
        Stubborn,
    }

    /// Scripted child for exercising supervision logic without an OS process
    pub struct RecordingProcess {
        calls: Arc<Mutex<Vec<ProcessCall>>>,
        behavior: TermBehavior,
        state: ProcessState,
        terminated: bool,
        released: bool,
        fail_writes: bool,
    }

    impl RecordingProcess {
        pub fn new(behavior: TermBehavior) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                behavior,
                state: ProcessState::Running,
                terminated: false,
                released: false,
                fail_writes: false,
            }
        }

        pub fn cooperative() -> Self {
            Self::new(TermBehavior::Cooperative)
        }

        pub fn stubborn() -> Self {
            Self::new(TermBehavior::Stubborn)
        }

        /// Every `send` fails as if stdin were a broken pipe
        pub fn with_broken_stdin(mut self) -> Self {
            self.fail_writes = true;
            self
        }

        /// Child that is already gone before teardown starts
        pub fn already_exited(mut self, code: i32) -> Self {
            self.state = ProcessState::Exited(Some(code));
            self
        }

        /// Shared view of the call log (survives the process being moved)
        pub fn call_log(&self) -> Arc<Mutex<Vec<ProcessCall>>> {
            self.calls.clone()
        }

        pub fn calls(&self) -> Vec<ProcessCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: ProcessCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ManagedProcess for RecordingProcess {
        fn pid(&self) -> Option<u32> {
            self.state.is_running().then_some(4242)
        }

        fn state(&mut self) -> ProcessState {
            self.state
        }

        async fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.record(ProcessCall::Send(bytes.to_vec()));
            if self.fail_writes || self.released || !self.state.is_running() {
                return Err(SupervisorError::Write("Broken pipe".to_string()));
            }
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            self.record(ProcessCall::Terminate);
            self.terminated = true;
            Ok(())
        }

        async fn wait(&mut self, timeout: Duration) -> Result<ProcessState> {
            self.record(ProcessCall::Wait);
            if self.state.is_running()
                && self.terminated
                && self.behavior == TermBehavior::Cooperative
            {
                self.state = ProcessState::Exited(None);
            }
            if self.state.is_running() {
                return Err(SupervisorError::TimeoutExceeded(timeout));
            }
            Ok(self.state)
        }

        async fn kill(&mut self) -> Result<()> {
            self.record(ProcessCall::Kill);
            if self.state.is_running() {
                self.state = ProcessState::Killed;
            }
            Ok(())
        }

        async fn release_streams(&mut self) {
            self.record(ProcessCall::Release);
            self.released = true;
        }

        fn is_released(&self) -> bool {
            self.released
        }
    }
}
