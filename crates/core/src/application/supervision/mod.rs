// Supervision - scoped ownership of a child process

pub mod constants;
mod shutdown;
mod teardown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use teardown::{teardown, TeardownReport, TeardownStep};

pub use futures::future::BoxFuture;

use crate::port::ManagedProcess;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::error;

/// Output of a supervised scope
#[derive(Debug)]
pub struct Supervised<T> {
    pub value: T,
    pub teardown: TeardownReport,
}

/// Run `body` against the child, then tear the child down exactly once
///
/// Teardown runs whatever `body` returns, including `Err` values. If `body`
/// panics the child is still torn down before the panic resumes.
///
/// # Example
/// ```text
/// let outcome = supervise(child, GRACEFUL_SHUTDOWN_TIMEOUT, |child| {
///     Box::pin(async move { child.send(b"{}\n").await })
/// })
/// .await;
/// ```
pub async fn supervise<P, T, F>(mut process: P, grace: Duration, body: F) -> Supervised<T>
where
    P: ManagedProcess,
    F: for<'a> FnOnce(&'a mut P) -> BoxFuture<'a, T>,
{
    let outcome = AssertUnwindSafe(body(&mut process)).catch_unwind().await;

    let report = teardown(&mut process, grace).await;

    match outcome {
        Ok(value) => Supervised {
            value,
            teardown: report,
        },
        Err(panic) => {
            error!(
                panic_msg = %panic_message(panic.as_ref()),
                "Supervised scope panicked, child was torn down"
            );
            std::panic::resume_unwind(panic)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
