// Reader Cancellation Token

use tokio::sync::watch;

/// Cancellation signal handed to background readers
///
/// Resolves when the supervisor releases the child's streams, or when the
/// supervisor itself is dropped.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        if self.is_shutdown() {
            return;
        }
        // Err means the sender is gone, which also ends the scope
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender, owned by the supervisor
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        // Stored even with no live tokens, so later subscribers see it
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_resolves_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("token should resolve");
        assert!(token.is_shutdown());
    }

    #[test]
    fn test_wait_stays_pending_until_shutdown() {
        let (tx, mut token) = shutdown_channel();
        let mut wait = tokio_test::task::spawn(token.wait());

        tokio_test::assert_pending!(wait.poll());
        tx.shutdown();
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_token_resolves_when_sender_dropped() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("dropped sender should release waiters");
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let (tx, token) = shutdown_channel();
        drop(token);
        tx.shutdown();

        let mut late = tx.token();
        assert!(late.is_shutdown());
        late.wait().await;
    }
}
