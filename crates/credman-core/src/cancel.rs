//! Cooperative cancellation
//!
//! A single [`CancellationSource`] is created at process start and tripped
//! by Ctrl-C. Clones of its [`CancellationToken`] are threaded through every
//! long-running operation; each suspension point races its I/O against
//! [`CancellationToken::cancelled`].

use tokio::sync::watch;

/// The write side. Dropping the source does not cancel outstanding tokens.
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

/// The read side, cheap to clone.
#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationSource {
    pub fn new() -> (Self, CancellationToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationToken { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    /// A token that can never be cancelled. Useful in tests.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Source dropped without cancelling; wait forever.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (source, token) = CancellationSource::new();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });

        source.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_token_does_not_fire() {
        let token = CancellationToken::never();
        let raced = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(raced.is_err());
    }
}
