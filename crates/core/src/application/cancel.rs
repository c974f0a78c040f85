// Cancellation Token - one-shot stop signal shared between a caller and a task

use std::sync::Arc;
use tokio::sync::watch;

/// Receiving side, handed to runners and loops
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Sender dropped: `cancelled()` pends forever, `is_cancelled()` stays false
        drop(tx);
        Self { rx }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// If every `CancelHandle` is dropped without cancelling, this never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Sending side, kept by whoever may cancel
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation (idempotent)
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another token linked to this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a linked handle/token pair
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, mut token) = cancel_channel();
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            token.is_cancelled()
        });

        handle.cancel();
        let observed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(observed);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (handle, mut token) = cancel_channel();
        drop(handle);

        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err(), "dropping the handle must not look like a cancel");
        assert!(!token.is_cancelled());

        let mut never = CancelToken::never();
        assert!(tokio::time::timeout(Duration::from_millis(20), never.cancelled())
            .await
            .is_err());
    }

    #[test]
    fn test_token_pending_until_cancel() {
        let (handle, mut token) = cancel_channel();
        let mut linked = handle.token();
        {
            let mut wait = tokio_test::task::spawn(token.cancelled());
            tokio_test::assert_pending!(wait.poll());
            handle.cancel();
            assert!(wait.is_woken());
            tokio_test::assert_ready!(wait.poll());
        }
        let mut wait = tokio_test::task::spawn(linked.cancelled());
        tokio_test::assert_ready!(wait.poll());
    }
}
