//! Per-request cancellation and timeouts
//!
//! Every operation on the charging hierarchy receives a [`RequestContext`].
//! The context bounds how long the call may wait for an EVSE's state lock and
//! lets the caller abandon the call. Either the state transition happens as a
//! whole or it does not happen at all.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

/// Default time an operation may wait before reporting `Timeout`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cancellation signal that can be cloned and shared across tasks
#[derive(Clone)]
pub struct CancelToken {
    sender: broadcast::Sender<()>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.sender.send(());
        }
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        // Subscribe before checking the flag so a concurrent cancel is not missed.
        let mut receiver = self.sender.subscribe();
        if self.is_cancelled() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Why a request gave up before it could run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Timeout,
    Canceled,
}

/// Timeout and cancellation handed to every operation
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub timeout: Duration,
    pub cancel: CancelToken,
}

impl RequestContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `fut` unless the request is cancelled or times out first.
    ///
    /// Cancellation wins over a ready future, so an already-cancelled request
    /// never performs its work.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Canceled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Canceled),
            value = fut => Ok(value),
            _ = tokio::time::sleep(self.timeout) => Err(Interrupted::Timeout),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_returns_value_when_ready() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.guard(async { 42 }).await, Ok(42));
    }

    #[tokio::test]
    async fn guard_reports_cancellation_before_running() {
        let ctx = RequestContext::default();
        ctx.cancel.cancel();
        assert_eq!(ctx.guard(async { 1 }).await, Err(Interrupted::Canceled));
    }

    #[tokio::test]
    async fn guard_times_out_on_pending_future() {
        let ctx = RequestContext::new(Duration::from_millis(20));
        let result = ctx.guard(std::future::pending::<()>()).await;
        assert_eq!(result, Err(Interrupted::Timeout));
    }

    #[tokio::test]
    async fn cancel_wakes_waiting_request() {
        let ctx = RequestContext::new(Duration::from_secs(10));
        let token = ctx.cancel.clone();
        let waiter = tokio::spawn(async move { ctx.guard(std::future::pending::<()>()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("Timeout")
            .expect("Join");
        assert_eq!(result, Err(Interrupted::Canceled));
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
