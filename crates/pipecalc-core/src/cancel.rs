//! Cooperative cancellation for the calculator session.
//!
//! A [`CancellationToken`] moves once from live to cancelled and never back.
//! [`with_cancellation`] races a single suspending operation against the
//! token and reports [`CancelledError`] if the token wins.

use std::future::Future;

/// A cancellation token shared between the hosting process and the loop it
/// wants to stop.
///
/// Cloning is cheap; every clone observes the same state. Backed by
/// [`tokio_util::sync::CancellationToken`], without its parent/child tree.
///
/// # Example
///
/// ```
/// use pipecalc_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// token_clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    /// Create a new, live cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every pending waiter.
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::PipeCalcError {
    fn from(_: CancelledError) -> Self {
        crate::error::PipeCalcError::Cancelled
    }
}

/// Race `operation` against `token`.
///
/// The token is polled first, so an operation is never started once
/// cancellation has been requested. When the token wins, the operation is
/// dropped without being awaited further; any bytes it had already consumed
/// are lost with it, so the caller must close the channel instead of reading
/// the rest of the frame.
pub async fn with_cancellation<F>(
    operation: F,
    token: &CancellationToken,
) -> Result<F::Output, CancelledError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CancelledError),
        output = operation => Ok(output),
    }
}
