//! # Deadlines
//!
//! Purpose: Bound checkout, dial, and every transport read/write with a
//! caller-supplied deadline that travels with the request.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ClientError;

/// An optional point in time after which an operation fails with
/// [`ClientError::DeadlineExceeded`].
///
/// `Deadline::NONE` never fires. The same deadline bounds the whole
/// logical operation: each read of a multi-message partial stream is
/// checked against it, so a deadline elapsing mid-stream aborts the
/// remaining partials.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; operations may block indefinitely.
    pub const NONE: Deadline = Deadline(None);

    /// A deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline(Some(Instant::now() + timeout))
    }

    /// The underlying instant, if any.
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Runs a future, failing with `DeadlineExceeded` if the deadline
    /// fires first.
    pub(crate) async fn bound<F: Future>(&self, fut: F) -> Result<F::Output, ClientError> {
        match self.0 {
            None => Ok(fut.await),
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| ClientError::DeadlineExceeded),
        }
    }

    /// Resolves when the deadline fires; pends forever for `NONE`.
    /// Select-arm companion to [`Deadline::bound`].
    pub(crate) async fn expired(&self) {
        match self.0 {
            None => std::future::pending().await,
            Some(at) => tokio::time::sleep_until(at).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn none_never_times_out() {
        let result = Deadline::NONE.bound(async { 7 }).await.unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_fails_pending_work() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let err = deadline
            .bound(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn quick_work_beats_the_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let result = deadline.bound(async { "done" }).await.unwrap();
        assert_eq!(result, "done");
    }
}
