// src/deadline.rs

//! Deadline and cancellation monitoring.
//!
//! A [`DeadlineContext`] is attached to every session when it opens. It holds
//! an optional expiry and a cancellation token. The first termination reason
//! wins and is never overwritten: explicit cancellation, expiry observed by
//! the [`DeadlineMonitor`], or a channel failure reported by the session.
//!
//! Handlers only ever see the read side, [`Deadline`]. Every suspension point
//! in the crate selects on [`Deadline::done`], so termination unblocks pending
//! receives, sends, and sleeps without polling a clock.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, Status};

struct Inner {
    expiry: Option<Instant>,
    token: CancellationToken,
    reason: OnceLock<Status>,
}

impl Inner {
    /// Record `status` as the termination reason unless one is already set,
    /// then fire the token. Returns true if this call set the reason.
    fn terminate(&self, status: Status) -> bool {
        let first = self.reason.set(status).is_ok();
        self.token.cancel();
        first
    }

    fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| Instant::now() >= expiry)
    }
}

/// Write side of a session's deadline context.
///
/// Held by whoever may terminate the session: the caller, the monitor, and
/// the session's own channel pumps.
#[derive(Clone)]
pub struct DeadlineContext {
    inner: Arc<Inner>,
}

impl DeadlineContext {
    /// Context expiring `timeout` from now, or never.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_expiry(timeout.map(|t| Instant::now() + t))
    }

    pub fn with_expiry(expiry: Option<Instant>) -> Self {
        DeadlineContext {
            inner: Arc::new(Inner {
                expiry,
                token: CancellationToken::new(),
                reason: OnceLock::new(),
            }),
        }
    }

    /// Context with no expiry; only explicit cancellation ends it.
    pub fn unbounded() -> Self {
        Self::with_expiry(None)
    }

    /// Cancel the call. No-op if it already terminated.
    pub fn cancel(&self) {
        if self
            .inner
            .terminate(Status::cancelled("the caller cancelled the request"))
        {
            tracing::debug!("call cancelled");
        }
    }

    pub(crate) fn expire(&self) {
        if self
            .inner
            .terminate(Status::deadline_exceeded("deadline exceeded"))
        {
            tracing::debug!("call deadline exceeded");
        }
    }

    /// Terminate with a status the session decided on itself: a channel
    /// failure, a protocol violation by the peer, or the peer hanging up.
    pub(crate) fn abort(&self, status: Status) {
        self.inner.terminate(status);
    }

    /// Read-only view handed to handlers.
    pub fn deadline(&self) -> Deadline {
        Deadline {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn expiry(&self) -> Option<Instant> {
        self.inner.expiry
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

impl std::fmt::Debug for DeadlineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineContext")
            .field("expiry", &self.inner.expiry)
            .field("reason", &self.inner.reason.get())
            .finish()
    }
}

/// Read side of a [`DeadlineContext`].
#[derive(Clone)]
pub struct Deadline {
    inner: Arc<Inner>,
}

impl Deadline {
    pub fn expiry(&self) -> Option<Instant> {
        self.inner.expiry
    }

    /// Time left before expiry; `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .expiry
            .map(|expiry| expiry.saturating_duration_since(Instant::now()))
    }

    /// True once the call was cancelled, expired, or aborted.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled() || self.inner.is_expired()
    }

    /// The termination reason, if the call has terminated.
    pub fn status(&self) -> Option<Status> {
        self.inner.reason.get().cloned()
    }

    /// Fail with the termination reason if the call has terminated.
    ///
    /// An expiry that passed before the monitor fired is recorded here, so
    /// polling handlers see it without waiting for the monitor task.
    pub fn check(&self) -> Result<()> {
        if self.inner.is_expired() {
            self.inner
                .terminate(Status::deadline_exceeded("deadline exceeded"));
        }
        match self.inner.reason.get() {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    /// Wait until the call terminates and return the reason.
    pub async fn done(&self) -> Status {
        self.inner.token.cancelled().await;
        self.inner
            .reason
            .get()
            .cloned()
            .unwrap_or_else(|| Status::cancelled("call terminated"))
    }

    /// Sleep for `period` unless the call terminates first.
    pub async fn sleep(&self, period: Duration) -> Result<()> {
        tokio::select! {
            biased;
            status = self.done() => Err(status),
            _ = tokio::time::sleep(period) => self.check(),
        }
    }
}

impl std::fmt::Debug for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline")
            .field("expiry", &self.inner.expiry)
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish()
    }
}

/// Background task that expires a context when its deadline passes.
///
/// Aborted on drop; a session keeps its monitor alive only while it runs.
pub struct DeadlineMonitor {
    handle: Option<JoinHandle<()>>,
}

impl DeadlineMonitor {
    pub fn spawn(ctx: &DeadlineContext) -> Self {
        let Some(expiry) = ctx.expiry() else {
            return DeadlineMonitor { handle: None };
        };
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = ctx.inner.token.cancelled() => {}
                _ = tokio::time::sleep_until(expiry) => ctx.expire(),
            }
        });
        DeadlineMonitor {
            handle: Some(handle),
        }
    }
}

impl Drop for DeadlineMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[tokio::test]
    async fn unbounded_context_is_live_until_cancelled() {
        let ctx = DeadlineContext::unbounded();
        let deadline = ctx.deadline();
        assert!(deadline.check().is_ok());
        assert!(deadline.remaining().is_none());

        ctx.cancel();
        assert!(deadline.is_cancelled());
        assert_eq!(deadline.check().unwrap_err().code(), Code::Cancelled);
        assert_eq!(deadline.done().await.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn first_reason_wins() {
        let ctx = DeadlineContext::unbounded();
        ctx.expire();
        ctx.cancel();
        ctx.abort(Status::unavailable("late"));
        assert_eq!(ctx.deadline().status().unwrap().code(), Code::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_expires_context() {
        let ctx = DeadlineContext::new(Some(Duration::from_secs(2)));
        let _monitor = DeadlineMonitor::spawn(&ctx);
        let deadline = ctx.deadline();

        let started = Instant::now();
        let status = deadline.done().await;
        assert_eq!(status.code(), Code::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn check_observes_expiry_without_monitor() {
        let ctx = DeadlineContext::new(Some(Duration::from_millis(10)));
        let deadline = ctx.deadline();
        tokio::time::advance(Duration::from_millis(11)).await;

        assert_eq!(deadline.check().unwrap_err().code(), Code::DeadlineExceeded);
        assert!(ctx.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_cancellation() {
        let ctx = DeadlineContext::unbounded();
        let deadline = ctx.deadline();

        let canceller = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                ctx.cancel();
            })
        };

        let started = Instant::now();
        let err = deadline.sleep(Duration::from_secs(10)).await.unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_monitor_never_fires() {
        let ctx = DeadlineContext::new(Some(Duration::from_millis(50)));
        drop(DeadlineMonitor::spawn(&ctx));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!ctx.is_terminated());
        assert!(ctx.deadline().is_cancelled());
    }
}
