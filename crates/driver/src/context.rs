//! Cancellation and deadline context for driver calls.
//!
//! Every driver method receives a [`Context`]. Drivers may inspect it to stop
//! early, but callers never rely on that: [`Context::run`] races the driver
//! future against the cancellation token and the deadline, so a call can
//! never wait past either of them.

use crate::error::{ErrorKind, Result};
use std::future::{Future, pending};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Caller-supplied cancellation token and deadline.
///
/// The default context never expires and cannot be cancelled.
///
/// # Examples
///
/// ```
/// use docket_driver::Context;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let ctx = Context::background()
///     .with_timeout(Duration::from_secs(5))
///     .with_cancellation(token.clone());
/// assert!(ctx.deadline().is_some());
/// assert!(!ctx.is_cancelled());
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}
impl Context {
    /// A context with no deadline and no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    /// Expire the context after `timeout`, measured from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Expire the context at `deadline`. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Abort the call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Drive `operation` to completion unless the context is cancelled or
    /// its deadline passes first.
    ///
    /// Returns [`Cancelled`](ErrorKind::Cancelled) or
    /// [`DeadlineExceeded`](ErrorKind::DeadlineExceeded) when the wait is
    /// aborted; the operation future is dropped at that point.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            // Cancellation is checked first so an already-cancelled token
            // never lets the operation start.
            biased;
            () = cancelled => {
                tracing::debug!("Driver call cancelled");
                Err(exn::Exn::from(ErrorKind::Cancelled))
            },
            () = expired => {
                tracing::debug!(deadline = ?self.deadline, "Driver call passed its deadline");
                Err(exn::Exn::from(ErrorKind::DeadlineExceeded))
            },
            result = operation => result,
        }
    }
}
