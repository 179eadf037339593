//! Background repeating operations checked from the main flow.
//!
//! A [`ConcurrentChecker`] runs its operation over and over on its own task.
//! Failures are never logged-and-dropped: the first one since the previous
//! [`ConcurrentChecker::check`] sits in a single shared slot until the main
//! flow, or the owner of a [`PendingFailure`] handle, collects it. Later
//! failures in the same window are counted but not kept. The loop itself
//! never stops on error, and a panicking operation counts as a failed
//! iteration.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::Error;
use crate::Result;

struct Failure {
    iteration: u64,
    error: Error,
}

/// Shared single slot holding the first uncollected failure of a checker.
#[derive(Clone, Default)]
pub struct PendingFailure {
    slot: Arc<Mutex<Option<Failure>>>,
}

impl PendingFailure {
    /// Offers a failure; `false` when an earlier one is still uncollected.
    fn offer(
        &self,
        failure: Failure,
    ) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(failure);
        true
    }

    /// Takes the uncollected failure, if any, as a [`Error::ConcurrentCheck`].
    pub fn take(&self) -> Option<Error> {
        self.slot.lock().take().map(|Failure { iteration, error }| Error::ConcurrentCheck {
            iteration,
            source: Box::new(error),
        })
    }
}

impl std::fmt::Debug for PendingFailure {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PendingFailure")
            .field("pending", &self.slot.lock().is_some())
            .finish()
    }
}

/// Totals of a stopped checker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub iterations: u64,
    pub failures: u64,
}

pub struct ConcurrentChecker {
    name: String,
    token: CancellationToken,
    pending: PendingFailure,
    handle: Option<JoinHandle<CheckSummary>>,
}

impl std::fmt::Debug for ConcurrentChecker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConcurrentChecker")
            .field("name", &self.name)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl ConcurrentChecker {
    /// Starts `operation` in a tight loop on a new task and returns immediately.
    ///
    /// `operation` is called once per iteration, so each call can draw fresh
    /// arguments.
    pub fn start<F, Fut>(
        name: impl Into<String>,
        operation: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::start_with(name, operation, Duration::ZERO, CancellationToken::new())
    }

    /// Like [`Self::start`], pausing between iterations and stopping when
    /// `token` is cancelled.
    pub fn start_with<F, Fut>(
        name: impl Into<String>,
        operation: F,
        pause: Duration,
        token: CancellationToken,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::launch(name.into(), operation, pause, token, None)
    }

    /// Like [`Self::start_with`], with the loop spawned on `tracker` so its
    /// owner can wait for it.
    pub fn start_tracked<F, Fut>(
        name: impl Into<String>,
        operation: F,
        pause: Duration,
        token: CancellationToken,
        tracker: &TaskTracker,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::launch(name.into(), operation, pause, token, Some(tracker))
    }

    fn launch<F, Fut>(
        name: String,
        mut operation: F,
        pause: Duration,
        token: CancellationToken,
        tracker: Option<&TaskTracker>,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let pending = PendingFailure::default();
        let loop_pending = pending.clone();
        let loop_token = token.clone();
        let loop_name = name.clone();

        let task = async move {
            let mut summary = CheckSummary::default();
            debug!(checker = %loop_name, ?pause, "checker started");

            loop {
                let outcome = select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    outcome = AssertUnwindSafe(async { operation().await }).catch_unwind() => outcome,
                };
                let outcome = outcome.unwrap_or_else(|payload| {
                    Err(Error::Fatal(format!("operation panicked: {}", panic_message(payload.as_ref()))))
                });
                summary.iterations += 1;

                if let Err(error) = outcome {
                    summary.failures += 1;
                    let iteration = summary.iterations;
                    if loop_pending.offer(Failure { iteration, error }) {
                        debug!(checker = %loop_name, iteration, "failure captured");
                    } else {
                        trace!(checker = %loop_name, iteration, "failure slot occupied, counting only");
                    }
                }

                if pause.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    select! {
                        _ = loop_token.cancelled() => break,
                        _ = sleep(pause) => {}
                    }
                }
            }

            debug!(checker = %loop_name, ?summary, "checker stopped");
            summary
        };

        let handle = match tracker {
            Some(tracker) => tracker.spawn(task),
            None => tokio::spawn(task),
        };

        Self {
            name,
            token,
            pending,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle on this checker's uncollected failure, valid after the checker
    /// is dropped.
    pub fn pending(&self) -> PendingFailure {
        self.pending.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    #[cfg(test)]
    pub(crate) fn abort_for_test(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// Surfaces the first failure since the previous check, if any.
    pub fn check(&mut self) -> Result<()> {
        if let Some(error) = self.pending.take() {
            warn!(checker = %self.name, "concurrent operation failed: {:?}", error);
            return Err(error);
        }
        let dead = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if dead && !self.token.is_cancelled() {
            warn!(checker = %self.name, "checker loop ended without being stopped");
            return Err(Error::Fatal(format!("checker {} is no longer running", self.name)));
        }
        Ok(())
    }

    /// Cancels the loop, waits for it, then runs a last [`Self::check`].
    pub async fn stop(mut self) -> Result<CheckSummary> {
        self.token.cancel();
        let summary = match self.handle.take() {
            Some(handle) => handle.await?,
            None => CheckSummary::default(),
        };
        info!(checker = %self.name, iterations = summary.iterations, failures = summary.failures, "checker finished");
        self.check()?;
        Ok(summary)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Drop for ConcurrentChecker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
