//! Bounded waits.
//!
//! Convergence in the cluster (streaming, index builds, gossip) is awaited with
//! explicit poll loops that fail with [`Error::Timeout`] instead of hanging.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::Error;
use crate::PollPolicy;
use crate::Result;

/// Polls `attempt` until it yields a value.
///
/// `Ok(None)` means "not yet"; an `Err` from the attempt aborts the wait and is
/// returned as-is.
pub async fn poll_until<F, Fut, T>(
    what: &str,
    policy: PollPolicy,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let result = timeout(policy.timeout(), async {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if let Some(value) = attempt().await? {
                debug!(what, attempts, elapsed = ?started.elapsed(), "condition reached");
                return Ok(value);
            }
            trace!(what, attempts, "condition not reached, retrying...");
            sleep(policy.interval()).await;
        }
    })
    .await;

    match result {
        Ok(r) => r,
        Err(_) => Err(Error::Timeout {
            what: what.to_string(),
            elapsed: started.elapsed(),
        }),
    }
}

/// Polls `attempt` until it returns `true`.
pub async fn wait_until<F, Fut>(
    what: &str,
    policy: PollPolicy,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_until(what, policy, || {
        let fut = attempt();
        async move { Ok(fut.await?.then_some(())) }
    })
    .await
}

/// Named fixed delay, for convergence the database gives no signal for.
pub async fn settle(
    what: &str,
    duration: Duration,
) {
    if duration.is_zero() {
        return;
    }
    debug!(what, ?duration, "settling");
    sleep(duration).await;
}
