//! Poll-until-timeout retry engine.
//!
//! Any step that asserts on eventually-consistent UI state runs through
//! here. Fixed-interval polling keeps assertion latency predictable: a
//! retried action never blocks longer than `timeout + poll_interval`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::errors::{EngineError, Result};

/// `poll_interval > 0`, `timeout >= 0`; enforced by [`RetryPolicy::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(timeout: Duration, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "retry poll_interval must be > 0".into(),
            ));
        }
        Ok(Self {
            timeout,
            poll_interval,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Cooperative run-teardown signal, observed at poll and step boundaries.
/// Cloneable; every worker and retry loop holds a receiver.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// A paired teardown source and token.
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

impl CancelSource {
    pub fn cancel(&self) {
        // Receivers may have gone away already; nothing to do then.
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A token that never fires, for standalone engine use.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        // Keeping the sender alive is not needed: a closed channel retains
        // its last value (false) and `changed()` resolving is handled below.
        Self { rx }
    }

    /// Resolves once cancellation is signalled; pends forever otherwise.
    async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Source dropped without cancelling; never resolve.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Execute `action` until it succeeds, fails non-recoverably, exhausts
/// `policy.timeout`, or the run is cancelled.
///
/// The first attempt runs immediately (zero sleeps on instant success).
/// On a recoverable failure the engine sleeps `poll_interval` and retries;
/// once elapsed time exceeds `timeout` the *last* attempt's error is
/// surfaced inside [`EngineError::Timeout`]. Cancellation is observed at
/// each poll boundary and aborts without completing the remaining sleep.
pub async fn retry<T, F, Fut>(mut action: F, policy: RetryPolicy, cancel: &CancelToken) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() => {
                if started.elapsed() >= policy.timeout {
                    return Err(EngineError::Timeout {
                        timeout: policy.timeout,
                        last: e.to_string(),
                    });
                }
                sleep_or_cancel(policy.poll_interval, cancel).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sleep one poll interval, aborting early on cancellation.
pub(crate) async fn sleep_or_cancel(interval: Duration, cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(EngineError::SchedulerAbort);
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => Ok(()),
        _ = cancel.cancelled() => Err(EngineError::SchedulerAbort),
    }
}
