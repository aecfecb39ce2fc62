//! Bounded retry and polling.
//!
//! Provider calls that fail transiently are retried with exponential backoff;
//! waits for a resource to reach a target state are expressed as
//! [`poll_until`]. Both stop early when their [`CancellationToken`] fires, and
//! both are bounded by an attempt count so a run never waits indefinitely.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Cooperative cancellation shared between the CLI signal handler and waits.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel every wait observing this token or its clones.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns whether [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any token clone, so `changed` only fails
        // after every clone is gone; nothing can cancel at that point.
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `delay`, returning `false` if cancelled first.
    pub async fn sleep(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.cancelled() => false,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles each time.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(MAX_BACKOFF)
    }
}

/// Result of [`retry`].
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded.
    Succeeded(T),
    /// A non-transient error stopped retrying immediately.
    Fatal(E),
    /// Every attempt failed transiently.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The last transient error.
        last: E,
    },
    /// The token fired while backing off.
    Cancelled,
}

/// Run `operation` until it succeeds, fails fatally, or the policy is spent.
///
/// `is_transient` decides which errors are worth another attempt.
pub async fn retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_transient: C,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(error) if !is_transient(&error) => return RetryOutcome::Fatal(error),
            Err(error) => error,
        };

        if attempt >= policy.max_attempts {
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last: error,
            };
        }

        let delay = policy.delay_after(attempt);
        warn!(attempt, max_attempts = policy.max_attempts, ?delay, %error, "transient failure, retrying");
        if !cancel.sleep(delay).await {
            return RetryOutcome::Cancelled;
        }
        attempt += 1;
    }
}

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay between checks.
    pub interval: Duration,
    /// Maximum number of checks.
    pub max_attempts: u32,
}

impl PollSchedule {
    /// Create a schedule; `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Upper bound on the time spent sleeping between checks.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Result of [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check reported the target condition.
    Reached(T),
    /// Every check ran without reaching the target; the operation may still
    /// be in progress.
    TimedOut {
        /// Checks made.
        attempts: u32,
    },
    /// The token fired between checks.
    Cancelled,
}

/// Run `check` until it yields `Some`, the schedule is spent, or the token fires.
///
/// # Errors
///
/// Returns the first error produced by `check`; polling does not retry errors.
pub async fn poll_until<T, E, F, Fut>(
    schedule: &PollSchedule,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 1..=schedule.max_attempts {
        if let Some(value) = check(attempt).await? {
            return Ok(PollOutcome::Reached(value));
        }
        if attempt < schedule.max_attempts && !cancel.sleep(schedule.interval).await {
            return Ok(PollOutcome::Cancelled);
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: schedule.max_attempts,
    })
}
