//! Cancellable, deadline-bounded polling of asynchronous remote operations
//!
//! Activations and deletions run remotely; the caller waits by reading their
//! status until a terminal state appears. Every wait and every remote call
//! made through a [`Deadline`] races the overall deadline and the caller's
//! [`CancellationToken`], so a loop never outlives its budget.
//!
//! Interval selection: a server-provided `retryAfter` in the future is
//! honoured exactly, anything else falls back to the configured default.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Default wait between activation status reads (30 seconds)
pub const DEFAULT_ACTIVATION_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default wait between deletion status reads (10 seconds)
pub const DEFAULT_DELETION_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Delay before the first deletion status read (1 second)
pub const DEFAULT_DELETION_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default budget for create, update and delete operations (1 hour)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3600);

/// Largest budget a [`Deadline`] honours (30 days); longer budgets are clamped
pub const MAX_OPERATION_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 3600);

/// Interval configuration for a poll loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait used when the server provides no usable `retryAfter`
    pub default_interval: Duration,
    /// Wait before the first status read (`None` reads immediately)
    pub initial_delay: Option<Duration>,
}

impl PollConfig {
    /// Intervals for activation and deactivation polling
    pub fn activation() -> Self {
        Self {
            default_interval: DEFAULT_ACTIVATION_POLL_INTERVAL,
            initial_delay: None,
        }
    }

    /// Intervals for deletion polling
    pub fn deletion() -> Self {
        Self {
            default_interval: DEFAULT_DELETION_POLL_INTERVAL,
            initial_delay: Some(DEFAULT_DELETION_INITIAL_DELAY),
        }
    }

    /// Fixed intervals, mostly useful in tests
    pub fn fixed(default_interval: Duration) -> Self {
        Self {
            default_interval,
            initial_delay: None,
        }
    }
}

/// Result of a single status read
#[derive(Debug)]
pub enum PollStep<T> {
    /// The operation reached its terminal success state
    Done(T),
    /// Still running; poll again after `retry_after` or the default interval
    Pending {
        /// Server-provided earliest time for the next read
        retry_after: Option<DateTime<Utc>>,
    },
}

/// Choose the wait before the next status read.
pub fn next_interval(
    retry_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    default_interval: Duration,
) -> Duration {
    match retry_after {
        Some(at) if at > now => (at - now).to_std().unwrap_or(default_interval),
        _ => default_interval,
    }
}

/// Overall time budget for one logical operation
///
/// Both expiry and cancellation surface as [`Error::Timeout`]; the remote
/// operation is left running either way.
#[derive(Clone, Debug)]
pub struct Deadline {
    operation: String,
    started: Instant,
    expires: Instant,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Deadline {
    /// Start a budget of `timeout` for `operation`, cancellable through `cancel`
    ///
    /// Budgets above [`MAX_OPERATION_TIMEOUT`] are clamped to it.
    pub fn new(operation: impl Into<String>, timeout: Duration, cancel: CancellationToken) -> Self {
        let operation = operation.into();
        let timeout = if timeout > MAX_OPERATION_TIMEOUT {
            warn!(
                operation = %operation,
                requested = ?timeout,
                max = ?MAX_OPERATION_TIMEOUT,
                "Operation timeout clamped to maximum"
            );
            MAX_OPERATION_TIMEOUT
        } else {
            timeout
        };
        let started = Instant::now();
        Self {
            operation,
            started,
            expires: started + timeout,
            timeout,
            cancel,
        }
    }

    /// Name of the operation this budget bounds
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Time spent since the budget started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Same budget and token, relabelled for a sub-operation
    pub fn for_operation(&self, operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..self.clone()
        }
    }

    fn expired_error(&self) -> Error {
        Error::timeout(
            self.operation.clone(),
            self.elapsed(),
            format!("deadline of {:?} exceeded", self.timeout),
        )
    }

    fn cancelled_error(&self) -> Error {
        Error::timeout(self.operation.clone(), self.elapsed(), "cancelled by caller")
    }

    /// Run a remote call, abandoning it if the budget runs out first
    pub async fn guard<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            _ = tokio::time::sleep_until(self.expires) => Err(self.expired_error()),
            result = fut => result,
        }
    }

    /// Sleep for `delay`, waking early with an error on expiry or cancellation
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            _ = tokio::time::sleep_until(self.expires) => Err(self.expired_error()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Poll until `poll_fn` reports [`PollStep::Done`].
///
/// Errors returned by `poll_fn` are terminal and returned unchanged; the loop
/// never retries a failed read.
pub async fn poll_until_done<T, F, Fut>(
    deadline: &Deadline,
    config: &PollConfig,
    mut poll_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        if let Some(d) = delay {
            deadline.sleep(d).await?;
        }
        attempt += 1;

        match deadline.guard(poll_fn()).await? {
            PollStep::Done(value) => return Ok(value),
            PollStep::Pending { retry_after } => {
                let next = next_interval(retry_after, Utc::now(), config.default_interval);
                debug!(
                    operation = %deadline.operation(),
                    attempt = attempt,
                    next_poll_ms = next.as_millis() as u64,
                    "Operation still in progress"
                );
                delay = Some(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn future_retry_after_is_honoured() {
        let now = Utc::now();
        let at = now + chrono::Duration::seconds(5);
        assert_eq!(
            next_interval(Some(at), now, Duration::from_secs(30)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn missing_or_elapsed_retry_after_uses_default() {
        let now = Utc::now();
        let default = Duration::from_secs(30);
        assert_eq!(next_interval(None, now, default), default);
        assert_eq!(
            next_interval(Some(now - chrono::Duration::seconds(5)), now, default),
            default
        );
        assert_eq!(next_interval(Some(now), now, default), default);
    }

    #[tokio::test]
    async fn completes_after_pending_reads() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let deadline = Deadline::new("test", Duration::from_secs(5), CancellationToken::new());

        let result = poll_until_done(
            &deadline,
            &PollConfig::fixed(Duration::from_millis(1)),
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Ok(PollStep::Pending { retry_after: None })
                    } else {
                        Ok(PollStep::Done(42))
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_errors_are_terminal() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let deadline = Deadline::new("test", Duration::from_secs(5), CancellationToken::new());

        let result: Result<()> = poll_until_done(
            &deadline,
            &PollConfig::fixed(Duration::from_millis(1)),
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Transport("connection reset".to_string()))
                }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_at_deadline_within_one_interval() {
        let timeout = Duration::from_millis(50);
        let interval = Duration::from_millis(20);
        let deadline = Deadline::new("activation 1", timeout, CancellationToken::new());
        let started = std::time::Instant::now();

        let result: Result<()> = poll_until_done(&deadline, &PollConfig::fixed(interval), || async {
            Ok(PollStep::Pending { retry_after: None })
        })
        .await;

        match result {
            Err(Error::Timeout { operation, .. }) => assert_eq!(operation, "activation 1"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() < timeout + interval + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn long_retry_after_is_cut_short_by_deadline() {
        let deadline = Deadline::new("deletion", Duration::from_millis(30), CancellationToken::new());
        let started = std::time::Instant::now();

        let result: Result<()> = poll_until_done(
            &deadline,
            &PollConfig::fixed(Duration::from_secs(60)),
            || async {
                Ok(PollStep::Pending {
                    retry_after: Some(Utc::now() + chrono::Duration::hours(1)),
                })
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let cancel = CancellationToken::new();
        let deadline = Deadline::new("activation 9", Duration::from_secs(3600), cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result: Result<()> = poll_until_done(
            &deadline,
            &PollConfig::fixed(Duration::from_secs(3600)),
            || async { Ok(PollStep::Pending { retry_after: None }) },
        )
        .await;

        match result {
            Err(Error::Timeout { message, .. }) => assert!(message.contains("cancelled")),
            other => panic!("expected cancellation timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_remote_call_is_abandoned_at_deadline() {
        let deadline = Deadline::new("get status", Duration::from_millis(20), CancellationToken::new());
        let result: Result<()> = deadline
            .guard(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn oversized_budget_is_clamped_instead_of_overflowing() {
        let deadline = Deadline::new("activation 1", Duration::MAX, CancellationToken::new());
        assert_eq!(deadline.timeout, MAX_OPERATION_TIMEOUT);

        let result = deadline.guard(async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn initial_delay_precedes_first_read() {
        let deadline = Deadline::new("deletion", Duration::from_secs(5), CancellationToken::new());
        let config = PollConfig {
            default_interval: Duration::from_millis(1),
            initial_delay: Some(Duration::from_millis(30)),
        };
        let started = std::time::Instant::now();

        let result = poll_until_done(&deadline, &config, || async { Ok(PollStep::Done(())) }).await;

        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
