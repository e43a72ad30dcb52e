//! Poller: retry a predicate until it passes, holds, or times out.
//!
//! Predicates report failure through `Err`. On timeout the poller rejects with
//! the last failure it observed rather than a generic timeout error, so the
//! caller sees the assertion that was still failing.
//!
//! With a stability window (`remains`) the predicate must keep passing for a
//! continuous trailing window before the poll resolves. A failure inside the
//! window restarts the window; it does not restart the overall timeout.
//! In fail-fast mode (used by `always`) the first failure rejects at once.

use crate::config::PollConfig;
use std::future::{ready, Future};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Report of a successful poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<T> {
    /// Value returned by the passing predicate invocation
    pub value: T,
    /// Number of predicate invocations
    pub attempts: usize,
    /// Time from the first invocation to resolution
    pub elapsed: Duration,
}

/// Poll an asynchronous predicate.
///
/// # Errors
///
/// Returns the last failure once the timeout elapses with a failure observed
/// (either the predicate never passed, or the stability window was broken).
pub async fn poll_async<T, E, F, Fut>(
    mut predicate: F,
    config: PollConfig,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut attempts = 0;
    let mut window_start: Option<Instant> = None;
    let mut last_failure: Option<E> = None;

    loop {
        attempts += 1;

        match predicate().await {
            Ok(value) => {
                let now = Instant::now();
                let since = *window_start.get_or_insert(now);
                if now.duration_since(since) >= config.remains {
                    tracing::trace!(attempts, "poll converged");
                    return Ok(PollOutcome {
                        value,
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
            }
            Err(err) => {
                if config.fail_fast {
                    tracing::debug!(attempts, "poll rejected on first failure");
                    return Err(err);
                }
                window_start = None;
                last_failure = Some(err);
            }
        }

        if let Some(timeout) = config.timeout {
            if start.elapsed() >= timeout {
                if let Some(err) = last_failure.take() {
                    tracing::debug!(
                        attempts,
                        timeout_ms = timeout.as_millis() as u64,
                        "poll timed out"
                    );
                    return Err(err);
                }
            }
        }

        sleep(config.interval).await;
    }
}

/// Poll a synchronous predicate, reporting attempts and elapsed time.
///
/// # Errors
///
/// See [`poll_async`].
pub async fn poll<T, E, F>(mut predicate: F, config: PollConfig) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Result<T, E>,
{
    poll_async(move || ready(predicate()), config).await
}

/// Resolve with the predicate's value once it passes.
///
/// ```ignore
/// let mut count = 0;
/// when(
///     || { count += 1; if count > 9 { Ok(count) } else { Err("too low") } },
///     PollConfig::new(Duration::from_millis(80)).with_interval(Duration::from_millis(3)),
/// )
/// .await?;
/// ```
///
/// # Errors
///
/// See [`poll_async`].
pub async fn when<T, E, F>(predicate: F, config: PollConfig) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    poll(predicate, config).await.map(|outcome| outcome.value)
}

/// Asynchronous form of [`when`].
///
/// # Errors
///
/// See [`poll_async`].
pub async fn when_async<T, E, F, Fut>(predicate: F, config: PollConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    poll_async(predicate, config)
        .await
        .map(|outcome| outcome.value)
}

/// Require the predicate to hold for the whole of `duration`.
///
/// The window doubles as the timeout and any failure inside it rejects at
/// once with that failure.
///
/// # Errors
///
/// See [`poll_async`].
pub async fn always<T, E, F>(predicate: F, duration: Duration, interval: Duration) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    let config = PollConfig::default()
        .with_timeout(duration)
        .with_interval(interval)
        .with_remains(duration)
        .with_fail_fast(true);
    when(predicate, config).await
}
