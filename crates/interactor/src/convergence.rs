//! Convergence: an immutable queue plus poll options, run on demand.
//!
//! Every builder method returns a new `Convergence`; nothing executes until
//! the value is awaited (or [`Convergence::run`] is called). Running the same
//! value twice replays the whole queue from the start.
//!
//! ```ignore
//! let stats = Convergence::new()
//!     .timeout(Duration::from_millis(500))
//!     .when(|| ready_flag.load(Ordering::SeqCst).then_some(()).ok_or_else(|| InteractorError::assertion("not ready")))
//!     .perform(|| { submit(); Ok(()) })
//!     .await?;
//! ```

use crate::config::{PollConfig, PollOverrides};
use crate::queue::{Delay, Queue, Step, StepBody, StepKind};
use crate::result::{InteractorError, InteractorResult};
use crate::when::poll_async;
use futures::future::{ready, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

/// Per-step entry of [`ConvergeStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step kind
    pub kind: StepKind,
    /// Step label
    pub label: String,
    /// Predicate invocations (1 for actions, delay count for waits)
    pub attempts: usize,
    /// Time spent in the step
    pub elapsed: Duration,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergeStats {
    /// Identifier attached to every log line of the run
    pub run_id: Uuid,
    /// Wall time of the whole run
    pub elapsed: Duration,
    /// One report per step, in execution order
    pub steps: Vec<StepReport>,
    /// Value produced by the last action or assertion step
    pub value: Value,
}

impl ConvergeStats {
    /// Total predicate invocations across assertion steps
    #[must_use]
    pub fn assertion_attempts(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Assertion)
            .map(|s| s.attempts)
            .sum()
    }
}

pub(crate) fn to_value<R: Serialize>(value: R) -> InteractorResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| InteractorError::action(format!("step produced an unserializable value: {e}")))
}

pub(crate) fn lift<F, R>(f: F) -> impl Fn() -> BoxFuture<'static, InteractorResult<Value>> + Send + Sync + 'static
where
    F: Fn() -> InteractorResult<R> + Send + Sync + 'static,
    R: Serialize + 'static,
{
    move || ready(f().and_then(to_value)).boxed()
}

pub(crate) fn lift_async<F, Fut, R>(
    f: F,
) -> impl Fn() -> BoxFuture<'static, InteractorResult<Value>> + Send + Sync + 'static
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InteractorResult<R>> + Send + 'static,
    R: Serialize + 'static,
{
    move || {
        let fut = f();
        async move { fut.await.and_then(to_value) }.boxed()
    }
}

/// Immutable, replayable queue of steps with poll options
#[derive(Clone, Default)]
pub struct Convergence {
    queue: Queue,
    defaults: PollConfig,
    type_overrides: PollOverrides,
    overrides: PollOverrides,
}

impl Convergence {
    /// Empty convergence with global defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the global defaults layer
    #[must_use]
    pub fn with_defaults(mut self, defaults: PollConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Type-level overrides stamped onto steps pushed from now on
    #[must_use]
    pub fn with_type_overrides(mut self, overrides: PollOverrides) -> Self {
        self.type_overrides = overrides;
        self
    }

    /// Queued steps
    #[must_use]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Global defaults layer
    #[must_use]
    pub const fn defaults(&self) -> PollConfig {
        self.defaults
    }

    /// Instance overrides layer
    #[must_use]
    pub const fn overrides(&self) -> PollOverrides {
        self.overrides
    }

    /// Type overrides stamped onto new steps
    #[must_use]
    pub const fn type_overrides(&self) -> PollOverrides {
        self.type_overrides
    }

    /// Poll options a plain assertion pushed now would run with
    #[must_use]
    pub fn effective(&self) -> PollConfig {
        self.defaults
            .merged(&self.overrides.over(&self.type_overrides))
    }

    /// Override the timeout for every assertion in the queue
    #[must_use]
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.with_overrides(PollOverrides::none().with_timeout(timeout))
    }

    /// Override the poll interval
    #[must_use]
    pub fn interval(&self, interval: Duration) -> Self {
        self.with_overrides(PollOverrides::none().with_interval(interval))
    }

    /// Override the stability window
    #[must_use]
    pub fn remains(&self, remains: Duration) -> Self {
        self.with_overrides(PollOverrides::none().with_remains(remains))
    }

    fn with_overrides(&self, overrides: PollOverrides) -> Self {
        let mut next = self.clone();
        next.overrides = overrides.over(&self.overrides);
        next
    }

    pub(crate) fn replace_queue(&self, queue: Queue) -> Self {
        let mut next = self.clone();
        next.queue = queue;
        next
    }

    /// Append a step
    #[must_use]
    pub fn push(&self, step: Step) -> Self {
        self.replace_queue(
            self.queue
                .push(step.with_type_overrides(self.type_overrides)),
        )
    }

    /// Run `other`'s steps after this one's. Options stay those of `self`.
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        self.replace_queue(self.queue.append(&other.queue))
    }

    /// Poll `predicate` until it returns `Ok`
    #[must_use]
    pub fn when<F, R>(&self, predicate: F) -> Self
    where
        F: Fn() -> InteractorResult<R> + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        self.push(Step::assertion("when", lift(predicate)))
    }

    /// Poll an asynchronous predicate
    #[must_use]
    pub fn when_async<F, Fut, R>(&self, predicate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InteractorResult<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.push(Step::assertion("when", lift_async(predicate)))
    }

    /// Require `predicate` to keep passing for `duration`, or for the
    /// effective timeout when `None`
    #[must_use]
    pub fn always<F, R>(&self, predicate: F, duration: Option<Duration>) -> Self
    where
        F: Fn() -> InteractorResult<R> + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        let mut step = Step::assertion("always", lift(predicate)).always();
        if let Some(duration) = duration {
            step = step.pinned(
                PollOverrides::none()
                    .with_timeout(duration)
                    .with_remains(duration),
            );
        }
        self.push(step)
    }

    /// Run `action` once
    #[must_use]
    pub fn perform<F, R>(&self, action: F) -> Self
    where
        F: Fn() -> InteractorResult<R> + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        self.push(Step::action("perform", lift(action)))
    }

    /// Run an asynchronous action once
    #[must_use]
    pub fn perform_async<F, Fut, R>(&self, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InteractorResult<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.push(Step::action("perform", lift_async(action)))
    }

    /// Await the delays produced by `delays`, which is called on every run
    #[must_use]
    pub fn wait<F, I>(&self, delays: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Delay>,
        I::IntoIter: Send + 'static,
    {
        self.push(Step::wait("wait", delays))
    }

    /// Sleep for `duration`
    #[must_use]
    pub fn pause(&self, duration: Duration) -> Self {
        self.push(Step::wait("pause", move || [Delay::Sleep(duration)]))
    }

    /// Execute the queue
    pub async fn run(&self) -> InteractorResult<ConvergeStats> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::debug!(%run_id, steps = self.queue.len(), "convergence started");

        let mut reports = Vec::with_capacity(self.queue.len());
        let mut value = Value::Null;

        for (index, step) in self.queue.iter().enumerate() {
            let step_started = Instant::now();
            let (produced, attempts) = match self.run_step(step).await {
                Ok(result) => result,
                Err(err) => {
                    tracing::debug!(
                        %run_id,
                        index,
                        kind = %step.kind(),
                        label = step.label(),
                        error = %err,
                        "convergence rejected"
                    );
                    return Err(err);
                }
            };
            if let Some(produced) = produced {
                value = produced;
            }
            let report = StepReport {
                kind: step.kind(),
                label: step.label().to_string(),
                attempts,
                elapsed: step_started.elapsed(),
            };
            tracing::trace!(%run_id, index, kind = %report.kind, label = %report.label, attempts, "step settled");
            reports.push(report);
        }

        let elapsed = started.elapsed();
        tracing::debug!(%run_id, elapsed_ms = elapsed.as_millis() as u64, "convergence resolved");
        Ok(ConvergeStats {
            run_id,
            elapsed,
            steps: reports,
            value,
        })
    }

    async fn run_step(&self, step: &Step) -> InteractorResult<(Option<Value>, usize)> {
        match (step.kind(), step.body()) {
            (StepKind::Action, StepBody::Run(run)) => Ok((Some(run().await?), 1)),
            (_, StepBody::Run(run)) => {
                let config = step.poll_config(self.defaults, &self.overrides);
                let outcome = poll_async(|| run(), config).await?;
                Ok((Some(outcome.value), outcome.attempts))
            }
            (_, StepBody::Wait(delays)) => {
                let mut count = 0;
                for delay in delays() {
                    count += 1;
                    match delay {
                        Delay::Sleep(duration) => sleep(duration).await,
                        Delay::Until(future) => future.await,
                    }
                }
                Ok((None, count))
            }
        }
    }
}

impl fmt::Debug for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convergence")
            .field("queue", &self.queue)
            .field("effective", &self.effective())
            .finish()
    }
}

impl IntoFuture for Convergence {
    type Output = InteractorResult<ConvergeStats>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.run().await }.boxed()
    }
}

impl<'a> IntoFuture for &'a Convergence {
    type Output = InteractorResult<ConvergeStats>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    mod execution {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_steps_run_in_order() {
            let log = Arc::new(Mutex::new(Vec::new()));
            let (a, b, c) = (log.clone(), log.clone(), log.clone());
            let stats = Convergence::new()
                .perform(move || {
                    a.lock().unwrap().push("first");
                    Ok(())
                })
                .when(move || {
                    b.lock().unwrap().push("second");
                    Ok(2)
                })
                .perform(move || {
                    c.lock().unwrap().push("third");
                    Ok("done")
                })
                .await
                .unwrap();

            assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
            assert_eq!(stats.value, Value::from("done"));
            assert_eq!(stats.steps.len(), 3);
            assert_eq!(stats.steps[1].kind, StepKind::Assertion);
        }

        #[tokio::test(start_paused = true)]
        async fn test_assertion_retries_until_pass() {
            let calls = counter();
            let seen = calls.clone();
            let stats = Convergence::new()
                .interval(Duration::from_millis(5))
                .when(move || {
                    let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    if n >= 4 {
                        Ok(n)
                    } else {
                        Err(InteractorError::assertion(format!("only {n}")))
                    }
                })
                .await
                .unwrap();

            assert_eq!(stats.value, Value::from(4));
            assert_eq!(stats.assertion_attempts(), 4);
            assert!(stats.elapsed >= Duration::from_millis(15));
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_rejects_with_last_failure_and_halts() {
            let after = counter();
            let after_seen = after.clone();
            let calls = counter();
            let seen = calls.clone();
            let started = Instant::now();
            let err = Convergence::new()
                .timeout(Duration::from_millis(30))
                .when(move || -> InteractorResult<()> {
                    let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(InteractorError::assertion(format!("attempt {n}")))
                })
                .perform(move || {
                    after_seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap_err();

            assert!(started.elapsed() >= Duration::from_millis(30));
            assert_eq!(err.message(), format!("attempt {}", calls.load(Ordering::SeqCst)));
            assert_eq!(after.load(Ordering::SeqCst), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_action_error_is_not_retried() {
            let calls = counter();
            let seen = calls.clone();
            let err = Convergence::new()
                .perform(move || -> InteractorResult<()> {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(InteractorError::action("boom"))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, InteractorError::ActionFailed { .. }));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_async_steps() {
            let stats = Convergence::new()
                .perform_async(|| async {
                    sleep(Duration::from_millis(10)).await;
                    Ok(())
                })
                .when_async(|| async { Ok(true) })
                .await
                .unwrap();
            assert_eq!(stats.value, Value::Bool(true));
            assert!(stats.elapsed >= Duration::from_millis(10));
        }
    }

    mod waits {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_wait_consumes_delays_in_order() {
            let stats = Convergence::new()
                .perform(|| Ok(1))
                .wait(|| {
                    vec![
                        Delay::Sleep(Duration::from_millis(10)),
                        Delay::Until(sleep(Duration::from_millis(5)).boxed()),
                    ]
                })
                .await
                .unwrap();
            assert!(stats.elapsed >= Duration::from_millis(15));
            assert_eq!(stats.steps[1].attempts, 2);
            assert_eq!(stats.value, Value::from(1));
        }

        #[tokio::test(start_paused = true)]
        async fn test_pause_replays() {
            let convergence = Convergence::new().pause(Duration::from_millis(20));
            let first = (&convergence).await.unwrap();
            let second = (&convergence).await.unwrap();
            assert!(first.elapsed >= Duration::from_millis(20));
            assert!(second.elapsed >= Duration::from_millis(20));
            assert_ne!(first.run_id, second.run_id);
        }
    }

    mod options {
        use super::*;

        #[test]
        fn test_instance_overrides_beat_type_layer() {
            let convergence = Convergence::new()
                .with_type_overrides(
                    PollOverrides::none()
                        .with_timeout(Duration::from_millis(500))
                        .with_interval(Duration::from_millis(1)),
                )
                .timeout(Duration::from_millis(50));
            let effective = convergence.effective();
            assert_eq!(effective.timeout, Some(Duration::from_millis(50)));
            assert_eq!(effective.interval, Duration::from_millis(1));
        }

        #[test]
        fn test_with_defaults() {
            let convergence = Convergence::new().with_defaults(PollConfig::fast());
            assert_eq!(convergence.effective(), PollConfig::fast());
        }

        #[tokio::test(start_paused = true)]
        async fn test_always_fails_fast_inside_window() {
            let calls = counter();
            let seen = calls.clone();
            let started = Instant::now();
            let err = Convergence::new()
                .always(
                    move || {
                        if seen.fetch_add(1, Ordering::SeqCst) < 3 {
                            Ok(())
                        } else {
                            Err(InteractorError::assertion("changed"))
                        }
                    },
                    Some(Duration::from_millis(500)),
                )
                .interval(Duration::from_millis(10))
                .await
                .unwrap_err();
            assert_eq!(err.message(), "changed");
            assert_eq!(calls.load(Ordering::SeqCst), 4);
            assert!(started.elapsed() >= Duration::from_millis(30));
            assert!(started.elapsed() < Duration::from_millis(40));
        }

        #[tokio::test(start_paused = true)]
        async fn test_always_uses_instance_timeout() {
            let stats = Convergence::new()
                .timeout(Duration::from_millis(40))
                .always(|| Ok(()), None)
                .await
                .unwrap();
            assert!(stats.elapsed >= Duration::from_millis(40));
            assert!(stats.steps[0].attempts > 1);
        }
    }

    mod composition {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_branches_from_shared_base() {
            let shared = counter();
            let left = counter();
            let right = counter();
            let (s, l, r) = (shared.clone(), left.clone(), right.clone());
            let base = Convergence::new().perform(move || {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            let left_chain = base.perform(move || {
                l.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            let right_chain = base.perform(move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

            left_chain.clone().await.unwrap();
            right_chain.await.unwrap();
            left_chain.await.unwrap();

            assert_eq!(shared.load(Ordering::SeqCst), 3);
            assert_eq!(left.load(Ordering::SeqCst), 2);
            assert_eq!(right.load(Ordering::SeqCst), 1);
            assert_eq!(base.queue().len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_append_runs_both() {
            let first = Convergence::new().perform(|| Ok(1));
            let second = Convergence::new().perform(|| Ok(2));
            let stats = first.append(&second).await.unwrap();
            assert_eq!(stats.steps.len(), 2);
            assert_eq!(stats.value, Value::from(2));
        }
    }
}
