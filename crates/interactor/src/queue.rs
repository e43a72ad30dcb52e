//! Immutable step queue.
//!
//! A [`Queue`] is an ordered, append-only list of [`Step`]s. Pushing returns a
//! new queue and leaves the receiver untouched, so a base chain can be shared
//! by any number of branches. Nothing runs at push time.

use crate::config::{PollConfig, PollOverrides, DEFAULT_TIMEOUT_MS};
use crate::result::InteractorResult;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Boxed body of an action or assertion step
pub type StepFn = Arc<dyn Fn() -> BoxFuture<'static, InteractorResult<Value>> + Send + Sync>;

/// Restartable factory producing the delays of a wait step
pub type WaitFactory = Arc<dyn Fn() -> Box<dyn Iterator<Item = Delay> + Send> + Send + Sync>;

/// What the executor does with a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Invoked exactly once; an error halts execution
    Action,
    /// Polled until it passes or the poll times out
    Assertion,
    /// Sequence of delays awaited in order
    Wait,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Assertion => write!(f, "assertion"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

/// One delay produced by a wait step
pub enum Delay {
    /// Sleep for a fixed duration
    Sleep(Duration),
    /// Wait for a future to complete
    Until(BoxFuture<'static, ()>),
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleep(duration) => f.debug_tuple("Sleep").field(duration).finish(),
            Self::Until(_) => f.write_str("Until(..)"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum StepBody {
    Run(StepFn),
    Wait(WaitFactory),
}

/// A unit of deferred work
#[derive(Clone)]
pub struct Step {
    kind: StepKind,
    label: String,
    body: StepBody,
    type_overrides: PollOverrides,
    pinned: PollOverrides,
    always: bool,
}

impl Step {
    /// Action step, run once
    pub fn action<F>(label: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, InteractorResult<Value>> + Send + Sync + 'static,
    {
        Self::with_body(StepKind::Action, label, StepBody::Run(Arc::new(run)))
    }

    /// Assertion step, polled
    pub fn assertion<F>(label: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, InteractorResult<Value>> + Send + Sync + 'static,
    {
        Self::with_body(StepKind::Assertion, label, StepBody::Run(Arc::new(run)))
    }

    /// Wait step. `delays` is called afresh on every run, so the sequence
    /// restarts each time the queue is replayed.
    pub fn wait<F, I>(label: impl Into<String>, delays: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Delay>,
        I::IntoIter: Send + 'static,
    {
        let factory: WaitFactory = Arc::new(move || Box::new(delays().into_iter()));
        Self::with_body(StepKind::Wait, label, StepBody::Wait(factory))
    }

    fn with_body(kind: StepKind, label: impl Into<String>, body: StepBody) -> Self {
        Self {
            kind,
            label: label.into(),
            body,
            type_overrides: PollOverrides::none(),
            pinned: PollOverrides::none(),
            always: false,
        }
    }

    /// Pin poll options on this step; they beat every other layer
    #[must_use]
    pub fn pinned(mut self, overrides: PollOverrides) -> Self {
        self.pinned = overrides.over(&self.pinned);
        self
    }

    /// Require the assertion to keep passing for the whole timeout
    #[must_use]
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }

    pub(crate) fn with_type_overrides(mut self, overrides: PollOverrides) -> Self {
        self.type_overrides = overrides;
        self
    }

    /// Step kind
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        self.kind
    }

    /// Human readable label used in logs and stats
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether this is an `always` assertion
    #[must_use]
    pub const fn is_always(&self) -> bool {
        self.always
    }

    pub(crate) fn body(&self) -> &StepBody {
        &self.body
    }

    /// Effective poll options for this step given the global defaults and the
    /// running instance's overrides
    #[must_use]
    pub fn poll_config(&self, defaults: PollConfig, instance: &PollOverrides) -> PollConfig {
        let mut config = defaults
            .merged(&instance.over(&self.type_overrides))
            .merged(&self.pinned);
        if self.always {
            if self.pinned.remains.is_none() {
                let window = config
                    .timeout
                    .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));
                config.remains = window;
                config.timeout = Some(window);
            }
            config.fail_fast = true;
        }
        config
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("always", &self.always)
            .finish()
    }
}

/// Immutable ordered list of steps
#[derive(Clone, Default)]
pub struct Queue {
    steps: Arc<[Step]>,
}

impl Queue {
    /// Empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New queue with `step` appended
    #[must_use]
    pub fn push(&self, step: Step) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend_from_slice(&self.steps);
        steps.push(step);
        Self {
            steps: steps.into(),
        }
    }

    /// New queue running `self` then `other`
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let steps: Vec<Step> = self.steps.iter().chain(other.steps.iter()).cloned().collect();
        Self {
            steps: steps.into(),
        }
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the queue has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order
    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Labels in execution order
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(Step::label).collect()
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a Queue {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
