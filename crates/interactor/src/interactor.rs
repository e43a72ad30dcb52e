//! Interactor: a convergence bound to a selector, a scope and a type.
//!
//! Every chaining call returns a new `Interactor`. Steps capture a queue-less
//! copy of the instance they were pushed from, so they resolve their elements
//! against the right scope whenever the chain runs.
//!
//! ```ignore
//! let form = signup_form.create(dom.clone(), "");
//! form.child("terms")
//!     .check()
//!     .parent()
//!     .assert().not().that("disabled")
//!     .timeout(Duration::from_millis(500))
//!     .await?;
//! ```

use crate::config::PollConfig;
use crate::convergence::{lift, lift_async, ConvergeStats, Convergence};
use crate::descriptor::TypeDescriptor;
use crate::dom::{Dom, DomEvent, ElementHandle, NodeId};
use crate::queue::{Delay, Queue, Step};
use crate::result::{InteractorError, InteractorResult};
use crate::selector::Selector;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

/// Unwrap a chain-build result, panicking on authoring errors
fn authored<T>(result: InteractorResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Selector-bound convergence with a capability table
#[derive(Clone)]
pub struct Interactor {
    descriptor: Arc<TypeDescriptor>,
    dom: Dom,
    selector: Selector,
    parent: Option<Arc<Interactor>>,
    convergence: Convergence,
}

impl Interactor {
    /// Interactor of the built-in base type
    pub fn new(dom: Dom, selector: impl Into<Selector>) -> Self {
        TypeDescriptor::base().create(dom, selector)
    }

    pub(crate) fn from_parts(descriptor: Arc<TypeDescriptor>, dom: Dom, selector: Selector) -> Self {
        let convergence = Convergence::new().with_type_overrides(descriptor.options().poll);
        Self {
            descriptor,
            dom,
            selector,
            parent: None,
            convergence,
        }
    }

    /// Replace the global poll defaults (for example with
    /// `Defaults::from_env()?.to_poll_config()`)
    #[must_use]
    pub fn with_defaults(&self, defaults: PollConfig) -> Self {
        self.with_convergence(self.convergence.clone().with_defaults(defaults))
    }

    /// Type of this interactor
    #[must_use]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Type name
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    /// Element access backend
    #[must_use]
    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Own selector
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Subject used in messages
    #[must_use]
    pub fn describe(&self) -> String {
        self.selector.describe()
    }

    /// Underlying convergence
    #[must_use]
    pub fn convergence(&self) -> &Convergence {
        &self.convergence
    }

    fn with_convergence(&self, convergence: Convergence) -> Self {
        let mut next = self.clone();
        next.convergence = convergence;
        next
    }

    /// Same scope and options, empty queue
    fn context(&self) -> Self {
        self.with_convergence(self.convergence.replace_queue(Queue::new()))
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    fn scope_within(&self, root: NodeId) -> InteractorResult<NodeId> {
        match &self.parent {
            Some(parent) => parent.node_within(root),
            None => Ok(root),
        }
    }

    fn node_within(&self, root: NodeId) -> InteractorResult<NodeId> {
        let scope = self.scope_within(root)?;
        self.selector.resolve(&*self.dom, scope)
    }

    pub(crate) fn nodes_within(&self, root: NodeId) -> InteractorResult<Vec<NodeId>> {
        let scope = self.scope_within(root)?;
        self.selector.resolve_all(&*self.dom, scope)
    }

    fn handle(&self, id: NodeId) -> ElementHandle {
        ElementHandle::new(id, self.dom.clone())
    }

    /// The element this interactor points at, resolved now
    pub fn element(&self) -> InteractorResult<ElementHandle> {
        let id = self.node_within(self.dom.document())?;
        Ok(self.handle(id))
    }

    /// Every element the selector matches, resolved now
    pub fn elements(&self) -> InteractorResult<Vec<ElementHandle>> {
        Ok(self
            .nodes_within(self.dom.document())?
            .into_iter()
            .map(|id| self.handle(id))
            .collect())
    }

    /// First match of `selector` inside this interactor's element
    pub fn find(&self, selector: impl Into<Selector>) -> InteractorResult<ElementHandle> {
        let root = self.element()?;
        let id = selector.into().resolve(&*self.dom, root.id())?;
        Ok(self.handle(id))
    }

    /// Every match of `selector` inside this interactor's element
    pub fn find_all(&self, selector: impl Into<Selector>) -> InteractorResult<Vec<ElementHandle>> {
        let root = self.element()?;
        Ok(selector
            .into()
            .resolve_all(&*self.dom, root.id())?
            .into_iter()
            .map(|id| self.handle(id))
            .collect())
    }

    // ------------------------------------------------------------------
    // Poll options
    // ------------------------------------------------------------------

    /// Override the timeout of every assertion in the chain
    #[must_use]
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.with_convergence(self.convergence.timeout(timeout))
    }

    /// Override the poll interval
    #[must_use]
    pub fn interval(&self, interval: Duration) -> Self {
        self.with_convergence(self.convergence.interval(interval))
    }

    /// Override the stability window
    #[must_use]
    pub fn remains(&self, remains: Duration) -> Self {
        self.with_convergence(self.convergence.remains(remains))
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    /// Append a raw step
    #[must_use]
    pub fn push(&self, step: Step) -> Self {
        self.with_convergence(self.convergence.push(step))
    }

    /// Run `other`'s queue after this one's
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        self.with_convergence(self.convergence.append(&other.convergence))
    }

    /// Run `action` once when the chain executes
    #[must_use]
    pub fn perform<F>(&self, action: F) -> Self
    where
        F: Fn(&Self) -> InteractorResult<()> + Send + Sync + 'static,
    {
        let ctx = self.context();
        self.push(Step::action(
            format!("perform on {}", self.describe()),
            lift(move || action(&ctx)),
        ))
    }

    /// Run an asynchronous action once
    #[must_use]
    pub fn perform_async<F, Fut>(&self, action: F) -> Self
    where
        F: Fn(Self) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InteractorResult<()>> + Send + 'static,
    {
        let ctx = self.context();
        self.push(Step::action(
            format!("perform on {}", self.describe()),
            lift_async(move || action(ctx.clone())),
        ))
    }

    /// Run `f` once and make its return value the chain's value
    #[must_use]
    pub fn exec<F, R>(&self, f: F) -> Self
    where
        F: Fn(&Self) -> InteractorResult<R> + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        let ctx = self.context();
        self.push(Step::action(
            format!("exec on {}", self.describe()),
            lift(move || f(&ctx)),
        ))
    }

    /// Poll `predicate` until it passes
    #[must_use]
    pub fn when<F, R>(&self, predicate: F) -> Self
    where
        F: Fn(&Self) -> InteractorResult<R> + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        let ctx = self.context();
        self.push(Step::assertion(
            format!("when {}", self.describe()),
            lift(move || predicate(&ctx)),
        ))
    }

    /// Require `predicate` to hold for `duration`, or for the effective
    /// timeout when `None`
    #[must_use]
    pub fn always<F, R>(&self, predicate: F, duration: Option<Duration>) -> Self
    where
        F: Fn(&Self) -> InteractorResult<R> + Send + Sync + 'static,
        R: Serialize + 'static,
    {
        let ctx = self.context();
        self.with_convergence(self.convergence.always(move || predicate(&ctx), duration))
    }

    /// Await the delays produced by `delays`
    #[must_use]
    pub fn wait<F, I>(&self, delays: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Delay>,
        I::IntoIter: Send + 'static,
    {
        self.with_convergence(self.convergence.wait(delays))
    }

    /// Sleep for `duration`
    #[must_use]
    pub fn pause(&self, duration: Duration) -> Self {
        self.with_convergence(self.convergence.pause(duration))
    }

    /// Wait until the element exists, then run `act` on it once
    #[must_use]
    pub fn interact<F>(&self, label: impl Into<String>, act: F) -> Self
    where
        F: Fn(&ElementHandle) -> InteractorResult<()> + Send + Sync + 'static,
    {
        let finder = self.context();
        let ctx = self.context();
        self.push(Step::assertion(
            format!("find {}", self.describe()),
            lift(move || finder.element().map(|element| element.id())),
        ))
        .push(Step::action(label, lift(move || act(&ctx.element()?))))
    }

    /// Dispatch `event` at the element once it exists
    #[must_use]
    pub fn dispatch(&self, event: DomEvent) -> Self {
        let label = format!("{} {}", event.name(), self.describe());
        self.interact(label, move |element| element.dispatch(&event))
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    /// Read property `name` now
    ///
    /// # Errors
    ///
    /// `Authoring` for an unregistered name, or whatever the getter raises.
    pub fn get(&self, name: &str) -> InteractorResult<Value> {
        self.get_with(name, &[])
    }

    /// Read property `name` with arguments
    pub fn get_with(&self, name: &str, args: &[Value]) -> InteractorResult<Value> {
        self.descriptor
            .property(name)
            .ok_or_else(|| self.descriptor.missing("property", name))?
            .get(self, args)
    }

    /// Chain the registered action `name`.
    ///
    /// # Panics
    ///
    /// When `name` is not a registered action.
    #[must_use]
    pub fn action(&self, name: &str) -> Self {
        authored(self.try_action(name, &[]))
    }

    /// Chain the registered action `name` with arguments.
    ///
    /// # Panics
    ///
    /// When `name` is not a registered action.
    #[must_use]
    pub fn action_with(&self, name: &str, args: &[Value]) -> Self {
        authored(self.try_action(name, args))
    }

    /// Fallible form of [`Interactor::action_with`]
    pub fn try_action(&self, name: &str, args: &[Value]) -> InteractorResult<Self> {
        let action = self
            .descriptor
            .action(name)
            .ok_or_else(|| self.descriptor.missing("action", name))?
            .clone();
        Ok(action.apply(self, args))
    }

    /// Nested interactor field `name`, scoped to this element.
    ///
    /// # Panics
    ///
    /// When `name` is not a registered child field.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        authored(self.try_child(name))
    }

    /// Fallible form of [`Interactor::child`]
    pub fn try_child(&self, name: &str) -> InteractorResult<Self> {
        let field = self
            .descriptor
            .child(name)
            .ok_or_else(|| self.descriptor.missing("child field", name))?;
        Ok(self.scope_as(field.descriptor(), field.selector().clone()))
    }

    /// `index`-th element of collection field `name`.
    ///
    /// # Panics
    ///
    /// When `name` is not a registered collection.
    #[must_use]
    pub fn item(&self, name: &str, index: usize) -> Self {
        authored(self.try_item(name, index))
    }

    /// Fallible form of [`Interactor::item`]
    pub fn try_item(&self, name: &str, index: usize) -> InteractorResult<Self> {
        let field = self
            .descriptor
            .child(name)
            .ok_or_else(|| self.descriptor.missing("collection", name))?;
        if !field.is_collection() {
            return Err(InteractorError::authoring(format!(
                "{}.{name} is not a collection",
                self.type_name()
            )));
        }
        Ok(self.scope_as(field.descriptor(), field.selector().clone().nth(index)))
    }

    /// Base-type interactor for `selector`, scoped to this element
    #[must_use]
    pub fn scope(&self, selector: impl Into<Selector>) -> Self {
        self.scope_as(&TypeDescriptor::base(), selector)
    }

    /// Interactor of `descriptor` for `selector`, scoped to this element. Its
    /// queue continues this one's.
    #[must_use]
    pub fn scope_as(&self, descriptor: &Arc<TypeDescriptor>, selector: impl Into<Selector>) -> Self {
        let selector = selector.into();
        let selector = match (&selector, &descriptor.options().selector) {
            (Selector::Scope, Some(default)) => default.clone(),
            _ => selector,
        };
        Self {
            descriptor: descriptor.clone(),
            dom: self.dom.clone(),
            selector,
            parent: Some(Arc::new(self.context())),
            convergence: self
                .convergence
                .clone()
                .with_type_overrides(descriptor.options().poll),
        }
    }

    /// Back to the enclosing scope, keeping the queue built so far.
    ///
    /// # Panics
    ///
    /// When this interactor has no enclosing scope.
    #[must_use]
    pub fn parent(&self) -> Self {
        authored(self.try_parent())
    }

    /// Fallible form of [`Interactor::parent`]
    pub fn try_parent(&self) -> InteractorResult<Self> {
        let parent = self.parent.as_ref().ok_or_else(|| {
            InteractorError::authoring(format!("{} has no enclosing scope", self.describe()))
        })?;
        let mut next = (**parent).clone();
        next.convergence = self
            .convergence
            .clone()
            .with_type_overrides(parent.descriptor.options().poll);
        Ok(next)
    }

    /// Assertion namespace
    #[must_use]
    pub fn assert(&self) -> Assertions<'_> {
        Assertions {
            interactor: self,
            negated: false,
            message: None,
        }
    }

    // ------------------------------------------------------------------
    // Built-in actions, dispatched through the type so overrides apply
    // ------------------------------------------------------------------

    /// `click` action
    #[must_use]
    pub fn click(&self) -> Self {
        self.action("click")
    }

    /// `focus` action
    #[must_use]
    pub fn focus(&self) -> Self {
        self.action("focus")
    }

    /// `blur` action
    #[must_use]
    pub fn blur(&self) -> Self {
        self.action("blur")
    }

    /// `keyup` action
    #[must_use]
    pub fn keyup(&self, key: &str) -> Self {
        self.action_with("keyup", &[Value::from(key)])
    }

    /// `trigger` action
    #[must_use]
    pub fn trigger(&self, event: &str) -> Self {
        self.action_with("trigger", &[Value::from(event)])
    }

    /// `fill` action
    #[must_use]
    pub fn fill(&self, value: &str) -> Self {
        self.action_with("fill", &[Value::from(value)])
    }

    /// `check` action
    #[must_use]
    pub fn check(&self) -> Self {
        self.action("check")
    }

    /// `uncheck` action
    #[must_use]
    pub fn uncheck(&self) -> Self {
        self.action("uncheck")
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute the chain
    pub async fn run(&self) -> InteractorResult<ConvergeStats> {
        tracing::debug!(
            type_name = self.type_name(),
            subject = %self.describe(),
            steps = self.convergence.queue().len(),
            "running interactor"
        );
        self.convergence.run().await
    }
}

impl fmt::Debug for Interactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interactor")
            .field("type", &self.type_name())
            .field("selector", &self.selector)
            .field("scoped", &self.parent.is_some())
            .field("steps", &self.convergence.queue().len())
            .finish()
    }
}

impl IntoFuture for Interactor {
    type Output = InteractorResult<ConvergeStats>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.run().await }.boxed()
    }
}

impl<'a> IntoFuture for &'a Interactor {
    type Output = InteractorResult<ConvergeStats>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}

/// The `assert()` namespace of an interactor
#[derive(Debug, Clone)]
pub struct Assertions<'a> {
    interactor: &'a Interactor,
    negated: bool,
    message: Option<String>,
}

impl Assertions<'_> {
    /// Invert the next assertion
    #[must_use]
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Whether the next assertion is inverted
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Replace the failure message template for the next assertion
    #[must_use]
    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    /// Assert property `name` (truthiness, or its custom assertion).
    ///
    /// # Panics
    ///
    /// When `name` is not a registered property.
    #[must_use]
    pub fn that(self, name: &str) -> Interactor {
        authored(self.try_that(name))
    }

    /// Assert property `name` equals `expected`.
    ///
    /// # Panics
    ///
    /// When `name` is not a registered property.
    #[must_use]
    pub fn equals(self, name: &str, expected: impl Into<Value>) -> Interactor {
        authored(self.try_equals(name, expected))
    }

    /// Assert property `name`, called with `args`, against `expected`.
    ///
    /// # Panics
    ///
    /// When `name` is not a registered property.
    #[must_use]
    pub fn matches(self, name: &str, expected: Option<Value>, args: Vec<Value>) -> Interactor {
        authored(self.try_matches(name, expected, args))
    }

    /// Fallible form of [`Assertions::that`]
    pub fn try_that(self, name: &str) -> InteractorResult<Interactor> {
        self.try_matches(name, None, Vec::new())
    }

    /// Fallible form of [`Assertions::equals`]
    pub fn try_equals(self, name: &str, expected: impl Into<Value>) -> InteractorResult<Interactor> {
        self.try_matches(name, Some(expected.into()), Vec::new())
    }

    /// Fallible form of [`Assertions::matches`]
    pub fn try_matches(
        self,
        name: &str,
        expected: Option<Value>,
        args: Vec<Value>,
    ) -> InteractorResult<Interactor> {
        let interactor = self.interactor;
        let property = interactor
            .descriptor
            .property(name)
            .ok_or_else(|| interactor.descriptor.missing("property", name))?
            .clone();

        let label = format!(
            "assert {}{name} {}",
            if self.negated { "not " } else { "" },
            interactor.describe()
        );
        let ctx = interactor.context();
        let name = name.to_string();
        let negated = self.negated;
        let message = self.message;

        Ok(interactor.push(Step::assertion(
            label,
            lift(move || {
                property.check(
                    &name,
                    &ctx,
                    expected.as_ref(),
                    &args,
                    negated,
                    message.as_deref(),
                )
            }),
        )))
    }

    /// Evaluate property `name` once, without queueing anything
    pub fn evaluate(
        &self,
        name: &str,
        expected: Option<&Value>,
        args: &[Value],
    ) -> InteractorResult<Value> {
        let interactor = self.interactor;
        interactor
            .descriptor
            .property(name)
            .ok_or_else(|| interactor.descriptor.missing("property", name))?
            .check(
                name,
                interactor,
                expected,
                args,
                self.negated,
                self.message.as_deref(),
            )
    }
}
