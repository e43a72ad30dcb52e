//! Interactor types: capability tables merged by `extend`.
//!
//! A [`TypeDescriptor`] maps names to exactly one [`Capability`] each: a
//! property (getter plus optional assertion and message), an action (a chain
//! transformer), or a nested child field. [`extend`] copies the base table,
//! lets every name in the definition replace the base entry outright, and
//! returns a new descriptor. The base is never touched.
//!
//! ```ignore
//! let todo_list = extend(
//!     &TypeDescriptor::base(),
//!     TypeDefinition::new("TodoList")
//!         .selector(".todos")
//!         .collection("items", &TypeDescriptor::base(), "li")
//!         .action("clear", |list, _| list.child("clear_button").click()),
//! )?;
//! ```

use crate::config::PollOverrides;
use crate::dom::{Dom, ElementSnapshot};
use crate::format::Message;
use crate::interactor::Interactor;
use crate::result::{InteractorError, InteractorResult};
use crate::selector::Selector;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Reads a property value
pub type GetterFn = Arc<dyn Fn(&Interactor, &[Value]) -> InteractorResult<Value> + Send + Sync>;

/// Custom assertion: `Ok` passes, `AssertionFailed` fails, anything else
/// propagates untouched
pub type AssertFn =
    Arc<dyn Fn(&Interactor, Option<&Value>, &[Value]) -> InteractorResult<()> + Send + Sync>;

/// Appends an action's steps to a chain
pub type ActionFn = Arc<dyn Fn(&Interactor, &[Value]) -> Interactor + Send + Sync>;

/// Names with structural meaning in the assertion namespace
const RESERVED: &[&str] = &["assert", "not", "parent"];

/// JSON truthiness: `false`, `null`, `0`, `""` and `[]` are falsy
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Readable, assertable property
#[derive(Clone)]
pub struct Property {
    get: GetterFn,
    assert: Option<AssertFn>,
    message: Option<String>,
}

impl Property {
    /// Property backed by a getter
    pub fn new<F>(get: F) -> Self
    where
        F: Fn(&Interactor, &[Value]) -> InteractorResult<Value> + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            assert: None,
            message: None,
        }
    }

    /// Property computed from the resolved element's snapshot
    pub fn of_element<F>(read: F) -> Self
    where
        F: Fn(&ElementSnapshot, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self::new(move |interactor, args| Ok(read(&interactor.element()?.snapshot(), args)))
    }

    /// Replace the default comparison with a custom assertion
    #[must_use]
    pub fn with_assert<F>(mut self, assert: F) -> Self
    where
        F: Fn(&Interactor, Option<&Value>, &[Value]) -> InteractorResult<()> + Send + Sync + 'static,
    {
        self.assert = Some(Arc::new(assert));
        self
    }

    /// Failure message template. Besides `%{@}` and `%{- text}`, `{arg}`
    /// expands to the first assertion argument.
    #[must_use]
    pub fn with_message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    /// Message template, if one was registered
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether a custom assertion is registered
    #[must_use]
    pub const fn has_assert(&self) -> bool {
        self.assert.is_some()
    }

    /// Read the value now
    pub fn get(&self, interactor: &Interactor, args: &[Value]) -> InteractorResult<Value> {
        (self.get)(interactor, args)
    }

    /// Run the assertion once. Negation inverts pass and fail; errors other
    /// than `AssertionFailed` are never inverted.
    pub(crate) fn check(
        &self,
        name: &str,
        interactor: &Interactor,
        expected: Option<&Value>,
        args: &[Value],
        negated: bool,
        message: Option<&str>,
    ) -> InteractorResult<Value> {
        let (passed, actual, detail) = match &self.assert {
            Some(assert) => match assert(interactor, expected, args) {
                Ok(()) => (true, None, None),
                Err(InteractorError::AssertionFailed { message }) => (false, None, Some(message)),
                Err(other) => return Err(other),
            },
            None => {
                let actual = (self.get)(interactor, args)?;
                let passed = expected.map_or_else(|| truthy(&actual), |e| actual == *e);
                (passed, Some(actual), None)
            }
        };

        if passed != negated {
            return Ok(actual.unwrap_or(Value::Bool(passed)));
        }

        let template = message
            .map(str::to_string)
            .or_else(|| self.message.clone())
            .or(detail)
            .unwrap_or_else(|| match expected {
                Some(expected) => format!("expected %{{@}} %{{- not}} to have {name} {expected}"),
                None => format!("expected %{{@}} %{{- not}} to be {name}"),
            });
        let template = match args.first() {
            Some(Value::String(arg)) => template.replace("{arg}", arg),
            Some(arg) => template.replace("{arg}", &arg.to_string()),
            None => template,
        };
        let mut rendered = Message::new(template)
            .negated(negated)
            .render(&interactor.describe());
        if let (Some(actual), Some(_), false) = (&actual, expected, negated) {
            rendered.push_str(&format!(", got {actual}"));
        }
        Err(InteractorError::assertion(rendered))
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("assert", &self.assert.is_some())
            .field("message", &self.message)
            .finish()
    }
}

/// Named action
#[derive(Clone)]
pub struct Action {
    run: ActionFn,
}

impl Action {
    /// Action from a chain transformer
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&Interactor, &[Value]) -> Interactor + Send + Sync + 'static,
    {
        Self { run: Arc::new(run) }
    }

    /// Append the action's steps to `interactor`
    #[must_use]
    pub fn apply(&self, interactor: &Interactor, args: &[Value]) -> Interactor {
        (self.run)(interactor, args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

/// Nested interactor field scoped to the owning element
#[derive(Clone)]
pub struct ChildField {
    selector: Selector,
    descriptor: Arc<TypeDescriptor>,
    collection: bool,
}

impl ChildField {
    /// Selector resolved inside the parent element
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Type of the child interactor
    #[must_use]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Whether the field addresses many elements (`item(name, i)`)
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        self.collection
    }
}

impl fmt::Debug for ChildField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildField")
            .field("selector", &self.selector)
            .field("type", &self.descriptor.name())
            .field("collection", &self.collection)
            .finish()
    }
}

/// One entry of a capability table
#[derive(Debug, Clone)]
pub enum Capability {
    /// Readable, assertable property
    Property(Property),
    /// Chainable action
    Action(Action),
    /// Nested interactor field
    Child(ChildField),
}

impl Capability {
    fn kind(&self) -> &'static str {
        match self {
            Self::Property(_) => "property",
            Self::Action(_) => "action",
            Self::Child(_) => "child field",
        }
    }
}

/// Per-type defaults
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Selector used when the caller supplies none
    pub selector: Option<Selector>,
    /// Poll options layered between instance overrides and global defaults
    pub poll: PollOverrides,
}

impl TypeOptions {
    /// Layer `self` over `base`
    #[must_use]
    fn over(&self, base: &Self) -> Self {
        Self {
            selector: self.selector.clone().or_else(|| base.selector.clone()),
            poll: self.poll.over(&base.poll),
        }
    }
}

/// Builder for the overrides passed to [`extend`]
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    name: String,
    options: TypeOptions,
    entries: Vec<(String, Capability)>,
}

impl TypeDefinition {
    /// Start a definition for a type called `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: TypeOptions::default(),
            entries: Vec::new(),
        }
    }

    /// Default selector
    #[must_use]
    pub fn selector(mut self, selector: impl Into<Selector>) -> Self {
        self.options.selector = Some(selector.into());
        self
    }

    /// Type-level timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.poll = self.options.poll.with_timeout(timeout);
        self
    }

    /// Type-level poll interval
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.options.poll = self.options.poll.with_interval(interval);
        self
    }

    /// Type-level stability window
    #[must_use]
    pub fn remains(mut self, remains: Duration) -> Self {
        self.options.poll = self.options.poll.with_remains(remains);
        self
    }

    /// Register a property
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.entries.push((name.into(), Capability::Property(property)));
        self
    }

    /// Register a property from a bare getter
    #[must_use]
    pub fn getter<F>(self, name: impl Into<String>, get: F) -> Self
    where
        F: Fn(&Interactor, &[Value]) -> InteractorResult<Value> + Send + Sync + 'static,
    {
        self.property(name, Property::new(get))
    }

    /// Register an action
    #[must_use]
    pub fn action<F>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Interactor, &[Value]) -> Interactor + Send + Sync + 'static,
    {
        self.entries.push((name.into(), Capability::Action(Action::new(run))));
        self
    }

    /// Register a nested interactor field
    #[must_use]
    pub fn child(
        self,
        name: impl Into<String>,
        descriptor: &Arc<TypeDescriptor>,
        selector: impl Into<Selector>,
    ) -> Self {
        self.field(name, descriptor, selector, false)
    }

    /// Register a nested field addressing many elements
    #[must_use]
    pub fn collection(
        self,
        name: impl Into<String>,
        descriptor: &Arc<TypeDescriptor>,
        selector: impl Into<Selector>,
    ) -> Self {
        self.field(name, descriptor, selector, true)
    }

    fn field(
        mut self,
        name: impl Into<String>,
        descriptor: &Arc<TypeDescriptor>,
        selector: impl Into<Selector>,
        collection: bool,
    ) -> Self {
        self.entries.push((
            name.into(),
            Capability::Child(ChildField {
                selector: selector.into(),
                descriptor: descriptor.clone(),
                collection,
            }),
        ));
        self
    }

    fn validate(&self) -> InteractorResult<()> {
        static IDENT: OnceLock<Regex> = OnceLock::new();
        let ident = IDENT.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
        });

        if !ident.is_match(&self.name) {
            return Err(InteractorError::authoring(format!(
                "type name {:?} is not an identifier",
                self.name
            )));
        }
        if self.options.poll.interval.is_some_and(|i| i.is_zero()) {
            return Err(InteractorError::authoring(format!(
                "{}: poll interval must be greater than zero",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for (name, capability) in &self.entries {
            if !ident.is_match(name) {
                return Err(InteractorError::authoring(format!(
                    "{}: {} name {name:?} is not an identifier",
                    self.name,
                    capability.kind()
                )));
            }
            if RESERVED.contains(&name.as_str()) {
                return Err(InteractorError::authoring(format!(
                    "{}: {name:?} is reserved",
                    self.name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(InteractorError::authoring(format!(
                    "{}: {name:?} is defined twice",
                    self.name
                )));
            }
            if let Capability::Child(field) = capability {
                if field.collection && field.selector.is_scope() {
                    return Err(InteractorError::authoring(format!(
                        "{}: collection {name:?} needs a selector",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Merged capability table acting as a factory for interactors
pub struct TypeDescriptor {
    name: String,
    lineage: Vec<String>,
    options: TypeOptions,
    capabilities: BTreeMap<String, Capability>,
}

impl TypeDescriptor {
    pub(crate) fn root(name: &str, capabilities: BTreeMap<String, Capability>) -> Self {
        Self {
            name: name.to_string(),
            lineage: Vec::new(),
            options: TypeOptions::default(),
            capabilities,
        }
    }

    /// The built-in base type every other type extends
    #[must_use]
    pub fn base() -> Arc<Self> {
        crate::builtins::base_type()
    }

    /// Type name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the types this one was derived from, nearest first
    #[must_use]
    pub fn ancestors(&self) -> &[String] {
        &self.lineage
    }

    /// Defaults carried by this type
    #[must_use]
    pub const fn options(&self) -> &TypeOptions {
        &self.options
    }

    /// Entry registered under `name`
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// Property registered under `name`
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        match self.capabilities.get(name)? {
            Capability::Property(property) => Some(property),
            _ => None,
        }
    }

    /// Action registered under `name`
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Action> {
        match self.capabilities.get(name)? {
            Capability::Action(action) => Some(action),
            _ => None,
        }
    }

    /// Child field registered under `name`
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ChildField> {
        match self.capabilities.get(name)? {
            Capability::Child(field) => Some(field),
            _ => None,
        }
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }

    pub(crate) fn missing(&self, kind: &str, name: &str) -> InteractorError {
        InteractorError::authoring(format!("{} has no {kind} named {name:?}", self.name))
    }

    /// Derive a new type. See [`extend`].
    pub fn extend(self: &Arc<Self>, definition: TypeDefinition) -> InteractorResult<Arc<Self>> {
        extend(self, definition)
    }

    /// Interactor of this type. An empty selector falls back to the type's
    /// default selector.
    pub fn create(self: &Arc<Self>, dom: Dom, selector: impl Into<Selector>) -> Interactor {
        let selector = selector.into();
        let selector = match (&selector, &self.options.selector) {
            (Selector::Scope, Some(default)) => default.clone(),
            _ => selector,
        };
        Interactor::from_parts(self.clone(), dom, selector)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("ancestors", &self.lineage)
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Derive a new type from `base`.
///
/// Every name in `definition` replaces the base entry of that name, whatever
/// table it lived in. Unmentioned names are inherited unchanged. Options
/// layer the same way: the definition's selector and poll settings win.
///
/// # Errors
///
/// `Authoring` when a name is not an identifier, is reserved, or appears
/// twice, when a collection has no selector, or when the poll interval is
/// zero.
pub fn extend(
    base: &Arc<TypeDescriptor>,
    definition: TypeDefinition,
) -> InteractorResult<Arc<TypeDescriptor>> {
    definition.validate()?;

    let mut capabilities = base.capabilities.clone();
    for (name, capability) in definition.entries {
        let kind = capability.kind();
        if let Some(previous) = capabilities.insert(name.clone(), capability) {
            if previous.kind() == kind {
                tracing::trace!(
                    type_name = %definition.name,
                    name = %name,
                    replaced = previous.kind(),
                    "capability overridden"
                );
            } else {
                tracing::warn!(
                    type_name = %definition.name,
                    name = %name,
                    replaced = previous.kind(),
                    with = kind,
                    "capability overridden by a different kind"
                );
            }
        }
    }

    let mut lineage = Vec::with_capacity(base.lineage.len() + 1);
    lineage.push(base.name.clone());
    lineage.extend(base.lineage.iter().cloned());

    tracing::debug!(
        type_name = %definition.name,
        base = %base.name,
        capabilities = capabilities.len(),
        "interactor type defined"
    );

    Ok(Arc::new(TypeDescriptor {
        name: definition.name,
        lineage,
        options: definition.options.over(&base.options),
        capabilities,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(value: Value) -> Property {
        Property::new(move |_, _| Ok(value.clone()))
    }

    mod truthiness {
        use super::*;

        #[test]
        fn test_json_truthiness() {
            for falsy in [json!(false), json!(null), json!(0), json!(""), json!([])] {
                assert!(!truthy(&falsy), "{falsy}");
            }
            for truthy_value in [json!(true), json!(1), json!("x"), json!([0]), json!({})] {
                assert!(truthy(&truthy_value), "{truthy_value}");
            }
        }
    }

    mod messages {
        use super::*;
        use crate::dom::VirtualDom;
        use std::sync::Arc;

        fn subject() -> Interactor {
            Interactor::new(Arc::new(VirtualDom::new()), "#x")
        }

        #[test]
        fn test_failure_renders_template() {
            let on = constant(json!(false)).with_message("expected %{@} %{- not} to be on");
            let err = on.check("on", &subject(), None, &[], false, None).unwrap_err();
            assert_eq!(err.message(), "expected #x to be on");
        }

        #[test]
        fn test_negated_failure_keeps_negated_text() {
            let on = constant(json!(true)).with_message("expected %{@} %{- not} to be on");
            let err = on.check("on", &subject(), None, &[], true, None).unwrap_err();
            assert_eq!(err.message(), "expected #x not to be on");
        }

        #[test]
        fn test_step_message_beats_registered() {
            let on = constant(json!(false)).with_message("registered");
            let err = on
                .check("on", &subject(), None, &[], false, Some("%{@} stayed off"))
                .unwrap_err();
            assert_eq!(err.message(), "#x stayed off");
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn test_override_wins_across_tables() {
            let base = TypeDescriptor::base();
            assert!(base.property("checked").is_some());
            let derived = base
                .extend(TypeDefinition::new("Toggle").action("checked", |i, _| i.click()))
                .unwrap();
            assert!(derived.property("checked").is_none());
            assert!(derived.action("checked").is_some());
            assert!(base.property("checked").is_some());
        }

        #[test]
        fn test_unmentioned_names_inherited() {
            let base = TypeDescriptor::base();
            let derived = base
                .extend(TypeDefinition::new("Card").property("title", constant(json!("t"))))
                .unwrap();
            assert!(derived.property("text").is_some());
            assert!(derived.action("click").is_some());
            assert!(derived.property("title").is_some());
            assert!(base.property("title").is_none());
            assert_eq!(derived.ancestors(), ["Interactor".to_string()]);
        }

        #[test]
        fn test_options_layer() {
            let base = TypeDescriptor::base();
            let form = base
                .extend(
                    TypeDefinition::new("Form")
                        .selector("form")
                        .timeout(Duration::from_millis(300)),
                )
                .unwrap();
            let login = form
                .extend(TypeDefinition::new("Login").interval(Duration::from_millis(1)))
                .unwrap();
            assert!(matches!(login.options().selector, Some(Selector::Css(ref s)) if s == "form"));
            assert_eq!(login.options().poll.timeout, Some(Some(Duration::from_millis(300))));
            assert_eq!(login.options().poll.interval, Some(Duration::from_millis(1)));
            assert_eq!(login.ancestors(), ["Form".to_string(), "Interactor".to_string()]);
        }
    }

    mod authoring {
        use super::*;

        fn rejected(definition: TypeDefinition) -> String {
            let err = TypeDescriptor::base().extend(definition).unwrap_err();
            assert!(matches!(err, InteractorError::Authoring { .. }));
            err.message().to_string()
        }

        #[test]
        fn test_rejects_bad_names() {
            assert!(rejected(TypeDefinition::new("")).contains("not an identifier"));
            assert!(rejected(TypeDefinition::new("T").property("has space", constant(json!(1))))
                .contains("not an identifier"));
            assert!(rejected(TypeDefinition::new("T").property("not", constant(json!(1))))
                .contains("reserved"));
        }

        #[test]
        fn test_rejects_duplicates() {
            let message = rejected(
                TypeDefinition::new("T")
                    .property("value", constant(json!(1)))
                    .action("value", |i, _| i.clone()),
            );
            assert!(message.contains("defined twice"));
        }

        #[test]
        fn test_rejects_scope_collection_and_zero_interval() {
            let base = TypeDescriptor::base();
            assert!(rejected(TypeDefinition::new("T").collection("rows", &base, ""))
                .contains("needs a selector"));
            assert!(rejected(TypeDefinition::new("T").interval(Duration::ZERO))
                .contains("interval"));
        }
    }
}
