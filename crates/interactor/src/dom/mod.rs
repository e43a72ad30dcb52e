//! Element access: the only seam between interactors and a document.
//!
//! Interactors never hold on to elements. Every step asks the injected
//! [`ElementAccess`] for live nodes when it runs, so a document that changes
//! between chain construction and execution is always observed as it is.
//!
//! [`VirtualDom`] is the bundled in-memory implementation. Other backends (a
//! remote automation driver, a platform accessibility tree) implement the
//! same trait.

mod css;
mod html;
mod virtual_dom;
mod xpath;

pub use css::CssSelector;
pub use virtual_dom::VirtualDom;
pub use xpath::XPathExpr;

use crate::result::InteractorResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a node owned by an [`ElementAccess`] backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A query the backend knows how to evaluate inside a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query<'a> {
    /// CSS selector
    Css(&'a str),
    /// XPath expression
    XPath(&'a str),
    /// Elements whose own text equals the string once both are trimmed of
    /// leading and trailing whitespace. Inner whitespace must match exactly.
    Text(&'a str),
}

/// Events an action can dispatch at an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomEvent {
    /// Mouse click
    Click,
    /// Element gains focus
    Focus,
    /// Element loses focus
    Blur,
    /// Key released
    KeyUp {
        /// Key name (`"Enter"`, `"a"`, ...)
        key: String,
    },
    /// Value changed by typing
    Input {
        /// New value
        value: String,
    },
    /// Any other named event
    Custom {
        /// Event name
        name: String,
    },
}

impl DomEvent {
    /// Event name as a listener would see it
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Click => "click",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::KeyUp { .. } => "keyup",
            Self::Input { .. } => "input",
            Self::Custom { name } => name,
        }
    }
}

/// Read-only copy of an element's state at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Lower-case tag name
    pub tag: String,
    /// Attributes as authored
    pub attributes: BTreeMap<String, String>,
    /// Concatenated text of all descendants
    pub text: String,
    /// Concatenated text of direct text children
    pub own_text: String,
    /// Current form value
    pub value: String,
    /// Current checkedness
    pub checked: bool,
    /// Whether the element is disabled
    pub disabled: bool,
    /// Whether the element has focus
    pub focused: bool,
}

impl ElementSnapshot {
    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the `class` attribute contains `class_name`
    #[must_use]
    pub fn has_class(&self, class_name: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
    }
}

/// Element access capability injected into every interactor
pub trait ElementAccess: Send + Sync + fmt::Debug {
    /// The document node; queries scoped to it search everything
    fn document(&self) -> NodeId;

    /// Whether `node` is still attached to the document
    fn is_connected(&self, node: NodeId) -> bool;

    /// All matches strictly inside `scope`, in document order
    fn find_all(&self, scope: NodeId, query: Query<'_>) -> InteractorResult<Vec<NodeId>>;

    /// First match inside `scope` in document order
    fn find(&self, scope: NodeId, query: Query<'_>) -> InteractorResult<Option<NodeId>> {
        Ok(self.find_all(scope, query)?.into_iter().next())
    }

    /// Element state, or `None` for non-element or unknown nodes
    fn snapshot(&self, node: NodeId) -> Option<ElementSnapshot>;

    /// Dispatch an event, applying the backend's default behaviour
    fn dispatch(&self, node: NodeId, event: &DomEvent) -> InteractorResult<()>;
}

/// Shared element access handle
pub type Dom = Arc<dyn ElementAccess>;

/// Live handle to one element, returned by `Interactor::element` and friends
#[derive(Clone)]
pub struct ElementHandle {
    id: NodeId,
    dom: Dom,
}

impl ElementHandle {
    /// Wrap a node id
    #[must_use]
    pub fn new(id: NodeId, dom: Dom) -> Self {
        Self { id, dom }
    }

    /// Node id
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Backend the element lives in
    #[must_use]
    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Current state. An element removed since resolution yields a default
    /// (empty) snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ElementSnapshot {
        self.dom.snapshot(self.id).unwrap_or_default()
    }

    /// Whether the element is still attached
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.dom.is_connected(self.id)
    }

    /// Lower-case tag name
    #[must_use]
    pub fn tag_name(&self) -> String {
        self.snapshot().tag
    }

    /// Descendant text
    #[must_use]
    pub fn text(&self) -> String {
        self.snapshot().text
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.snapshot().attributes.remove(name)
    }

    /// Dispatch an event at this element
    pub fn dispatch(&self, event: &DomEvent) -> InteractorResult<()> {
        self.dom.dispatch(self.id, event)
    }

    /// Click this element
    pub fn click(&self) -> InteractorResult<()> {
        self.dispatch(&DomEvent::Click)
    }

    /// Find the first match inside this element
    pub fn find(&self, query: Query<'_>) -> InteractorResult<Option<Self>> {
        Ok(self
            .dom
            .find(self.id, query)?
            .map(|id| Self::new(id, self.dom.clone())))
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("id", &self.id)
            .field("tag", &self.tag_name())
            .finish()
    }
}

impl PartialEq for ElementHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.dom, &other.dom)
    }
}
