//! In-memory document backing [`ElementAccess`].
//!
//! Nodes live in an arena indexed by [`NodeId`]. Removing a node only unlinks
//! it from its parent, so handles to detached subtrees stay valid and can be
//! re-attached later.

use super::css::CssSelector;
use super::html;
use super::xpath::XPathExpr;
use super::{DomEvent, ElementAccess, ElementSnapshot, NodeId, Query};
use crate::result::{InteractorError, InteractorResult};
use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) value: String,
    pub(crate) checked: bool,
    pub(crate) disabled: bool,
}

impl ElementData {
    pub(crate) fn new(tag: &str, attrs: BTreeMap<String, String>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            value: attrs.get("value").cloned().unwrap_or_default(),
            checked: attrs.contains_key("checked"),
            disabled: attrs.contains_key("disabled"),
            attrs,
        }
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn is_toggle(&self) -> bool {
        self.tag == "input" && matches!(self.attr("type"), Some("checkbox" | "radio"))
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Arena of nodes plus focus and event bookkeeping
#[derive(Debug, Clone)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    active: Option<NodeId>,
    events: Vec<(NodeId, DomEvent)>,
}

impl Tree {
    const DOCUMENT: NodeId = NodeId(0);

    fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            active: None,
            events: Vec::new(),
        }
    }

    pub(crate) const fn document(&self) -> NodeId {
        Self::DOCUMENT
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    pub(crate) fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.element(*c).is_some())
            .collect()
    }

    pub(crate) fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Document | NodeKind::Element(_) => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    pub(crate) fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn own_text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|c| match &self.node(*c)?.kind {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Topmost ancestor of `id`: the document, or the root of a detached subtree
    pub(crate) fn root_of(&self, id: NodeId) -> NodeId {
        let mut root = id;
        while let Some(parent) = self.parent(root) {
            root = parent;
        }
        root
    }

    pub(crate) fn is_connected(&self, id: NodeId) -> bool {
        id == Self::DOCUMENT || self.is_descendant_of(id, Self::DOCUMENT)
    }

    /// Element descendants of `scope` in document order, excluding `scope`
    pub(crate) fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.element(id).is_some() {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Keep only members of `set`, ordered as they appear under `scope`
    pub(crate) fn in_document_order(&self, scope: NodeId, set: &HashSet<NodeId>) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| set.contains(id))
            .collect()
    }

    pub(crate) fn is_focused(&self, id: NodeId) -> bool {
        self.active == Some(id)
    }

    pub(crate) fn create(&mut self, parent: Option<NodeId>, element: ElementData) -> NodeId {
        self.push_node(parent, NodeKind::Element(element))
    }

    pub(crate) fn create_text(&mut self, parent: Option<NodeId>, text: String) -> NodeId {
        self.push_node(parent, NodeKind::Text(text))
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = parent.filter(|p| self.node(*p).is_some());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(node) = parent.and_then(|p| self.nodes.get_mut(p.0)) {
            node.children.push(id);
        }
        id
    }

    /// Check that `parent` exists and can hold children
    pub(crate) fn container(&self, parent: NodeId) -> InteractorResult<NodeId> {
        match self.node(parent).map(|n| &n.kind) {
            Some(NodeKind::Document | NodeKind::Element(_)) => Ok(parent),
            Some(NodeKind::Text(_)) => Err(InteractorError::action(format!(
                "cannot insert into text node {}",
                parent.0
            ))),
            None => Err(InteractorError::action(format!("unknown node {}", parent.0))),
        }
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            if let Some(node) = self.nodes.get_mut(parent.0) {
                node.children.retain(|c| *c != id);
            }
            if let Some(node) = self.nodes.get_mut(id.0) {
                node.parent = None;
            }
        }
        if self.active.is_some_and(|active| active == id || self.is_descendant_of(active, id)) {
            self.active = None;
        }
    }

    fn snapshot(&self, id: NodeId) -> Option<ElementSnapshot> {
        let data = self.element(id)?;
        Some(ElementSnapshot {
            tag: data.tag.clone(),
            attributes: data.attrs.clone(),
            text: self.text_content(id),
            own_text: self.own_text(id),
            value: data.value.clone(),
            checked: data.checked,
            disabled: data.disabled,
            focused: self.is_focused(id),
        })
    }

    fn query(&self, scope: NodeId, query: Query<'_>) -> InteractorResult<Vec<NodeId>> {
        match query {
            Query::Css(selector) => Ok(CssSelector::parse(selector)?.select(self, scope)),
            Query::XPath(expr) => XPathExpr::parse(expr)?.evaluate(self, scope),
            Query::Text(text) => {
                let wanted = text.trim();
                Ok(self
                    .descendants(scope)
                    .into_iter()
                    .filter(|id| self.own_text(*id).trim() == wanted)
                    .collect())
            }
        }
    }

    fn dispatch(&mut self, id: NodeId, event: &DomEvent) -> InteractorResult<()> {
        let Some(data) = self.element(id) else {
            return Err(InteractorError::action(format!(
                "cannot dispatch {} at a non-element node",
                event.name()
            )));
        };
        if data.disabled && !matches!(event, DomEvent::Custom { .. }) {
            return Err(InteractorError::action(format!(
                "cannot {} disabled <{}>",
                event.name(),
                data.tag
            )));
        }
        let toggles = data.is_toggle();
        let is_radio = data.attr("type") == Some("radio");

        match event {
            DomEvent::Click if toggles => {
                if let Some(data) = self.element_mut(id) {
                    data.checked = if is_radio { true } else { !data.checked };
                }
            }
            DomEvent::Focus => self.active = Some(id),
            DomEvent::Blur if self.active == Some(id) => self.active = None,
            DomEvent::Input { value } => {
                if let Some(data) = self.element_mut(id) {
                    data.value.clone_from(value);
                }
            }
            _ => {}
        }
        self.events.push((id, event.clone()));
        Ok(())
    }
}

/// In-memory document implementing [`ElementAccess`]
#[derive(Debug)]
pub struct VirtualDom {
    tree: RwLock<Tree>,
}

impl Default for VirtualDom {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDom {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
        }
    }

    /// Document built from an HTML fragment
    pub fn parse(markup: &str) -> InteractorResult<Self> {
        let dom = Self::new();
        let document = dom.document();
        let _ = dom.append_html(document, markup)?;
        Ok(dom)
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse `markup` and append the resulting nodes under `parent`
    ///
    /// # Errors
    ///
    /// `ActionFailed` when `parent` is unknown or a text node, `Config` when
    /// the markup does not parse cleanly.
    pub fn append_html(&self, parent: NodeId, markup: &str) -> InteractorResult<Vec<NodeId>> {
        let mut tree = self.write();
        let parent = tree.container(parent)?;
        html::append(&mut tree, parent, markup)
    }

    /// Append a new element
    ///
    /// # Errors
    ///
    /// `ActionFailed` when `parent` is unknown or a text node, or when `tag`
    /// is not a valid element name.
    pub fn create_element(
        &self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> InteractorResult<NodeId> {
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(InteractorError::action(format!("invalid element name {tag:?}")));
        }
        let attrs = attrs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut tree = self.write();
        let parent = tree.container(parent)?;
        Ok(tree.create(Some(parent), ElementData::new(tag, attrs)))
    }

    /// Append a text node
    ///
    /// # Errors
    ///
    /// `ActionFailed` when `parent` is unknown or a text node.
    pub fn append_text(&self, parent: NodeId, text: &str) -> InteractorResult<NodeId> {
        let mut tree = self.write();
        let parent = tree.container(parent)?;
        Ok(tree.create_text(Some(parent), text.to_string()))
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&self, node: NodeId) {
        self.write().detach(node);
    }

    /// Move `node` to be the last child of `parent`
    ///
    /// # Errors
    ///
    /// `ActionFailed` when either node is unknown, `parent` is a text node,
    /// or `parent` is `node` itself or one of its descendants. The tree is
    /// left unchanged on error.
    pub fn attach(&self, parent: NodeId, node: NodeId) -> InteractorResult<()> {
        let mut tree = self.write();
        let parent = tree.container(parent)?;
        if tree.node(node).is_none() || node == tree.document() {
            return Err(InteractorError::action(format!("cannot attach node {}", node.0)));
        }
        if parent == node || tree.is_descendant_of(parent, node) {
            return Err(InteractorError::action(format!(
                "cannot attach node {} inside itself",
                node.0
            )));
        }
        tree.detach(node);
        if let Some(child) = tree.nodes.get_mut(node.0) {
            child.parent = Some(parent);
        }
        if let Some(owner) = tree.nodes.get_mut(parent.0) {
            owner.children.push(node);
        }
        Ok(())
    }

    /// Replace the children of `node` with a single text node.
    /// Unknown nodes and text nodes are left alone.
    pub fn set_text(&self, node: NodeId, text: &str) {
        let mut tree = self.write();
        if tree.container(node).is_err() {
            return;
        }
        let children = tree
            .nodes
            .get_mut(node.0)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(child) = tree.nodes.get_mut(child.0) {
                child.parent = None;
            }
        }
        if !text.is_empty() {
            let _ = tree.create_text(Some(node), text.to_string());
        }
    }

    /// Set an attribute
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.write().element_mut(node) {
            let _ = data.attrs.insert(name.to_string(), value.to_string());
        }
    }

    /// Remove an attribute
    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(data) = self.write().element_mut(node) {
            let _ = data.attrs.remove(name);
        }
    }

    /// Set checkedness without dispatching events
    pub fn set_checked(&self, node: NodeId, checked: bool) {
        if let Some(data) = self.write().element_mut(node) {
            data.checked = checked;
        }
    }

    /// Set disabledness
    pub fn set_disabled(&self, node: NodeId, disabled: bool) {
        if let Some(data) = self.write().element_mut(node) {
            data.disabled = disabled;
        }
    }

    /// Set the form value without dispatching events
    pub fn set_value(&self, node: NodeId, value: &str) {
        if let Some(data) = self.write().element_mut(node) {
            value.clone_into(&mut data.value);
        }
    }

    /// First CSS match in the whole document
    #[must_use]
    pub fn select(&self, selector: &str) -> Option<NodeId> {
        let tree = self.read();
        tree.query(tree.document(), Query::Css(selector))
            .ok()
            .and_then(|found| found.into_iter().next())
    }

    /// Events dispatched at `node`, oldest first
    #[must_use]
    pub fn events(&self, node: NodeId) -> Vec<DomEvent> {
        self.read()
            .events
            .iter()
            .filter(|(id, _)| *id == node)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Number of `name` events dispatched at `node`
    #[must_use]
    pub fn event_count(&self, node: NodeId, name: &str) -> usize {
        self.read()
            .events
            .iter()
            .filter(|(id, event)| *id == node && event.name() == name)
            .count()
    }

    /// Element that currently has focus
    #[must_use]
    pub fn active_element(&self) -> Option<NodeId> {
        self.read().active
    }
}

impl ElementAccess for VirtualDom {
    fn document(&self) -> NodeId {
        self.read().document()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.read().is_connected(node)
    }

    fn find_all(&self, scope: NodeId, query: Query<'_>) -> InteractorResult<Vec<NodeId>> {
        self.read().query(scope, query)
    }

    fn snapshot(&self, node: NodeId) -> Option<ElementSnapshot> {
        self.read().snapshot(node)
    }

    fn dispatch(&self, node: NodeId, event: &DomEvent) -> InteractorResult<()> {
        self.write().dispatch(node, event)
    }
}
