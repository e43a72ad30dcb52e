//! HTML fragment reader for building virtual documents.
//!
//! Markup goes through `scraper`'s HTML5 parser in fragment mode, then the
//! resulting elements and text are copied into the arena. Comments and
//! whitespace-only text between tags are dropped. Any parse error reported by
//! the tree builder rejects the whole fragment.

use super::virtual_dom::{ElementData, Tree};
use super::NodeId;
use crate::result::{InteractorError, InteractorResult};
use scraper::{Html, Node};
use std::collections::HashMap;

fn markup_error(message: impl Into<String>) -> InteractorError {
    InteractorError::Config {
        message: format!("malformed markup: {}", message.into()),
    }
}

pub(crate) fn append(tree: &mut Tree, parent: NodeId, markup: &str) -> InteractorResult<Vec<NodeId>> {
    let fragment = Html::parse_fragment(markup);
    if let Some(error) = fragment.errors.first() {
        return Err(markup_error(error.to_string()));
    }

    let root = fragment.root_element();
    let mut ids = HashMap::new();
    let _ = ids.insert(root.id(), parent);
    let mut top_level = Vec::new();

    for node in root.descendants().skip(1) {
        let Some(owner) = node.parent().and_then(|p| ids.get(&p.id()).copied()) else {
            continue;
        };
        let id = match node.value() {
            Node::Element(element) => {
                let attrs = element
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect();
                tree.create(Some(owner), ElementData::new(element.name(), attrs))
            }
            Node::Text(text) if !text.trim().is_empty() => {
                tree.create_text(Some(owner), text.to_string())
            }
            _ => continue,
        };
        let _ = ids.insert(node.id(), id);
        if owner == parent {
            top_level.push(id);
        }
    }

    Ok(top_level)
}
