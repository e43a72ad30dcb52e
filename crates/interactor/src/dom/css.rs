//! CSS selectors, parsed and matched by `scraper`.
//!
//! The arena is not a `scraper` document, so matching writes the tree that
//! holds the scope out as markup with every element stamped by its
//! [`NodeId`], runs the selector over the re-parsed fragment, and maps the
//! stamps back. Live `checked` and `disabled` state is written as the
//! matching boolean attribute, so `[checked]` and `:not([disabled])` follow
//! what the user did rather than the original markup.

use super::virtual_dom::Tree;
use super::NodeId;
use crate::result::{InteractorError, InteractorResult};
use scraper::{Html, Selector};
use std::collections::HashSet;

const STAMP: &str = "data-interactor-node";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Parsed CSS selector list
#[derive(Debug, Clone)]
pub struct CssSelector {
    source: String,
    selector: Selector,
}

impl CssSelector {
    /// Parse a selector list such as `form > input[type=checkbox], #agree`
    pub fn parse(source: &str) -> InteractorResult<Self> {
        let selector = Selector::parse(source)
            .map_err(|err| InteractorError::invalid_selector(source, err.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    /// The selector text as written
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Element descendants of `scope` matching the selector, in document order
    pub(crate) fn select(&self, tree: &Tree, scope: NodeId) -> Vec<NodeId> {
        let mut markup = String::new();
        write_markup(tree, tree.root_of(scope), &mut markup);
        let stamped = Html::parse_fragment(&markup);

        let found: HashSet<NodeId> = stamped
            .select(&self.selector)
            .filter_map(|element| element.value().attr(STAMP)?.parse::<usize>().ok())
            .map(NodeId)
            .collect();
        tree.in_document_order(scope, &found)
    }
}

fn write_markup(tree: &Tree, id: NodeId, out: &mut String) {
    if let Some(text) = tree.text(id) {
        push_escaped(out, text, false);
        return;
    }
    let Some(data) = tree.element(id) else {
        for child in tree.children(id) {
            write_markup(tree, *child, out);
        }
        return;
    };

    out.push('<');
    out.push_str(&data.tag);
    for (name, value) in &data.attrs {
        if matches!(name.as_str(), "checked" | "disabled" | STAMP) || !is_attribute_name(name) {
            continue;
        }
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        push_escaped(out, value, true);
        out.push('"');
    }
    if data.checked {
        out.push_str(" checked");
    }
    if data.disabled {
        out.push_str(" disabled");
    }
    out.push(' ');
    out.push_str(STAMP);
    out.push_str("=\"");
    out.push_str(&id.0.to_string());
    out.push_str("\">");

    if VOID_ELEMENTS.contains(&data.tag.as_str()) {
        return;
    }
    for child in tree.children(id) {
        write_markup(tree, *child, out);
    }
    out.push_str("</");
    out.push_str(&data.tag);
    out.push('>');
}

fn is_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '/' | '='))
}

fn push_escaped(out: &mut String, raw: &str, in_attribute: bool) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
