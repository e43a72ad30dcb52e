//! Selector specifications and their resolution inside a scope.
//!
//! Resolution happens every time a step runs. Kinds are tried in this order:
//! nested interactor, XPath, text, CSS, and finally "no selector", which
//! resolves to the scope itself. Single-element resolution takes the first
//! match in document order.

use crate::dom::{ElementAccess, NodeId, Query};
use crate::format::DEFAULT_SUBJECT;
use crate::interactor::Interactor;
use crate::result::{InteractorError, InteractorResult};
use std::fmt;

/// What an interactor points at
#[derive(Clone, Default)]
pub enum Selector {
    /// The scope element itself
    #[default]
    Scope,
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
    /// Elements whose trimmed own text equals the trimmed string
    Text(String),
    /// Another interactor, resolved inside the scope
    Nested(Box<Interactor>),
    /// The `index`-th (zero based) match of a plural selector
    Nth {
        /// Plural selector
        selector: Box<Selector>,
        /// Zero-based position in document order
        index: usize,
    },
}

impl Selector {
    /// CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// XPath expression
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Own-text match, ignoring surrounding whitespace on both sides
    ///
    /// `Selector::text("Help")` finds `<a> Help </a>` but not `<a>Help me</a>`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Interactor used as a selector
    #[must_use]
    pub fn nested(interactor: Interactor) -> Self {
        Self::Nested(Box::new(interactor))
    }

    /// `index`-th match of `self`
    #[must_use]
    pub fn nth(self, index: usize) -> Self {
        Self::Nth {
            selector: Box::new(self),
            index,
        }
    }

    /// Whether this resolves to the scope itself
    #[must_use]
    pub const fn is_scope(&self) -> bool {
        matches!(self, Self::Scope)
    }

    /// Description used in messages: the raw CSS, `xpath(...)`, the quoted
    /// text, or `it` for the scope itself
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Scope => DEFAULT_SUBJECT.to_string(),
            Self::Css(css) => css.clone(),
            Self::XPath(expr) => format!("xpath({expr})"),
            Self::Text(text) => format!("\"{text}\""),
            Self::Nested(interactor) => interactor.describe(),
            Self::Nth { selector, index } => format!("{} [{index}]", selector.describe()),
        }
    }

    fn query(&self) -> Option<Query<'_>> {
        match self {
            Self::Css(css) => Some(Query::Css(css)),
            Self::XPath(expr) => Some(Query::XPath(expr)),
            Self::Text(text) => Some(Query::Text(text)),
            Self::Scope | Self::Nested(_) | Self::Nth { .. } => None,
        }
    }

    /// All matches inside `scope`, in document order. A detached scope is
    /// `NotFound`; an attached scope with no matches is an empty list.
    pub fn resolve_all(&self, dom: &dyn ElementAccess, scope: NodeId) -> InteractorResult<Vec<NodeId>> {
        if !dom.is_connected(scope) {
            return Err(InteractorError::not_found(self.describe()));
        }
        match self {
            Self::Scope => Ok(vec![scope]),
            Self::Nested(interactor) => interactor.nodes_within(scope),
            Self::Nth { selector, index } => Ok(selector
                .resolve_all(dom, scope)?
                .get(*index)
                .copied()
                .into_iter()
                .collect()),
            _ => match self.query() {
                Some(query) => dom.find_all(scope, query),
                None => Ok(Vec::new()),
            },
        }
    }

    /// First match inside `scope`
    pub fn resolve(&self, dom: &dyn ElementAccess, scope: NodeId) -> InteractorResult<NodeId> {
        self.resolve_all(dom, scope)?
            .into_iter()
            .next()
            .ok_or_else(|| InteractorError::not_found(self.describe()))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope => f.write_str("Scope"),
            Self::Css(css) => f.debug_tuple("Css").field(css).finish(),
            Self::XPath(expr) => f.debug_tuple("XPath").field(expr).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Nested(interactor) => f.debug_tuple("Nested").field(&interactor.describe()).finish(),
            Self::Nth { selector, index } => f
                .debug_struct("Nth")
                .field("selector", selector)
                .field("index", index)
                .finish(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<&str> for Selector {
    fn from(css: &str) -> Self {
        if css.trim().is_empty() {
            Self::Scope
        } else {
            Self::Css(css.to_string())
        }
    }
}

impl From<String> for Selector {
    fn from(css: String) -> Self {
        Self::from(css.as_str())
    }
}

impl From<Interactor> for Selector {
    fn from(interactor: Interactor) -> Self {
        Self::nested(interactor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::VirtualDom;
    use std::sync::Arc;

    fn dom() -> Arc<VirtualDom> {
        Arc::new(
            VirtualDom::parse(
                r#"<div id="app">
                     <ul class="todos">
                       <li>Write code</li>
                       <li>Ship it</li>
                     </ul>
                   </div>
                   <ul class="archive"><li>Old</li></ul>"#,
            )
            .unwrap(),
        )
    }

    mod description {
        use super::*;

        #[test]
        fn test_describe_kinds() {
            assert_eq!(Selector::css(".todos li").describe(), ".todos li");
            assert_eq!(Selector::xpath("//li[1]").describe(), "xpath(//li[1])");
            assert_eq!(Selector::text("Ship it").describe(), "\"Ship it\"");
            assert_eq!(Selector::Scope.describe(), "it");
            assert_eq!(Selector::css("li").nth(2).describe(), "li [2]");
        }

        #[test]
        fn test_from_str() {
            assert!(Selector::from("").is_scope());
            assert!(matches!(Selector::from("button"), Selector::Css(_)));
        }
    }

    mod resolution {
        use super::*;

        #[test]
        fn test_first_match_wins() {
            let dom = dom();
            let first = Selector::css("li").resolve(&*dom, dom.document()).unwrap();
            assert_eq!(dom.snapshot(first).unwrap().text, "Write code");
        }

        #[test]
        fn test_plural_in_document_order() {
            let dom = dom();
            let all = Selector::css("li").resolve_all(&*dom, dom.document()).unwrap();
            let texts: Vec<String> = all.iter().map(|n| dom.snapshot(*n).unwrap().text).collect();
            assert_eq!(texts, vec!["Write code", "Ship it", "Old"]);
        }

        #[test]
        fn test_scope_limits_matches() {
            let dom = dom();
            let app = dom.select("#app").unwrap();
            let all = Selector::css("li").resolve_all(&*dom, app).unwrap();
            assert_eq!(all.len(), 2);
            let err = Selector::text("Old").resolve(&*dom, app).unwrap_err();
            assert_eq!(err.message(), "did not find \"Old\"");
        }

        #[test]
        fn test_scope_selector_is_scope() {
            let dom = dom();
            let app = dom.select("#app").unwrap();
            assert_eq!(Selector::Scope.resolve(&*dom, app).unwrap(), app);
        }

        #[test]
        fn test_text_ignores_surrounding_whitespace() {
            let dom = VirtualDom::parse("<nav><a id=\"help\">  Help\n </a><a>Help me</a></nav>").unwrap();
            let help = dom.select("#help").unwrap();
            let all = Selector::text("Help").resolve_all(&dom, dom.document()).unwrap();
            assert_eq!(all, vec![help]);
            assert_eq!(Selector::text(" Help ").resolve(&dom, dom.document()).unwrap(), help);
            assert!(Selector::text("Hel p").resolve(&dom, dom.document()).is_err());
        }

        #[test]
        fn test_detached_scope_not_found() {
            let dom = dom();
            let app = dom.select("#app").unwrap();
            dom.remove(app);
            let err = Selector::css("li").resolve_all(&*dom, app).unwrap_err();
            assert!(err.is_not_found());
            assert!(err.message().contains("li"));
        }

        #[test]
        fn test_nth_and_xpath() {
            let dom = dom();
            let second = Selector::css("li").nth(1).resolve(&*dom, dom.document()).unwrap();
            assert_eq!(dom.snapshot(second).unwrap().text, "Ship it");
            let missing = Selector::css("li").nth(9).resolve(&*dom, dom.document());
            assert!(missing.unwrap_err().is_not_found());
            let old = Selector::xpath("//ul[@class='archive']/li")
                .resolve(&*dom, dom.document())
                .unwrap();
            assert_eq!(dom.snapshot(old).unwrap().text, "Old");
        }

        #[test]
        fn test_invalid_selector_surfaces() {
            let dom = dom();
            let err = Selector::css("li[").resolve(&*dom, dom.document()).unwrap_err();
            assert!(matches!(err, InteractorError::InvalidSelector { .. }));
        }
    }
}
