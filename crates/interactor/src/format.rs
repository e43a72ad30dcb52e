//! Assertion message templates.
//!
//! - `%{@}` expands to the subject (a selector description, or `it`)
//! - `%{- text}` expands to `text` only when the assertion is negated
//!
//! A single space following an omitted negation is dropped too, so
//! `"%{@} is %{- not} checked"` reads `"#agree is checked"` or
//! `"#agree is not checked"`. Anything else is left verbatim.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Subject used when an interactor has no selector of its own
pub const DEFAULT_SUBJECT: &str = "it";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"%\{(?:(@)|- ?([^}]*))\}( ?)").expect("placeholder pattern is valid")
    })
}

/// Expand a message template
#[must_use]
pub fn format_message(template: &str, subject: &str, negated: bool) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            let trailing = caps.get(3).map_or("", |m| m.as_str());
            if caps.get(1).is_some() {
                format!("{subject}{trailing}")
            } else if negated {
                let text = caps.get(2).map_or("", |m| m.as_str());
                format!("{text}{trailing}")
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Message template paired with how it should be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    template: String,
    negated: bool,
}

impl Message {
    /// A plain, non-negated message
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            negated: false,
        }
    }

    /// Mark the message as describing a negated assertion
    #[must_use]
    pub const fn negated(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// Raw template
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether the negated text will be emitted
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Render against a subject
    #[must_use]
    pub fn render(&self, subject: &str) -> String {
        format_message(&self.template, subject, self.negated)
    }
}
