//! XPath location-path subset.
//!
//! Supported: absolute (`/`, `//`) and relative (`./`, `.//`, bare) paths,
//! name tests and `*`, `.` and `..` steps, and predicates `[n]`, `[@a]`,
//! `[@a='v']`, `[text()='v']`, `[.='v']` and `[contains(@a|text()|., 'v')]`.
//!
//! Whatever the path says, results are restricted to the subtree of the
//! scope the expression is evaluated in.

use super::virtual_dom::Tree;
use super::NodeId;
use crate::result::{InteractorError, InteractorResult};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Attribute(String),
    Text,
    StringValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Exists(String),
    Equals(Operand, String),
    Contains(Operand, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    SelfNode,
    Parent,
    Name {
        name: Option<String>,
        predicates: Vec<Predicate>,
    },
}

/// Parsed XPath expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathExpr {
    source: String,
    absolute: bool,
    steps: Vec<(Axis, Step)>,
}

impl XPathExpr {
    /// Parse an expression
    pub fn parse(source: &str) -> InteractorResult<Self> {
        Parser {
            src: source.trim(),
            pos: 0,
        }
        .parse()
        .map_err(|message| InteractorError::invalid_selector(format!("xpath({source})"), message))
    }

    /// Expression text as written
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn evaluate(&self, tree: &Tree, scope: NodeId) -> InteractorResult<Vec<NodeId>> {
        let mut context: Vec<NodeId> = vec![if self.absolute {
            tree.document()
        } else {
            scope
        }];

        for (axis, step) in &self.steps {
            let mut next: Vec<NodeId> = Vec::new();
            let mut seen = HashSet::new();
            for node in &context {
                for found in apply_step(tree, *node, *axis, step) {
                    if seen.insert(found) {
                        next.push(found);
                    }
                }
            }
            context = next;
        }

        let set: HashSet<NodeId> = context.into_iter().collect();
        Ok(tree.in_document_order(scope, &set))
    }
}

fn apply_step(tree: &Tree, node: NodeId, axis: Axis, step: &Step) -> Vec<NodeId> {
    match step {
        Step::SelfNode => vec![node],
        Step::Parent => tree.parent(node).into_iter().collect(),
        Step::Name { name, predicates } => {
            let origins = match axis {
                Axis::Child => vec![node],
                Axis::Descendant => {
                    let mut all = vec![node];
                    all.extend(tree.descendants(node));
                    all
                }
            };
            origins
                .into_iter()
                .flat_map(|origin| {
                    let group: Vec<NodeId> = tree
                        .element_children(origin)
                        .into_iter()
                        .filter(|child| {
                            name.as_ref().map_or(true, |name| {
                                tree.element(*child).is_some_and(|e| e.tag == *name)
                            })
                        })
                        .collect();
                    filter_predicates(tree, group, predicates)
                })
                .collect()
        }
    }
}

fn filter_predicates(tree: &Tree, group: Vec<NodeId>, predicates: &[Predicate]) -> Vec<NodeId> {
    predicates.iter().fold(group, |group, predicate| match predicate {
        Predicate::Position(n) => group.get(n - 1).copied().into_iter().collect(),
        other => group
            .into_iter()
            .filter(|node| test_predicate(tree, *node, other))
            .collect(),
    })
}

fn operand_value(tree: &Tree, node: NodeId, operand: &Operand) -> Option<String> {
    match operand {
        Operand::Attribute(name) => tree.element(node)?.attr(name).map(str::to_string),
        Operand::Text => Some(tree.own_text(node).trim().to_string()),
        Operand::StringValue => Some(tree.text_content(node).trim().to_string()),
    }
}

fn test_predicate(tree: &Tree, node: NodeId, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Position(_) => true,
        Predicate::Exists(name) => tree.element(node).is_some_and(|e| e.attr(name).is_some()),
        Predicate::Equals(operand, value) => {
            operand_value(tree, node, operand).is_some_and(|actual| actual == *value)
        }
        Predicate::Contains(operand, value) => {
            operand_value(tree, node, operand).is_some_and(|actual| actual.contains(value.as_str()))
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn name(&mut self) -> &'a str {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn literal(&mut self) -> Result<String, String> {
        self.skip_ws();
        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err("expected a quoted string".into()),
        };
        self.pos += 1;
        let rest = self.rest();
        let end = rest.find(quote).ok_or("unterminated string literal")?;
        self.pos += end + 1;
        Ok(rest[..end].to_string())
    }

    fn parse(mut self) -> Result<XPathExpr, String> {
        if self.src.is_empty() {
            return Err("empty expression".into());
        }

        let relative_dot = self.rest().starts_with("./") || self.rest().starts_with(".//");
        let absolute = !relative_dot && self.rest().starts_with('/');
        if relative_dot {
            self.pos += 1;
        }

        let mut steps = Vec::new();
        let mut axis = if self.eat("//") {
            Axis::Descendant
        } else {
            let _ = self.eat("/");
            Axis::Child
        };

        loop {
            steps.push((axis, self.step()?));
            self.skip_ws();
            if self.rest().is_empty() {
                break;
            }
            axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                return Err(format!("unexpected '{}'", self.rest()));
            };
        }

        Ok(XPathExpr {
            source: self.src.to_string(),
            absolute,
            steps,
        })
    }

    fn step(&mut self) -> Result<Step, String> {
        if self.eat("..") {
            return Ok(Step::Parent);
        }
        if self.eat(".") {
            return Ok(Step::SelfNode);
        }
        let name = if self.eat("*") {
            None
        } else {
            let name = self.name();
            if name.is_empty() {
                return Err("expected a node name".into());
            }
            Some(name.to_ascii_lowercase())
        };
        let mut predicates = Vec::new();
        while self.eat("[") {
            predicates.push(self.predicate()?);
            if !self.eat("]") {
                return Err("expected ']'".into());
            }
        }
        Ok(Step::Name { name, predicates })
    }

    fn operand(&mut self) -> Result<Operand, String> {
        if self.eat("@") {
            let name = self.name();
            if name.is_empty() {
                return Err("expected an attribute name".into());
            }
            Ok(Operand::Attribute(name.to_ascii_lowercase()))
        } else if self.eat("text()") {
            Ok(Operand::Text)
        } else if self.eat(".") {
            Ok(Operand::StringValue)
        } else {
            Err("expected @attribute, text() or '.'".into())
        }
    }

    fn predicate(&mut self) -> Result<Predicate, String> {
        self.skip_ws();
        let digits: &str = {
            let rest = self.rest();
            let len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            &rest[..len]
        };
        if !digits.is_empty() {
            self.pos += digits.len();
            let position: usize = digits.parse().map_err(|_| "invalid position")?;
            if position == 0 {
                return Err("positions start at 1".into());
            }
            return Ok(Predicate::Position(position));
        }

        if self.eat("contains(") {
            let operand = self.operand()?;
            if !self.eat(",") {
                return Err("expected ',' in contains()".into());
            }
            let value = self.literal()?;
            if !self.eat(")") {
                return Err("expected ')' after contains()".into());
            }
            return Ok(Predicate::Contains(operand, value));
        }

        let operand = self.operand()?;
        if self.eat("=") {
            return Ok(Predicate::Equals(operand, self.literal()?));
        }
        match operand {
            Operand::Attribute(name) => Ok(Predicate::Exists(name)),
            _ => Err("expected '=' after text() or '.'".into()),
        }
    }
}
