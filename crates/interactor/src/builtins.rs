//! The base interactor type: stock properties and thin DOM actions.

use crate::descriptor::{Action, Capability, Property, TypeDescriptor};
use crate::dom::DomEvent;
use crate::interactor::Interactor;
use crate::result::{InteractorError, InteractorResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Name of the base type
pub const BASE_TYPE: &str = "Interactor";

fn string_arg(args: &[Value], index: usize, what: &str) -> InteractorResult<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(InteractorError::authoring(format!(
            "{what} needs argument #{}",
            index + 1
        ))),
    }
}

fn action_arg(args: &[Value], what: &str) -> String {
    match string_arg(args, 0, what) {
        Ok(arg) => arg,
        Err(err) => panic!("{err}"),
    }
}

fn properties() -> Vec<(&'static str, Property)> {
    vec![
        (
            "exists",
            Property::new(|i, _| match i.element() {
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if err.is_not_found() => Ok(Value::Bool(false)),
                Err(err) => Err(err),
            })
            .with_message("expected %{@} %{- not} to exist"),
        ),
        (
            "text",
            Property::of_element(|el, _| Value::from(el.text.trim())),
        ),
        ("value", Property::of_element(|el, _| Value::from(el.value.as_str()))),
        (
            "checked",
            Property::of_element(|el, _| Value::Bool(el.checked))
                .with_message("expected %{@} %{- not} to be checked"),
        ),
        (
            "disabled",
            Property::of_element(|el, _| Value::Bool(el.disabled))
                .with_message("expected %{@} %{- not} to be disabled"),
        ),
        (
            "focused",
            Property::of_element(|el, _| Value::Bool(el.focused))
                .with_message("expected %{@} %{- not} to be focused"),
        ),
        ("tag", Property::of_element(|el, _| Value::from(el.tag.as_str()))),
        (
            "count",
            Property::new(|i, _| Ok(Value::from(i.elements()?.len()))),
        ),
        (
            "attribute",
            Property::new(|i, args| {
                let name = string_arg(args, 0, "attribute")?;
                Ok(i.element()?
                    .snapshot()
                    .attribute(&name)
                    .map_or(Value::Null, Value::from))
            }),
        ),
        (
            "has_class",
            Property::new(|i, args| {
                let class = string_arg(args, 0, "has_class")?;
                Ok(Value::Bool(i.element()?.snapshot().has_class(&class)))
            })
            .with_message("expected %{@} %{- not} to have class {arg}"),
        ),
    ]
}

fn event(interactor: &Interactor, event: DomEvent) -> Interactor {
    interactor.dispatch(event)
}

fn actions() -> Vec<(&'static str, Action)> {
    vec![
        ("click", Action::new(|i, _| event(i, DomEvent::Click))),
        ("focus", Action::new(|i, _| event(i, DomEvent::Focus))),
        ("blur", Action::new(|i, _| event(i, DomEvent::Blur))),
        (
            "keyup",
            Action::new(|i, args| {
                event(
                    i,
                    DomEvent::KeyUp {
                        key: action_arg(args, "keyup"),
                    },
                )
            }),
        ),
        (
            "trigger",
            Action::new(|i, args| {
                event(
                    i,
                    DomEvent::Custom {
                        name: action_arg(args, "trigger"),
                    },
                )
            }),
        ),
        (
            "fill",
            Action::new(|i, args| {
                let value = action_arg(args, "fill");
                i.interact(format!("fill {}", i.describe()), move |el| {
                    el.dispatch(&DomEvent::Input {
                        value: value.clone(),
                    })?;
                    el.dispatch(&DomEvent::Custom {
                        name: "change".into(),
                    })
                })
            }),
        ),
        (
            "check",
            Action::new(|i, _| {
                i.assert()
                    .not()
                    .message("%{@} is disabled")
                    .that("disabled")
                    .assert()
                    .not()
                    .message("%{@} is checked")
                    .that("checked")
                    .click()
            }),
        ),
        (
            "uncheck",
            Action::new(|i, _| {
                i.assert()
                    .not()
                    .message("%{@} is disabled")
                    .that("disabled")
                    .assert()
                    .message("%{@} is not checked")
                    .that("checked")
                    .click()
            }),
        ),
    ]
}

pub(crate) fn base_type() -> Arc<TypeDescriptor> {
    static BASE: OnceLock<Arc<TypeDescriptor>> = OnceLock::new();
    BASE.get_or_init(|| {
        let mut table = BTreeMap::new();
        for (name, property) in properties() {
            let _ = table.insert(name.to_string(), Capability::Property(property));
        }
        for (name, action) in actions() {
            let _ = table.insert(name.to_string(), Capability::Action(action));
        }
        Arc::new(TypeDescriptor::root(BASE_TYPE, table))
    })
    .clone()
}
