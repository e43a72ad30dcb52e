//! Interactor: convergent DOM interactions and auto-retrying assertions
//!
//! An [`Interactor`] is an immutable chain of steps bound to a selector.
//! Awaiting it runs the chain: actions fire once, assertions are polled
//! until they pass or time out, and waits sleep. Elements are looked up
//! when each step runs, never when the chain is built.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    INTERACTOR Architecture                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Interactor │    │Convergence │    │  Poller    │            │
//! │   │ (extend,   │───►│ (immutable │───►│  (when,    │            │
//! │   │  assert)   │    │  queue)    │    │  remains)  │            │
//! │   └─────┬──────┘    └────────────┘    └────────────┘            │
//! │         │ Selector                                               │
//! │   ┌─────▼──────┐    ┌────────────┐                              │
//! │   │ Resolver   │───►│ElementAccess│  (VirtualDom, drivers)      │
//! │   └────────────┘    └────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use interactor::prelude::*;
//!
//! let dom = Arc::new(VirtualDom::parse(r#"<input type="checkbox" id="agree">"#)?);
//! Interactor::new(dom.clone(), "#agree")
//!     .check()
//!     .assert().that("checked")
//!     .await?;
//! ```

#![warn(missing_docs)]

mod builtins;
mod config;
mod convergence;
mod descriptor;
pub mod dom;
mod format;
mod interactor;
mod queue;
mod result;
mod selector;
mod when;

pub use builtins::BASE_TYPE;
pub use config::{
    Defaults, PollConfig, PollOverrides, DEFAULT_INTERVAL_MS, DEFAULT_REMAINS_MS,
    DEFAULT_TIMEOUT_MS, ENV_INTERVAL_MS, ENV_REMAINS_MS, ENV_TIMEOUT_MS,
};
pub use convergence::{ConvergeStats, Convergence, StepReport};
pub use descriptor::{
    extend, truthy, Action, ActionFn, AssertFn, Capability, ChildField, GetterFn, Property,
    TypeDefinition, TypeDescriptor, TypeOptions,
};
pub use dom::{
    Dom, DomEvent, ElementAccess, ElementHandle, ElementSnapshot, NodeId, Query, VirtualDom,
};
pub use format::{format_message, Message, DEFAULT_SUBJECT};
pub use interactor::{Assertions, Interactor};
pub use queue::{Delay, Queue, Step, StepFn, StepKind, WaitFactory};
pub use result::{InteractorError, InteractorResult};
pub use selector::Selector;
pub use when::{always, poll, poll_async, when, when_async, PollOutcome};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::*;
    pub use super::convergence::*;
    pub use super::descriptor::*;
    pub use super::dom::{
        Dom, DomEvent, ElementAccess, ElementHandle, ElementSnapshot, NodeId, Query, VirtualDom,
    };
    pub use super::format::*;
    pub use super::interactor::*;
    pub use super::queue::*;
    pub use super::result::*;
    pub use super::selector::*;
    pub use super::when::*;
    pub use serde_json::{json, Value};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::prelude::*;

    mod prelude_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_prelude_covers_a_chain() {
            let dom = Arc::new(VirtualDom::parse(r#"<input type="checkbox" id="agree">"#).unwrap());
            let stats = Interactor::new(dom.clone(), "#agree")
                .check()
                .assert()
                .that("checked")
                .await
                .unwrap();
            assert_eq!(stats.steps.len(), 5);
            assert_eq!(stats.value, json!(true));
        }

        #[test]
        fn test_defaults_feed_poll_config() {
            let config = Defaults::from_yaml_str("timeout_ms: 75").unwrap().to_poll_config();
            assert_eq!(config.timeout, Some(Duration::from_millis(75)));
        }
    }
}
