//! Result and error types for Interactor.

use thiserror::Error;

/// Result type for Interactor operations
pub type InteractorResult<T> = Result<T, InteractorError>;

/// Errors that can occur while building or running interactors.
///
/// Every execution-time rejection surfaces as one of these variants carrying a
/// fully formatted message. Poll timeouts are not a variant of their own: the
/// poller re-raises the last failure it observed so messages stay specific.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InteractorError {
    /// Selector resolved to zero elements where one was required
    #[error("{message}")]
    NotFound {
        /// Human readable selector description
        selector: String,
        /// Formatted message
        message: String,
    },

    /// A registered assertion (or polled predicate) failed
    #[error("{message}")]
    AssertionFailed {
        /// Formatted message
        message: String,
    },

    /// An action step failed; actions are never retried
    #[error("{message}")]
    ActionFailed {
        /// Formatted message
        message: String,
    },

    /// Invalid type definition or use of an unregistered capability
    #[error("invalid interactor definition: {message}")]
    Authoring {
        /// Error message
        message: String,
    },

    /// Selector syntax the resolver does not understand
    #[error("invalid selector {selector}: {message}")]
    InvalidSelector {
        /// Raw selector text
        selector: String,
        /// Error message
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl InteractorError {
    /// Build a `NotFound` error for a selector description
    #[must_use]
    pub fn not_found(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        Self::NotFound {
            message: format!("did not find {selector}"),
            selector,
        }
    }

    /// Build an `AssertionFailed` error
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Build an `ActionFailed` error
    #[must_use]
    pub fn action(message: impl Into<String>) -> Self {
        Self::ActionFailed {
            message: message.into(),
        }
    }

    /// Build an `Authoring` error
    #[must_use]
    pub fn authoring(message: impl Into<String>) -> Self {
        Self::Authoring {
            message: message.into(),
        }
    }

    /// Build an `InvalidSelector` error
    #[must_use]
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// The formatted message, without any variant prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message, .. }
            | Self::AssertionFailed { message }
            | Self::ActionFailed { message }
            | Self::Authoring { message }
            | Self::InvalidSelector { message, .. }
            | Self::Config { message } => message,
        }
    }

    /// Whether this is a `NotFound` error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is an `AssertionFailed` error
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Self::AssertionFailed { .. })
    }
}

impl From<serde_yaml_ng::Error> for InteractorError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for InteractorError {
    fn from(err: std::io::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
