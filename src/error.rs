//! Error types for eventgate.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific failure. Unknown discrete keys are programming errors and
//! are always surfaced, never swallowed.

use thiserror::Error;

/// Top-level error type for eventgate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A discrete event key outside the declared domain was emitted or subscribed to.
    #[error("Unknown event key: {key}")]
    UnknownEventKey {
        /// Debug rendering of the offending key.
        key: String,
    },

    /// A catalog condition referenced a flag that was never declared.
    #[error("Unknown flag: {name}")]
    UnknownFlag {
        /// Flag name.
        name: String,
    },

    /// A flag or condition name was declared twice in one catalog.
    #[error("Name '{name}' is already declared in this catalog")]
    DuplicateName {
        /// Conflicting name.
        name: String,
    },

    /// A flag write was attempted on a static catalog.
    #[error("Catalog is static; flag '{name}' cannot be changed")]
    CatalogFrozen {
        /// Flag name.
        name: String,
    },

    /// A serialized catalog definition could not be parsed.
    #[error("Invalid catalog definition: {reason}")]
    InvalidDefinition {
        /// Parser message.
        reason: String,
    },

    /// The poll driver worker could not be started.
    #[error("Failed to spawn poll worker: {message}")]
    Spawn {
        /// OS error text.
        message: String,
    },

    /// A predicate or handler panicked on the poll driver worker.
    #[error("Poll worker panicked: {message}")]
    PollWorkerPanicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Registry state became unusable (poisoned lock).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl DispatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an unknown-key error from any debuggable key.
    #[must_use]
    pub fn unknown_key(key: &impl std::fmt::Debug) -> Self {
        Self::UnknownEventKey {
            key: format!("{key:?}"),
        }
    }

    /// Returns true if this is an unknown discrete key error.
    #[must_use]
    pub const fn is_unknown_key(&self) -> bool {
        matches!(self, Self::UnknownEventKey { .. })
    }

    /// Returns true if this error came from catalog construction or flag access.
    #[must_use]
    pub const fn is_catalog_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownFlag { .. }
                | Self::DuplicateName { .. }
                | Self::CatalogFrozen { .. }
                | Self::InvalidDefinition { .. }
        )
    }
}

/// Result type alias for eventgate operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

pub(crate) fn lock_err(context: &'static str) -> DispatchError {
    DispatchError::internal(format!("poisoned lock: {context}"))
}
