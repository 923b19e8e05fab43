//! Error types for reconciliation.
//!
//! Errors are categorized so the coordinator can report what went wrong
//! and what the operator has to do about it. Reconcilers never retry:
//! every error here is terminal for the resource that produced it.

use crate::types::ResourceKind;
use std::fmt;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed provider error carried as the source of [`Error::Provider`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A field the provider refuses to change differs from the desired value
    ImmutableField,
    /// A provider call failed (permissions, throttling, malformed input)
    Provider,
    /// The provider claims a sub-resource exists but it cannot be fetched
    InconsistentState,
    /// The stack was already rolled back, nothing was attempted
    RolledBack,
    /// The desired input could not be used (unreadable artifact, bad document)
    InvalidInput,
}

impl ErrorKind {
    /// Whether running again might succeed without changing anything.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider | Self::InconsistentState)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ImmutableField => "Immutable field conflict",
            Self::Provider => "Provider call failed",
            Self::InconsistentState => "Inconsistent provider state",
            Self::RolledBack => "Stack rolled back",
            Self::InvalidInput => "Invalid desired state",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::ImmutableField => {
                "Delete the resource in the provider console or revert the change to proceed"
            }
            Self::Provider => "Check credentials, permissions and request limits, then run again",
            Self::InconsistentState => "Wait for the provider to settle and run again",
            Self::RolledBack => "Fix the first reported error; later resources were not touched",
            Self::InvalidInput => "Fix the stack definition and run again",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Desired value for an immutable field disagrees with the provider.
    #[error(
        "{kind} \"{name}\" has {field} {actual:?} which differs from the supplied {field} {desired:?}; {field} cannot be updated"
    )]
    ImmutableField {
        /// Kind of the conflicting resource
        kind: ResourceKind,
        /// Resource name
        name: String,
        /// Field that cannot change
        field: &'static str,
        /// Value reported by the provider
        actual: String,
        /// Value requested by the caller
        desired: String,
    },

    /// A provider call failed.
    #[error("{operation} failed for {kind} \"{name}\": {source}")]
    Provider {
        /// Provider operation that failed (e.g. "UpdateRole")
        operation: &'static str,
        /// Kind of the resource being reconciled
        kind: ResourceKind,
        /// Resource name
        name: String,
        /// Underlying provider error
        #[source]
        source: BoxError,
    },

    /// The provider contradicted itself.
    #[error("{kind} \"{name}\" is inconsistent: {message}")]
    InconsistentState {
        /// Kind of the resource being reconciled
        kind: ResourceKind,
        /// Resource name
        name: String,
        /// What was expected and what was found
        message: String,
    },

    /// The stack is in rollback, so no provider call was made.
    #[error("stack is rolled back; skipped {kind} \"{name}\"")]
    RolledBack {
        /// Kind of the skipped resource
        kind: ResourceKind,
        /// Resource name
        name: String,
    },

    /// The desired state could not be used as given.
    #[error("invalid {kind} \"{name}\": {message}")]
    InvalidInput {
        /// Kind of the resource
        kind: ResourceKind,
        /// Resource name
        name: String,
        /// Reason the input is unusable
        message: String,
    },
}

impl Error {
    /// Create a provider error with operation context.
    pub fn provider(
        operation: &'static str,
        kind: ResourceKind,
        name: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Provider {
            operation,
            kind,
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create an immutable field conflict.
    pub fn immutable(
        kind: ResourceKind,
        name: impl Into<String>,
        field: &'static str,
        actual: impl Into<String>,
        desired: impl Into<String>,
    ) -> Self {
        Self::ImmutableField {
            kind,
            name: name.into(),
            field,
            actual: actual.into(),
            desired: desired.into(),
        }
    }

    /// Create an inconsistent state error.
    pub fn inconsistent(kind: ResourceKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentState {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid(kind: ResourceKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ImmutableField { .. } => ErrorKind::ImmutableField,
            Error::Provider { .. } => ErrorKind::Provider,
            Error::InconsistentState { .. } => ErrorKind::InconsistentState,
            Error::RolledBack { .. } => ErrorKind::RolledBack,
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Name of the resource the error is about.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        match self {
            Error::ImmutableField { name, .. }
            | Error::Provider { name, .. }
            | Error::InconsistentState { name, .. }
            | Error::RolledBack { name, .. }
            | Error::InvalidInput { name, .. } => name,
        }
    }
}
