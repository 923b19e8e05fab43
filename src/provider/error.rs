//! Error types reported by cloud provider bindings.
//!
//! Provider errors are categorized from the provider's error code so that
//! reconcilers can tell an affirmative "does not exist" apart from every
//! other failure.

use declarative::{Lookup, ResourceKind};
use std::fmt;
use thiserror::Error;

/// Result type alias for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The resource does not exist
    NotFound,
    /// Credentials lack a permission
    AccessDenied,
    /// Request rate exceeded
    Throttled,
    /// Malformed request or document
    Validation,
    /// Account or resource quota reached (e.g. five policy versions)
    LimitExceeded,
    /// The resource already exists or is being modified
    Conflict,
    /// Other/unknown errors
    Other,
}

impl ProviderErrorKind {
    /// Categorize an error code as returned by the identity or compute API.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "NoSuchEntity" | "ResourceNotFoundException" => Self::NotFound,
            "AccessDenied" | "AccessDeniedException" | "UnauthorizedOperation" => {
                Self::AccessDenied
            }
            "Throttling" | "ThrottlingException" | "TooManyRequestsException" => Self::Throttled,
            "ValidationError"
            | "InvalidInput"
            | "MalformedPolicyDocument"
            | "InvalidParameterValueException" => Self::Validation,
            "LimitExceeded" | "CodeStorageExceededException" => Self::LimitExceeded,
            "EntityAlreadyExists" | "ResourceConflictException" | "ResourceInUseException" => {
                Self::Conflict
            }
            _ => Self::Other,
        }
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::AccessDenied => "Access denied",
            Self::Throttled => "Request throttled",
            Self::Validation => "Invalid request",
            Self::LimitExceeded => "Limit exceeded",
            Self::Conflict => "Resource conflict",
            Self::Other => "Unexpected provider error",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// An error returned by a provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Error category
    pub kind: ProviderErrorKind,
    /// Provider error code (e.g. "NoSuchEntity")
    pub code: String,
    /// Provider error message
    pub message: String,
}

impl ProviderError {
    /// Create an error from a provider error code, categorizing it.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: ProviderErrorKind::from_code(&code),
            code,
            message: message.into(),
        }
    }

    /// Create an identity-API "NoSuchEntity" error.
    pub fn no_such_entity(message: impl Into<String>) -> Self {
        Self::from_code("NoSuchEntity", message)
    }

    /// Create a compute-API "ResourceNotFoundException" error.
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::from_code("ResourceNotFoundException", message)
    }

    /// Whether the provider affirmatively reported the resource as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }
}

/// Conversion of provider results into reconciliation results
pub trait ProviderResultExt<T> {
    /// Attach operation and resource context to a failure
    fn for_resource(self, operation: &'static str, kind: ResourceKind, name: &str)
    -> declarative::Result<T>;

    /// Like [`for_resource`](Self::for_resource), but a not-found error
    /// becomes [`Lookup::NotFound`]
    fn lookup(self, operation: &'static str, kind: ResourceKind, name: &str)
    -> declarative::Result<Lookup<T>>;
}

impl<T> ProviderResultExt<T> for ProviderResult<T> {
    fn for_resource(
        self,
        operation: &'static str,
        kind: ResourceKind,
        name: &str,
    ) -> declarative::Result<T> {
        self.map_err(|e| {
            log::warn!("{operation} failed for {kind} \"{name}\": {e}");
            declarative::Error::provider(operation, kind, name, e)
        })
    }

    fn lookup(
        self,
        operation: &'static str,
        kind: ResourceKind,
        name: &str,
    ) -> declarative::Result<Lookup<T>> {
        match self {
            Ok(found) => Ok(Lookup::Found(found)),
            Err(e) if e.is_not_found() => {
                log::debug!("{kind} \"{name}\" does not exist");
                Ok(Lookup::NotFound)
            }
            Err(e) => Err(e).for_resource(operation, kind, name),
        }
    }
}
