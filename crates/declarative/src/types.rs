//! Core types for declarative reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of resource being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// IAM role
    Role,
    /// IAM managed policy
    ManagedPolicy,
    /// Serverless function
    Function,
    /// Policy attached to a role
    PolicyAttachment,
    /// Function with its execution role and policy
    Lambda,
}

impl ResourceKind {
    /// Short identifier used in action names (e.g. `create-role-<name>`)
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::ManagedPolicy => "managed-policy",
            Self::Function => "function",
            Self::PolicyAttachment => "policy-attachment",
            Self::Lambda => "lambda",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Role => "role",
            Self::ManagedPolicy => "managed policy",
            Self::Function => "function",
            Self::PolicyAttachment => "policy attachment",
            Self::Lambda => "lambda",
        };
        f.write_str(label)
    }
}

/// Result of reading a resource from the provider
///
/// `NotFound` means the provider affirmatively reported the resource as
/// absent. Transport or permission failures are errors, never `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Resource exists
    Found(T),
    /// Provider reported the resource does not exist
    NotFound,
}

impl<T> Lookup<T> {
    /// Check if the resource was found
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Convert into an `Option`, dropping the distinction from errors
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    /// Map the found value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None => Self::NotFound,
        }
    }
}

/// What a reconciliation did to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Resource did not exist and was created
    Created,
    /// Resource existed and at least one mutation was issued
    Updated,
    /// Resource already matched, no mutation was issued
    Unchanged,
}

impl Outcome {
    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    /// Merge two outcomes of the same resource into one
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Created, _) | (_, Self::Created) => Self::Created,
            (Self::Updated, _) | (_, Self::Updated) => Self::Updated,
            _ => Self::Unchanged,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        };
        f.write_str(label)
    }
}

/// A reconciled resource together with what happened to it
#[derive(Debug, Clone, PartialEq)]
pub struct Converged<T> {
    pub outcome: Outcome,
    pub resource: T,
}

impl<T> Converged<T> {
    pub fn created(resource: T) -> Self {
        Self {
            outcome: Outcome::Created,
            resource,
        }
    }

    pub fn updated(resource: T) -> Self {
        Self {
            outcome: Outcome::Updated,
            resource,
        }
    }

    pub fn unchanged(resource: T) -> Self {
        Self {
            outcome: Outcome::Unchanged,
            resource,
        }
    }

    /// `Updated` if `changed`, `Unchanged` otherwise
    pub fn from_changed(changed: bool, resource: T) -> Self {
        if changed {
            Self::updated(resource)
        } else {
            Self::unchanged(resource)
        }
    }

    /// Take the resource, dropping the outcome
    pub fn into_inner(self) -> T {
        self.resource
    }
}

/// Summary of a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Count a failed resource
    pub fn add_failure(&mut self) {
        self.failed += 1;
    }
}
