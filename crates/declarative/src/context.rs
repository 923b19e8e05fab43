//! Run context: rollback state and action log
//!
//! A [`RunContext`] is passed into every reconciliation entry point. It is
//! the only mutable state shared across resources in a run, and it only
//! changes in two ways: the one-way flip from ready to rollback, and the
//! recording of actions.

use crate::error::{Error, Result};
use crate::types::{Outcome, ResourceKind};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether mutations are still permitted in this run
///
/// Serialized by name. Deserializing also accepts the numeric codes the
/// stack service stores (see [`RunState::code`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "StoredRunState")]
pub enum RunState {
    /// Mutations permitted
    #[default]
    Ready,
    /// A resource failed; no further mutation is attempted this run
    Rollback,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Rollback => "rollback",
        }
    }

    /// Numeric code used by the stack service (0 ready, 1 rollback)
    pub fn code(self) -> u8 {
        match self {
            Self::Ready => 0,
            Self::Rollback => 1,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRunState {
    Code(u64),
    Name(String),
}

impl TryFrom<StoredRunState> for RunState {
    type Error = String;

    fn try_from(value: StoredRunState) -> std::result::Result<Self, Self::Error> {
        match value {
            StoredRunState::Code(0) => Ok(Self::Ready),
            StoredRunState::Code(1) => Ok(Self::Rollback),
            StoredRunState::Code(code) => Err(format!("unknown stack state {code}")),
            StoredRunState::Name(name) => match name.as_str() {
                "ready" => Ok(Self::Ready),
                "rollback" => Ok(Self::Rollback),
                _ => Err(format!("unknown stack state \"{name}\"")),
            },
        }
    }
}

/// A change marker recorded in the stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Stable key: operation kind plus resource name
    pub name: String,
    /// Opaque payload describing what happened
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Action {
    /// Action name for an operation on a resource (e.g. `create-role-svc`)
    pub fn key(kind: ResourceKind, name: &str) -> String {
        format!("create-{}-{}", kind.slug(), name)
    }

    /// Build the action recorded after reconciling a resource
    pub fn reconciled(kind: ResourceKind, name: &str, outcome: Outcome, at: DateTime<Utc>) -> Self {
        Self {
            name: Self::key(kind, name),
            data: serde_json::json!({
                "kind": kind,
                "name": name,
                "outcome": outcome,
                "recordedAt": at.to_rfc3339(),
            }),
        }
    }
}

/// Rollback state plus the action log of one stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default)]
    state: RunState,
    #[serde(default)]
    actions: IndexMap<String, Action>,
}

impl RunContext {
    /// Create a fresh, ready context
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Check if mutations are still permitted
    pub fn is_ready(&self) -> bool {
        self.state == RunState::Ready
    }

    /// Fail with [`Error::RolledBack`] unless the context is ready
    pub fn ensure_ready(&self, kind: ResourceKind, name: &str) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            log::debug!("Skipping {kind} \"{name}\": stack is rolled back");
            Err(Error::RolledBack {
                kind,
                name: name.to_string(),
            })
        }
    }

    /// Flip into rollback because of `err`
    ///
    /// There is no way back to ready within a run.
    pub fn rollback(&mut self, err: &Error) {
        if self.is_ready() {
            log::warn!("Rolling back stack after {}: {err}", err.kind());
        }
        self.state = RunState::Rollback;
    }

    /// Flip into rollback and hand the error back to the caller
    pub fn fail(&mut self, err: Error) -> Error {
        self.rollback(&err);
        err
    }

    /// Look up a recorded action by name
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// Record an action, replacing any previous entry with the same name
    pub fn record_action(&mut self, action: Action) {
        self.actions.insert(action.name.clone(), action);
    }

    /// All recorded actions in insertion order
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }
}
