//! Stack document and its coordination
//!
//! A stack is the unit of a run: a name, the user it belongs to, the
//! rollback state and the log of actions taken so far.

pub mod coordinator;
pub mod store;

pub use coordinator::{StackCoordinator, StackOptions};
pub use store::{FileStackStore, HttpStackStore, StackStore};

use declarative::RunContext;
use serde::{Deserialize, Serialize};

/// Persisted stack document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    pub user: String,
    /// Rollback state and action log
    #[serde(flatten)]
    pub run: RunContext,
}

impl Stack {
    /// A fresh, ready stack with no actions
    pub fn new(name: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            run: RunContext::new(),
        }
    }
}
