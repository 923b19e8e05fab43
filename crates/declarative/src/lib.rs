//! # Declarative
//!
//! A framework for declarative resource reconciliation.
//!
//! This crate provides the provider-agnostic pieces of idempotent
//! reconciliation: reading current state, diffing it against desired state,
//! and converging with the minimal set of mutations.
//!
//! ## Core Concepts
//!
//! - **Reconciler**: get/create/update contract for one resource kind
//! - **RunContext**: rollback state and action log shared by a run
//! - **converge**: the driver that gates on the run state, reads, branches
//!   to create or update, and rolls the run back on failure
//! - **TagDiff**: remove/upsert delta between two tag sets
//! - **Document equality**: structural comparison of JSON policy documents
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{converge, RunContext};
//!
//! let mut ctx = RunContext::new();
//! let role = converge(&roles, &mut ctx, &desired_role)?;
//! let policy = converge(&policies, &mut ctx, &desired_policy)?;
//! ```
//!
//! Once any call fails, `ctx` is in rollback and every later `converge`
//! returns [`Error::RolledBack`] without touching the provider.

pub mod context;
pub mod diff;
pub mod document;
pub mod error;
pub mod executor;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{Action, RunContext, RunState};
pub use diff::{TagDiff, TagSet, tag_set};
pub use document::{DocumentError, decode_document, documents_equal, matches_stored, to_document};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use executor::converge;
pub use resource::Reconciler;
pub use types::{Converged, Lookup, Outcome, ReconcileSummary, ResourceKind};
