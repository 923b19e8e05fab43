//! Reconciler trait for declarative state management
//!
//! A reconciler knows how to read one kind of provider resource, create it
//! from a desired description, and bring an existing one in line with that
//! description.

use crate::error::Result;
use crate::types::{Converged, Lookup, ResourceKind};

/// Core trait for reconcilable resource kinds
///
/// Implementations must keep `update` minimal: compare each field group and
/// issue a provider call only for groups that differ, so reconciling an
/// already converged resource issues no mutating call at all. Steps run in a
/// fixed order and the first failing step aborts the rest.
///
/// # Example
///
/// ```ignore
/// use declarative::{Converged, Lookup, Reconciler, ResourceKind, Result};
///
/// struct Buckets<'a> { store: &'a Store }
///
/// impl Reconciler for Buckets<'_> {
///     type Desired = BucketSpec;
///     type Actual = Bucket;
///
///     fn kind(&self) -> ResourceKind { ResourceKind::Role }
///     fn name<'d>(&self, desired: &'d BucketSpec) -> &'d str { &desired.name }
///
///     fn get(&self, name: &str) -> Result<Lookup<Bucket>> {
///         Ok(self.store.find(name).into())
///     }
///
///     fn create(&self, desired: &BucketSpec) -> Result<Bucket> {
///         self.store.create(desired)
///     }
///
///     fn update(&self, actual: Bucket, desired: &BucketSpec) -> Result<Converged<Bucket>> {
///         Ok(Converged::unchanged(actual))
///     }
/// }
/// ```
pub trait Reconciler {
    /// Caller-supplied description of the resource
    type Desired;
    /// Resource as reported by the provider
    type Actual;

    /// Resource kind, used for errors and action names
    fn kind(&self) -> ResourceKind;

    /// Name that identifies the desired resource at the provider
    fn name<'d>(&self, desired: &'d Self::Desired) -> &'d str;

    /// Read the current state
    ///
    /// Returns `Lookup::NotFound` only when the provider affirmatively
    /// reports the resource as absent.
    fn get(&self, name: &str) -> Result<Lookup<Self::Actual>>;

    /// Create the resource with every supplied field
    fn create(&self, desired: &Self::Desired) -> Result<Self::Actual>;

    /// Bring an existing resource in line with the desired description
    fn update(&self, actual: Self::Actual, desired: &Self::Desired)
    -> Result<Converged<Self::Actual>>;
}
