//! Identity resources: roles, managed policies and their attachments

pub mod attachment;
pub mod document;
pub mod policy;
pub mod role;

pub use attachment::PolicyAttachment;
pub use document::{OneOrMany, PolicyDocument, PolicyStatement, Principal};
pub use policy::{PolicyReconciler, PolicySpec};
pub use role::{RoleReconciler, RoleSpec};
