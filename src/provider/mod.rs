//! Provider abstraction for identity and compute APIs.
//!
//! The [`IdentityProvider`] and [`ComputeProvider`] traits are the whole
//! surface reconciliation needs from a cloud. They allow different bindings
//! (an SDK client, the in-memory [`MemoryCloud`] used by `plan` and tests).
//!
//! Calls are blocking and are issued one at a time; a binding is free to
//! drive an async client underneath.

pub mod error;
pub mod memory;
pub mod types;

pub use error::{ProviderResult, ProviderResultExt};
pub use memory::{CloudSnapshot, MemoryCloud};
pub use types::{
    AttachedPoliciesPage, AttachedPolicy, CreateFunctionRequest, CreatePolicyRequest,
    CreateRoleRequest, EnvironmentVariables, FunctionConfiguration, FunctionState, ManagedPolicy,
    PolicyVersion, Role, UpdateFunctionConfigurationRequest,
};

use declarative::TagSet;

/// Identity provider operations (roles, managed policies, attachments).
pub trait IdentityProvider {
    /// Fetch a role by name.
    fn get_role(&self, name: &str) -> ProviderResult<Role>;

    /// Create a role with every supplied field.
    fn create_role(&self, request: &CreateRoleRequest) -> ProviderResult<Role>;

    /// Set description and maximum session duration in one call.
    fn update_role(
        &self,
        name: &str,
        description: Option<&str>,
        max_session_duration: u32,
    ) -> ProviderResult<()>;

    /// Set the permissions boundary of a role.
    fn put_role_permissions_boundary(&self, name: &str, boundary_arn: &str) -> ProviderResult<()>;

    /// Remove the permissions boundary of a role.
    fn delete_role_permissions_boundary(&self, name: &str) -> ProviderResult<()>;

    /// Replace the trust policy of a role.
    fn update_assume_role_policy(&self, name: &str, document: &str) -> ProviderResult<()>;

    fn tag_role(&self, name: &str, tags: &TagSet) -> ProviderResult<()>;

    fn untag_role(&self, name: &str, keys: &[String]) -> ProviderResult<()>;

    /// List one page of managed policies attached to a role.
    fn list_attached_role_policies(
        &self,
        role_name: &str,
        marker: Option<&str>,
    ) -> ProviderResult<AttachedPoliciesPage>;

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()>;

    /// Fetch a managed policy by ARN.
    fn get_policy(&self, arn: &str) -> ProviderResult<ManagedPolicy>;

    /// Fetch one stored version of a managed policy.
    fn get_policy_version(&self, arn: &str, version_id: &str) -> ProviderResult<PolicyVersion>;

    fn create_policy(&self, request: &CreatePolicyRequest) -> ProviderResult<ManagedPolicy>;

    /// Store a new version of a policy document.
    fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ProviderResult<PolicyVersion>;

    fn tag_policy(&self, arn: &str, tags: &TagSet) -> ProviderResult<()>;

    fn untag_policy(&self, arn: &str, keys: &[String]) -> ProviderResult<()>;
}

/// Compute provider operations (functions).
pub trait ComputeProvider {
    /// Fetch a function's configuration and tags by name.
    fn get_function(&self, name: &str) -> ProviderResult<FunctionState>;

    /// Create a function from an inline zip package.
    fn create_function(&self, request: &CreateFunctionRequest)
    -> ProviderResult<FunctionConfiguration>;

    /// Replace a function's configuration in one call.
    fn update_function_configuration(
        &self,
        request: &UpdateFunctionConfigurationRequest,
    ) -> ProviderResult<FunctionConfiguration>;

    /// Upload a new zip package.
    fn update_function_code(
        &self,
        name: &str,
        zip_file: &[u8],
        publish: bool,
    ) -> ProviderResult<FunctionConfiguration>;

    /// Tag a function by ARN.
    fn tag_resource(&self, arn: &str, tags: &TagSet) -> ProviderResult<()>;

    /// Untag a function by ARN.
    fn untag_resource(&self, arn: &str, keys: &[String]) -> ProviderResult<()>;
}
