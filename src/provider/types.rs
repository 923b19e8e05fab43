//! Request and response shapes exchanged with provider bindings
//!
//! These mirror what the identity and compute APIs accept and return,
//! flattened to the fields reconciliation reads or writes.

use declarative::TagSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment variables of a function
pub type EnvironmentVariables = BTreeMap<String, String>;

// ============================================================================
// Identity
// ============================================================================

/// A role as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    pub arn: String,
    pub path: String,
    /// Trust policy, URL-encoded JSON as stored by the provider
    #[serde(default)]
    pub assume_role_policy_document: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_session_duration: Option<u32>,
    /// ARN of the permissions boundary policy
    #[serde(default)]
    pub permissions_boundary: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleRequest {
    pub name: String,
    pub path: Option<String>,
    /// Trust policy as JSON text
    pub assume_role_policy_document: String,
    pub description: Option<String>,
    pub max_session_duration: Option<u32>,
    pub permissions_boundary: Option<String>,
    pub tags: TagSet,
}

/// A managed policy as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedPolicy {
    pub name: String,
    pub arn: String,
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_version_id: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
}

/// One stored version of a managed policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    /// "v1", "v2", ...
    pub version_id: String,
    /// URL-encoded JSON as stored by the provider
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub is_default_version: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub path: Option<String>,
    /// Policy document as JSON text
    pub document: String,
    pub description: Option<String>,
    pub tags: TagSet,
}

/// A managed policy attached to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedPolicy {
    pub policy_name: String,
    pub policy_arn: String,
}

/// One page of attached policies
///
/// `marker` is set when the listing is truncated and must be passed to the
/// next call to continue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachedPoliciesPage {
    pub policies: Vec<AttachedPolicy>,
    pub marker: Option<String>,
}

// ============================================================================
// Compute
// ============================================================================

/// Function configuration as reported by the compute provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfiguration {
    pub function_name: String,
    pub function_arn: String,
    pub role: String,
    pub handler: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kms_key_arn: Option<String>,
    #[serde(default)]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub environment: Option<EnvironmentVariables>,
    /// Layer version ARNs
    #[serde(default)]
    pub layers: Option<Vec<String>>,
    /// Base64 SHA-256 of the deployed package
    #[serde(default)]
    pub code_sha256: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A function together with its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionState {
    pub configuration: FunctionConfiguration,
    #[serde(default)]
    pub tags: TagSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub role: String,
    pub handler: String,
    pub runtime: String,
    pub description: Option<String>,
    pub environment: Option<EnvironmentVariables>,
    pub kms_key_arn: Option<String>,
    pub memory_size: Option<u32>,
    pub timeout: Option<u32>,
    pub layers: Option<Vec<String>>,
    pub tags: TagSet,
    /// Zip package uploaded inline
    pub zip_file: Vec<u8>,
    pub publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFunctionConfigurationRequest {
    pub function_name: String,
    pub role: String,
    pub handler: String,
    pub runtime: String,
    pub description: Option<String>,
    pub environment: Option<EnvironmentVariables>,
    pub kms_key_arn: Option<String>,
    pub memory_size: Option<u32>,
    pub timeout: Option<u32>,
    pub layers: Option<Vec<String>>,
}
