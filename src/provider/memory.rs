//! In-memory cloud provider
//!
//! [`MemoryCloud`] implements both provider traits over shared in-process
//! state. It behaves like the real APIs where reconciliation can observe the
//! difference: documents come back URL-encoded, policies keep at most five
//! versions, functions report a base64 SHA-256 of their package, and absent
//! resources produce not-found errors. Every successful mutating call is
//! recorded, which makes it the provider double for tests and the backend of
//! the offline `plan` command.

use super::error::{ProviderError, ProviderResult};
use super::types::{
    AttachedPoliciesPage, AttachedPolicy, CreateFunctionRequest, CreatePolicyRequest,
    CreateRoleRequest, FunctionConfiguration, FunctionState, ManagedPolicy, PolicyVersion, Role,
    UpdateFunctionConfigurationRequest,
};
use super::{ComputeProvider, IdentityProvider};
use crate::lambda::artifact::code_sha256;
use declarative::TagSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Versions a managed policy may keep
pub const MAX_POLICY_VERSIONS: usize = 5;

const DEFAULT_PATH: &str = "/";
const DEFAULT_MAX_SESSION_DURATION: u32 = 3600;
const DEFAULT_PAGE_SIZE: usize = 100;

/// A mutating call issued against the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutatingCall {
    /// Operation name (e.g. "CreateRole")
    pub operation: String,
    /// Name or ARN of the target resource
    pub target: String,
}

/// A managed policy with its stored versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    pub policy: ManagedPolicy,
    #[serde(default)]
    pub versions: Vec<PolicyVersion>,
}

/// Serializable picture of the whole cloud
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSnapshot {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub policies: Vec<StoredPolicy>,
    /// Role name -> attached policies
    #[serde(default)]
    pub attachments: BTreeMap<String, Vec<AttachedPolicy>>,
    #[serde(default)]
    pub functions: Vec<FunctionState>,
}

#[derive(Debug, Default)]
struct CloudState {
    roles: BTreeMap<String, Role>,
    /// Keyed by ARN
    policies: BTreeMap<String, StoredPolicy>,
    attachments: BTreeMap<String, Vec<AttachedPolicy>>,
    functions: BTreeMap<String, FunctionState>,
    calls: Vec<MutatingCall>,
    requests: usize,
    failures: BTreeMap<String, ProviderError>,
    page_size: usize,
}

impl CloudState {
    fn record(&mut self, operation: &str, target: &str) {
        log::debug!("{operation} {target}");
        self.calls.push(MutatingCall {
            operation: operation.to_string(),
            target: target.to_string(),
        });
    }

    fn role_mut(&mut self, name: &str) -> ProviderResult<&mut Role> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| ProviderError::no_such_entity(format!("The role with name {name} cannot be found.")))
    }

    fn policy_mut(&mut self, arn: &str) -> ProviderResult<&mut StoredPolicy> {
        self.policies
            .get_mut(arn)
            .ok_or_else(|| ProviderError::no_such_entity(format!("Policy {arn} does not exist or is not attachable.")))
    }

    fn function_mut(&mut self, name: &str) -> ProviderResult<&mut FunctionState> {
        self.functions
            .get_mut(name)
            .ok_or_else(|| ProviderError::resource_not_found(format!("Function not found: {name}")))
    }

    fn function_by_arn_mut(&mut self, arn: &str) -> ProviderResult<&mut FunctionState> {
        self.functions
            .values_mut()
            .find(|f| f.configuration.function_arn == arn)
            .ok_or_else(|| ProviderError::resource_not_found(format!("Function not found: {arn}")))
    }
}

/// In-memory implementation of [`IdentityProvider`] and [`ComputeProvider`]
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other.
#[derive(Debug, Clone)]
pub struct MemoryCloud {
    account_id: String,
    region: String,
    state: Arc<Mutex<CloudState>>,
}

impl MemoryCloud {
    /// Create an empty cloud for an account and region
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            state: Arc::new(Mutex::new(CloudState {
                page_size: DEFAULT_PAGE_SIZE,
                ..CloudState::default()
            })),
        }
    }

    /// Create a cloud seeded from a snapshot
    pub fn from_snapshot(
        account_id: impl Into<String>,
        region: impl Into<String>,
        snapshot: CloudSnapshot,
    ) -> Self {
        let cloud = Self::new(account_id, region);
        {
            let mut state = cloud.lock();
            for role in snapshot.roles {
                state.roles.insert(role.name.clone(), role);
            }
            for stored in snapshot.policies {
                state.policies.insert(stored.policy.arn.clone(), stored);
            }
            state.attachments = snapshot.attachments;
            for function in snapshot.functions {
                state
                    .functions
                    .insert(function.configuration.function_name.clone(), function);
            }
        }
        cloud
    }

    /// Export the current resources
    pub fn snapshot(&self) -> CloudSnapshot {
        let state = self.lock();
        CloudSnapshot {
            roles: state.roles.values().cloned().collect(),
            policies: state.policies.values().cloned().collect(),
            attachments: state.attachments.clone(),
            functions: state.functions.values().cloned().collect(),
        }
    }

    /// Successful mutating calls, in order
    pub fn calls(&self) -> Vec<MutatingCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock state for one request, applying injected failures
    fn begin(&self, operation: &str) -> ProviderResult<MutexGuard<'_, CloudState>> {
        let mut state = self.lock();
        state.requests += 1;
        if let Some(err) = state.failures.get(operation) {
            return Err(err.clone());
        }
        Ok(state)
    }

    fn role_arn(&self, path: &str, name: &str) -> String {
        format!("arn:aws:iam::{}:role{}{}", self.account_id, path, name)
    }

    fn policy_arn(&self, path: &str, name: &str) -> String {
        format!("arn:aws:iam::{}:policy{}{}", self.account_id, path, name)
    }

    fn function_arn(&self, name: &str) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            self.region, self.account_id, name
        )
    }
}

/// Inspection and fault injection for tests
#[cfg(test)]
impl MemoryCloud {
    /// Operation names of the successful mutating calls, in order
    pub fn operations(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.operation.clone()).collect()
    }

    /// Forget recorded calls and the request counter
    pub fn clear_calls(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.requests = 0;
    }

    /// Number of requests of any kind received, reads included
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Make every later call of `operation` fail with `error`
    pub fn fail_on(&self, operation: &str, error: ProviderError) {
        self.lock().failures.insert(operation.to_string(), error);
    }

    /// Limit the size of attached-policy pages
    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size.max(1);
    }

    /// Replace or insert a role, bypassing the API (simulates drift)
    pub fn insert_role(&self, role: Role) {
        self.lock().roles.insert(role.name.clone(), role);
    }

    /// Replace or insert a function, bypassing the API (simulates drift)
    pub fn insert_function(&self, function: FunctionState) {
        self.lock()
            .functions
            .insert(function.configuration.function_name.clone(), function);
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        self.lock().roles.get(name).cloned()
    }

    pub fn policy(&self, arn: &str) -> Option<StoredPolicy> {
        self.lock().policies.get(arn).cloned()
    }

    pub fn function(&self, name: &str) -> Option<FunctionState> {
        self.lock().functions.get(name).cloned()
    }

    pub fn attached_policies(&self, role_name: &str) -> Vec<AttachedPolicy> {
        self.lock()
            .attachments
            .get(role_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Providers store documents URL-encoded
fn store_document(document: &str) -> ProviderResult<String> {
    serde_json::from_str::<serde_json::Value>(document).map_err(|e| {
        ProviderError::from_code("MalformedPolicyDocument", format!("Syntax errors in policy: {e}"))
    })?;
    Ok(urlencoding::encode(document).into_owned())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl IdentityProvider for MemoryCloud {
    fn get_role(&self, name: &str) -> ProviderResult<Role> {
        let mut state = self.begin("GetRole")?;
        state.role_mut(name).map(|role| role.clone())
    }

    fn create_role(&self, request: &CreateRoleRequest) -> ProviderResult<Role> {
        let mut state = self.begin("CreateRole")?;
        if state.roles.contains_key(&request.name) {
            return Err(ProviderError::from_code(
                "EntityAlreadyExists",
                format!("Role with name {} already exists.", request.name),
            ));
        }
        let path = request.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string());
        let role = Role {
            name: request.name.clone(),
            arn: self.role_arn(&path, &request.name),
            path,
            assume_role_policy_document: Some(store_document(&request.assume_role_policy_document)?),
            description: request.description.clone(),
            max_session_duration: Some(
                request
                    .max_session_duration
                    .unwrap_or(DEFAULT_MAX_SESSION_DURATION),
            ),
            permissions_boundary: request.permissions_boundary.clone(),
            tags: request.tags.clone(),
        };
        state.roles.insert(role.name.clone(), role.clone());
        state.record("CreateRole", &request.name);
        Ok(role)
    }

    fn update_role(
        &self,
        name: &str,
        description: Option<&str>,
        max_session_duration: u32,
    ) -> ProviderResult<()> {
        let mut state = self.begin("UpdateRole")?;
        let role = state.role_mut(name)?;
        role.description = description.map(str::to_string);
        role.max_session_duration = Some(max_session_duration);
        state.record("UpdateRole", name);
        Ok(())
    }

    fn put_role_permissions_boundary(&self, name: &str, boundary_arn: &str) -> ProviderResult<()> {
        let mut state = self.begin("PutRolePermissionsBoundary")?;
        state.role_mut(name)?.permissions_boundary = Some(boundary_arn.to_string());
        state.record("PutRolePermissionsBoundary", name);
        Ok(())
    }

    fn delete_role_permissions_boundary(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.begin("DeleteRolePermissionsBoundary")?;
        state.role_mut(name)?.permissions_boundary = None;
        state.record("DeleteRolePermissionsBoundary", name);
        Ok(())
    }

    fn update_assume_role_policy(&self, name: &str, document: &str) -> ProviderResult<()> {
        let mut state = self.begin("UpdateAssumeRolePolicy")?;
        let stored = store_document(document)?;
        state.role_mut(name)?.assume_role_policy_document = Some(stored);
        state.record("UpdateAssumeRolePolicy", name);
        Ok(())
    }

    fn tag_role(&self, name: &str, tags: &TagSet) -> ProviderResult<()> {
        let mut state = self.begin("TagRole")?;
        state.role_mut(name)?.tags.extend(tags.clone());
        state.record("TagRole", name);
        Ok(())
    }

    fn untag_role(&self, name: &str, keys: &[String]) -> ProviderResult<()> {
        let mut state = self.begin("UntagRole")?;
        let role = state.role_mut(name)?;
        for key in keys {
            role.tags.remove(key);
        }
        state.record("UntagRole", name);
        Ok(())
    }

    fn list_attached_role_policies(
        &self,
        role_name: &str,
        marker: Option<&str>,
    ) -> ProviderResult<AttachedPoliciesPage> {
        let mut state = self.begin("ListAttachedRolePolicies")?;
        state.role_mut(role_name)?;
        let start = match marker {
            Some(marker) => marker.parse::<usize>().map_err(|_| {
                ProviderError::from_code("InvalidInput", format!("Invalid marker {marker}"))
            })?,
            None => 0,
        };
        let page_size = state.page_size;
        let all = state.attachments.get(role_name).cloned().unwrap_or_default();
        let end = start.saturating_add(page_size).min(all.len());
        let policies = all.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let marker = (end < all.len()).then(|| end.to_string());
        Ok(AttachedPoliciesPage { policies, marker })
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut state = self.begin("AttachRolePolicy")?;
        state.role_mut(role_name)?;
        let policy_name = state.policy_mut(policy_arn)?.policy.name.clone();
        let attached = state.attachments.entry(role_name.to_string()).or_default();
        if !attached.iter().any(|p| p.policy_arn == policy_arn) {
            attached.push(AttachedPolicy {
                policy_name,
                policy_arn: policy_arn.to_string(),
            });
        }
        state.record("AttachRolePolicy", role_name);
        Ok(())
    }

    fn get_policy(&self, arn: &str) -> ProviderResult<ManagedPolicy> {
        let mut state = self.begin("GetPolicy")?;
        state.policy_mut(arn).map(|stored| stored.policy.clone())
    }

    fn get_policy_version(&self, arn: &str, version_id: &str) -> ProviderResult<PolicyVersion> {
        let mut state = self.begin("GetPolicyVersion")?;
        state
            .policy_mut(arn)?
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::no_such_entity(format!(
                    "Policy {arn} version {version_id} does not exist."
                ))
            })
    }

    fn create_policy(&self, request: &CreatePolicyRequest) -> ProviderResult<ManagedPolicy> {
        let mut state = self.begin("CreatePolicy")?;
        let path = request.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string());
        let arn = self.policy_arn(&path, &request.name);
        if state.policies.contains_key(&arn) {
            return Err(ProviderError::from_code(
                "EntityAlreadyExists",
                format!("A policy called {} already exists.", request.name),
            ));
        }
        let policy = ManagedPolicy {
            name: request.name.clone(),
            arn: arn.clone(),
            path,
            description: request.description.clone(),
            default_version_id: Some("v1".to_string()),
            tags: request.tags.clone(),
        };
        let version = PolicyVersion {
            version_id: "v1".to_string(),
            document: Some(store_document(&request.document)?),
            is_default_version: true,
        };
        state.policies.insert(
            arn,
            StoredPolicy {
                policy: policy.clone(),
                versions: vec![version],
            },
        );
        state.record("CreatePolicy", &request.name);
        Ok(policy)
    }

    fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ProviderResult<PolicyVersion> {
        let mut state = self.begin("CreatePolicyVersion")?;
        let stored_document = store_document(document)?;
        let stored = state.policy_mut(arn)?;
        if stored.versions.len() >= MAX_POLICY_VERSIONS {
            return Err(ProviderError::from_code(
                "LimitExceeded",
                format!("A managed policy can have up to {MAX_POLICY_VERSIONS} versions."),
            ));
        }
        let next = stored
            .versions
            .iter()
            .filter_map(|v| v.version_id.trim_start_matches('v').parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let version = PolicyVersion {
            version_id: format!("v{next}"),
            document: Some(stored_document),
            is_default_version: set_as_default,
        };
        if set_as_default {
            for existing in &mut stored.versions {
                existing.is_default_version = false;
            }
            stored.policy.default_version_id = Some(version.version_id.clone());
        }
        stored.versions.push(version.clone());
        state.record("CreatePolicyVersion", arn);
        Ok(version)
    }

    fn tag_policy(&self, arn: &str, tags: &TagSet) -> ProviderResult<()> {
        let mut state = self.begin("TagPolicy")?;
        state.policy_mut(arn)?.policy.tags.extend(tags.clone());
        state.record("TagPolicy", arn);
        Ok(())
    }

    fn untag_policy(&self, arn: &str, keys: &[String]) -> ProviderResult<()> {
        let mut state = self.begin("UntagPolicy")?;
        let stored = state.policy_mut(arn)?;
        for key in keys {
            stored.policy.tags.remove(key);
        }
        state.record("UntagPolicy", arn);
        Ok(())
    }
}

impl ComputeProvider for MemoryCloud {
    fn get_function(&self, name: &str) -> ProviderResult<FunctionState> {
        let mut state = self.begin("GetFunction")?;
        state.function_mut(name).map(|f| f.clone())
    }

    fn create_function(
        &self,
        request: &CreateFunctionRequest,
    ) -> ProviderResult<FunctionConfiguration> {
        let mut state = self.begin("CreateFunction")?;
        if state.functions.contains_key(&request.function_name) {
            return Err(ProviderError::from_code(
                "ResourceConflictException",
                format!("Function already exist: {}", request.function_name),
            ));
        }
        let configuration = FunctionConfiguration {
            function_name: request.function_name.clone(),
            function_arn: self.function_arn(&request.function_name),
            role: request.role.clone(),
            handler: request.handler.clone(),
            runtime: Some(request.runtime.clone()),
            description: request.description.clone().filter(|d| !d.is_empty()),
            kms_key_arn: request.kms_key_arn.clone().filter(|k| !k.is_empty()),
            memory_size: Some(request.memory_size.unwrap_or(128)),
            timeout: Some(request.timeout.unwrap_or(3)),
            environment: request.environment.clone().filter(|e| !e.is_empty()),
            layers: request.layers.clone().filter(|l| !l.is_empty()),
            code_sha256: Some(code_sha256(&request.zip_file)),
            version: Some(if request.publish { "1" } else { "$LATEST" }.to_string()),
        };
        state.functions.insert(
            request.function_name.clone(),
            FunctionState {
                configuration: configuration.clone(),
                tags: request.tags.clone(),
            },
        );
        state.record("CreateFunction", &request.function_name);
        Ok(configuration)
    }

    fn update_function_configuration(
        &self,
        request: &UpdateFunctionConfigurationRequest,
    ) -> ProviderResult<FunctionConfiguration> {
        let mut state = self.begin("UpdateFunctionConfiguration")?;
        let function = state.function_mut(&request.function_name)?;
        let config = &mut function.configuration;
        config.role = request.role.clone();
        config.handler = request.handler.clone();
        config.runtime = Some(request.runtime.clone());
        config.description = request.description.as_deref().and_then(non_empty);
        config.kms_key_arn = request.kms_key_arn.as_deref().and_then(non_empty);
        if let Some(memory_size) = request.memory_size {
            config.memory_size = Some(memory_size);
        }
        if let Some(timeout) = request.timeout {
            config.timeout = Some(timeout);
        }
        if let Some(environment) = &request.environment {
            config.environment = (!environment.is_empty()).then(|| environment.clone());
        }
        if let Some(layers) = &request.layers {
            config.layers = (!layers.is_empty()).then(|| layers.clone());
        }
        let updated = config.clone();
        state.record("UpdateFunctionConfiguration", &request.function_name);
        Ok(updated)
    }

    fn update_function_code(
        &self,
        name: &str,
        zip_file: &[u8],
        publish: bool,
    ) -> ProviderResult<FunctionConfiguration> {
        let mut state = self.begin("UpdateFunctionCode")?;
        let config = &mut state.function_mut(name)?.configuration;
        config.code_sha256 = Some(code_sha256(zip_file));
        if publish {
            let next = config
                .version
                .as_deref()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0)
                + 1;
            config.version = Some(next.to_string());
        }
        let updated = config.clone();
        state.record("UpdateFunctionCode", name);
        Ok(updated)
    }

    fn tag_resource(&self, arn: &str, tags: &TagSet) -> ProviderResult<()> {
        let mut state = self.begin("TagResource")?;
        state.function_by_arn_mut(arn)?.tags.extend(tags.clone());
        state.record("TagResource", arn);
        Ok(())
    }

    fn untag_resource(&self, arn: &str, keys: &[String]) -> ProviderResult<()> {
        let mut state = self.begin("UntagResource")?;
        let function = state.function_by_arn_mut(arn)?;
        for key in keys {
            function.tags.remove(key);
        }
        state.record("UntagResource", arn);
        Ok(())
    }
}
