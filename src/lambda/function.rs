//! Function reconciliation
//!
//! Configuration and code are converged independently. Configuration fields
//! are compared one by one and written in a single call when any differs;
//! the package is uploaded only when its hash differs from the one the
//! provider reports.

use super::artifact::CodeArtifact;
use crate::provider::{
    ComputeProvider, CreateFunctionRequest, EnvironmentVariables, FunctionConfiguration,
    FunctionState, ProviderResultExt, UpdateFunctionConfigurationRequest,
};
use declarative::{
    Converged, Error, Lookup, Reconciler, ResourceKind, Result, TagDiff, TagSet,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_RUNTIME: &str = "nodejs14.x";
/// MB
pub const DEFAULT_MEMORY_SIZE: u32 = 128;
/// Seconds
pub const DEFAULT_TIMEOUT: u32 = 3;

/// Desired state of a function
///
/// Only zip packages uploaded inline are supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    /// ARN of the execution role
    #[serde(alias = "role")]
    pub role_arn: String,
    pub handler: String,
    /// Path of the zip package
    pub zip_location: PathBuf,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "environment_variables")]
    pub environment: Option<EnvironmentVariables>,
    #[serde(default)]
    pub kms_key_arn: Option<String>,
    #[serde(default)]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    /// Layer version ARNs
    #[serde(default)]
    pub layers: Option<Vec<String>>,
    #[serde(default)]
    pub tags: TagSet,
}

impl FunctionSpec {
    pub fn new(
        name: impl Into<String>,
        role_arn: impl Into<String>,
        handler: impl Into<String>,
        zip_location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            role_arn: role_arn.into(),
            handler: handler.into(),
            zip_location: zip_location.into(),
            runtime: None,
            description: None,
            environment: None,
            kms_key_arn: None,
            memory_size: None,
            timeout: None,
            layers: None,
            tags: TagSet::new(),
        }
    }

    fn runtime(&self) -> &str {
        self.runtime.as_deref().unwrap_or(DEFAULT_RUNTIME)
    }
}

/// Configuration fields of `actual` that differ from `desired`
pub fn configuration_changes(
    actual: &FunctionConfiguration,
    desired: &FunctionSpec,
) -> Vec<&'static str> {
    let empty_env = EnvironmentVariables::new();
    let no_layers: Vec<String> = Vec::new();
    let blank = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

    let checks = [
        ("role", actual.role != desired.role_arn),
        ("handler", actual.handler != desired.handler),
        (
            "description",
            actual.description.as_deref().unwrap_or_default()
                != desired.description.as_deref().unwrap_or_default(),
        ),
        (
            "runtime",
            actual.runtime.as_deref().unwrap_or(DEFAULT_RUNTIME) != desired.runtime(),
        ),
        ("kms_key_arn", blank(&actual.kms_key_arn) != blank(&desired.kms_key_arn)),
        (
            "memory_size",
            actual.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE)
                != desired.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE),
        ),
        (
            "timeout",
            actual.timeout.unwrap_or(DEFAULT_TIMEOUT) != desired.timeout.unwrap_or(DEFAULT_TIMEOUT),
        ),
        (
            "environment",
            actual.environment.as_ref().unwrap_or(&empty_env)
                != desired.environment.as_ref().unwrap_or(&empty_env),
        ),
        (
            "layers",
            actual.layers.as_ref().unwrap_or(&no_layers)
                != desired.layers.as_ref().unwrap_or(&no_layers),
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(field, differs)| differs.then_some(field))
        .collect()
}

/// Reconciles [`FunctionSpec`] against the compute provider
pub struct FunctionReconciler<'a> {
    provider: &'a dyn ComputeProvider,
    min_tag_upserts: usize,
}

impl<'a> FunctionReconciler<'a> {
    pub fn new(provider: &'a dyn ComputeProvider) -> Self {
        Self {
            provider,
            min_tag_upserts: 1,
        }
    }

    /// Only issue the tag call when at least `min` tags need adding or
    /// changing
    ///
    /// Defaults to 1. A value of 2 skips single-tag updates, which some
    /// existing deployments rely on.
    pub fn with_min_tag_upserts(mut self, min: usize) -> Self {
        self.min_tag_upserts = min.max(1);
        self
    }

    fn read_artifact(desired: &FunctionSpec) -> Result<CodeArtifact> {
        CodeArtifact::read(&desired.zip_location).map_err(|e| {
            Error::invalid(
                ResourceKind::Function,
                &desired.name,
                format!("cannot read package {}: {e}", desired.zip_location.display()),
            )
        })
    }

    fn update_request(desired: &FunctionSpec) -> UpdateFunctionConfigurationRequest {
        UpdateFunctionConfigurationRequest {
            function_name: desired.name.clone(),
            role: desired.role_arn.clone(),
            handler: desired.handler.clone(),
            runtime: desired.runtime().to_string(),
            description: Some(desired.description.clone().unwrap_or_default()),
            environment: Some(desired.environment.clone().unwrap_or_default()),
            kms_key_arn: Some(desired.kms_key_arn.clone().unwrap_or_default()),
            memory_size: Some(desired.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE)),
            timeout: Some(desired.timeout.unwrap_or(DEFAULT_TIMEOUT)),
            layers: Some(desired.layers.clone().unwrap_or_default()),
        }
    }
}

impl Reconciler for FunctionReconciler<'_> {
    type Desired = FunctionSpec;
    type Actual = FunctionState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn name<'d>(&self, desired: &'d FunctionSpec) -> &'d str {
        &desired.name
    }

    fn get(&self, name: &str) -> Result<Lookup<FunctionState>> {
        log::debug!("Getting function {name}");
        self.provider
            .get_function(name)
            .lookup("GetFunction", ResourceKind::Function, name)
    }

    fn create(&self, desired: &FunctionSpec) -> Result<FunctionState> {
        let artifact = Self::read_artifact(desired)?;
        let request = CreateFunctionRequest {
            function_name: desired.name.clone(),
            role: desired.role_arn.clone(),
            handler: desired.handler.clone(),
            runtime: desired.runtime().to_string(),
            description: desired.description.clone(),
            environment: desired.environment.clone(),
            kms_key_arn: desired.kms_key_arn.clone(),
            memory_size: desired.memory_size,
            timeout: desired.timeout,
            layers: desired.layers.clone(),
            tags: desired.tags.clone(),
            zip_file: artifact.bytes,
            publish: true,
        };
        let configuration = self
            .provider
            .create_function(&request)
            .for_resource("CreateFunction", ResourceKind::Function, &desired.name)?;
        Ok(FunctionState {
            configuration,
            tags: desired.tags.clone(),
        })
    }

    fn update(
        &self,
        mut actual: FunctionState,
        desired: &FunctionSpec,
    ) -> Result<Converged<FunctionState>> {
        let name = desired.name.as_str();
        let kind = ResourceKind::Function;
        let artifact = Self::read_artifact(desired)?;
        let mut changed = false;

        let changes = configuration_changes(&actual.configuration, desired);
        if !changes.is_empty() {
            log::info!("Updating configuration of function {name}: {}", changes.join(", "));
            actual.configuration = self
                .provider
                .update_function_configuration(&Self::update_request(desired))
                .for_resource("UpdateFunctionConfiguration", kind, name)?;
            changed = true;
        }

        let arn = actual.configuration.function_arn.clone();
        let tags = TagDiff::between(&actual.tags, &desired.tags);
        if !tags.remove.is_empty() {
            log::info!("Removing tags {:?} from function {name}", tags.remove);
            self.provider
                .untag_resource(&arn, &tags.remove_keys())
                .for_resource("UntagResource", kind, name)?;
            actual.tags.retain(|key, _| !tags.remove.contains(key));
            changed = true;
        }
        if tags.upsert.len() >= self.min_tag_upserts {
            log::info!("Tagging function {name} with {:?}", tags.upsert);
            self.provider
                .tag_resource(&arn, &tags.upsert)
                .for_resource("TagResource", kind, name)?;
            actual.tags.extend(tags.upsert);
            changed = true;
        } else if !tags.upsert.is_empty() {
            log::warn!(
                "Skipping tag update of function {name}: {} pending, threshold {}",
                tags.upsert.len(),
                self.min_tag_upserts
            );
        }

        let hash = artifact.sha256();
        if actual.configuration.code_sha256.as_deref() != Some(hash.as_str()) {
            log::info!("Uploading new code for function {name}");
            actual.configuration = self
                .provider
                .update_function_code(name, &artifact.bytes, true)
                .for_resource("UpdateFunctionCode", kind, name)?;
            changed = true;
        }

        Ok(Converged::from_changed(changed, actual))
    }
}
