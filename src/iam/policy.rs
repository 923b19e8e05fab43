//! Managed policy reconciliation
//!
//! A managed policy's body lives in numbered versions. The reconciler never
//! edits a version in place: a changed document becomes a new version marked
//! as default. The provider keeps at most five versions and pruning old ones
//! is left to the operator.

use super::document::PolicyDocument;
use super::role::DEFAULT_PATH;
use crate::provider::{
    CreatePolicyRequest, IdentityProvider, ManagedPolicy, PolicyVersion, ProviderResultExt,
};
use declarative::{
    Converged, Error, Lookup, Reconciler, ResourceKind, Result, TagDiff, TagSet, matches_stored,
};
use serde::{Deserialize, Serialize};

/// Version assumed when the provider does not report a default
const FIRST_VERSION: &str = "v1";

/// Desired state of a managed policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Policy name, also the last segment of its ARN
    pub name: String,
    #[serde(alias = "document")]
    pub policy_document: PolicyDocument,
    /// Cannot be changed after creation
    #[serde(default)]
    pub path: Option<String>,
    /// Cannot be changed after creation
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
}

impl PolicySpec {
    pub fn new(name: impl Into<String>, policy_document: PolicyDocument) -> Self {
        Self {
            name: name.into(),
            policy_document,
            path: None,
            description: None,
            tags: TagSet::new(),
        }
    }
}

/// Reconciles [`PolicySpec`] against the identity provider
pub struct PolicyReconciler<'a> {
    provider: &'a dyn IdentityProvider,
    account_id: &'a str,
}

impl<'a> PolicyReconciler<'a> {
    pub fn new(provider: &'a dyn IdentityProvider, account_id: &'a str) -> Self {
        Self {
            provider,
            account_id,
        }
    }

    /// ARN of a policy in this account
    ///
    /// Derived from the name alone, so policies created under a non-root
    /// path are not found by [`Reconciler::get`].
    pub fn arn_for(&self, name: &str) -> String {
        format!("arn:aws:iam::{}:policy/{}", self.account_id, name)
    }

    /// Fetch one stored version of the named policy
    pub fn get_version(&self, name: &str, version_id: &str) -> Result<Lookup<PolicyVersion>> {
        log::debug!("Getting version {version_id} of managed policy {name}");
        self.provider
            .get_policy_version(&self.arn_for(name), version_id)
            .lookup("GetPolicyVersion", ResourceKind::ManagedPolicy, name)
    }
}

impl Reconciler for PolicyReconciler<'_> {
    type Desired = PolicySpec;
    type Actual = ManagedPolicy;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ManagedPolicy
    }

    fn name<'d>(&self, desired: &'d PolicySpec) -> &'d str {
        &desired.name
    }

    fn get(&self, name: &str) -> Result<Lookup<ManagedPolicy>> {
        log::debug!("Getting managed policy {name}");
        self.provider
            .get_policy(&self.arn_for(name))
            .lookup("GetPolicy", ResourceKind::ManagedPolicy, name)
    }

    fn create(&self, desired: &PolicySpec) -> Result<ManagedPolicy> {
        let kind = ResourceKind::ManagedPolicy;
        let document = desired
            .policy_document
            .to_json()
            .map_err(|e| Error::invalid(kind, &desired.name, e.to_string()))?;
        let request = CreatePolicyRequest {
            name: desired.name.clone(),
            path: desired.path.clone(),
            document,
            description: desired.description.clone(),
            tags: desired.tags.clone(),
        };
        self.provider
            .create_policy(&request)
            .for_resource("CreatePolicy", kind, &desired.name)
    }

    fn update(
        &self,
        mut actual: ManagedPolicy,
        desired: &PolicySpec,
    ) -> Result<Converged<ManagedPolicy>> {
        let name = desired.name.as_str();
        let kind = ResourceKind::ManagedPolicy;

        let path = desired.path.as_deref().unwrap_or(DEFAULT_PATH);
        if actual.path != path {
            return Err(Error::immutable(kind, name, "path", &actual.path, path));
        }
        if actual.description != desired.description {
            return Err(Error::immutable(
                kind,
                name,
                "description",
                actual.description.clone().unwrap_or_default(),
                desired.description.clone().unwrap_or_default(),
            ));
        }

        let mut changed = false;

        let version_id = actual
            .default_version_id
            .clone()
            .unwrap_or_else(|| FIRST_VERSION.to_string());
        let current = match self.get_version(name, &version_id)? {
            Lookup::Found(version) => version,
            Lookup::NotFound => {
                return Err(Error::inconsistent(
                    kind,
                    name,
                    format!("default version {version_id} appears to exist but could not be retrieved"),
                ));
            }
        };

        let document = desired
            .policy_document
            .to_value()
            .map_err(|e| Error::invalid(kind, name, e.to_string()))?;
        if !matches_stored(&document, current.document.as_deref()) {
            log::info!("Creating a new version of managed policy {name} (was {version_id})");
            let text = desired
                .policy_document
                .to_json()
                .map_err(|e| Error::invalid(kind, name, e.to_string()))?;
            let version = self
                .provider
                .create_policy_version(&actual.arn, &text, true)
                .for_resource("CreatePolicyVersion", kind, name)?;
            actual.default_version_id = Some(version.version_id);
            changed = true;
        }

        let tags = TagDiff::between(&actual.tags, &desired.tags);
        if !tags.remove.is_empty() {
            log::info!("Removing tags {:?} from managed policy {name}", tags.remove);
            self.provider
                .untag_policy(&actual.arn, &tags.remove_keys())
                .for_resource("UntagPolicy", kind, name)?;
            changed = true;
        }
        if !tags.upsert.is_empty() {
            log::info!("Tagging managed policy {name} with {:?}", tags.upsert);
            self.provider
                .tag_policy(&actual.arn, &tags.upsert)
                .for_resource("TagPolicy", kind, name)?;
            changed = true;
        }
        actual.tags = desired.tags.clone();

        Ok(Converged::from_changed(changed, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::document::PolicyStatement;
    use crate::provider::error::ProviderError;
    use crate::testing::{ACCOUNT, cloud};
    use declarative::{ErrorKind, Outcome, RunContext, converge, tag_set};

    fn logs_policy() -> PolicyDocument {
        PolicyDocument::new(vec![
            PolicyStatement::allow(["logs:CreateLogStream", "logs:PutLogEvents"])
                .on("arn:aws:logs:us-east-1:123456789012:*"),
        ])
    }

    fn spec() -> PolicySpec {
        let mut spec = PolicySpec::new("svc-exe-policy", logs_policy());
        spec.description = Some("Basic execution policy".into());
        spec
    }

    #[test]
    fn test_arn_derived_from_name() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        assert_eq!(
            policies.arn_for("p"),
            "arn:aws:iam::123456789012:policy/p"
        );
        assert!(matches!(policies.get("p").unwrap(), Lookup::NotFound));
    }

    #[test]
    fn test_create_then_unchanged() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();

        let created = converge(&policies, &mut ctx, &spec()).unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        assert_eq!(created.resource.arn, policies.arn_for("svc-exe-policy"));
        cloud.clear_calls();

        let again = converge(&policies, &mut ctx, &spec()).unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_reordered_document_creates_no_version() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();
        let arn = converge(&policies, &mut ctx, &spec()).unwrap().resource.arn;

        // Same document, different key order, stored as a new default version
        let reordered = r#"{"Statement":[{"Resource":"arn:aws:logs:us-east-1:123456789012:*","Action":["logs:CreateLogStream","logs:PutLogEvents"],"Effect":"Allow"}],"Version":"2012-10-17"}"#;
        cloud.create_policy_version(&arn, reordered, true).unwrap();
        cloud.clear_calls();

        let mut desired = spec();
        desired.tags = tag_set([("team", "core")]);
        converge(&policies, &mut ctx, &desired).unwrap();
        assert_eq!(cloud.operations(), vec!["TagPolicy"]);
    }

    #[test]
    fn test_changed_document_creates_default_version() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();
        converge(&policies, &mut ctx, &spec()).unwrap();
        cloud.clear_calls();

        let mut desired = spec();
        desired.policy_document = PolicyDocument::new(vec![
            PolicyStatement::allow("logs:*").on("*"),
        ]);
        let converged = converge(&policies, &mut ctx, &desired).unwrap();

        assert_eq!(converged.outcome, Outcome::Updated);
        assert_eq!(converged.resource.default_version_id.as_deref(), Some("v2"));
        assert_eq!(cloud.operations(), vec!["CreatePolicyVersion"]);

        let stored = cloud.policy(&converged.resource.arn).unwrap();
        let defaults: Vec<_> = stored
            .versions
            .iter()
            .filter(|v| v.is_default_version)
            .map(|v| v.version_id.as_str())
            .collect();
        assert_eq!(defaults, vec!["v2"]);
    }

    #[test]
    fn test_description_is_immutable() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();
        converge(&policies, &mut ctx, &spec()).unwrap();
        cloud.clear_calls();

        let mut desired = spec();
        desired.description = Some("other".into());
        let err = converge(&policies, &mut ctx, &desired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImmutableField);
        assert!(err.to_string().contains("description"));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_path_is_immutable() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();
        converge(&policies, &mut ctx, &spec()).unwrap();

        let mut desired = spec();
        desired.path = Some("/team/".into());
        let err = converge(&policies, &mut ctx, &desired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImmutableField);
    }

    #[test]
    fn test_missing_default_version_is_inconsistent() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();
        converge(&policies, &mut ctx, &spec()).unwrap();
        cloud.fail_on(
            "GetPolicyVersion",
            ProviderError::no_such_entity("version v1 does not exist"),
        );

        let err = converge(&policies, &mut ctx, &spec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InconsistentState);
        assert!(!ctx.is_ready());
    }

    #[test]
    fn test_version_limit_surfaces_as_provider_error() {
        let cloud = cloud();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let mut ctx = RunContext::new();
        let arn = converge(&policies, &mut ctx, &spec()).unwrap().resource.arn;
        for _ in 0..3 {
            cloud.create_policy_version(&arn, "{}", false).unwrap();
        }
        // v1 is still default; four versions stored
        let mut desired = spec();
        desired.policy_document = PolicyDocument::new(vec![PolicyStatement::allow("s3:*")]);
        converge(&policies, &mut ctx, &desired).unwrap();

        desired.policy_document = PolicyDocument::new(vec![PolicyStatement::allow("sqs:*")]);
        let err = converge(&policies, &mut ctx, &desired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.to_string().contains("LimitExceeded"));
    }
}
