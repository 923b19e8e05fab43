//! Role reconciliation

use super::document::PolicyDocument;
use crate::provider::{CreateRoleRequest, IdentityProvider, ProviderResultExt, Role};
use declarative::{
    Converged, Error, Lookup, Reconciler, ResourceKind, Result, TagDiff, TagSet, matches_stored,
};
use serde::{Deserialize, Serialize};

/// Path used when none is given
pub const DEFAULT_PATH: &str = "/";

/// Session duration the provider applies when none is given (one hour)
pub const DEFAULT_MAX_SESSION_DURATION: u32 = 3600;

/// Desired state of a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role name, unique per account. Cannot be changed.
    pub name: String,
    /// Trust policy allowing principals to assume the role
    #[serde(alias = "trust_policy")]
    pub assume_role_policy_document: PolicyDocument,
    /// Cannot be changed after creation
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Seconds, between one and twelve hours
    #[serde(default)]
    pub max_session_duration: Option<u32>,
    /// ARN of the permissions boundary policy
    #[serde(default)]
    pub permissions_boundary: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, assume_role_policy_document: PolicyDocument) -> Self {
        Self {
            name: name.into(),
            assume_role_policy_document,
            path: None,
            description: None,
            max_session_duration: None,
            permissions_boundary: None,
            tags: TagSet::new(),
        }
    }

    fn effective_path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_PATH)
    }

    fn effective_max_session_duration(&self) -> u32 {
        self.max_session_duration
            .unwrap_or(DEFAULT_MAX_SESSION_DURATION)
    }
}

/// Reconciles [`RoleSpec`] against the identity provider
pub struct RoleReconciler<'a> {
    provider: &'a dyn IdentityProvider,
}

impl<'a> RoleReconciler<'a> {
    pub fn new(provider: &'a dyn IdentityProvider) -> Self {
        Self { provider }
    }

    fn trust_policy_json(desired: &RoleSpec) -> Result<String> {
        desired
            .assume_role_policy_document
            .to_json()
            .map_err(|e| Error::invalid(ResourceKind::Role, &desired.name, e.to_string()))
    }
}

impl Reconciler for RoleReconciler<'_> {
    type Desired = RoleSpec;
    type Actual = Role;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    fn name<'d>(&self, desired: &'d RoleSpec) -> &'d str {
        &desired.name
    }

    fn get(&self, name: &str) -> Result<Lookup<Role>> {
        log::debug!("Getting role {name}");
        self.provider
            .get_role(name)
            .lookup("GetRole", ResourceKind::Role, name)
    }

    fn create(&self, desired: &RoleSpec) -> Result<Role> {
        let request = CreateRoleRequest {
            name: desired.name.clone(),
            path: desired.path.clone(),
            assume_role_policy_document: Self::trust_policy_json(desired)?,
            description: desired.description.clone(),
            max_session_duration: desired.max_session_duration,
            permissions_boundary: desired.permissions_boundary.clone(),
            tags: desired.tags.clone(),
        };
        self.provider
            .create_role(&request)
            .for_resource("CreateRole", ResourceKind::Role, &desired.name)
    }

    fn update(&self, mut actual: Role, desired: &RoleSpec) -> Result<Converged<Role>> {
        let name = desired.name.as_str();
        let kind = ResourceKind::Role;

        if actual.path != desired.effective_path() {
            return Err(Error::immutable(
                kind,
                name,
                "path",
                &actual.path,
                desired.effective_path(),
            ));
        }

        let mut changed = false;

        let max_session_duration = desired.effective_max_session_duration();
        if actual.description != desired.description
            || actual.max_session_duration != Some(max_session_duration)
        {
            log::info!(
                "Updating description and max session duration of role {name}: {:?}/{:?} -> {:?}/{max_session_duration}",
                actual.description,
                actual.max_session_duration,
                desired.description
            );
            self.provider
                .update_role(name, desired.description.as_deref(), max_session_duration)
                .for_resource("UpdateRole", kind, name)?;
            actual.description = desired.description.clone();
            actual.max_session_duration = Some(max_session_duration);
            changed = true;
        }

        if actual.permissions_boundary != desired.permissions_boundary {
            log::info!(
                "Updating permissions boundary of role {name}: {:?} -> {:?}",
                actual.permissions_boundary,
                desired.permissions_boundary
            );
            match &desired.permissions_boundary {
                Some(arn) => self
                    .provider
                    .put_role_permissions_boundary(name, arn)
                    .for_resource("PutRolePermissionsBoundary", kind, name)?,
                None => self
                    .provider
                    .delete_role_permissions_boundary(name)
                    .for_resource("DeleteRolePermissionsBoundary", kind, name)?,
            }
            actual.permissions_boundary = desired.permissions_boundary.clone();
            changed = true;
        }

        let trust_policy = desired
            .assume_role_policy_document
            .to_value()
            .map_err(|e| Error::invalid(kind, name, e.to_string()))?;
        if !matches_stored(&trust_policy, actual.assume_role_policy_document.as_deref()) {
            log::info!("Updating trust policy of role {name}");
            let document = Self::trust_policy_json(desired)?;
            self.provider
                .update_assume_role_policy(name, &document)
                .for_resource("UpdateAssumeRolePolicy", kind, name)?;
            actual.assume_role_policy_document = Some(urlencoding::encode(&document).into_owned());
            changed = true;
        }

        let tags = TagDiff::between(&actual.tags, &desired.tags);
        if !tags.remove.is_empty() {
            log::info!("Removing tags {:?} from role {name}", tags.remove);
            self.provider
                .untag_role(name, &tags.remove_keys())
                .for_resource("UntagRole", kind, name)?;
            changed = true;
        }
        if !tags.upsert.is_empty() {
            log::info!("Tagging role {name} with {:?}", tags.upsert);
            self.provider
                .tag_role(name, &tags.upsert)
                .for_resource("TagRole", kind, name)?;
            changed = true;
        }
        actual.tags = desired.tags.clone();

        Ok(Converged::from_changed(changed, actual))
    }
}
