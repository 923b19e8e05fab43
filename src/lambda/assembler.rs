//! Function with its execution role and policy
//!
//! A lambda is a function plus everything it needs to run: a role the
//! compute service may assume and a policy allowing it to write its logs.
//! Both are created with defaults unless the caller brings their own.

use super::function::FunctionSpec;
use crate::iam::{OneOrMany, PolicyDocument, PolicySpec, PolicyStatement, Principal, RoleSpec};
use crate::provider::{EnvironmentVariables, FunctionState, Role};
use crate::stack::StackCoordinator;
use chrono::Utc;
use declarative::{Action, Converged, Outcome, ResourceKind, Result, TagSet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service principal of the compute provider
pub const LAMBDA_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";

/// An existing role to run a lambda as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub name: String,
    pub arn: String,
}

impl From<&Role> for RoleRef {
    fn from(role: &Role) -> Self {
        Self {
            name: role.name.clone(),
            arn: role.arn.clone(),
        }
    }
}

/// An existing managed policy to attach instead of the default one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRef {
    pub arn: String,
}

/// Desired state of a lambda
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaSpec {
    /// Logical name, prefixed with the stack name
    pub name: String,
    pub zip_location: PathBuf,
    pub handler: String,
    /// A default role is created when absent
    #[serde(default)]
    pub custom_role: Option<RoleRef>,
    /// A default execution policy is created when absent
    #[serde(default)]
    pub custom_managed_policy: Option<PolicyRef>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "environment_variables")]
    pub environment: Option<EnvironmentVariables>,
    #[serde(default)]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub tags: TagSet,
}

impl LambdaSpec {
    #[cfg(test)]
    pub fn new(
        name: impl Into<String>,
        zip_location: impl Into<PathBuf>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            zip_location: zip_location.into(),
            handler: handler.into(),
            custom_role: None,
            custom_managed_policy: None,
            runtime: None,
            description: None,
            environment: None,
            memory_size: None,
            timeout: None,
            tags: TagSet::new(),
        }
    }

    /// Function to reconcile once the role is known
    fn function_spec(&self, full_name: &str, role_arn: &str) -> FunctionSpec {
        FunctionSpec {
            runtime: self.runtime.clone(),
            description: self.description.clone(),
            environment: self.environment.clone(),
            memory_size: self.memory_size,
            timeout: self.timeout,
            tags: self.tags.clone(),
            ..FunctionSpec::new(full_name, role_arn, &self.handler, &self.zip_location)
        }
    }
}

/// Resource name of a lambda within a stack
pub fn full_name(stack_name: &str, name: &str) -> String {
    format!("{stack_name}-{name}")
}

/// Role trusted only by the compute service
pub fn default_role_spec(full_name: &str) -> RoleSpec {
    RoleSpec::new(
        format!("{full_name}-role"),
        PolicyDocument::new(vec![
            PolicyStatement::allow("sts:AssumeRole")
                .for_principal(Principal::service(LAMBDA_SERVICE_PRINCIPAL)),
        ]),
    )
}

/// Policy allowing a function to write to its own log group
pub fn default_policy_spec(full_name: &str, region: &str, account_id: &str) -> PolicySpec {
    let log_group = format!("arn:aws:logs:{region}:{account_id}:log-group:/aws/lambda/{full_name}:*");
    let document = PolicyDocument::new(vec![
        PolicyStatement::allow("logs:CreateLogGroup")
            .on(format!("arn:aws:logs:{region}:{account_id}:*")),
        PolicyStatement::allow(["logs:CreateLogStream", "logs:PutLogEvents"])
            .on(OneOrMany::Many(vec![log_group])),
    ]);
    let mut spec = PolicySpec::new(format!("{full_name}-exe-policy"), document);
    spec.description = Some(format!("Basic execution policy for {full_name}"));
    spec
}

impl StackCoordinator<'_> {
    /// Create or update a lambda with its role and execution policy
    ///
    /// Any failing step rolls the stack back and aborts the rest.
    pub fn create_lambda(&mut self, spec: &LambdaSpec) -> Result<Converged<FunctionState>> {
        self.ensure_ready(ResourceKind::Lambda, &spec.name)?;
        let full_name = full_name(self.name(), &spec.name);
        log::info!("Building lambda {full_name}");

        match self.assemble(spec, &full_name) {
            Ok(converged) => {
                if converged.outcome.is_change() {
                    self.update_action(Action::reconciled(
                        ResourceKind::Lambda,
                        &full_name,
                        converged.outcome,
                        Utc::now(),
                    ));
                }
                Ok(converged)
            }
            Err(e) => {
                log::warn!("Error creating lambda {full_name}: {e}");
                Err(self.handle_error(e))
            }
        }
    }

    fn assemble(&mut self, spec: &LambdaSpec, full_name: &str) -> Result<Converged<FunctionState>> {
        let mut outcome = Outcome::Unchanged;

        let role = match &spec.custom_role {
            Some(role) => role.clone(),
            None => {
                let converged = self.create_role(&default_role_spec(full_name))?;
                outcome = outcome.and(converged.outcome);
                RoleRef::from(&converged.resource)
            }
        };

        let policy_arn = match &spec.custom_managed_policy {
            Some(policy) => policy.arn.clone(),
            None => {
                let environment = self.environment();
                let policy = default_policy_spec(full_name, &environment.region, &environment.account_id);
                let converged = self.create_managed_policy(&policy)?;
                outcome = outcome.and(converged.outcome);
                converged.resource.arn
            }
        };

        outcome = outcome.and(self.add_managed_policy_to_role(&role.name, &policy_arn)?);

        let function = self.create_function(&spec.function_spec(full_name, &role.arn))?;
        Ok(Converged {
            outcome: function.outcome.and(outcome_as_update(outcome)),
            resource: function.resource,
        })
    }
}

/// Changes to supporting resources count as an update of the lambda
fn outcome_as_update(outcome: Outcome) -> Outcome {
    if outcome.is_change() {
        Outcome::Updated
    } else {
        Outcome::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::provider::MemoryCloud;
    use crate::provider::error::ProviderError;
    use crate::stack::StackOptions;
    use crate::testing::{ACCOUNT, REGION, cloud, write_package};
    use declarative::{ErrorKind, RunState, documents_equal, decode_document};
    use tempfile::TempDir;

    fn coordinator(cloud: &MemoryCloud) -> StackCoordinator<'_> {
        StackCoordinator::new(
            StackOptions {
                api_key: "key".into(),
                stack_name: "penny-auth".into(),
                user: "penny".into(),
            },
            Environment::new(Some(REGION), Some(ACCOUNT), Some("dev")).unwrap(),
            cloud,
            cloud,
        )
    }

    fn spec(dir: &TempDir) -> LambdaSpec {
        let zip = write_package(dir.path(), "dist.zip", b"bundle");
        LambdaSpec::new("authorize", zip, "dist/index.handler")
    }

    #[test]
    fn test_default_policy_scopes_log_group() {
        let policy = default_policy_spec("s-f", "eu-west-1", "42");
        assert_eq!(policy.name, "s-f-exe-policy");
        let value = policy.policy_document.to_value().unwrap();
        assert_eq!(value["Statement"][0]["Resource"], "arn:aws:logs:eu-west-1:42:*");
        assert_eq!(
            value["Statement"][1]["Resource"][0],
            "arn:aws:logs:eu-west-1:42:log-group:/aws/lambda/s-f:*"
        );
    }

    #[test]
    fn test_builds_role_policy_attachment_and_function() {
        let cloud = cloud();
        let dir = tempfile::tempdir().unwrap();
        let mut coord = coordinator(&cloud);

        let lambda = coord.create_lambda(&spec(&dir)).unwrap();
        assert_eq!(lambda.outcome, Outcome::Created);
        assert_eq!(
            cloud.operations(),
            vec!["CreateRole", "CreatePolicy", "AttachRolePolicy", "CreateFunction"]
        );

        let role = cloud.role("penny-auth-dev-authorize-role").unwrap();
        assert_eq!(lambda.resource.configuration.function_name, "penny-auth-dev-authorize");
        assert_eq!(lambda.resource.configuration.role, role.arn);
        let trust = decode_document(role.assume_role_policy_document.as_deref().unwrap()).unwrap();
        assert!(documents_equal(
            &trust,
            &default_role_spec("x").assume_role_policy_document.to_value().unwrap()
        ));
        let attached = cloud.attached_policies(&role.name);
        assert_eq!(attached[0].policy_name, "penny-auth-dev-authorize-exe-policy");
        assert!(coord.get_action("create-lambda-penny-auth-dev-authorize").is_some());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let cloud = cloud();
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(&dir);
        coordinator(&cloud).create_lambda(&spec).unwrap();
        cloud.clear_calls();

        let again = coordinator(&cloud).create_lambda(&spec).unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_custom_role_and_policy_skip_defaults() {
        let cloud = cloud();
        let dir = tempfile::tempdir().unwrap();
        let mut coord = coordinator(&cloud);
        let role = coord
            .create_role(&RoleSpec::new("shared-role", default_role_spec("x").assume_role_policy_document))
            .unwrap()
            .resource;
        let policy = coord
            .create_managed_policy(&PolicySpec::new(
                "shared-policy",
                PolicyDocument::new(vec![PolicyStatement::allow("logs:*").on("*")]),
            ))
            .unwrap()
            .resource;
        cloud.clear_calls();

        let mut spec = spec(&dir);
        spec.custom_role = Some(RoleRef::from(&role));
        spec.custom_managed_policy = Some(PolicyRef { arn: policy.arn });
        coord.create_lambda(&spec).unwrap();

        assert_eq!(cloud.operations(), vec!["AttachRolePolicy", "CreateFunction"]);
    }

    #[test]
    fn test_failed_step_rolls_back_and_stops() {
        let cloud = cloud();
        let dir = tempfile::tempdir().unwrap();
        cloud.fail_on("CreatePolicy", ProviderError::from_code("AccessDenied", "no"));
        let mut coord = coordinator(&cloud);

        let err = coord.create_lambda(&spec(&dir)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(coord.state(), RunState::Rollback);
        assert_eq!(cloud.operations(), vec!["CreateRole"]);

        let err = coord.create_lambda(&spec(&dir)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RolledBack);
    }
}
