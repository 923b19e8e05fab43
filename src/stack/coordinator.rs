//! Stack coordinator
//!
//! Owns the stack document for one run and is the entry point for every
//! resource builder. Each builder checks the run is still ready before it
//! touches the provider; the first failure flips the stack into rollback and
//! every later builder returns [`Error::RolledBack`] without a provider call.

use super::store::{StackStore, StoreError};
use super::Stack;
use crate::config::Environment;
use crate::iam::{PolicyAttachment, PolicyReconciler, PolicySpec, RoleReconciler, RoleSpec};
use crate::lambda::{FunctionReconciler, FunctionSpec};
use crate::provider::{AttachedPolicy, ComputeProvider, FunctionState, IdentityProvider, ManagedPolicy, Role};
use declarative::{
    Action, Converged, Error, ErrorKind, Outcome, ReconcileSummary, ResourceKind, Result,
    RunState, converge,
};

/// Identity of the stack a coordinator builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOptions {
    /// Key authenticating against the stack service
    pub api_key: String,
    /// Base name; the environment suffix is added by the coordinator
    pub stack_name: String,
    /// User the stack belongs to
    pub user: String,
}

pub struct StackCoordinator<'a> {
    identity: &'a dyn IdentityProvider,
    compute: &'a dyn ComputeProvider,
    environment: Environment,
    api_key: String,
    stack: Stack,
    summary: ReconcileSummary,
    min_function_tag_upserts: usize,
}

impl<'a> StackCoordinator<'a> {
    pub fn new(
        options: StackOptions,
        environment: Environment,
        identity: &'a dyn IdentityProvider,
        compute: &'a dyn ComputeProvider,
    ) -> Self {
        let name = environment.stack_name(&options.stack_name);
        Self {
            identity,
            compute,
            environment,
            api_key: options.api_key,
            stack: Stack::new(name, options.user),
            summary: ReconcileSummary::default(),
            min_function_tag_upserts: 1,
        }
    }

    /// See [`FunctionReconciler::with_min_tag_upserts`]
    pub fn with_min_function_tag_upserts(mut self, min: usize) -> Self {
        self.min_function_tag_upserts = min;
        self
    }

    /// Load the persisted stack document
    ///
    /// Called once before any builder. The recorded actions are adopted; name
    /// and user stay as configured and the run starts ready even if the last
    /// run ended in rollback. With `ignore_failure`, a failed load is logged
    /// and the run continues with a fresh stack.
    pub fn init(&mut self, store: &dyn StackStore, ignore_failure: bool) -> std::result::Result<(), StoreError> {
        match store.load(&self.stack.name, &self.stack.user, &self.api_key) {
            Ok(Some(loaded)) => {
                if loaded.run.state() == RunState::Rollback {
                    log::info!("Stack {} ended its last run in rollback", self.stack.name);
                }
                for action in loaded.run.actions() {
                    self.stack.run.record_action(action.clone());
                }
                log::debug!(
                    "Loaded stack {} with {} actions",
                    self.stack.name,
                    loaded.run.actions().count()
                );
                Ok(())
            }
            Ok(None) => {
                log::info!("No stored stack {}, starting fresh", self.stack.name);
                Ok(())
            }
            Err(e) if ignore_failure => {
                log::warn!("Error loading stack {}, continuing: {e}", self.stack.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the stack document
    pub fn save(&self, store: &dyn StackStore) -> std::result::Result<(), StoreError> {
        store.save(&self.stack, &self.api_key)
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Effective stack name (base name plus environment suffix)
    pub fn name(&self) -> &str {
        &self.stack.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn state(&self) -> RunState {
        self.stack.run.state()
    }

    pub fn summary(&self) -> &ReconcileSummary {
        &self.summary
    }

    /// Fail with [`Error::RolledBack`] unless the stack is ready
    pub fn ensure_ready(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.stack.run.ensure_ready(kind, name)
    }

    /// Flip the stack into rollback and hand the error back
    pub fn handle_error(&mut self, err: Error) -> Error {
        self.stack.run.fail(err)
    }

    pub fn get_action(&self, name: &str) -> Option<&Action> {
        self.stack.run.action(name)
    }

    pub fn update_action(&mut self, action: Action) {
        self.stack.run.record_action(action);
    }

    /// ARN of a managed policy of this account by name
    pub fn policy_arn(&self, name: &str) -> String {
        PolicyReconciler::new(self.identity, &self.environment.account_id).arn_for(name)
    }

    pub fn create_role(&mut self, spec: &RoleSpec) -> Result<Converged<Role>> {
        let result = converge(&RoleReconciler::new(self.identity), &mut self.stack.run, spec);
        self.track(result)
    }

    pub fn create_managed_policy(&mut self, spec: &PolicySpec) -> Result<Converged<ManagedPolicy>> {
        let policies = PolicyReconciler::new(self.identity, &self.environment.account_id);
        let result = converge(&policies, &mut self.stack.run, spec);
        self.track(result)
    }

    /// Attach a managed policy to a role unless it already is
    pub fn add_managed_policy_to_role(&mut self, role_name: &str, policy_arn: &str) -> Result<Outcome> {
        let result =
            PolicyAttachment::new(self.identity).attach(&mut self.stack.run, role_name, policy_arn);
        self.count(result.as_ref().map(|outcome| *outcome));
        result
    }

    /// Every managed policy attached to a role
    pub fn list_all_managed_policies_for_role(&self, role_name: &str) -> Result<Vec<AttachedPolicy>> {
        PolicyAttachment::new(self.identity).list_attached_policies(&self.stack.run, role_name)
    }

    /// Create or update a function
    ///
    /// Only inline zip packages are supported.
    pub fn create_function(&mut self, spec: &FunctionSpec) -> Result<Converged<FunctionState>> {
        let functions =
            FunctionReconciler::new(self.compute).with_min_tag_upserts(self.min_function_tag_upserts);
        let result = converge(&functions, &mut self.stack.run, spec);
        self.track(result)
    }

    fn track<T>(&mut self, result: Result<Converged<T>>) -> Result<Converged<T>> {
        self.count(result.as_ref().map(|converged| converged.outcome));
        result
    }

    fn count(&mut self, outcome: std::result::Result<Outcome, &Error>) {
        match outcome {
            Ok(outcome) => self.summary.add_outcome(outcome),
            Err(e) if e.kind() == ErrorKind::RolledBack => {}
            Err(_) => self.summary.add_failure(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryCloud;
    use crate::provider::error::ProviderError;
    use crate::stack::FileStackStore;
    use crate::testing::{ACCOUNT, REGION, cloud, lambda_trust_policy, write_package};
    use crate::iam::{PolicyDocument, PolicyStatement};

    fn environment(name: &str) -> Environment {
        Environment::new(Some(REGION), Some(ACCOUNT), Some(name)).unwrap()
    }

    fn options() -> StackOptions {
        StackOptions {
            api_key: "key".into(),
            stack_name: "penny-auth".into(),
            user: "penny".into(),
        }
    }

    fn coordinator(cloud: &MemoryCloud) -> StackCoordinator<'_> {
        StackCoordinator::new(options(), environment("dev"), cloud, cloud)
    }

    struct FailingStore;

    impl StackStore for FailingStore {
        fn load(&self, _: &str, _: &str, _: &str) -> std::result::Result<Option<Stack>, StoreError> {
            Err(StoreError::InvalidResponse {
                url: "http://stack".into(),
                message: "not json".into(),
            })
        }

        fn save(&self, _: &Stack, _: &str) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_stack_name_uses_environment() {
        let cloud = cloud();
        assert_eq!(coordinator(&cloud).name(), "penny-auth-dev");
        let prod = StackCoordinator::new(options(), environment("production"), &cloud, &cloud);
        assert_eq!(prod.name(), "penny-auth");
        assert_eq!(prod.state(), RunState::Ready);
    }

    #[test]
    fn test_init_failure_handling() {
        let cloud = cloud();
        let mut coord = coordinator(&cloud);
        assert!(coord.init(&FailingStore, false).is_err());
        assert!(coord.init(&FailingStore, true).is_ok());
        assert_eq!(coord.state(), RunState::Ready);
    }

    #[test]
    fn test_init_adopts_actions_and_starts_ready() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStackStore::new(dir.path());
        let cloud = cloud();

        let mut first = coordinator(&cloud);
        first.create_role(&RoleSpec::new("r", lambda_trust_policy())).unwrap();
        first.handle_error(Error::invalid(ResourceKind::Role, "x", "boom"));
        first.save(&store).unwrap();

        let mut second = coordinator(&cloud);
        second.init(&store, false).unwrap();
        assert!(second.get_action("create-role-r").is_some());
        assert_eq!(second.state(), RunState::Ready);
        assert_eq!(second.name(), "penny-auth-dev");
    }

    #[test]
    fn test_rollback_blocks_every_builder() {
        let cloud = cloud();
        cloud.fail_on("GetRole", ProviderError::from_code("AccessDenied", "no"));
        let mut coord = coordinator(&cloud);

        let err = coord.create_role(&RoleSpec::new("r", lambda_trust_policy())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(coord.state(), RunState::Rollback);
        cloud.clear_calls();

        let policy = PolicySpec::new("p", PolicyDocument::new(vec![PolicyStatement::allow("s3:*")]));
        let dir = tempfile::tempdir().unwrap();
        let zip = write_package(dir.path(), "f.zip", b"code");
        let function = FunctionSpec::new("f", "arn:role", "index.handler", zip);

        for err in [
            coord.create_managed_policy(&policy).unwrap_err(),
            coord.create_function(&function).unwrap_err(),
            coord.add_managed_policy_to_role("r", "arn:p").unwrap_err(),
            coord.list_all_managed_policies_for_role("r").unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::RolledBack);
        }
        assert_eq!(cloud.request_count(), 0);
        assert_eq!(coord.summary().failed, 1);
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let cloud = cloud();
        let mut coord = coordinator(&cloud);
        let role = RoleSpec::new("r", lambda_trust_policy());
        coord.create_role(&role).unwrap();
        coord.create_role(&role).unwrap();

        let policy = coord
            .create_managed_policy(&PolicySpec::new(
                "p",
                PolicyDocument::new(vec![PolicyStatement::allow("s3:*")]),
            ))
            .unwrap();
        coord.add_managed_policy_to_role("r", &policy.resource.arn).unwrap();
        assert_eq!(coord.list_all_managed_policies_for_role("r").unwrap().len(), 1);

        let summary = coord.summary();
        assert_eq!(summary.created, 3);
        assert_eq!(summary.unchanged, 1);
        assert!(summary.is_success());
        assert_eq!(coord.policy_arn("p"), policy.resource.arn);
    }
}
