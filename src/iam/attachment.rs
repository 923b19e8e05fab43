//! Managed policy attachment
//!
//! Attachments have no desired/actual shape of their own: a policy is either
//! in the role's attached list or it is not.

use crate::provider::{AttachedPolicy, IdentityProvider, ProviderResultExt};
use chrono::Utc;
use declarative::{Action, Error, Outcome, ResourceKind, Result, RunContext};

/// Upper bound on listing pages followed for one role
pub const MAX_ATTACHMENT_PAGES: usize = 100;

pub struct PolicyAttachment<'a> {
    provider: &'a dyn IdentityProvider,
}

impl<'a> PolicyAttachment<'a> {
    pub fn new(provider: &'a dyn IdentityProvider) -> Self {
        Self { provider }
    }

    /// Every managed policy attached to `role_name`
    ///
    /// Follows the provider's cursor until the listing is no longer truncated.
    pub fn list_attached_policies(
        &self,
        ctx: &RunContext,
        role_name: &str,
    ) -> Result<Vec<AttachedPolicy>> {
        let kind = ResourceKind::PolicyAttachment;
        ctx.ensure_ready(kind, role_name)?;

        let mut policies = Vec::new();
        let mut marker: Option<String> = None;
        for page_number in 1..=MAX_ATTACHMENT_PAGES {
            let page = self
                .provider
                .list_attached_role_policies(role_name, marker.as_deref())
                .for_resource("ListAttachedRolePolicies", kind, role_name)?;
            log::debug!(
                "Page {page_number} of policies attached to {role_name}: {} entries",
                page.policies.len()
            );
            policies.extend(page.policies);
            match page.marker {
                Some(next) => marker = Some(next),
                None => return Ok(policies),
            }
        }

        Err(Error::inconsistent(
            kind,
            role_name,
            format!("attached policy listing did not finish within {MAX_ATTACHMENT_PAGES} pages"),
        ))
    }

    /// Attach `policy_arn` to `role_name` unless it already is
    ///
    /// Any failure rolls the run back.
    pub fn attach(&self, ctx: &mut RunContext, role_name: &str, policy_arn: &str) -> Result<Outcome> {
        let kind = ResourceKind::PolicyAttachment;
        ctx.ensure_ready(kind, role_name)?;
        log::info!("Adding managed policy {policy_arn} to role {role_name}");

        let attached = match self.list_attached_policies(ctx, role_name) {
            Ok(attached) => attached,
            Err(e) => return Err(ctx.fail(e)),
        };
        if attached.iter().any(|p| p.policy_arn == policy_arn) {
            log::debug!("{policy_arn} is already attached to {role_name}");
            return Ok(Outcome::Unchanged);
        }

        if let Err(e) = self
            .provider
            .attach_role_policy(role_name, policy_arn)
            .for_resource("AttachRolePolicy", kind, role_name)
        {
            return Err(ctx.fail(e));
        }
        ctx.record_action(Action::reconciled(
            kind,
            &attachment_name(role_name, policy_arn),
            Outcome::Created,
            Utc::now(),
        ));
        Ok(Outcome::Created)
    }
}

/// Name an attachment is recorded under
fn attachment_name(role_name: &str, policy_arn: &str) -> String {
    let policy = policy_arn.rsplit('/').next().unwrap_or(policy_arn);
    format!("{role_name}-{policy}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::document::PolicyStatement;
    use crate::iam::{PolicyDocument, PolicyReconciler, PolicySpec, RoleReconciler, RoleSpec};
    use crate::provider::MemoryCloud;
    use crate::provider::error::ProviderError;
    use crate::testing::{ACCOUNT, cloud, lambda_trust_policy};
    use declarative::{ErrorKind, converge};

    /// A role plus `count` policies, none attached
    fn setup(count: usize) -> (MemoryCloud, Vec<String>) {
        let cloud = cloud();
        let mut ctx = RunContext::new();
        converge(
            &RoleReconciler::new(&cloud),
            &mut ctx,
            &RoleSpec::new("svc-role", lambda_trust_policy()),
        )
        .unwrap();
        let policies = PolicyReconciler::new(&cloud, ACCOUNT);
        let arns = (0..count)
            .map(|i| {
                let doc = PolicyDocument::new(vec![PolicyStatement::allow("s3:GetObject")]);
                converge(&policies, &mut ctx, &PolicySpec::new(format!("p{i}"), doc))
                    .unwrap()
                    .resource
                    .arn
            })
            .collect();
        cloud.clear_calls();
        (cloud, arns)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (cloud, arns) = setup(1);
        let attachments = PolicyAttachment::new(&cloud);
        let mut ctx = RunContext::new();

        assert_eq!(attachments.attach(&mut ctx, "svc-role", &arns[0]).unwrap(), Outcome::Created);
        assert_eq!(attachments.attach(&mut ctx, "svc-role", &arns[0]).unwrap(), Outcome::Unchanged);
        assert_eq!(cloud.operations(), vec!["AttachRolePolicy"]);
        assert!(ctx.action("create-policy-attachment-svc-role-p0").is_some());
    }

    #[test]
    fn test_listing_drains_every_page() {
        let (cloud, arns) = setup(5);
        cloud.set_page_size(2);
        let attachments = PolicyAttachment::new(&cloud);
        let mut ctx = RunContext::new();
        for arn in &arns[..4] {
            attachments.attach(&mut ctx, "svc-role", arn).unwrap();
        }

        let listed = attachments.list_attached_policies(&ctx, "svc-role").unwrap();
        assert_eq!(listed.len(), 4);

        // The fifth is absent from every page, the first sits on page one
        cloud.clear_calls();
        attachments.attach(&mut ctx, "svc-role", &arns[0]).unwrap();
        attachments.attach(&mut ctx, "svc-role", &arns[4]).unwrap();
        assert_eq!(cloud.operations(), vec!["AttachRolePolicy"]);
    }

    #[test]
    fn test_listing_failure_rolls_back() {
        let (cloud, arns) = setup(1);
        cloud.fail_on(
            "ListAttachedRolePolicies",
            ProviderError::from_code("AccessDenied", "no"),
        );
        let attachments = PolicyAttachment::new(&cloud);
        let mut ctx = RunContext::new();

        let err = attachments.attach(&mut ctx, "svc-role", &arns[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(!ctx.is_ready());
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_rolled_back_context_skips_provider() {
        let (cloud, arns) = setup(1);
        let attachments = PolicyAttachment::new(&cloud);
        let mut ctx = RunContext::new();
        ctx.rollback(&Error::invalid(ResourceKind::Role, "x", "earlier failure"));
        cloud.clear_calls();

        let err = attachments.attach(&mut ctx, "svc-role", &arns[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RolledBack);
        assert_eq!(cloud.request_count(), 0);
    }
}
