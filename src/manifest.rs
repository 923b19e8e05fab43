//! Stack manifest
//!
//! A TOML file describing one stack and the resources it should contain:
//!
//! ```toml
//! [stack]
//! name = "penny-auth"
//! user = "penny"
//!
//! [[lambdas]]
//! name = "authorize"
//! zip_location = "dist.zip"
//! handler = "dist/index.handler"
//! ```
//!
//! Resources are applied in a fixed order (roles, policies, attachments,
//! functions, lambdas) and the first failure stops the run.

use crate::iam::{PolicySpec, RoleSpec};
use crate::lambda::{FunctionSpec, LambdaSpec};
use crate::stack::{StackCoordinator, StackOptions};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Variable holding the stack service API key unless the manifest names another
pub const DEFAULT_API_KEY_ENV: &str = "PENNY_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSection {
    /// Base name, suffixed with the environment outside production
    pub name: String,
    pub user: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Stack service URL; stacks are kept on disk when absent
    #[serde(default)]
    pub store_url: Option<String>,
    /// Continue with a fresh stack if loading fails (default: only in dev)
    #[serde(default)]
    pub ignore_load_failure: Option<bool>,
    /// See `FunctionReconciler::with_min_tag_upserts`
    #[serde(default)]
    pub min_function_tag_upserts: Option<usize>,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

/// A managed policy to attach to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub role: String,
    /// Policy ARN, or the name of a policy in the target account
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub stack: StackSection,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
    #[serde(default)]
    pub attachments: Vec<AttachmentSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub lambdas: Vec<LambdaSpec>,
}

impl Manifest {
    /// Read a manifest; package paths are resolved against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
            .with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut manifest: Self = toml::from_str(content).context("Failed to parse TOML")?;
        for function in &mut manifest.functions {
            function.zip_location = resolve(base_dir, &function.zip_location);
        }
        for lambda in &mut manifest.lambdas {
            lambda.zip_location = resolve(base_dir, &lambda.zip_location);
        }
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check names are present and unique per resource kind
    pub fn validate(&self) -> Result<()> {
        if self.stack.name.trim().is_empty() {
            bail!("stack.name must not be empty");
        }
        if self.stack.user.trim().is_empty() {
            bail!("stack.user must not be empty");
        }
        check_names("role", self.roles.iter().map(|r| r.name.as_str()))?;
        check_names("policy", self.policies.iter().map(|p| p.name.as_str()))?;
        check_names("function", self.functions.iter().map(|f| f.name.as_str()))?;
        check_names("lambda", self.lambdas.iter().map(|l| l.name.as_str()))?;
        for attachment in &self.attachments {
            if attachment.role.is_empty() || attachment.policy.is_empty() {
                bail!("attachments need both a role and a policy");
            }
        }
        Ok(())
    }

    pub fn resource_count(&self) -> usize {
        self.roles.len()
            + self.policies.len()
            + self.attachments.len()
            + self.functions.len()
            + self.lambdas.len()
    }

    /// Roles the manifest creates or attaches to, without duplicates
    pub fn role_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.roles
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.attachments.iter().map(|a| a.role.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn stack_options(&self, api_key: String) -> StackOptions {
        StackOptions {
            api_key,
            stack_name: self.stack.name.clone(),
            user: self.stack.user.clone(),
        }
    }

    /// Reconcile every resource, stopping at the first failure
    pub fn apply(&self, coordinator: &mut StackCoordinator<'_>) -> declarative::Result<()> {
        for role in &self.roles {
            coordinator.create_role(role)?;
        }
        for policy in &self.policies {
            coordinator.create_managed_policy(policy)?;
        }
        for attachment in &self.attachments {
            let arn = if attachment.policy.starts_with("arn:") {
                attachment.policy.clone()
            } else {
                coordinator.policy_arn(&attachment.policy)
            };
            coordinator.add_managed_policy_to_role(&attachment.role, &arn)?;
        }
        for function in &self.functions {
            coordinator.create_function(function)?;
        }
        for lambda in &self.lambdas {
            coordinator.create_lambda(lambda)?;
        }
        Ok(())
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn check_names<'n>(kind: &str, names: impl Iterator<Item = &'n str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            bail!("{kind} with an empty name");
        }
        if !seen.insert(name) {
            bail!("duplicate {kind} \"{name}\"");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::testing::{ACCOUNT, REGION, cloud, write_package};
    use declarative::{ErrorKind, RunState};

    const MANIFEST: &str = r#"
[stack]
name = "penny-auth"
user = "penny"

[[roles]]
name = "shared-role"
description = "shared"
tags = { team = "core" }

[roles.trust_policy]
Version = "2012-10-17"

[[roles.trust_policy.Statement]]
Effect = "Allow"
Action = "sts:AssumeRole"
Principal = { Service = "lambda.amazonaws.com" }

[[policies]]
name = "read-bucket"

[policies.document]
[[policies.document.Statement]]
Effect = "Allow"
Action = ["s3:GetObject"]
Resource = "arn:aws:s3:::bucket/*"

[[attachments]]
role = "shared-role"
policy = "read-bucket"

[[lambdas]]
name = "authorize"
zip_location = "dist.zip"
handler = "dist/index.handler"
environment = { LOG_LEVEL = "info" }
"#;

    fn environment() -> Environment {
        Environment::new(Some(REGION), Some(ACCOUNT), Some("dev")).unwrap()
    }

    #[test]
    fn test_parse_resolves_packages() {
        let manifest = Manifest::parse(MANIFEST, Path::new("/srv/app")).unwrap();
        assert_eq!(manifest.stack.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(manifest.resource_count(), 4);
        assert_eq!(manifest.lambdas[0].zip_location, PathBuf::from("/srv/app/dist.zip"));
        assert_eq!(manifest.roles[0].tags.get("team").map(String::as_str), Some("core"));
    }

    #[test]
    fn test_role_names_include_attachment_targets() {
        let mut manifest = Manifest::parse(MANIFEST, Path::new(".")).unwrap();
        manifest.attachments.push(AttachmentSpec {
            role: "external-role".into(),
            policy: "arn:aws:iam::aws:policy/ReadOnlyAccess".into(),
        });
        assert_eq!(manifest.role_names(), vec!["shared-role", "external-role"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let content = r#"
[stack]
name = "s"
user = "u"

[[functions]]
name = "f"
role = "arn:r"
handler = "h"
zip_location = "a.zip"

[[functions]]
name = "f"
role = "arn:r"
handler = "h"
zip_location = "b.zip"
"#;
        let err = Manifest::parse(content, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("duplicate function"));
    }

    #[test]
    fn test_apply_and_reapply() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "dist.zip", b"bundle");
        let path = dir.path().join("penny.toml");
        fs::write(&path, MANIFEST).unwrap();
        let manifest = Manifest::load(&path).unwrap();

        let cloud = cloud();
        let mut coord =
            StackCoordinator::new(manifest.stack_options(String::new()), environment(), &cloud, &cloud);
        manifest.apply(&mut coord).unwrap();
        assert_eq!(
            cloud.attached_policies("shared-role")[0].policy_arn,
            "arn:aws:iam::123456789012:policy/read-bucket"
        );
        assert!(cloud.function("penny-auth-dev-authorize").is_some());
        cloud.clear_calls();

        let mut again =
            StackCoordinator::new(manifest.stack_options(String::new()), environment(), &cloud, &cloud);
        manifest.apply(&mut again).unwrap();
        assert!(cloud.calls().is_empty());
        assert_eq!(again.summary().total_changes(), 0);
    }

    #[test]
    fn test_apply_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::parse(MANIFEST, dir.path()).unwrap();
        let cloud = cloud();
        let mut coord =
            StackCoordinator::new(manifest.stack_options(String::new()), environment(), &cloud, &cloud);

        // dist.zip was never written
        let err = manifest.apply(&mut coord).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(coord.state(), RunState::Rollback);
        assert!(cloud.function("penny-auth-dev-authorize").is_none());
    }
}
