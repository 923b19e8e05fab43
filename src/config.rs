//! Process configuration
//!
//! Region, account and environment name must all be present before any
//! reconciler is built. They normally come from the `REGION`,
//! `ACCOUNT_NUMBER` and `ENVIRONMENT` variables (see [`crate::cli::EnvArgs`]).

use anyhow::{Context, Result};
use std::path::PathBuf;
use thiserror::Error;

/// Environment that needs no stack-name suffix
pub const PRODUCTION: &str = "production";

/// Environment in which a failed stack load is tolerated by default
pub const DEV: &str = "dev";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set; REGION, ACCOUNT_NUMBER and ENVIRONMENT are all required")]
    Missing(&'static str),
}

/// Target of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub region: String,
    pub account_id: String,
    /// Deployment environment, e.g. "dev" or "production"
    pub name: String,
}

impl Environment {
    /// Validate and build from optional values
    pub fn new(
        region: Option<&str>,
        account_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, ConfigError> {
        fn required(value: Option<&str>, var: &'static str) -> Result<String, ConfigError> {
            match value.map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(ConfigError::Missing(var)),
            }
        }

        Ok(Self {
            region: required(region, "REGION")?,
            account_id: required(account_id, "ACCOUNT_NUMBER")?,
            name: required(name, "ENVIRONMENT")?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.name == PRODUCTION
    }

    pub fn is_dev(&self) -> bool {
        self.name == DEV
    }

    /// Effective stack name for a base name
    ///
    /// Production stacks keep the base name; every other environment gets
    /// its name appended.
    pub fn stack_name(&self, base: &str) -> String {
        if self.is_production() {
            base.to_string()
        } else {
            format!("{base}-{}", self.name)
        }
    }
}

/// Get the state directory path (~/.local/state/penny)
pub fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("penny"))
}
