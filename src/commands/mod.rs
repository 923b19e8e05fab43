// Manifest and environment validation
pub mod check;

// Offline reconciliation against a cloud snapshot
pub mod plan;

// Persisted stack documents
pub mod stack;

use crate::config::{self, Environment};
use crate::manifest::Manifest;
use crate::stack::{FileStackStore, HttpStackStore, StackStore};
use anyhow::Result;
use std::env;
use std::path::Path;

/// Store configured by the manifest: the stack service when it names a URL,
/// local files otherwise
pub fn stack_store(manifest: &Manifest, state_dir: Option<&Path>) -> Result<Box<dyn StackStore>> {
    if let Some(url) = &manifest.stack.store_url {
        log::debug!("Using stack service at {url}");
        return Ok(Box::new(HttpStackStore::with_base_url(url.as_str())));
    }
    let dir = match state_dir {
        Some(dir) => dir.to_path_buf(),
        None => config::state_dir()?.join("stacks"),
    };
    log::debug!("Using local stacks in {}", dir.display());
    Ok(Box::new(FileStackStore::new(dir)))
}

/// API key from the variable the manifest names; empty when unset
pub fn api_key(manifest: &Manifest) -> String {
    env::var(&manifest.stack.api_key_env).unwrap_or_else(|_| {
        log::debug!("{} is not set", manifest.stack.api_key_env);
        String::new()
    })
}

/// Whether a failed stack load is tolerated
pub fn ignore_load_failure(manifest: &Manifest, environment: &Environment) -> bool {
    manifest
        .stack
        .ignore_load_failure
        .unwrap_or_else(|| environment.is_dev())
}
