//! Fixtures shared by unit tests

use crate::iam::document::{PolicyDocument, PolicyStatement, Principal};
use crate::provider::MemoryCloud;
use std::fs;
use std::path::{Path, PathBuf};

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "us-east-1";

pub fn cloud() -> MemoryCloud {
    MemoryCloud::new(ACCOUNT, REGION)
}

/// Trust policy letting the compute service assume a role
pub fn lambda_trust_policy() -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::allow("sts:AssumeRole")
            .for_principal(Principal::service("lambda.amazonaws.com")),
    ])
}

/// Write a fake deployment package
pub fn write_package(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}
