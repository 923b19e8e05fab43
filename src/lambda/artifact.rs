//! Deployment package handling

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Base64-encoded SHA-256 of a package, in the form the compute API reports it
pub fn code_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    STANDARD.encode(hasher.finalize())
}

/// A zip package read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl CodeArtifact {
    /// Read the package at `path`
    pub fn read(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        log::debug!("Read {} bytes of code from {}", bytes.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    /// Hash comparable with the provider-reported code hash
    pub fn sha256(&self) -> String {
        code_sha256(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_code_sha256_known_value() {
        // sha256("") in base64
        assert_eq!(
            code_sha256(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_ne!(code_sha256(b"a"), code_sha256(b"b"));
    }

    #[test]
    fn test_read_artifact() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04zip").unwrap();

        let artifact = CodeArtifact::read(file.path()).unwrap();
        assert_eq!(artifact.bytes, b"PK\x03\x04zip");
        assert_eq!(artifact.sha256(), code_sha256(b"PK\x03\x04zip"));
    }

    #[test]
    fn test_read_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CodeArtifact::read(dir.path().join("missing.zip")).is_err());
    }
}
