//! Configuration artifacts and change detection
//!
//! An [`Artifact`] is an immutable snapshot of a configuration file's
//! content plus its size and SHA-256 digest. The remote candidate and the
//! locally installed file are both represented this way so the update
//! decision is a pure comparison of two values.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::error::{UpdaterError, UpdaterResult};

/// A configuration file's bytes plus identity metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
    digest: [u8; 32],
}

impl Artifact {
    /// Build an artifact from in-memory bytes, computing its digest
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let digest = Sha256::digest(&bytes).into();
        Self { bytes, digest }
    }

    /// Read the file at `path` into an artifact; `Ok(None)` when the file
    /// does not exist
    pub async fn from_file(path: &Path) -> UpdaterResult<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(Self::from_bytes(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UpdaterError::Io(e)),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Hex rendering of the digest for log lines
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Whether the candidate differs from the installed configuration.
/// Recomputed on every run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    NoChangeNeeded,
    UpdateRequired,
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateDecision::NoChangeNeeded => write!(f, "no change needed"),
            UpdateDecision::UpdateRequired => write!(f, "update required"),
        }
    }
}

/// Decide whether `remote` should replace `local`.
///
/// Size is compared first; the digest is only consulted when sizes match.
/// An empty candidate is rejected outright so a truncated or corrupt
/// download can never be installed.
pub fn decide_update(
    remote: &Artifact,
    local: Option<&Artifact>,
) -> UpdaterResult<UpdateDecision> {
    if remote.size() == 0 {
        return Err(UpdaterError::InvalidArtifact(
            "candidate configuration is empty".to_string(),
        ));
    }

    let local = match local {
        // Bootstrap: nothing installed yet
        None => return Ok(UpdateDecision::UpdateRequired),
        Some(local) => local,
    };

    if remote.size() != local.size() {
        return Ok(UpdateDecision::UpdateRequired);
    }

    if remote.digest() == local.digest() {
        Ok(UpdateDecision::NoChangeNeeded)
    } else {
        Ok(UpdateDecision::UpdateRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_size_and_digest_needs_no_change() {
        let remote = Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec());
        let local = Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec());

        assert_eq!(
            decide_update(&remote, Some(&local)).unwrap(),
            UpdateDecision::NoChangeNeeded
        );
    }

    #[test]
    fn size_difference_forces_update() {
        let remote = Artifact::from_bytes(b"remote 1.2.3.4 1194\ncipher AES-256-GCM".to_vec());
        let local = Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec());

        assert_eq!(
            decide_update(&remote, Some(&local)).unwrap(),
            UpdateDecision::UpdateRequired
        );
    }

    #[test]
    fn equal_size_different_content_forces_update() {
        let remote = Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec());
        let local = Artifact::from_bytes(b"remote 5.6.7.8 1194".to_vec());
        assert_eq!(remote.size(), local.size());

        assert_eq!(
            decide_update(&remote, Some(&local)).unwrap(),
            UpdateDecision::UpdateRequired
        );
    }

    #[test]
    fn absent_local_is_bootstrap_install() {
        let remote = Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec());

        assert_eq!(
            decide_update(&remote, None).unwrap(),
            UpdateDecision::UpdateRequired
        );
    }

    #[test]
    fn empty_candidate_is_rejected() {
        let remote = Artifact::from_bytes(Vec::new());
        let local = Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec());

        match decide_update(&remote, Some(&local)) {
            Err(UpdaterError::InvalidArtifact(_)) => {}
            other => panic!("expected InvalidArtifact, got {:?}", other),
        }
    }

    #[test]
    fn digest_hex_is_stable_sha256() {
        let artifact = Artifact::from_bytes(b"abc".to_vec());
        assert_eq!(
            artifact.digest_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn from_file_reports_absent_file_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("client.conf");

        assert!(Artifact::from_file(&missing).await.unwrap().is_none());

        tokio::fs::write(&missing, b"remote 1.2.3.4 1194").await.unwrap();
        let artifact = Artifact::from_file(&missing).await.unwrap().unwrap();
        assert_eq!(artifact.size(), 19);
    }
}
