//! Atomic installation of a candidate configuration
//!
//! Bytes are written to a sibling `.new` file, locked down to owner
//! read/write, then renamed over the destination. A crash mid-write leaves
//! the active configuration untouched.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::error::{UpdaterError, UpdaterResult};

/// Restrictive mode for installed configurations (credentials may be inline)
const INSTALLED_MODE: u32 = 0o600;

pub struct ConfigInstaller;

impl ConfigInstaller {
    pub fn new() -> Self {
        Self
    }

    /// Install `candidate` at `dest`, replacing any existing file atomically.
    /// Installing the same candidate twice is a no-op in effect.
    pub async fn install(&self, candidate: &Artifact, dest: &Path) -> UpdaterResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                UpdaterError::Install(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        let staging = Self::staging_path(dest);
        debug!("Writing candidate to staging file {:?}", staging);

        tokio::fs::write(&staging, candidate.bytes())
            .await
            .map_err(|e| {
                UpdaterError::Install(format!("Failed to write {:?}: {}", staging, e))
            })?;

        tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(INSTALLED_MODE))
            .await
            .map_err(|e| {
                UpdaterError::Install(format!(
                    "Failed to set permissions on {:?}: {}",
                    staging, e
                ))
            })?;

        tokio::fs::rename(&staging, dest).await.map_err(|e| {
            // Leave no stale staging file behind
            let _ = std::fs::remove_file(&staging);
            UpdaterError::Install(format!("Failed to replace {:?}: {}", dest, e))
        })?;

        info!(
            "Configuration installed: {:?} ({} bytes, sha256 {})",
            dest,
            candidate.size(),
            candidate.digest_hex()
        );
        Ok(())
    }

    fn staging_path(dest: &Path) -> PathBuf {
        let mut name = dest.as_os_str().to_os_string();
        name.push(".new");
        PathBuf::from(name)
    }
}

impl Default for ConfigInstaller {
    fn default() -> Self {
        Self::new()
    }
}
