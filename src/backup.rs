//! Timestamped backups of the active configuration
//!
//! [`BackupStore`] owns the backup directory. Records are append-only:
//! a snapshot never deletes or overwrites an existing record, and rollback
//! always restores the most recent one.

use chrono::Local;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{UpdaterError, UpdaterResult};

/// One preserved configuration version, named
/// `<original>.backup_<YYYYMMDD_HHMMSS>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    path: PathBuf,
}

impl BackupRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append-only store of prior configuration versions
pub struct BackupStore {
    backup_dir: PathBuf,
}

impl BackupStore {
    pub fn new<P: Into<PathBuf>>(backup_dir: P) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy the file at `current` into a new timestamped record.
    ///
    /// Returns `Ok(None)` when no prior configuration exists yet; the first
    /// install has nothing worth preserving. `fs::copy` carries the original
    /// permission bits over to the record.
    pub async fn snapshot(&self, current: &Path) -> UpdaterResult<Option<BackupRecord>> {
        match tokio::fs::metadata(current).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing configuration at {:?}, skipping backup", current);
                return Ok(None);
            }
            Err(e) => return Err(UpdaterError::Io(e)),
        }

        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let filename = current
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UpdaterError::Config(format!("Invalid configuration path: {:?}", current))
            })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}.backup_{}", filename, timestamp);

        // Never overwrite an existing record; two snapshots within the same
        // second get a counter suffix.
        let mut target = self.backup_dir.join(&base);
        let mut counter = 0u32;
        while tokio::fs::try_exists(&target).await? {
            counter += 1;
            target = self.backup_dir.join(format!("{}-{}", base, counter));
        }

        tokio::fs::copy(current, &target).await?;
        info!("Backup created: {:?}", target);

        Ok(Some(BackupRecord { path: target }))
    }

    /// Find the most recent record for the file named by `dest`
    pub async fn latest_for(&self, dest: &Path) -> UpdaterResult<Option<BackupRecord>> {
        let filename = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UpdaterError::Config(format!("Invalid configuration path: {:?}", dest))
            })?;
        let prefix = format!("{}.backup_", filename);

        let mut entries = match tokio::fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(UpdaterError::Io(e)),
        };

        // Timestamped names sort chronologically, so the lexicographic
        // maximum is the newest record.
        let mut newest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }
            if newest.as_deref().map_or(true, |n| name > n) {
                newest = Some(name.to_string());
            }
        }

        Ok(newest.map(|name| BackupRecord {
            path: self.backup_dir.join(name),
        }))
    }

    /// Restore the most recent record over `dest`.
    ///
    /// This is the rollback path: a missing record is `RollbackNotFound`
    /// and a failed copy is `RollbackWrite`, both fatal for the run.
    pub async fn restore_latest(&self, dest: &Path) -> UpdaterResult<BackupRecord> {
        let record = self.latest_for(dest).await?.ok_or_else(|| {
            UpdaterError::RollbackNotFound(format!(
                "No backup for {:?} in {:?}",
                dest, self.backup_dir
            ))
        })?;

        tokio::fs::copy(record.path(), dest).await.map_err(|e| {
            UpdaterError::RollbackWrite(format!(
                "Failed to restore {:?} to {:?}: {}",
                record.path(),
                dest,
                e
            ))
        })?;

        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| {
                UpdaterError::RollbackWrite(format!(
                    "Failed to set permissions on {:?}: {}",
                    dest, e
                ))
            })?;

        info!("Configuration restored from backup: {:?}", record.path());
        Ok(record)
    }
}
