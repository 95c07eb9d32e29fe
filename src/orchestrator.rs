//! The update-verify-rollback state machine
//!
//! One run walks `Idle → Comparing → Installing → Restarting → Verifying`
//! and terminates in a [`UpdateOutcome`]. Failed verification rolls back to
//! the latest backup; a failed rollback is the single most severe condition
//! this engine can reach and is logged accordingly.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::artifact::{decide_update, Artifact, UpdateDecision};
use crate::backup::BackupStore;
use crate::config::UpdaterConfig;
use crate::error::UpdaterResult;
use crate::installer::ConfigInstaller;
use crate::service::ServiceController;
use crate::source::ArtifactSource;
use crate::verify::{ConnectivityVerifier, VerificationConfig, VerificationResult};

/// Terminal record of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Remote and local configuration already match
    NoActionTaken,
    /// New configuration installed and verified (or verification disabled)
    UpdatedSuccessfully,
    /// New configuration failed verification; previous one restored
    UpdatedThenRolledBack,
    /// Update failed with the previous configuration still in place, or
    /// verification failed with rollback disabled
    UpdateFailedNoRollbackPossible,
    /// Verification failed and the backup could not be restored; the VPN
    /// may be broken and needs manual intervention
    RollbackFailed,
}

impl UpdateOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            UpdateOutcome::NoActionTaken | UpdateOutcome::UpdatedSuccessfully => 0,
            UpdateOutcome::UpdatedThenRolledBack => 2,
            UpdateOutcome::UpdateFailedNoRollbackPossible => 3,
            UpdateOutcome::RollbackFailed => 4,
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::NoActionTaken => write!(f, "no action taken"),
            UpdateOutcome::UpdatedSuccessfully => write!(f, "updated successfully"),
            UpdateOutcome::UpdatedThenRolledBack => write!(f, "updated then rolled back"),
            UpdateOutcome::UpdateFailedNoRollbackPossible => {
                write!(f, "update failed, no rollback performed")
            }
            UpdateOutcome::RollbackFailed => write!(f, "rollback failed"),
        }
    }
}

/// Engine phases, logged as the run advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Comparing,
    Installing,
    Restarting,
    Verifying,
    RollingBack,
}

pub struct UpdateOrchestrator {
    config: UpdaterConfig,
    source: Arc<dyn ArtifactSource>,
    service: Arc<dyn ServiceController>,
    installer: ConfigInstaller,
    backups: Option<BackupStore>,
}

impl UpdateOrchestrator {
    pub fn new(
        config: &UpdaterConfig,
        source: Arc<dyn ArtifactSource>,
        service: Arc<dyn ServiceController>,
    ) -> Self {
        let backups = config
            .openvpn
            .backup_path
            .as_ref()
            .map(|dir| BackupStore::new(dir.clone()));

        Self {
            config: config.clone(),
            source,
            service,
            installer: ConfigInstaller::new(),
            backups,
        }
    }

    fn enter(&self, phase: Phase) {
        debug!("Entering phase {:?}", phase);
    }

    /// Execute one complete run.
    ///
    /// Errors before any local mutation (fetch, invalid candidate) are
    /// returned as `Err`; everything after the install resolves to an
    /// [`UpdateOutcome`] so the caller can map it to an exit status.
    pub async fn run(&self) -> UpdaterResult<UpdateOutcome> {
        let remote = self
            .source
            .fetch(
                &self.config.openvpn.remote_path,
                &self.config.openvpn.remote_filename,
            )
            .await?;

        self.enter(Phase::Comparing);
        let local_path = self.config.local_config_path();
        let local = Artifact::from_file(&local_path).await?;

        if local.is_none() {
            info!("No local configuration at {:?}, bootstrap install", local_path);
        }

        match decide_update(&remote, local.as_ref())? {
            UpdateDecision::NoChangeNeeded => {
                info!("Local configuration is up to date ({} bytes)", remote.size());
                Ok(UpdateOutcome::NoActionTaken)
            }
            UpdateDecision::UpdateRequired => self.apply_update(&remote, &local_path).await,
        }
    }

    async fn apply_update(
        &self,
        candidate: &Artifact,
        local_path: &Path,
    ) -> UpdaterResult<UpdateOutcome> {
        info!(
            "Update required: candidate is {} bytes, sha256 {}",
            candidate.size(),
            candidate.digest_hex()
        );

        self.snapshot_current(local_path).await;

        self.enter(Phase::Installing);
        if let Err(e) = self.installer.install(candidate, local_path).await {
            // Write-then-rename failed before the swap; the previous
            // configuration is still in place.
            error!("Install failed, previous configuration untouched: {}", e);
            return Ok(UpdateOutcome::UpdateFailedNoRollbackPossible);
        }

        self.restart_service().await;

        if !self.config.verification.rollback.check_connectivity {
            info!("Connectivity check disabled, accepting new configuration");
            return Ok(UpdateOutcome::UpdatedSuccessfully);
        }

        self.enter(Phase::Verifying);
        let verifier = ConnectivityVerifier::new(
            self.service.clone(),
            VerificationConfig::from(&self.config.verification.rollback),
        );

        match verifier.verify().await {
            VerificationResult::Healthy => {
                info!("Configuration updated and verified: {:?}", local_path);
                Ok(UpdateOutcome::UpdatedSuccessfully)
            }
            VerificationResult::Unhealthy(reason) => {
                error!("Post-update verification failed: {}", reason);

                if !self.config.verification.rollback.auto_rollback {
                    error!("Auto-rollback disabled, leaving new configuration in place");
                    return Ok(UpdateOutcome::UpdateFailedNoRollbackPossible);
                }

                self.roll_back(local_path).await
            }
        }
    }

    /// Preserve the current configuration before touching it. A backup
    /// failure is logged and the update proceeds, matching the behavior of
    /// skipping backups when no backup directory is configured.
    async fn snapshot_current(&self, local_path: &Path) {
        if !self.config.verification.create_backup {
            info!("Backups disabled by configuration");
            return;
        }

        let Some(store) = &self.backups else {
            info!("No backup directory configured, skipping backup");
            return;
        };

        match store.snapshot(local_path).await {
            Ok(Some(_)) => {}
            Ok(None) => {}
            Err(e) => warn!("Backup creation failed, continuing with update: {}", e),
        }
    }

    /// Restart the service. A reported failure is not fatal here: the
    /// verifier will observe an inactive unit and classify it.
    async fn restart_service(&self) {
        if !self.config.verification.restart_openvpn {
            info!("Service restart disabled by configuration");
            return;
        }

        self.enter(Phase::Restarting);
        info!(
            "Restarting service {}",
            self.config.verification.openvpn_service_name
        );
        if let Err(e) = self.service.restart().await {
            warn!("Service restart reported failure: {}", e);
        }
    }

    async fn roll_back(&self, local_path: &Path) -> UpdaterResult<UpdateOutcome> {
        self.enter(Phase::RollingBack);
        warn!("Rolling back to the last known good configuration");

        let Some(store) = &self.backups else {
            error!(
                "CRITICAL: rollback required but no backup directory is configured; \
                 manual intervention required for {:?}",
                local_path
            );
            return Ok(UpdateOutcome::RollbackFailed);
        };

        match store.restore_latest(local_path).await {
            Ok(record) => {
                info!("Restored {:?} from {:?}", local_path, record.path());
                // Bring the service back up on the restored configuration.
                // The result is not verified again: single rollback attempt.
                if let Err(e) = self.service.restart().await {
                    warn!("Restart after rollback reported failure: {}", e);
                }
                warn!("Update rolled back, previous configuration active again");
                Ok(UpdateOutcome::UpdatedThenRolledBack)
            }
            Err(e) => {
                error!(
                    "CRITICAL: rollback failed, VPN may be non-functional and requires \
                     manual intervention: {}",
                    e
                );
                Ok(UpdateOutcome::RollbackFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdaterError;
    use crate::source::MockArtifactSource;
    use crate::service::MockServiceController;

    fn test_config(dir: &Path) -> UpdaterConfig {
        let toml = format!(
            r#"
            [ftp]
            host = "ftp.example.com"
            username = "sync"
            password = "secret"

            [openvpn]
            remote_path = "/configs"
            remote_filename = "client.ovpn"
            local_openvpn_path = "{}"
            local_config_filename = "client.conf"
            backup_path = "{}"

            [verification.rollback]
            retry_interval = 0
            "#,
            dir.join("openvpn").display(),
            dir.join("backups").display(),
        );
        toml::from_str(&toml).unwrap()
    }

    #[tokio::test]
    async fn fetch_failure_aborts_before_any_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let mut source = MockArtifactSource::new();
        source.expect_fetch().returning(|_, _| {
            Err(UpdaterError::Fetch("connection refused".to_string()))
        });
        // No service interaction expected at all
        let service = MockServiceController::new();

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert!(matches!(
            orchestrator.run().await,
            Err(UpdaterError::Fetch(_))
        ));
        assert!(!config.local_config_path().exists());
    }

    #[tokio::test]
    async fn identical_remote_takes_no_action() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        tokio::fs::create_dir_all(&config.openvpn.local_openvpn_path)
            .await
            .unwrap();
        tokio::fs::write(config.local_config_path(), b"remote 1.2.3.4 1194")
            .await
            .unwrap();

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(b"remote 1.2.3.4 1194".to_vec())));
        let service = MockServiceController::new();

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert_eq!(
            orchestrator.run().await.unwrap(),
            UpdateOutcome::NoActionTaken
        );
        // No backup directory was created
        assert!(!dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn empty_candidate_is_rejected_before_install() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(Vec::new())));
        let service = MockServiceController::new();

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert!(matches!(
            orchestrator.run().await,
            Err(UpdaterError::InvalidArtifact(_))
        ));
        assert!(!config.local_config_path().exists());
    }

    #[tokio::test]
    async fn healthy_update_installs_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        tokio::fs::create_dir_all(&config.openvpn.local_openvpn_path)
            .await
            .unwrap();
        tokio::fs::write(config.local_config_path(), b"remote 1.2.3.4 1194")
            .await
            .unwrap();

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(b"remote 5.6.7.8 1194".to_vec())));

        let mut service = MockServiceController::new();
        service.expect_restart().times(1).returning(|| Ok(()));
        service.expect_is_active().returning(|| true);
        service.expect_has_tunnel_interface().returning(|| true);
        service
            .expect_tail_recent_log_lines()
            .returning(|_| Ok(Vec::new()));

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert_eq!(
            orchestrator.run().await.unwrap(),
            UpdateOutcome::UpdatedSuccessfully
        );
        assert_eq!(
            tokio::fs::read(config.local_config_path()).await.unwrap(),
            b"remote 5.6.7.8 1194"
        );
        // Exactly one backup record of the pre-update content
        let mut backups = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(backups.len(), 1);
        let record = backups.pop().unwrap();
        assert_eq!(std::fs::read(record.path()).unwrap(), b"remote 1.2.3.4 1194");
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_update_rolls_back_to_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        tokio::fs::create_dir_all(&config.openvpn.local_openvpn_path)
            .await
            .unwrap();
        tokio::fs::write(config.local_config_path(), b"remote 1.2.3.4 1194")
            .await
            .unwrap();

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(b"remote 5.6.7.8 1194".to_vec())));

        let mut service = MockServiceController::new();
        // Restart after install plus restart after rollback
        service.expect_restart().times(2).returning(|| Ok(()));
        service.expect_is_active().returning(|| true);
        service.expect_has_tunnel_interface().returning(|| false);

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert_eq!(
            orchestrator.run().await.unwrap(),
            UpdateOutcome::UpdatedThenRolledBack
        );
        assert_eq!(
            tokio::fs::read(config.local_config_path()).await.unwrap(),
            b"remote 1.2.3.4 1194"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_without_backup_is_a_rollback_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        // Bootstrap install: nothing to snapshot, so no backup exists
        config.verification.create_backup = true;

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(b"remote 5.6.7.8 1194".to_vec())));

        let mut service = MockServiceController::new();
        service.expect_restart().times(1).returning(|| Ok(()));
        service.expect_is_active().returning(|| false);

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert_eq!(
            orchestrator.run().await.unwrap(),
            UpdateOutcome::RollbackFailed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_update_without_auto_rollback_keeps_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.verification.rollback.auto_rollback = false;

        tokio::fs::create_dir_all(&config.openvpn.local_openvpn_path)
            .await
            .unwrap();
        tokio::fs::write(config.local_config_path(), b"remote 1.2.3.4 1194")
            .await
            .unwrap();

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(b"remote 5.6.7.8 1194".to_vec())));

        let mut service = MockServiceController::new();
        service.expect_restart().times(1).returning(|| Ok(()));
        service.expect_is_active().returning(|| false);

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert_eq!(
            orchestrator.run().await.unwrap(),
            UpdateOutcome::UpdateFailedNoRollbackPossible
        );
        assert_eq!(
            tokio::fs::read(config.local_config_path()).await.unwrap(),
            b"remote 5.6.7.8 1194"
        );
    }

    #[tokio::test]
    async fn verification_disabled_accepts_update_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.verification.rollback.check_connectivity = false;

        let mut source = MockArtifactSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Ok(Artifact::from_bytes(b"remote 5.6.7.8 1194".to_vec())));

        let mut service = MockServiceController::new();
        // Restart only; none of the verification probes may run
        service.expect_restart().times(1).returning(|| Ok(()));

        let orchestrator =
            UpdateOrchestrator::new(&config, Arc::new(source), Arc::new(service));

        assert_eq!(
            orchestrator.run().await.unwrap(),
            UpdateOutcome::UpdatedSuccessfully
        );
    }
}
