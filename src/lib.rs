//! vpnsync - OpenVPN Configuration Updater Library
//!
//! Keeps a local OpenVPN configuration synchronized with a remote
//! authoritative copy while guaranteeing a failed update never leaves the
//! VPN non-functional:
//! - Change detection by size and SHA-256 digest
//! - Transactional install with timestamped backups
//! - Post-update connectivity verification with bounded retries
//! - Automatic rollback to the last known good configuration
//!
//! The service manager and the remote transport sit behind capability
//! traits so both can be replaced by test doubles.

pub mod error;
pub mod config;
pub mod logging;
pub mod artifact;
pub mod source;
pub mod backup;
pub mod installer;
pub mod service;
pub mod verify;
pub mod orchestrator;

// Re-export commonly used types
pub use error::{UpdaterError, UpdaterResult};
pub use config::{
    FtpSettings, LoggingSettings, OpenVpnSettings, RollbackSettings, UpdaterConfig,
    VerificationSettings, DEFAULT_CONFIG_FILENAME,
};
pub use artifact::{decide_update, Artifact, UpdateDecision};
pub use source::{ArtifactSource, FtpArtifactSource};
pub use backup::{BackupRecord, BackupStore};
pub use installer::ConfigInstaller;
pub use service::{ServiceController, SystemdServiceController};
pub use verify::{
    ConnectivityVerifier, UnhealthyReason, VerificationConfig, VerificationResult,
};
pub use orchestrator::{UpdateOrchestrator, UpdateOutcome};
