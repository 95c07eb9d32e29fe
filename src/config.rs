//! Configuration management for vpnsync
//!
//! The configuration document is a TOML file with `[ftp]`, `[openvpn]`,
//! `[logging]` and `[verification]` sections. Keys with sensible defaults
//! may be omitted; connection credentials and file locations are required.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{UpdaterError, UpdaterResult};

/// Conventional configuration filename used when the CLI is given no path.
pub const DEFAULT_CONFIG_FILENAME: &str = "vpnsync.toml";

/// Main vpnsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Remote artifact source connection settings
    pub ftp: FtpSettings,
    /// OpenVPN file locations (remote and local)
    pub openvpn: OpenVpnSettings,
    /// Log destinations and verbosity
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Post-update verification and rollback behavior
    #[serde(default)]
    pub verification: VerificationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpSettings {
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub use_passive: bool,
    /// Connect/read timeout in seconds
    #[serde(default = "default_ftp_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenVpnSettings {
    /// Directory on the remote server holding the authoritative config
    pub remote_path: String,
    /// Filename of the authoritative config on the remote server
    pub remote_filename: String,
    /// Local directory holding the active configuration
    pub local_openvpn_path: PathBuf,
    /// Filename of the active configuration inside `local_openvpn_path`
    pub local_config_filename: String,
    /// Directory for timestamped backups; backups are skipped when unset
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path; file logging is skipped when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Cap on retained log file lines (oldest lines are dropped)
    #[serde(default = "default_log_max_lines")]
    pub max_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Scheduling hint consumed by the external timer, not by a run itself
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u32,
    #[serde(default = "default_true")]
    pub create_backup: bool,
    #[serde(default = "default_true")]
    pub restart_openvpn: bool,
    #[serde(default = "default_service_name")]
    pub openvpn_service_name: String,
    #[serde(default)]
    pub rollback: RollbackSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSettings {
    #[serde(default = "default_true")]
    pub check_connectivity: bool,
    /// Per-attempt verification timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    #[serde(default = "default_max_connection_attempts")]
    pub max_connection_attempts: u32,
    /// Seconds to wait between verification attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_lines() -> usize {
    10_000
}

fn default_check_interval_hours() -> u32 {
    6
}

fn default_service_name() -> String {
    "openvpn@client".to_string()
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_max_connection_attempts() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
            max_lines: default_log_max_lines(),
        }
    }
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            check_interval_hours: default_check_interval_hours(),
            create_backup: true,
            restart_openvpn: true,
            openvpn_service_name: default_service_name(),
            rollback: RollbackSettings::default(),
        }
    }
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            check_connectivity: true,
            connection_timeout: default_connection_timeout(),
            max_connection_attempts: default_max_connection_attempts(),
            retry_interval: default_retry_interval(),
            auto_rollback: true,
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> UpdaterResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            UpdaterError::Config(format!(
                "Failed to read config {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| UpdaterError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> UpdaterResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| UpdaterError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| UpdaterError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Check required values that serde cannot express (non-empty strings,
    /// sane retry bounds)
    pub fn validate(&self) -> UpdaterResult<()> {
        for (key, value) in [
            ("ftp.host", &self.ftp.host),
            ("ftp.username", &self.ftp.username),
            ("ftp.password", &self.ftp.password),
            ("openvpn.remote_path", &self.openvpn.remote_path),
            ("openvpn.remote_filename", &self.openvpn.remote_filename),
            (
                "openvpn.local_config_filename",
                &self.openvpn.local_config_filename,
            ),
        ] {
            if value.is_empty() {
                return Err(UpdaterError::Config(format!(
                    "Required option '{}' is empty",
                    key
                )));
            }
        }

        if self.openvpn.local_openvpn_path.as_os_str().is_empty() {
            return Err(UpdaterError::Config(
                "Required option 'openvpn.local_openvpn_path' is empty".to_string(),
            ));
        }

        if self.verification.rollback.max_connection_attempts == 0 {
            return Err(UpdaterError::Config(
                "verification.rollback.max_connection_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Full path of the active local configuration file
    pub fn local_config_path(&self) -> PathBuf {
        self.openvpn
            .local_openvpn_path
            .join(&self.openvpn.local_config_filename)
    }
}
