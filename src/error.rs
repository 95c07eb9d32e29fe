//! Error types for vpnsync

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum UpdaterError {
    /// IO error
    Io(io::Error),
    /// Configuration error
    Config(String),
    /// Remote fetch failed (unreachable host, auth failure, missing file)
    Fetch(String),
    /// Candidate artifact is empty or corrupt and must not be installed
    InvalidArtifact(String),
    /// Writing the active configuration failed; nothing was changed
    Install(String),
    /// Service manager command failed
    ServiceControl { cmd: String, code: Option<i32>, stderr: String },
    /// Rollback requested but no backup record exists
    RollbackNotFound(String),
    /// Restoring the backup failed mid-write
    RollbackWrite(String),
    /// Timeout
    Timeout(String),
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::Io(e) => write!(f, "IO error: {}", e),
            UpdaterError::Config(msg) => write!(f, "Configuration error: {}", msg),
            UpdaterError::Fetch(msg) => write!(f, "Fetch error: {}", msg),
            UpdaterError::InvalidArtifact(msg) => write!(f, "Invalid artifact: {}", msg),
            UpdaterError::Install(msg) => write!(f, "Install error: {}", msg),
            UpdaterError::ServiceControl { cmd, code, stderr } => {
                if let Some(code) = code {
                    write!(f, "Command '{}' failed with code {}: {}", cmd, code, stderr)
                } else {
                    write!(f, "Command '{}' failed: {}", cmd, stderr)
                }
            }
            UpdaterError::RollbackNotFound(msg) => write!(f, "Rollback not possible: {}", msg),
            UpdaterError::RollbackWrite(msg) => write!(f, "Rollback write failed: {}", msg),
            UpdaterError::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

impl std::error::Error for UpdaterError {}

impl From<io::Error> for UpdaterError {
    fn from(error: io::Error) -> Self {
        UpdaterError::Io(error)
    }
}

pub type UpdaterResult<T> = Result<T, UpdaterError>;
