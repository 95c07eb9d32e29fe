//! Remote artifact retrieval
//!
//! The orchestrator only sees the [`ArtifactSource`] trait: give it a
//! remote directory and filename, get back an [`Artifact`]. The production
//! implementation speaks FTP; the protocol session is blocking and runs on
//! the tokio blocking pool.

use async_trait::async_trait;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::artifact::Artifact;
use crate::config::FtpSettings;
use crate::error::{UpdaterError, UpdaterResult};

/// Provider of the remote candidate configuration
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetch `remote_filename` from the directory `remote_path`
    async fn fetch(&self, remote_path: &str, remote_filename: &str) -> UpdaterResult<Artifact>;
}

/// FTP-backed artifact source
pub struct FtpArtifactSource {
    settings: FtpSettings,
}

impl FtpArtifactSource {
    pub fn new(settings: &FtpSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Run one blocking FTP session: connect, login, cwd, retrieve
    fn fetch_blocking(
        settings: &FtpSettings,
        remote_path: &str,
        remote_filename: &str,
    ) -> UpdaterResult<Vec<u8>> {
        let addr = format!("{}:{}", settings.host, settings.port);
        debug!("Connecting to FTP server {}", addr);

        let mut ftp = FtpStream::connect(addr.as_str())
            .map_err(|e| UpdaterError::Fetch(format!("Failed to connect to {}: {}", addr, e)))?;

        ftp.get_ref()
            .set_read_timeout(Some(Duration::from_secs(settings.timeout)))
            .map_err(|e| UpdaterError::Fetch(format!("Failed to set FTP timeout: {}", e)))?;

        ftp.login(&settings.username, &settings.password)
            .map_err(|e| UpdaterError::Fetch(format!("FTP login failed: {}", e)))?;

        if settings.use_passive {
            ftp.set_mode(Mode::Passive);
        } else {
            ftp.set_mode(Mode::Active);
        }

        ftp.transfer_type(FileType::Binary)
            .map_err(|e| UpdaterError::Fetch(format!("Failed to set binary mode: {}", e)))?;

        ftp.cwd(remote_path).map_err(|e| {
            UpdaterError::Fetch(format!("Failed to enter {}: {}", remote_path, e))
        })?;

        // SIZE is advisory; some servers refuse it. Used only to cross-check
        // the transfer.
        let reported_size = ftp.size(remote_filename).ok();

        let buffer = ftp.retr_as_buffer(remote_filename).map_err(|e| {
            UpdaterError::Fetch(format!("Failed to retrieve {}: {}", remote_filename, e))
        })?;
        let bytes = buffer.into_inner();

        if let Some(size) = reported_size {
            if size != bytes.len() {
                warn!(
                    "FTP transfer size mismatch for {}: server reported {} bytes, received {}",
                    remote_filename,
                    size,
                    bytes.len()
                );
            }
        }

        if let Err(e) = ftp.quit() {
            debug!("FTP quit failed (ignored): {}", e);
        }

        Ok(bytes)
    }
}

#[async_trait]
impl ArtifactSource for FtpArtifactSource {
    async fn fetch(&self, remote_path: &str, remote_filename: &str) -> UpdaterResult<Artifact> {
        info!(
            "Fetching {}/{} from {}",
            remote_path, remote_filename, self.settings.host
        );

        let settings = self.settings.clone();
        let remote_path = remote_path.to_string();
        let remote_filename = remote_filename.to_string();

        let bytes = tokio::task::spawn_blocking(move || {
            Self::fetch_blocking(&settings, &remote_path, &remote_filename)
        })
        .await
        .map_err(|e| UpdaterError::Fetch(format!("FTP task failed: {}", e)))??;

        let artifact = Artifact::from_bytes(bytes);
        info!(
            "Fetched remote candidate: {} bytes, sha256 {}",
            artifact.size(),
            artifact.digest_hex()
        );

        Ok(artifact)
    }
}
