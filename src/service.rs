//! Service manager boundary
//!
//! The orchestrator and verifier only talk to [`ServiceController`]; the
//! systemd implementation shells out to `systemctl`/`journalctl` and probes
//! `/sys/class/net` for the tunnel interface. Test doubles substitute the
//! trait directly.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::error::{UpdaterError, UpdaterResult};

/// Bound on any single service-manager command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Control and observation operations on the VPN service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Restart the service
    async fn restart(&self) -> UpdaterResult<()>;

    /// Whether the service manager reports the unit as active
    async fn is_active(&self) -> bool;

    /// Whether a tun/tap interface is up (liveness signal for the tunnel)
    async fn has_tunnel_interface(&self) -> bool;

    /// Most recent service log lines, newest last
    async fn tail_recent_log_lines(&self, n: usize) -> UpdaterResult<Vec<String>>;
}

/// systemd-backed controller for the OpenVPN unit
pub struct SystemdServiceController {
    service_name: String,
    net_class_dir: PathBuf,
}

impl SystemdServiceController {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            net_class_dir: PathBuf::from("/sys/class/net"),
        }
    }

    async fn run_command(&self, program: &str, args: &[&str]) -> UpdaterResult<std::process::Output> {
        let cmd_line = format!("{} {}", program, args.join(" "));
        debug!("Running: {}", cmd_line);

        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new(program).args(args).output(),
        )
        .await
        .map_err(|_| UpdaterError::Timeout(cmd_line.clone()))?
        .map_err(|e| UpdaterError::ServiceControl {
            cmd: cmd_line,
            code: None,
            stderr: e.to_string(),
        })?;

        Ok(output)
    }

    async fn try_restart(&self, program: &str, args: &[&str]) -> UpdaterResult<()> {
        let output = self.run_command(program, args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(UpdaterError::ServiceControl {
                cmd: format!("{} {}", program, args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

#[async_trait]
impl ServiceController for SystemdServiceController {
    async fn restart(&self) -> UpdaterResult<()> {
        match self
            .try_restart("systemctl", &["restart", &self.service_name])
            .await
        {
            Ok(()) => {
                debug!("Service {} restarted via systemctl", self.service_name);
                Ok(())
            }
            Err(e) => {
                // Hosts without systemd still carry the SysV shim
                warn!("systemctl restart failed ({}), trying 'service'", e);
                self.try_restart("service", &[&self.service_name, "restart"])
                    .await
            }
        }
    }

    async fn is_active(&self) -> bool {
        match self
            .run_command("systemctl", &["is-active", &self.service_name])
            .await
        {
            Ok(output) => {
                let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
                debug!("Service {} state: {}", self.service_name, state);
                output.status.success() && state == "active"
            }
            Err(e) => {
                warn!("Failed to query service state: {}", e);
                false
            }
        }
    }

    async fn has_tunnel_interface(&self) -> bool {
        let mut entries = match tokio::fs::read_dir(&self.net_class_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read {:?}: {}", self.net_class_dir, e);
                return false;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("tun") || name.starts_with("tap") {
                    debug!("Tunnel interface present: {}", name);
                    return true;
                }
            }
        }

        false
    }

    async fn tail_recent_log_lines(&self, n: usize) -> UpdaterResult<Vec<String>> {
        let count = n.to_string();
        let output = self
            .run_command(
                "journalctl",
                &[
                    "-u",
                    &self.service_name,
                    "--since",
                    "1 minute ago",
                    "--no-pager",
                    "-n",
                    &count,
                ],
            )
            .await?;

        if !output.status.success() {
            return Err(UpdaterError::ServiceControl {
                cmd: format!("journalctl -u {}", self.service_name),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }
}
