//! Post-update connectivity verification
//!
//! After a new configuration is installed and the service restarted, the
//! verifier probes the service up to `max_attempts` times. Each attempt
//! checks, in order: unit active, tunnel interface present, no error
//! markers in the recent service log. The whole attempt is bounded by
//! `timeout_per_attempt`. If every attempt fails, the most recent failure
//! reason is reported.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RollbackSettings;
use crate::service::ServiceController;

/// Case-insensitive markers that flag a broken connection in the log tail
const LOG_ERROR_MARKERS: &[&str] = &["error", "fatal", "auth failure"];

/// How many recent log lines to inspect per attempt
const LOG_TAIL_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationConfig {
    pub timeout_per_attempt: Duration,
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl From<&RollbackSettings> for VerificationConfig {
    fn from(settings: &RollbackSettings) -> Self {
        Self {
            timeout_per_attempt: Duration::from_secs(settings.connection_timeout),
            max_attempts: settings.max_connection_attempts,
            retry_interval: Duration::from_secs(settings.retry_interval),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhealthyReason {
    ServiceInactive,
    NoTunnelInterface,
    ErrorsInLog,
    Timeout,
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnhealthyReason::ServiceInactive => write!(f, "service is not active"),
            UnhealthyReason::NoTunnelInterface => write!(f, "no tunnel interface present"),
            UnhealthyReason::ErrorsInLog => write!(f, "errors found in service log"),
            UnhealthyReason::Timeout => write!(f, "verification attempt timed out"),
        }
    }
}

/// Outcome of one probe attempt (and, aggregated, of the whole verification)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    Healthy,
    Unhealthy(UnhealthyReason),
}

pub struct ConnectivityVerifier {
    service: Arc<dyn ServiceController>,
    config: VerificationConfig,
}

impl ConnectivityVerifier {
    pub fn new(service: Arc<dyn ServiceController>, config: VerificationConfig) -> Self {
        Self { service, config }
    }

    /// Probe until healthy or attempts are exhausted.
    ///
    /// Short-circuits on the first healthy attempt; otherwise reports the
    /// LAST observed failure reason, since the most recent evidence best
    /// describes the service's state.
    pub async fn verify(&self) -> VerificationResult {
        let max = self.config.max_attempts.max(1);
        let mut last_reason = UnhealthyReason::ServiceInactive;

        for attempt in 1..=max {
            info!("Connectivity check attempt {}/{}", attempt, max);

            let result = tokio::time::timeout(
                self.config.timeout_per_attempt,
                self.check_once(),
            )
            .await;

            match result {
                Ok(VerificationResult::Healthy) => {
                    info!("VPN verified healthy on attempt {}", attempt);
                    return VerificationResult::Healthy;
                }
                Ok(VerificationResult::Unhealthy(reason)) => {
                    warn!("Attempt {} unhealthy: {}", attempt, reason);
                    last_reason = reason;
                }
                Err(_) => {
                    warn!(
                        "Attempt {} exceeded {:?}",
                        attempt, self.config.timeout_per_attempt
                    );
                    last_reason = UnhealthyReason::Timeout;
                }
            }

            if attempt < max {
                debug!("Waiting {:?} before next attempt", self.config.retry_interval);
                tokio::time::sleep(self.config.retry_interval).await;
            }
        }

        VerificationResult::Unhealthy(last_reason)
    }

    /// One probe: active unit, tunnel interface up, clean recent log
    async fn check_once(&self) -> VerificationResult {
        if !self.service.is_active().await {
            return VerificationResult::Unhealthy(UnhealthyReason::ServiceInactive);
        }

        if !self.service.has_tunnel_interface().await {
            return VerificationResult::Unhealthy(UnhealthyReason::NoTunnelInterface);
        }

        match self.service.tail_recent_log_lines(LOG_TAIL_LINES).await {
            Ok(lines) => {
                if let Some(line) = lines.iter().find(|l| contains_error_marker(l)) {
                    warn!("Error marker in service log: {}", line);
                    return VerificationResult::Unhealthy(UnhealthyReason::ErrorsInLog);
                }
            }
            Err(e) => {
                // Unit is active and the tunnel is up; an unreadable journal
                // alone is not treated as a broken VPN.
                warn!("Could not read service log, skipping log scan: {}", e);
            }
        }

        VerificationResult::Healthy
    }
}

fn contains_error_marker(line: &str) -> bool {
    let lower = line.to_lowercase();
    LOG_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}
