//! vpnsync - OpenVPN configuration updater
//!
//! Fetches the authoritative configuration from the remote server, installs
//! it when it differs from the local copy, verifies the VPN still works and
//! rolls back automatically when it does not.
//!
//! # Usage
//!
//! ```bash
//! # Run with the conventional config file in the working directory
//! vpnsync
//!
//! # Run with an explicit config file
//! vpnsync /etc/vpnsync/vpnsync.toml
//! ```
//!
//! Exit codes: 0 = up to date or updated successfully, 1 = fatal error,
//! 2 = updated then rolled back, 3 = update failed without rollback,
//! 4 = rollback failed (manual intervention required).

use clap::Parser;
use libvpnsync::{
    logging, FtpArtifactSource, SystemdServiceController, UpdateOrchestrator, UpdaterConfig,
    DEFAULT_CONFIG_FILENAME,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// OpenVPN configuration updater with verification and automatic rollback
#[derive(Parser, Debug)]
#[command(name = "vpnsync")]
#[command(author = "vpnsync contributors")]
#[command(version)]
#[command(about = "Keep the local OpenVPN configuration in sync with a remote copy", long_about = None)]
struct Args {
    /// Path to the configuration document
    #[arg(default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match UpdaterConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Usage: vpnsync [{}]", DEFAULT_CONFIG_FILENAME);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = logging::init(&config.logging, args.log_level.as_deref()) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    info!("vpnsync {} starting", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {:?}", args.config);

    let source = Arc::new(FtpArtifactSource::new(&config.ftp));
    let service = Arc::new(SystemdServiceController::new(
        &config.verification.openvpn_service_name,
    ));

    let orchestrator = UpdateOrchestrator::new(&config, source, service);

    match orchestrator.run().await {
        Ok(outcome) => {
            info!("Run finished: {}", outcome);
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            ExitCode::from(1)
        }
    }
}
