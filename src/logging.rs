//! Log output setup
//!
//! Events go to stdout (colored when attached to a terminal) and, when a
//! log file is configured, to a line-capped file: once the file exceeds
//! `max_lines`, the oldest lines are dropped so the newest `max_lines`
//! remain.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::{UpdaterError, UpdaterResult};

/// Append-only log file that keeps at most `max_lines` lines
#[derive(Clone)]
pub struct LineCappedFile {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    path: PathBuf,
    max_lines: usize,
    line_count: usize,
    file: File,
}

impl LineCappedFile {
    pub fn open(path: &Path, max_lines: usize) -> UpdaterResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line_count = match File::open(path) {
            Ok(existing) => BufReader::new(existing).lines().count(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(UpdaterError::Io(e)),
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let inner = Inner {
            path: path.to_path_buf(),
            max_lines: max_lines.max(1),
            line_count,
            file,
        };
        let capped = Self {
            inner: Arc::new(Mutex::new(inner)),
        };

        // An inherited oversized file is trimmed up front
        {
            let mut inner = capped.lock()?;
            if inner.line_count > inner.max_lines {
                inner.trim()?;
            }
        }

        Ok(capped)
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))
    }
}

impl Inner {
    /// Rewrite the file keeping only the newest `max_lines` lines
    fn trim(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let content = std::fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = content.lines().collect();
        let keep_from = lines.len().saturating_sub(self.max_lines);

        let mut trimmed = lines[keep_from..].join("\n");
        if !trimmed.is_empty() {
            trimmed.push('\n');
        }
        std::fs::write(&self.path, &trimmed)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.line_count = lines.len() - keep_from;
        Ok(())
    }
}

impl Write for LineCappedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock()?;
        let written = inner.file.write(buf)?;
        inner.line_count += buf[..written].iter().filter(|b| **b == b'\n').count();
        if inner.line_count > inner.max_lines {
            inner.trim()?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.file.flush()
    }
}

/// Initialize tracing output per the logging settings.
///
/// `level_override` (from the CLI) takes precedence over the configured
/// level; `RUST_LOG` takes precedence over both.
pub fn init(settings: &LoggingSettings, level_override: Option<&str>) -> UpdaterResult<()> {
    let level = level_override.unwrap_or(&settings.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_target(false);

    let file_layer = match &settings.log_file {
        Some(path) => {
            let writer = LineCappedFile::open(path, settings.max_lines)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(move || writer.clone()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
