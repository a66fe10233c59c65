//! Tracing setup: stderr plus an appending log file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::LoggingError;

/// File name of the log written inside the log directory.
pub const LOG_FILE_NAME: &str = "auto_responder.log";

/// Keeps the file writer flushing. Hold it for the life of the process.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(log_dir: &Path) -> Result<LoggingGuard, LoggingError> {
    let path = log_dir.join(LOG_FILE_NAME);
    let open_err = |source| LoggingError::OpenFile {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(log_dir).map_err(open_err)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(open_err)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(LoggingGuard {
        _guard: guard,
        path,
    })
}
