//! Logging setup.
//!
//! Installs a `tracing` subscriber writing to stdout and appending to
//! `module_host.log` in the log directory. `RUST_LOG` takes precedence over
//! the configured level.

use crate::config::LoggingSettings;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "module_host.log";

/// Initializes the global subscriber and returns the log file path.
pub fn setup_logging(settings: &LoggingSettings, log_directory: &Path) -> Result<PathBuf> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let (log_path, file) = open_log_file(log_directory)?;
    let file = Arc::new(file);

    let registry = tracing_subscriber::registry().with(filter);

    if settings.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .with(
                fmt::layer()
                    .json()
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(file),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(file),
            )
            .try_init()?;
    }

    info!("Logging initialized with level: {}", settings.level);
    Ok(log_path)
}

/// Opens the log file for appending, creating the directory if needed.
fn open_log_file(log_directory: &Path) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(log_directory)
        .with_context(|| format!("Failed to create log directory {}", log_directory.display()))?;

    let log_path = log_directory.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    Ok((log_path, file))
}
