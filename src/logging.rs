//! Logging setup
//!
//! Log lines go to stderr and, when a log directory is given, are appended to
//! `<logs_dir>/<YYYY-MM-DD>.log` without ANSI colors.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Filter directives for the `-v`/`-q` flags
pub fn filter_directives(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "civic_collector=info,warn",
        1 => "civic_collector=debug,info",
        2 => "civic_collector=trace,debug",
        _ => "trace",
    }
}

/// Path of today's log file under `logs_dir`
pub fn daily_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(format!("{}.log", Utc::now().format("%Y-%m-%d")))
}

fn open_log_file(logs_dir: &Path) -> std::io::Result<(File, PathBuf)> {
    std::fs::create_dir_all(logs_dir)?;
    let path = daily_log_path(logs_dir);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Installs the global subscriber
///
/// # Arguments
///
/// * `verbose` - Number of `-v` flags
/// * `quiet` - Only errors
/// * `logs_dir` - Directory for the daily log file; stderr only when `None`
///
/// # Returns
///
/// The log file path when file logging is active. If the file cannot be
/// opened, logging continues on stderr and a warning is emitted.
pub fn init_logging(verbose: u8, quiet: bool, logs_dir: Option<&Path>) -> Option<PathBuf> {
    let filter = EnvFilter::new(filter_directives(verbose, quiet));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    let mut file_error = None;
    let (file_layer, file_path) = match logs_dir.map(open_log_file) {
        Some(Ok((file, path))) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(path))
        }
        Some(Err(e)) => {
            file_error = Some(e);
            (None, None)
        }
        None => (None, None),
    };

    let installed = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        // A subscriber is already set (tests, embedding)
        return None;
    }

    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {}", e);
    }

    file_path
}
