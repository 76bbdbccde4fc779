//! Logging setup.
//!
//! Console logging goes to stderr so it never interleaves with the
//! listing output on stdout; a copy of everything lands in a log file
//! under the cache root for post-mortem debugging of misbehaving
//! add-ons.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// How long log files are kept around.
const LOG_RETENTION_HOURS: u64 = 48;

/// Returns the log directory under the cache root.
#[must_use]
pub fn log_directory(cache_root: &Path) -> PathBuf {
    cache_root.join("logs")
}

/// Returns a fresh timestamped log file path.
#[must_use]
pub fn current_log_path(cache_root: &Path) -> PathBuf {
    let now = chrono::Local::now();
    let filename = format!("kodidev_{}.log", now.format("%Y-%m-%d_%H-%M-%S"));
    log_directory(cache_root).join(filename)
}

/// Deletes log files older than the retention period.
pub fn cleanup_old_logs(cache_root: &Path) -> io::Result<u32> {
    let log_dir = log_directory(cache_root);
    if !log_dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(LOG_RETENTION_HOURS * 3600);
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if let Ok(age) = now.duration_since(modified) {
                    if age > retention && fs::remove_file(&path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }
    }

    Ok(deleted)
}

/// Initializes tracing with a stderr layer and a file layer.
///
/// `debug` lifts the default level from info to debug; `RUST_LOG`
/// overrides both.
pub fn init(cache_root: &Path, debug: bool) -> io::Result<()> {
    let log_dir = log_directory(cache_root);
    fs::create_dir_all(&log_dir)?;

    let deleted = cleanup_old_logs(cache_root)?;

    let log_path = current_log_path(cache_root);
    let log_file = File::create(&log_path)?;

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time();

    let file_layer = fmt::layer()
        .with_writer(log_file.with_max_level(tracing::Level::TRACE))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::debug!("log file: {}", log_path.display());
    if deleted > 0 {
        tracing::debug!("cleaned up {} old log file(s)", deleted);
    }

    Ok(())
}
