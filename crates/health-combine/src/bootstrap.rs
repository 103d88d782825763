use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Log file ───────────────────────────────────────────────────────────────────

/// Per-run log file under `logs/`, named after the start time.
pub fn default_log_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from("logs").join(format!("health_combine_{stamp}.log"))
}

/// Create the parent directory of `log_file` if it is missing.
pub fn ensure_log_dir(log_file: &Path) -> anyhow::Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a CLI level name to a `tracing` filter directive.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Human-readable output goes to stderr; every record is also written as a
/// JSON line to `log_file` (or [`default_log_path`]). Returns the log file
/// path in use.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    let path = log_file.cloned().unwrap_or_else(default_log_path);
    ensure_log_dir(&path)?;
    let file =
        File::create(&path).with_context(|| format!("creating log file {}", path.display()))?;

    let filter = EnvFilter::try_new(level_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);
    let file_layer = fmt::layer().json().with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(path)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
