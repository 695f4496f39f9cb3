use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory under `$HOME` holding saved parameters, logs and the default
/// input drop folder.
pub const APP_DIR: &str = ".spot-triage";

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the standard `~/.spot-triage/` directory hierarchy exists.
///
/// Creates the following directories if absent (including any missing parents):
/// - `~/.spot-triage/`
/// - `~/.spot-triage/logs/`
/// - `~/.spot-triage/inputs/`
pub fn ensure_directories() -> anyhow::Result<()> {
    let app_dir = app_dir();
    std::fs::create_dir_all(&app_dir)?;
    std::fs::create_dir_all(app_dir.join("logs"))?;
    std::fs::create_dir_all(app_dir.join("inputs"))?;
    Ok(())
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name onto an [`EnvFilter`] directive.
///
/// Falls back to `"info"` if the level string is not recognised.
pub fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Events go to stderr so they never mix with the report on stdout. When
/// `log_file` is set they are appended there as well, without colours.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ── Input-dir discovery ────────────────────────────────────────────────────────

/// Directory to search for inputs when none was configured.
///
/// Checks the following paths in order and returns the first that exists:
/// 1. `./inputs/`
/// 2. `~/.spot-triage/inputs/`
///
/// Returns `None` when neither path exists.
pub fn discover_input_dir() -> Option<PathBuf> {
    discover_input_dir_from(Path::new("."))
}

fn discover_input_dir_from(cwd: &Path) -> Option<PathBuf> {
    let candidates = [cwd.join("inputs"), app_dir().join("inputs")];
    candidates.into_iter().find(|p| p.is_dir())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
