//! Logging setup for the DataBack binary.
//!
//! Everything goes to a daily log file under `<home>/logs/`. The console
//! only shows warnings unless `verbose` is set.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "databack=info,databack_core=info,databack_db=info";
const KEPT_LOG_FILES: usize = 5;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Keeps the background log writer alive. Dropping it flushes the file.
pub struct LogGuard {
    _worker: WorkerGuard,
    dir: PathBuf,
}

impl LogGuard {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Install the global subscriber. Call once, early in `main`, and hold the
/// returned guard until exit.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let dir = ensure_logs_dir()?;
    let appender = file_appender(&dir, config.app_name)?;
    let (file_writer, worker) = tracing_appender::non_blocking(appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(LogGuard {
        _worker: worker,
        dir,
    })
}

/// `$DATABACK_HOME`, or `~/.databack`.
pub fn databack_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("DATABACK_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".databack"))
        .ok_or_else(|| anyhow!("Could not determine home directory; set DATABACK_HOME"))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(databack_home()?.join("logs"))
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = logs_dir()?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// `<dir>/<app>.<yyyy-mm-dd>.log`, keeping the newest few days.
fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_prefix(app_name))
        .filename_suffix("log")
        .max_log_files(KEPT_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

fn file_prefix(name: &str) -> String {
    let prefix: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if prefix.is_empty() {
        "databack".to_string()
    } else {
        prefix
    }
}
