//! Per-plugin file logger
//!
//! The host has no console, so diagnostics go to a text file with one
//! timestamped line per record:
//!
//! ```text
//! [2024-05-01 13:37:00.123] [WARN] celua::lua::session: failed to destroy memscan 0x1f2a: ...
//! ```
//!
//! The `log` facade allows one logger per process. The first plugin to call
//! [`init`] installs it and later calls are no-ops.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::{LevelFilter, Record};

use crate::config::LogConfig;

/// Failure to set up the log file
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot install logger: {0}")]
    Install(#[from] log::SetLoggerError),
}

lazy_static! {
    /// File the process-wide logger writes to, once installed
    static ref INSTALLED: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Render one record the way every log line looks
pub fn format_line(timestamp: chrono::DateTime<chrono::Local>, record: &Record) -> String {
    format!(
        "[{}] [{}] {}: {}",
        timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}

/// Install the file logger for `plugin` unless one is already installed.
///
/// Returns the file the process logs to, which is the first caller's file.
pub fn init(plugin: &str, config: &LogConfig) -> Result<PathBuf, LoggingError> {
    let mut installed = INSTALLED.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(path) = installed.as_ref() {
        return Ok(path.clone());
    }

    let path = config.file_for(plugin);
    let dispatch = dispatch(config.level, &path)?;
    dispatch.apply()?;
    log::info!("{} logging to {} at level {}", plugin, path.display(), config.level);

    *installed = Some(path.clone());
    Ok(path)
}

/// The file the process logs to, if [`init`] succeeded
pub fn log_file() -> Option<PathBuf> {
    INSTALLED.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn dispatch(level: LevelFilter, path: &Path) -> Result<fern::Dispatch, LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(fern::Dispatch::new()
        .format(|out, _message, record| {
            out.finish(format_args!("{}", format_line(chrono::Local::now(), record)))
        })
        .level(level)
        .chain(file))
}
