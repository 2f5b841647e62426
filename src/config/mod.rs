//! Configuration module for celua plugins
//!
//! A plugin reads an optional Redis-style `key value` file next to its DLL.
//! Every setting has a default, so a missing file is not an error.

mod parser;

pub use parser::{parse_config_file, parse_config_str, ConfigParseError};

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;

use crate::lua::DecodeLimits;

/// Main configuration structure for a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// Log output
    pub log: LogConfig,

    /// Ceilings for decoding table results
    pub limits: DecodeLimits,

    /// Longest wait for a host background task (`wait_for_scan`)
    pub wait_timeout: Duration,
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Most verbose level written
    pub level: LevelFilter,

    /// Log file path; `None` means `<temp>/<plugin>.log`
    pub file: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            log: LogConfig::default(),
            limits: DecodeLimits::default(),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: LevelFilter::Info,
            file: None,
        }
    }
}

impl LogConfig {
    /// File the plugin named `plugin` logs to
    pub fn file_for(&self, plugin: &str) -> PathBuf {
        match &self.file {
            Some(path) => path.clone(),
            None => std::env::temp_dir().join(format!("{}.log", sanitize_file_name(plugin))),
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "celua".to_string()
    } else {
        cleaned
    }
}

impl PluginConfig {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigParseError> {
        parse_config_file(path.as_ref())
    }

    /// Load from `path`, or use the defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigParseError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(PluginConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PluginConfig::default();
        assert_eq!(config.log.level, LevelFilter::Info);
        assert_eq!(config.limits.max_table_entries, 100);
        assert_eq!(config.limits.max_table_depth, 5);
        assert_eq!(config.wait_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_default_log_file() {
        let log = LogConfig::default();
        assert_eq!(log.file_for("Speed Hack"), std::env::temp_dir().join("Speed_Hack.log"));
        assert_eq!(log.file_for(""), std::env::temp_dir().join("celua.log"));

        let log = LogConfig {
            file: Some(PathBuf::from("/tmp/x.log")),
            ..LogConfig::default()
        };
        assert_eq!(log.file_for("anything"), PathBuf::from("/tmp/x.log"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PluginConfig::load_or_default(dir.path().join("absent.conf")).unwrap();
        assert_eq!(config, PluginConfig::default());
    }
}
