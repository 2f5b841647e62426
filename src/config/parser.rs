//! Configuration file parser
//!
//! One `parameter value` pair per line; blank lines and `#` comments are
//! skipped. Parameter names are case-insensitive.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{warn, LevelFilter};

use super::PluginConfig;

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid line format
    #[error("Invalid line format at line {0}: {1}")]
    Format(usize, String),

    /// Invalid parameter value
    #[error("Invalid value for parameter '{0}' at line {1}: {2}")]
    Value(String, usize, String),
}

/// Parse a configuration file
pub fn parse_config_file(path: &Path) -> Result<PluginConfig, ConfigParseError> {
    let file = File::open(path)?;
    let mut config = parse_lines(file)?;

    // Relative log paths are relative to the config file
    if let (Some(file), Some(parent)) = (config.log.file.as_mut(), path.parent()) {
        if file.is_relative() {
            *file = parent.join(&*file);
        }
    }
    Ok(config)
}

/// Parse configuration text
pub fn parse_config_str(text: &str) -> Result<PluginConfig, ConfigParseError> {
    parse_lines(text.as_bytes())
}

fn parse_lines<R: Read>(reader: R) -> Result<PluginConfig, ConfigParseError> {
    let mut config = PluginConfig::default();

    for (line_num, line_result) in BufReader::new(reader).lines().enumerate() {
        let line = line_result?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((param, value)) = line.split_once(char::is_whitespace) else {
            return Err(ConfigParseError::Format(line_num + 1, line.to_string()));
        };
        let param = param.trim().to_lowercase();
        let value = value.trim();

        apply_config_param(&mut config, &param, value, line_num + 1)?;
    }

    Ok(config)
}

/// Apply a configuration parameter to the config
fn apply_config_param(
    config: &mut PluginConfig,
    param: &str,
    value: &str,
    line_num: usize,
) -> Result<(), ConfigParseError> {
    match param {
        "loglevel" => {
            config.log.level = match value.to_lowercase().as_str() {
                "off" => LevelFilter::Off,
                "error" => LevelFilter::Error,
                "warn" | "warning" => LevelFilter::Warn,
                "info" | "notice" => LevelFilter::Info,
                "debug" | "verbose" => LevelFilter::Debug,
                "trace" => LevelFilter::Trace,
                _ => return Err(ConfigParseError::Value(param.to_string(), line_num, value.to_string())),
            };
        }
        "logfile" => {
            let value = value.trim_matches('"');
            config.log.file = if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        "table-max-entries" => {
            config.limits.max_table_entries = parse_positive(param, value, line_num)?;
        }
        "table-max-depth" => {
            config.limits.max_table_depth = parse_positive(param, value, line_num)?;
        }
        "wait-timeout-ms" => {
            let millis: u64 = parse_value(param, value, line_num)?;
            config.wait_timeout = Duration::from_millis(millis);
        }
        _ => {
            warn!("unknown configuration parameter '{}' at line {} - skipping", param, line_num);
        }
    }

    Ok(())
}

/// Parse a value that implements FromStr
fn parse_value<T: FromStr>(param: &str, value: &str, line_num: usize) -> Result<T, ConfigParseError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigParseError::Value(param.to_string(), line_num, value.to_string()))
}

fn parse_positive(param: &str, value: &str, line_num: usize) -> Result<usize, ConfigParseError> {
    match parse_value(param, value, line_num)? {
        0 => Err(ConfigParseError::Value(param.to_string(), line_num, value.to_string())),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_config() {
        let config_content = r#"
# Logging
loglevel debug
logfile speedhack.log

# Decoding
table-max-entries 250
TABLE-MAX-DEPTH 8
wait-timeout-ms 1500
"#;

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();
        write(path, config_content).unwrap();

        let config = parse_config_file(path).unwrap();

        assert_eq!(config.log.level, LevelFilter::Debug);
        assert_eq!(config.log.file, Some(path.parent().unwrap().join("speedhack.log")));
        assert_eq!(config.limits.max_table_entries, 250);
        assert_eq!(config.limits.max_table_depth, 8);
        assert_eq!(config.wait_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_config_str("loglevel info\n\ntable-max-depth 0\n").unwrap_err();
        assert!(matches!(err, ConfigParseError::Value(ref p, 3, _) if p == "table-max-depth"));

        let err = parse_config_str("# only a comment\nloglevel\n").unwrap_err();
        assert!(matches!(err, ConfigParseError::Format(2, _)));

        let err = parse_config_str("loglevel loud").unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for parameter 'loglevel' at line 1: loud");
    }

    #[test]
    fn test_unknown_parameters_are_skipped() {
        let config = parse_config_str("maxmemory 64mb\nloglevel warning\n").unwrap();
        assert_eq!(config.log.level, LevelFilter::Warn);
    }

    #[test]
    fn test_empty_logfile_means_default() {
        let config = parse_config_str("logfile \"\"").unwrap();
        assert_eq!(config.log.file, None);
    }
}
