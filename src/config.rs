//! Server Configuration
//!
//! All settings are fixed at startup. Defaults match a stock memcached
//! listener with a 1024-entry cache.

use crate::protocol::framing::{DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT};
use crate::storage::DEFAULT_CAPACITY;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use thiserror::Error;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Default largest value accepted by `set` (1 MiB, as in memcached)
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Upper bound for `--max-value-size` (1 GiB, memcached's item size ceiling)
pub const MAX_VALUE_SIZE_LIMIT: usize = 1024 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Pending-connection queue length passed to `listen`
    pub backlog: u32,
    /// Maximum number of cached entries
    pub capacity: usize,
    /// Bytes pulled from a socket per read
    pub chunk_size: usize,
    /// Connections with no incoming bytes for this long are closed
    pub idle_timeout: Duration,
    /// Largest value `set` will store
    pub max_value_size: usize,
    /// Log at debug level unless `RUST_LOG` says otherwise
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            capacity: DEFAULT_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            verbose: false,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    /// Start the server with this configuration
    Run(Config),
    /// Print usage and exit
    Help,
    /// Print the version and exit
    Version,
}

/// Errors from command-line parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

impl Config {
    /// Parses command-line arguments (without the program name).
    pub fn from_args<I, S>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => config.host = value_for(&arg, args.next())?,
                "--port" | "-p" => config.port = parse_value(&arg, args.next())?,
                "--backlog" => config.backlog = parse_value(&arg, args.next())?,
                "--capacity" | "-c" => {
                    config.capacity = parse_positive(&arg, args.next())?;
                }
                "--chunk-size" => {
                    config.chunk_size = parse_positive(&arg, args.next())?;
                }
                "--idle-timeout" => {
                    let secs: u64 = parse_positive(&arg, args.next())?;
                    config.idle_timeout = Duration::from_secs(secs);
                }
                "--max-value-size" => {
                    let size: usize = parse_value(&arg, args.next())?;
                    if size > MAX_VALUE_SIZE_LIMIT {
                        return Err(ConfigError::InvalidValue {
                            flag: arg,
                            value: size.to_string(),
                        });
                    }
                    config.max_value_size = size;
                }
                "--verbose" => config.verbose = true,
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, ConfigError> {
    let value = value_for(flag, value)?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}

fn parse_positive<T>(flag: &str, value: Option<String>) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq + ToString,
{
    let parsed: T = parse_value(flag, value)?;
    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: parsed.to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Config {
        match Config::from_args(args.iter().copied()) {
            Ok(CliAction::Run(config)) => config,
            other => panic!("expected a run config, got {:?}", other),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 11211);
        assert_eq!(config.backlog, 1024);
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_value_size, 1024 * 1024);
        assert_eq!(config.bind_address(), "127.0.0.1:11211");
    }

    #[test]
    fn test_no_args_gives_defaults() {
        assert_eq!(run(&[]), Config::default());
    }

    #[test]
    fn test_all_flags() {
        let config = run(&[
            "--host",
            "0.0.0.0",
            "-p",
            "11300",
            "--backlog",
            "64",
            "-c",
            "2",
            "--chunk-size",
            "16",
            "--idle-timeout",
            "30",
            "--max-value-size",
            "4096",
            "--verbose",
        ]);

        assert_eq!(config.bind_address(), "0.0.0.0:11300");
        assert_eq!(config.backlog, 64);
        assert_eq!(config.capacity, 2);
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.max_value_size, 4096);
        assert!(config.verbose);
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(Config::from_args(["--help"]), Ok(CliAction::Help));
        assert_eq!(Config::from_args(["-v"]), Ok(CliAction::Version));
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(
            Config::from_args(["--port"]),
            Err(ConfigError::MissingValue("--port".to_string()))
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_args(["--port", "eleven"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_args(["--capacity", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_args(["--idle-timeout", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_max_value_size_is_capped() {
        assert_eq!(
            run(&["--max-value-size", "1073741824"]).max_value_size,
            MAX_VALUE_SIZE_LIMIT
        );

        let huge = usize::MAX.to_string();
        assert_eq!(
            Config::from_args(["--max-value-size", huge.as_str()]),
            Err(ConfigError::InvalidValue {
                flag: "--max-value-size".to_string(),
                value: huge.clone(),
            })
        );
    }

    #[test]
    fn test_unknown_argument() {
        assert_eq!(
            Config::from_args(["--daemonize"]),
            Err(ConfigError::UnknownArgument("--daemonize".to_string()))
        );
    }
}
