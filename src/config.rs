//! Configuration module for the async-echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::bench::BenchConfig;
use crate::error::ConfigError;
use crate::runtime::AcceptErrorPolicy;
use crate::server::{ServerConfig, DEFAULT_BACKLOG};
use crate::DEFAULT_PAYLOAD_LENGTH;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "async-echo")]
#[command(author = "async-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A completion-driven TCP echo server", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Host to bind to (an IP literal or `localhost`)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Payload length in bytes; clients must use the same value
    #[arg(long, global = true)]
    pub payload_length: Option<usize>,

    /// Number of reactor worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Listen backlog
    #[arg(long, global = true)]
    pub backlog: Option<u32>,

    /// What to do after a failed accept
    #[arg(long, value_enum, global = true)]
    pub accept_errors: Option<AcceptErrors>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the echo server until interrupted (default)
    Serve,
    /// Start an in-process server and time echo round trips against it
    Bench {
        /// Concurrent client connections
        #[arg(long)]
        connections: Option<usize>,
        /// Sequential round trips per connection
        #[arg(long)]
        round_trips: Option<usize>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub payload: PayloadSection,
    #[serde(default)]
    pub bench: BenchSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads
    pub workers: Option<usize>,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default)]
    pub accept_errors: AcceptErrors,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            backlog: default_backlog(),
            accept_errors: AcceptErrors::default(),
        }
    }
}

/// Accept failure handling as written in the CLI and config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AcceptErrors {
    /// Stop accepting after the first failure
    #[default]
    Stop,
    /// Keep accepting after a short backoff
    Rearm,
}

impl From<AcceptErrors> for AcceptErrorPolicy {
    fn from(value: AcceptErrors) -> Self {
        match value {
            AcceptErrors::Stop => AcceptErrorPolicy::Stop,
            AcceptErrors::Rearm => AcceptErrorPolicy::Rearm,
        }
    }
}

/// Payload configuration
#[derive(Debug, Deserialize)]
pub struct PayloadSection {
    #[serde(default = "default_payload_length")]
    pub length: usize,
}

impl Default for PayloadSection {
    fn default() -> Self {
        Self {
            length: default_payload_length(),
        }
    }
}

/// Benchmark configuration
#[derive(Debug, Deserialize)]
pub struct BenchSection {
    #[serde(default = "default_connections")]
    pub connections: usize,
    #[serde(default = "default_round_trips")]
    pub round_trips: usize,
}

impl Default for BenchSection {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            round_trips: default_round_trips(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    25300
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_payload_length() -> usize {
    DEFAULT_PAYLOAD_LENGTH
}

fn default_connections() -> usize {
    1
}

fn default_round_trips() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// What the binary should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Bench,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub host: String,
    pub port: u16,
    pub payload_length: usize,
    pub workers: usize,
    pub backlog: u32,
    pub accept_errors: AcceptErrors,
    pub log_level: String,
    pub bench: BenchConfig,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve already-parsed CLI arguments against the optional TOML file.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let payload_length = cli.payload_length.unwrap_or(toml_config.payload.length);
        if payload_length == 0 {
            return Err(ConfigError::Invalid(
                "payload length must be at least 1 byte".to_string(),
            ));
        }

        let workers = cli
            .workers
            .or(toml_config.server.workers)
            .unwrap_or_else(default_workers)
            .max(1);

        let (mode, connections, round_trips) = match cli.command {
            None | Some(Command::Serve) => (Mode::Serve, None, None),
            Some(Command::Bench {
                connections,
                round_trips,
            }) => (Mode::Bench, connections, round_trips),
        };

        Ok(Config {
            mode,
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            payload_length,
            workers,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            accept_errors: cli
                .accept_errors
                .unwrap_or(toml_config.server.accept_errors),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            bench: BenchConfig {
                connections: connections.unwrap_or(toml_config.bench.connections),
                round_trips: round_trips.unwrap_or(toml_config.bench.round_trips),
                payload_len: payload_length,
            },
        })
    }

    /// Settings for the `EchoServer`.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            payload_len: self.payload_length,
            backlog: self.backlog,
            accept_errors: self.accept_errors.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 25300);
        assert_eq!(config.server.backlog, 1024);
        assert_eq!(config.server.accept_errors, AcceptErrors::Stop);
        assert_eq!(config.payload.length, 64);
        assert_eq!(config.bench.round_trips, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "::1"
            port = 4000
            workers = 2
            accept_errors = "rearm"

            [payload]
            length = 128

            [bench]
            connections = 10

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "::1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.workers, Some(2));
        assert_eq!(config.server.accept_errors, AcceptErrors::Rearm);
        assert_eq!(config.server.backlog, 1024);
        assert_eq!(config.payload.length, 128);
        assert_eq!(config.bench.connections, 10);
        assert_eq!(config.bench.round_trips, 1000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::parse_from([
            "async-echo",
            "--port",
            "9000",
            "--payload-length",
            "32",
            "--accept-errors",
            "rearm",
            "--log-level",
            "trace",
        ]);
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 4000
            host = "localhost"

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let config = Config::merge(cli, toml_config).unwrap();
        assert_eq!(config.mode, Mode::Serve);
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.payload_length, 32);
        assert_eq!(config.accept_errors, AcceptErrors::Rearm);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.bench.payload_len, 32);
        assert!(config.workers >= 1);

        let server = config.server_config();
        assert_eq!(server.payload_len, 32);
        assert_eq!(server.host, "localhost");
        assert_eq!(server.accept_errors, AcceptErrorPolicy::Rearm);
    }

    #[test]
    fn test_accept_errors_map_to_policy() {
        assert_eq!(
            AcceptErrorPolicy::from(AcceptErrors::default()),
            AcceptErrorPolicy::default()
        );
        assert_eq!(
            AcceptErrorPolicy::from(AcceptErrors::Stop),
            AcceptErrorPolicy::Stop
        );
        assert_eq!(
            AcceptErrorPolicy::from(AcceptErrors::Rearm),
            AcceptErrorPolicy::Rearm
        );
    }

    #[test]
    fn test_bench_subcommand() {
        let cli = CliArgs::parse_from([
            "async-echo",
            "bench",
            "--connections",
            "10",
            "--round-trips",
            "50",
            "--workers",
            "2",
        ]);
        let config = Config::merge(cli, TomlConfig::default()).unwrap();
        assert_eq!(config.mode, Mode::Bench);
        assert_eq!(config.workers, 2);
        assert_eq!(
            config.bench,
            BenchConfig {
                connections: 10,
                round_trips: 50,
                payload_len: 64,
            }
        );
    }

    #[test]
    fn test_zero_payload_rejected() {
        let cli = CliArgs::parse_from(["async-echo", "--payload-length", "0"]);
        assert!(matches!(
            Config::merge(cli, TomlConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = CliArgs::parse_from(["async-echo", "--config", "/nonexistent/async-echo.toml"]);
        assert!(matches!(
            Config::from_cli(cli),
            Err(ConfigError::FileRead { .. })
        ));
    }
}
