//! Command-line interface parsing for the readings proxy
//!
//! This module handles parsing of CLI arguments using clap: the config file
//! location, an optional bind address override and the default log level.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The bind address is not a valid socket address
    #[error("Invalid bind address: '{0}'. Expected HOST:PORT, e.g. 127.0.0.1:8080")]
    InvalidBind(String),
}

/// Readings proxy - cache telemetry and document queries in front of rate-limited providers
#[derive(Parser, Debug)]
#[command(name = "readings-proxy")]
#[command(about = "Caching proxy for telemetry readings and document database queries")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    ///
    /// Examples:
    ///   readings-proxy --bind 0.0.0.0:8080
    ///   readings-proxy --bind 127.0.0.1:3000
    #[arg(short, long, value_name = "HOST:PORT")]
    pub bind: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub config_path: Option<PathBuf>,
    /// Bind address override, if one was given
    pub bind: Option<SocketAddr>,
    pub log_level: String,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            bind: None,
            log_level: "info".to_string(),
        }
    }
}

/// Parses a bind address argument.
///
/// # Arguments
/// * `s` - The address string from CLI or config
///
/// # Returns
/// * `Ok(SocketAddr)` if the string is a valid HOST:PORT
/// * `Err(CliError::InvalidBind)` otherwise
pub fn parse_bind_arg(s: &str) -> Result<SocketAddr, CliError> {
    s.trim()
        .parse()
        .map_err(|_| CliError::InvalidBind(s.to_string()))
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let bind = match &cli.bind {
            Some(addr) => Some(parse_bind_arg(addr)?),
            None => None,
        };
        Ok(StartupConfig {
            config_path: cli.config.clone(),
            bind,
            log_level: cli.log_level.clone(),
        })
    }
}
