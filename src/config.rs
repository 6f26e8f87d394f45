//! Configuration loading
//!
//! Settings come from an optional TOML file, then secrets and identifiers are
//! overlaid from the environment. Missing credentials are not a startup error:
//! each request path calls `require` and reports a configuration fault when the
//! value it needs is absent.

use chrono::Duration;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregate::DEFAULT_MAX_PAGES;
use crate::data::documents::{DEFAULT_API_VERSION, DEFAULT_QUERY_BASE_URL};
use crate::data::share::DEFAULT_SHARE_BASE_URL;

/// Largest page size the document provider accepts
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest cache TTL accepted from configuration (one year)
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub const ENV_TELEMETRY_ACCOUNT: &str = "READINGS_TELEMETRY_ACCOUNT";
pub const ENV_TELEMETRY_PASSWORD: &str = "READINGS_TELEMETRY_PASSWORD";
pub const ENV_TELEMETRY_APP_ID: &str = "READINGS_TELEMETRY_APP_ID";
pub const ENV_DOCUMENTS_TOKEN: &str = "READINGS_DOCUMENTS_TOKEN";
pub const ENV_DOCUMENTS_DATABASE_ID: &str = "READINGS_DOCUMENTS_DATABASE_ID";

/// Errors that can occur while loading or using configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential or identifier is not configured
    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    /// The config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("{section}.ttl_secs is {secs}, the maximum is {max}")]
    InvalidTtl {
        section: &'static str,
        secs: u64,
        max: u64,
    },
}

fn ttl_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

fn check_ttl(section: &'static str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_TTL_SECS {
        return Err(ConfigError::InvalidTtl {
            section,
            secs,
            max: MAX_TTL_SECS,
        });
    }
    Ok(())
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Transport timeout applied to every upstream request
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Telemetry provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub base_url: String,
    pub account_name: Option<String>,
    pub password: Option<String>,
    pub application_id: Option<String>,
    pub ttl_secs: u64,
    /// How far back to look for readings
    pub window_minutes: u32,
    pub max_count: u32,
    /// IANA timezone used for the display timestamp
    pub timezone: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SHARE_BASE_URL.to_string(),
            account_name: None,
            password: None,
            application_id: None,
            ttl_secs: 60,
            window_minutes: 1440,
            max_count: 1,
            timezone: "America/New_York".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Cache TTL, capped at `MAX_TTL_SECS`
    pub fn ttl(&self) -> Duration {
        ttl_duration(self.ttl_secs)
    }

    pub fn display_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

/// Document-database provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub base_url: String,
    pub api_version: String,
    pub api_token: Option<String>,
    pub database_id: Option<String>,
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Aggregation ceiling
    pub max_pages: usize,
    pub default_page_size: u32,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_QUERY_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_token: None,
            database_id: None,
            ttl_secs: 300,
            max_entries: 100,
            max_pages: DEFAULT_MAX_PAGES,
            default_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl DocumentsConfig {
    /// Cache TTL, capped at `MAX_TTL_SECS`
    pub fn ttl(&self) -> Duration {
        ttl_duration(self.ttl_secs)
    }
}

impl Config {
    /// Default config file location (`<config dir>/readings-proxy/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "readings-proxy")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration and applies environment overrides
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if a file is there, otherwise built-in defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ttl("telemetry", self.telemetry.ttl_secs)?;
        check_ttl("documents", self.documents.ttl_secs)
    }

    /// Overlays secrets and identifiers from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut Option<String>); 5] = [
            (ENV_TELEMETRY_ACCOUNT, &mut self.telemetry.account_name),
            (ENV_TELEMETRY_PASSWORD, &mut self.telemetry.password),
            (ENV_TELEMETRY_APP_ID, &mut self.telemetry.application_id),
            (ENV_DOCUMENTS_TOKEN, &mut self.documents.api_token),
            (ENV_DOCUMENTS_DATABASE_ID, &mut self.documents.database_id),
        ];
        for (name, slot) in overrides {
            if let Some(value) = lookup(name) {
                *slot = Some(value);
            }
        }
    }
}

/// Returns a configured value or a `Missing` error naming it
///
/// Blank strings count as missing.
pub fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}
