//! Configuration
//!
//! TOML-based configuration for the engine host:
//! - logging level
//! - named zone policies (`[zones.<name>]` tables)
//!
//! Supports `${VAR}` / `${VAR:-default}` substitution inside the file
//! and `GATEMQ__` environment overrides with double underscores for
//! nesting (`GATEMQ__LOG__LEVEL=debug`).

use std::collections::HashMap;
use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::zone::Zone;

#[cfg(test)]
mod tests;

/// Expand `${VAR}` and `${VAR:-fallback}` references against the
/// process environment. Unset variables without a fallback expand to
/// the empty string.
fn expand_env_refs(content: &str) -> String {
    let reference = Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<fallback>[^}]*))?\}")
        .expect("env reference pattern is valid");

    reference
        .replace_all(content, |caps: &regex::Captures| {
            match std::env::var(&caps["name"]) {
                Ok(value) => value,
                Err(_) => caps.name("fallback").map_or("", |m| m.as_str()).to_string(),
            }
        })
        .into_owned()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Zone policy tables, keyed by zone name
    pub zones: HashMap<String, Zone>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment overrides.
    ///
    /// A missing file is not an error; defaults apply. Environment
    /// overrides use the `GATEMQ__` prefix with double underscores for
    /// nesting, e.g. `GATEMQ__LOG__LEVEL=debug`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().set_default("log.level", "info")?;

        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let expanded = expand_env_refs(&content);
                builder = builder.add_source(File::from_str(&expanded, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("GATEMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment overrides only (no file)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, zone) in &self.zones {
            if !(zone.keepalive_backoff > 0.0 && zone.keepalive_backoff <= 1.0) {
                return Err(ConfigError::Validation(format!(
                    "zone '{}': keepalive_backoff must be in (0, 1]",
                    name
                )));
            }
            if zone.max_packet_size == 0 {
                return Err(ConfigError::Validation(format!(
                    "zone '{}': max_packet_size must be non-zero",
                    name
                )));
            }
            if zone.max_clientid_len == 0 {
                return Err(ConfigError::Validation(format!(
                    "zone '{}': max_clientid_len must be non-zero",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Resolve a zone by name, falling back to the default policy for
    /// names without a table
    pub fn zone(&self, name: &str) -> Zone {
        self.zones.get(name).cloned().unwrap_or_default()
    }
}

/// Install the global tracing subscriber using the configured level.
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
