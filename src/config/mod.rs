//! Application configuration loading and validation.
//!
//! The top-level `Config` aggregates the logger, transport, sensor and
//! publishing sections of a single TOML file. It is loaded once at startup,
//! before logging exists, and stays immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::{
    logger::LoggerConfig,
    publish::{PublishConfig, PublishMode},
    sensor::SensorConfig,
};

pub mod logger;
pub mod publish;
pub mod sensor;

/// Environment variable that points at the config file.
pub const CONFIG_ENV: &str = "BMEBRIDGE_CONFIG";

/// Location used when neither an argument nor `BMEBRIDGE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bmebridge/config.toml";

/// Timestamped messages for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()
            ).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()
            ).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()
            ).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors that can occur while locating, reading, parsing or validating the
/// configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error while reading configuration {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, unknown enum value or a missing required key.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Broker connection. Required: the daemon has nowhere to publish without it.
    #[validate(nested)]
    pub transport: TransportConfig,

    #[serde(default)]
    #[validate(nested)]
    pub sensor: SensorConfig,

    #[serde(default)]
    #[validate(nested)]
    pub publish: PublishConfig,
}

pub type TransportConfig = bmebridge_mqtt::Config;

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read, parsed or validated.
    pub fn new(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(cli_path, std::env::var(CONFIG_ENV).ok());
        Self::load(&config_path)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. command-line argument
    /// 2. `BMEBRIDGE_CONFIG` environment variable
    /// 3. `/etc/bmebridge/config.toml`
    fn get_config_path(cli_path: Option<PathBuf>, env_path: Option<String>) -> PathBuf {
        if let Some(path) = cli_path {
            print_info!("Using config from command line: {}", path.display());
            return path;
        }

        if let Some(path) = env_path.filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return path;
        }

        print_info!("Using default config path: {}", DEFAULT_CONFIG_PATH);
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = config_str.parse::<Config>()?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Topic the daemon announces `online`/`offline` on, for the configured layout.
    pub fn availability_topic(&self) -> String {
        let publish = &self.publish;
        match publish.mode {
            PublishMode::Discovery => format!(
                "{}/sensor/{}/status",
                publish.discovery_prefix.trim_end_matches('/'),
                publish.node_id()
            ),
            PublishMode::Fixed => format!(
                "{}/{}/status",
                publish.base_topic.trim_end_matches('/'),
                publish.location()
            ),
        }
    }

    /// Fills values derived from other settings: node id, client id and the
    /// availability topic used for announcements and the Last Will.
    fn resolve(&mut self) {
        self.publish.resolve_identity();

        if self.transport.client_id.is_empty() {
            let node_id = self.publish.node_id();
            let suffix = format!("-{}", std::process::id());
            // Keep within the 36 characters accepted by the transport
            let keep = 36usize.saturating_sub(suffix.len());
            let prefix: String = node_id.chars().take(keep).collect();
            self.transport.client_id = format!("{prefix}{suffix}");
        }

        self.transport.availability_topic = Some(self.availability_topic());
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    /// Parses, resolves and validates a TOML document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::from_str(s)?;
        config.resolve();
        config.validate()?;
        Ok(config)
    }
}
