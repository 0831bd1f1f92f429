//! Configuration file and secrets loading.
//!
//! Precedence for every setting: command-line flag, then environment
//! variable (handled by clap's `env` attributes), then the TOML file, then the
//! built-in default.

use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use divopt_core::DEFAULT_CONSTITUENTS_URL;
use divopt_warehouse::RetentionPolicy;
use serde::Deserialize;
use thiserror::Error;

pub const API_KEY_ENV: &str = "POLYGON_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value: {0}")]
    InvalidValue(String),
    #[error(
        "Polygon API key is not set; export POLYGON_API_KEY or add polygon_api_key to '{}'",
        secrets.display()
    )]
    MissingApiKey { secrets: PathBuf },
}

/// Root of the TOML configuration file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub fetch: FetchSection,
    pub universe: UniverseSection,
    pub polygon: PolygonSection,
    pub dashboard: DashboardSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSection {
    pub db_path: PathBuf,
    pub interval_minutes: f64,
    pub batch_size: usize,
    /// Unbounded when absent.
    pub run_for_minutes: Option<f64>,
    pub retention: RetentionPolicy,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/options.duckdb"),
            interval_minutes: 1.0,
            batch_size: 4,
            run_for_minutes: None,
            retention: RetentionPolicy::Latest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UniverseSection {
    pub threshold: f64,
    pub tickers_file: Option<PathBuf>,
    pub constituents_url: String,
}

impl Default for UniverseSection {
    fn default() -> Self {
        Self {
            threshold: divopt_core::DEFAULT_YIELD_THRESHOLD,
            tickers_file: None,
            constituents_url: String::from(DEFAULT_CONSTITUENTS_URL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolygonSection {
    pub base_url: String,
    pub requests_per_minute: u32,
    pub page_limit: u32,
    pub max_pages: usize,
    pub timeout_secs: u64,
    /// In-request retries for 429/5xx/timeouts. Zero leaves retrying to the next cycle.
    pub max_retries: u32,
}

impl Default for PolygonSection {
    fn default() -> Self {
        Self {
            base_url: String::from(divopt_core::adapters::polygon::DEFAULT_BASE_URL),
            requests_per_minute: 5,
            page_limit: 250,
            max_pages: 10,
            timeout_secs: 20,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardSection {
    pub addr: SocketAddr,
    pub refresh_secs: u64,
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            refresh_secs: divopt_web::DEFAULT_REFRESH_SECS,
        }
    }
}

impl AppConfig {
    /// Load `path`, or built-in defaults when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        minutes("fetch.interval_minutes", self.fetch.interval_minutes)?;
        if let Some(run_for) = self.fetch.run_for_minutes {
            minutes("fetch.run_for_minutes", run_for)?;
        }
        if self.fetch.batch_size == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "fetch.batch_size must be greater than zero",
            )));
        }
        if self.polygon.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "polygon.requests_per_minute must be greater than zero",
            )));
        }
        divopt_core::validate_threshold(self.universe.threshold)
            .map_err(|error| ConfigError::InvalidValue(format!("universe.threshold: {error}")))?;
        Ok(())
    }
}

/// Resolve the Polygon API key: environment value first, then the secrets file.
pub fn resolve_api_key(env_value: Option<String>, secrets: &Path) -> Result<String, ConfigError> {
    if let Some(key) = env_value.map(|key| key.trim().to_string()).filter(|key| !key.is_empty()) {
        return Ok(key);
    }

    let content = match fs::read_to_string(secrets) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::MissingApiKey {
                secrets: secrets.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: secrets.to_path_buf(),
                source,
            })
        }
    };
    let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: secrets.to_path_buf(),
        source,
    })?;

    ["polygon_api_key", API_KEY_ENV]
        .iter()
        .find_map(|name| table.get(*name).and_then(toml::Value::as_str))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingApiKey {
            secrets: secrets.to_path_buf(),
        })
}

/// The API key from `POLYGON_API_KEY` or the secrets file.
pub fn api_key(secrets: &Path) -> Result<String, ConfigError> {
    resolve_api_key(std::env::var(API_KEY_ENV).ok(), secrets)
}

/// Convert a positive minute count into a duration.
pub fn minutes(field: &str, value: f64) -> Result<std::time::Duration, ConfigError> {
    let invalid = || {
        ConfigError::InvalidValue(format!(
            "{field} must be a positive number of minutes, got {value}"
        ))
    };
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid());
    }
    std::time::Duration::try_from_secs_f64(value * 60.0).map_err(|_| invalid())
}
