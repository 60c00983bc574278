//! Environment-driven configuration shared by everything that drives a scan
//! session.

use std::env;

use thiserror::Error;

/// Namespace key the alert state is persisted under unless overridden.
pub const DEFAULT_ALERT_NAMESPACE: &str = "shielded_watch.alerts";

/// Scan range and persistence settings derived from `.env`/process variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    database_url: Option<String>,
    start_height: u64,
    end_height: Option<u64>,
    alert_namespace: String,
}

impl WatchConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so callers can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let start_height =
            parse_height("WATCH_START_HEIGHT", get_required_var("WATCH_START_HEIGHT")?)?;
        let end_height = get_optional_var("WATCH_END_HEIGHT")
            .map(|value| parse_height("WATCH_END_HEIGHT", value))
            .transpose()?;

        if let Some(end) = end_height {
            if end < start_height {
                return Err(ConfigError::InvalidRange {
                    start: start_height,
                    end,
                });
            }
        }

        Ok(Self {
            database_url: get_optional_var("WATCH_DATABASE_URL"),
            start_height,
            end_height,
            alert_namespace: get_optional_var("WATCH_ALERT_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_ALERT_NAMESPACE.to_string()),
        })
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    pub fn end_height(&self) -> Option<u64> {
        self.end_height
    }

    pub fn alert_namespace(&self) -> &str {
        &self.alert_namespace
    }

    pub fn persists_alerts(&self) -> bool {
        self.database_url.is_some()
    }
}

fn parse_height(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("SHIELDED_WATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("scan range end {end} is below start {start}")]
    InvalidRange { start: u64, end: u64 },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
