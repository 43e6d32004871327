//! Configuration structures for the dramline stock analytics system.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration for the batch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory of daily snapshot CSV files.
    pub data_dir: PathBuf,
    /// Output directory for dated sales exports.
    pub sales_dir: PathBuf,
    /// Path of the embedded DuckDB database file.
    pub db_path: PathBuf,
    /// Product category the filtered view is restricted to.
    pub product_filter: String,
    /// Which analytics backend to run queries against.
    pub backend: BackendKind,
    /// Remote columnar backend settings.
    pub athena: AthenaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sales_dir: PathBuf::from("sales_data"),
            db_path: PathBuf::from("database.db"),
            product_filter: "Whisky".to_string(),
            backend: BackendKind::DuckDb,
            athena: AthenaConfig::default(),
        }
    }
}

/// Analytics backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded single-file DuckDB store.
    DuckDb,
    /// Remote managed columnar query service (Athena).
    Athena,
}

/// Settings for the remote columnar query backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// Athena database holding the stock views.
    pub database: String,
    /// S3 location Athena writes query results to.
    pub output_location: String,
    /// Seconds between query-status polls.
    pub poll_interval_secs: u64,
    /// Ceiling on total polling time per query.
    pub timeout_secs: u64,
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            database: "hedonism_wines".to_string(),
            output_location: String::new(),
            poll_interval_secs: 2,
            timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, honoring a `.env`
    /// file if present.
    ///
    /// Required: `DATA_DIR`, `SALES_DIR`, `DB_PATH`. Optional:
    /// `PRODUCT_FILTER`, `QUERY_BACKEND` (`duckdb`/`athena`), and the
    /// `ATHENA_*` settings, which fall back to defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = AthenaConfig::default();
        let backend = match optional_env("QUERY_BACKEND") {
            None => BackendKind::DuckDb,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "duckdb" => BackendKind::DuckDb,
                "athena" => BackendKind::Athena,
                other => {
                    return Err(Error::config(format!(
                        "QUERY_BACKEND must be 'duckdb' or 'athena', got '{other}'"
                    )))
                }
            },
        };

        Ok(Self {
            data_dir: PathBuf::from(require_env("DATA_DIR")?),
            sales_dir: PathBuf::from(require_env("SALES_DIR")?),
            db_path: PathBuf::from(require_env("DB_PATH")?),
            product_filter: optional_env("PRODUCT_FILTER")
                .unwrap_or_else(|| "Whisky".to_string()),
            backend,
            athena: AthenaConfig {
                database: optional_env("ATHENA_DATABASE").unwrap_or(defaults.database),
                output_location: optional_env("ATHENA_QUERY_RESULTS_S3")
                    .unwrap_or(defaults.output_location),
                poll_interval_secs: parse_env_u64(
                    "ATHENA_POLL_INTERVAL_SECS",
                    defaults.poll_interval_secs,
                )?,
                timeout_secs: parse_env_u64("ATHENA_TIMEOUT_SECS", defaults.timeout_secs)?,
            },
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    optional_env(name)
        .ok_or_else(|| Error::config(format!("Missing required environment variable: {name}")))
}

fn optional_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64> {
    match optional_env(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| Error::config(format!("{name} must be an integer, got '{value}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.product_filter, "Whisky");
        assert_eq!(config.backend, BackendKind::DuckDb);
        assert_eq!(config.athena.poll_interval_secs, 2);
        assert_eq!(config.athena.timeout_secs, 300);
    }

    #[test]
    fn test_backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"athena\"").unwrap();
        assert_eq!(kind, BackendKind::Athena);
        assert_eq!(serde_json::to_string(&BackendKind::DuckDb).unwrap(), "\"duckdb\"");
    }
}
