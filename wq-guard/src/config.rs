//! Process configuration for the binaries.
//!
//! The library takes its configs by value; only [`ServiceConfig::from_env`]
//! reads the environment.

use crate::error::{Result, WqError};
use crate::ingest::IngestConfig;
use crate::logging::setup::LoggingConfig;
use crate::store::StoreConfig;
use std::time::Duration;

/// Comma separated source glob patterns.
pub const ENV_SOURCE_GLOBS: &str = "WQ_SOURCE_GLOBS";
/// Path of the cleaned CSV.
pub const ENV_CLEANED_PATH: &str = "WQ_CLEANED_PATH";
/// Name the observation table is registered under.
pub const ENV_TABLE_NAME: &str = "WQ_TABLE_NAME";
/// Per-call store timeout in milliseconds.
pub const ENV_QUERY_TIMEOUT_MS: &str = "WQ_QUERY_TIMEOUT_MS";
/// `true` for JSON log lines.
pub const ENV_LOG_JSON: &str = "WQ_LOG_JSON";

/// Store, ingest and logging configuration for one process.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Defaults overridden by the `WQ_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `WQ_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(globs) = value(ENV_SOURCE_GLOBS) {
            let patterns: Vec<String> = globs
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            if patterns.is_empty() {
                return Err(WqError::Configuration(format!(
                    "{ENV_SOURCE_GLOBS} must name at least one pattern"
                )));
            }
            config.ingest.source_patterns = patterns;
        }

        if let Some(path) = value(ENV_CLEANED_PATH) {
            config.ingest.output_path = path.trim().into();
        }

        if let Some(name) = value(ENV_TABLE_NAME) {
            config.store.table_name = name.trim().to_string();
        }

        if let Some(raw) = value(ENV_QUERY_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                WqError::Configuration(format!(
                    "{ENV_QUERY_TIMEOUT_MS} must be a whole number of milliseconds, got '{raw}'"
                ))
            })?;
            config.store.query_timeout = Duration::from_millis(millis);
        }

        if let Some(raw) = value(ENV_LOG_JSON) {
            let json = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(WqError::Configuration(format!(
                        "{ENV_LOG_JSON} must be true or false, got '{raw}'"
                    )))
                }
            };
            config.logging = config.logging.with_json_format(json);
        }

        Ok(config)
    }
}
