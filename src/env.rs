//! Environment variables read once at startup.
//!
//! The sink and scheduler types never read the environment themselves;
//! everything flows through [`Config`].

use std::time::Duration;

use crate::backend::SinkMode;

/// Selects the active sink, `loki` or `otel` (case-insensitive).
pub const MODE_ENV: &str = "MODE";

/// Loki base URL, e.g. `http://localhost:3100`. Required in `loki` mode.
pub const LOKI_URL_ENV: &str = "LOKI_URL";

/// URL of the upstream JSON snapshot.
pub const SOURCE_URL_ENV: &str = "SOURCE_URL";

/// Tick period in whole seconds.
pub const FETCH_INTERVAL_ENV: &str = "FETCH_INTERVAL";

/// Service identity used for stream labels and the OTel resource.
pub const SERVICE_NAME_ENV: &str = "SERVICE_NAME";

/// Fallback filter for local diagnostics when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

pub const DEFAULT_MODE: &str = "loki";
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SERVICE_NAME: &str = "adsb2loki";

/// Read an environment variable or fall back to a provided default.
///
/// A variable that is set but empty is returned as-is.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid MODE '{0}', must be 'loki' or 'otel'")]
    InvalidMode(String),

    #[error("LOKI_URL environment variable is required in Loki mode")]
    MissingLokiUrl,

    #[error("SOURCE_URL environment variable is required")]
    MissingSourceUrl,

    #[error("invalid FETCH_INTERVAL '{0}', expected a positive number of seconds")]
    InvalidInterval(String),
}

/// Startup configuration. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: SinkMode,
    /// Only consulted in [`SinkMode::Loki`].
    pub loki_url: Option<String>,
    pub source_url: String,
    pub fetch_interval: Duration,
    pub service_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = SinkMode::parse(&lookup(MODE_ENV).unwrap_or_else(|| DEFAULT_MODE.to_string()))?;

        let loki_url = lookup(LOKI_URL_ENV).filter(|url| !url.is_empty());
        if mode == SinkMode::Loki && loki_url.is_none() {
            return Err(ConfigError::MissingLokiUrl);
        }

        let source_url = lookup(SOURCE_URL_ENV)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingSourceUrl)?;

        let fetch_interval = match lookup(FETCH_INTERVAL_ENV) {
            Some(raw) => parse_interval(&raw)?,
            None => DEFAULT_FETCH_INTERVAL,
        };

        let service_name = lookup(SERVICE_NAME_ENV)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        Ok(Config {
            mode,
            loki_url,
            source_url,
            fetch_interval,
            service_name,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_mode(mode: SinkMode) -> Self {
        Config {
            mode,
            loki_url: None,
            source_url: "http://localhost:8080/data/aircraft.json".to_string(),
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidInterval(raw.to_string())),
    }
}
