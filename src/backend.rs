use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::env::{Config, ConfigError};
use crate::sink::LogSink;

/// Bound on flushing the telemetry providers at process end.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Supported sink kinds, selected once at startup via `MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Loki,
    Otel,
}

impl SinkMode {
    /// Parse a mode string, ignoring ASCII case.
    ///
    /// Examples:
    /// - "loki", "LOKI" → [`SinkMode::Loki`]
    /// - "otel", "Otel" → [`SinkMode::Otel`]
    pub fn parse(mode: &str) -> Result<Self, ConfigError> {
        match mode.to_ascii_lowercase().as_str() {
            "loki" => Ok(SinkMode::Loki),
            "otel" => Ok(SinkMode::Otel),
            _ => Err(ConfigError::InvalidMode(mode.to_string())),
        }
    }

    fn feature(self) -> &'static str {
        match self {
            SinkMode::Loki => "loki",
            SinkMode::Otel => "otel",
        }
    }
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feature())
    }
}

/// Error type returned when building the active sink from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} sink is not compiled in, enable the `{feature}` feature", feature = .0.feature())]
    FeatureDisabled(SinkMode),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "otel")]
    #[error("failed to create OpenTelemetry client: {0}")]
    Telemetry(#[from] crate::otel::TelemetryError),
}

/// The single sink used for the lifetime of the process, plus whatever it
/// needs torn down at exit.
pub struct ActiveSink {
    sink: Arc<dyn LogSink>,
    #[cfg(feature = "otel")]
    telemetry: Option<crate::otel::TelemetryHandle>,
}

impl ActiveSink {
    pub fn sink(&self) -> &dyn LogSink {
        &*self.sink
    }

    /// Release backend resources. Failures are logged, never returned,
    /// so they cannot hold up process exit.
    pub async fn shutdown(self) {
        #[cfg(feature = "otel")]
        if let Some(handle) = self.telemetry {
            if let Err(e) = handle.shutdown(SHUTDOWN_TIMEOUT).await {
                tracing::error!(error = %e, "failed to shutdown OpenTelemetry");
            }
        }
        drop(self.sink);
    }
}

/// Create the concrete [`LogSink`] selected by `cfg.mode`.
///
/// This is the main entry point for the binary; tests and embedders can
/// construct sinks directly instead.
pub fn build_sink(cfg: &Config) -> Result<ActiveSink, BuildError> {
    match cfg.mode {
        SinkMode::Loki => {
            #[cfg(feature = "loki")]
            {
                use crate::loki::{LokiConfig, LokiSink};

                let url = cfg.loki_url.clone().ok_or(ConfigError::MissingLokiUrl)?;
                let sink = LokiSink::new(LokiConfig::new(url))?;
                tracing::info!(push_url = sink.push_url(), "running in Loki mode");

                Ok(ActiveSink {
                    sink: Arc::new(sink),
                    #[cfg(feature = "otel")]
                    telemetry: None,
                })
            }

            #[cfg(not(feature = "loki"))]
            {
                let _ = cfg;
                Err(BuildError::FeatureDisabled(SinkMode::Loki))
            }
        }
        SinkMode::Otel => {
            #[cfg(feature = "otel")]
            {
                use crate::otel::TelemetrySink;

                let sink = TelemetrySink::new(&cfg.service_name)?;
                let handle = sink.handle();
                tracing::info!("running in OpenTelemetry mode");

                Ok(ActiveSink {
                    sink: Arc::new(sink),
                    telemetry: Some(handle),
                })
            }

            #[cfg(not(feature = "otel"))]
            {
                let _ = cfg;
                Err(BuildError::FeatureDisabled(SinkMode::Otel))
            }
        }
    }
}
