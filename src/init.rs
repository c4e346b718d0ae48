use tracing_subscriber::EnvFilter;

/// Configuration of the local diagnostic logger.
///
/// This only controls what the process itself prints to stderr; it has
/// nothing to do with the entries shipped to the active sink.
///
/// **Fields**
/// - `level`: fallback filter used when `RUST_LOG` is unset.
/// - `with_target`: include the module target in each line.
/// - `ansi`: colorize output.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Defaults with `level` taken from `LOG_LEVEL`.
    pub fn from_env() -> Self {
        Self {
            level: crate::env::env_or(crate::env::LOG_LEVEL_ENV, "info"),
            ..Self::default()
        }
    }
}

/// Filter directives for a fallback `level`, with chatty transport crates
/// turned down.
pub fn filter_directives(level: &str) -> String {
    format!("hyper=off,h2=off,rustls=off,reqwest=warn,opentelemetry=warn,opentelemetry_sdk=warn,{level}")
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(filter_directives("info")))
}

/// Install the global `tracing` subscriber.
///
/// **Effects**
///
/// Installs a `fmt` subscriber as the process-wide default. Calling this
/// twice panics, so it belongs in `main` only.
pub fn init_tracing_with_config(config: LoggingConfig) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level))
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
}

/// Initialize tracing from `RUST_LOG` / `LOG_LEVEL`.
pub fn init_tracing() {
    init_tracing_with_config(LoggingConfig::from_env());
}
