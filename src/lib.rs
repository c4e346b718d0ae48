pub mod entry;
pub mod sink;

#[cfg(feature = "loki")]
pub mod loki;

#[cfg(feature = "otel")]
pub mod otel;

pub mod backend;
pub mod env;
pub mod fetch;
pub mod init;
pub mod noop_sink;
pub mod scheduler;
