use crate::entry::LogEntry;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error returned by [`LogSink::deliver`].
///
/// The scheduler only cares whether a delivery happened; the variants exist
/// so the cause can be logged.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("failed to marshal payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("delivery cancelled")]
    Cancelled,

    #[error("{0}")]
    Backend(String),
}

/// Asynchronous destination for batches of [`LogEntry`]s.
///
/// Exactly one sink is active per process. It is built once at startup and
/// shared read-only across ticks.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch to the backend.
    ///
    /// **Contract**
    /// - An empty `entries` slice is a no-op that returns `Ok(())` without
    ///   touching the network.
    /// - `entries` is borrowed for the duration of the call only.
    /// - If `cancel` fires while the delivery is in flight the call returns
    ///   [`DeliveryError::Cancelled`] without waiting for the backend.
    async fn deliver(
        &self,
        entries: &[LogEntry],
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError>;

    /// Optional observability surface for the scheduler.
    ///
    /// Sinks without instruments keep the default, and the scheduler skips
    /// recording for them.
    fn instruments(&self) -> Option<&dyn Instrumented> {
        None
    }
}

/// Timing and error hooks a sink may expose to the scheduler.
pub trait Instrumented: Send + Sync {
    /// Record how long one fetch + deliver cycle took.
    fn record_fetch_duration(&self, duration: Duration);

    /// Count one failed cycle.
    fn record_push_error(&self);
}
