use crate::entry::LogEntry;
use crate::sink::{DeliveryError, LogSink};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A sink that simply drops all entries.
///
/// Useful for exercising the scheduler and fetchers without any external
/// I/O, and for tests that don't care about delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn deliver(
        &self,
        _entries: &[LogEntry],
        _cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }
}
