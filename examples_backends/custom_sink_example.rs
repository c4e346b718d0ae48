use std::collections::BTreeMap;
use std::time::Duration;

use adsb_sink::entry::LogEntry;
use adsb_sink::fetch::{FetchError, Fetcher};
use adsb_sink::scheduler::Scheduler;
use adsb_sink::sink::{DeliveryError, LogSink};
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Example of plugging in a completely custom backend by implementing
/// `LogSink` directly. Imagine this talks to some proprietary store for
/// which this crate does not provide a built-in sink.
struct StdoutSink;

#[async_trait]
impl LogSink for StdoutSink {
    async fn deliver(
        &self,
        entries: &[LogEntry],
        _cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        for entry in entries {
            println!("[stdout-sink] {} {:?} {}", entry.unix_nanos(), entry.labels, entry.line);
        }
        Ok(())
    }
}

/// Produces one synthetic record per tick instead of calling an upstream.
struct HeartbeatFetcher;

#[async_trait]
impl Fetcher for HeartbeatFetcher {
    async fn fetch_and_deliver(
        &self,
        cancel: &CancellationToken,
        sink: &dyn LogSink,
    ) -> Result<(), FetchError> {
        let labels = BTreeMap::from([("service".to_string(), "heartbeat".to_string())]);
        let entry = LogEntry::new(Utc::now(), labels, r#"{"alive":true}"#);
        sink.deliver(&[entry], cancel).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let scheduler = Scheduler::new(Duration::from_secs(1));
    let cancel = CancellationToken::new();

    // Stop after a few ticks; a real service would wait on a signal.
    scheduler
        .run(
            &HeartbeatFetcher,
            &StdoutSink,
            &cancel,
            tokio::time::sleep(Duration::from_millis(3500)),
        )
        .await;
}
