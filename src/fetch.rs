use crate::entry::LogEntry;
use crate::sink::{DeliveryError, LogSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to fetch snapshot: {0}")]
    Request(#[from] reqwest::Error),

    #[error("snapshot source returned status {0}")]
    Status(StatusCode),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to deliver entries: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("fetch cancelled")]
    Cancelled,
}

/// One delivery cycle: pull upstream records, turn them into entries and
/// hand them to the sink.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_and_deliver(
        &self,
        cancel: &CancellationToken,
        sink: &dyn LogSink,
    ) -> Result<(), FetchError>;
}

/// Configuration for [`SnapshotFetcher`].
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    /// Full URL of the JSON document, e.g. "http://feeder/data/aircraft.json".
    pub url: String,
    /// Value of the `service` label on every entry.
    pub service_name: String,
    pub timeout: Duration,
}

/// Fetches an `aircraft.json`-style snapshot over HTTP.
///
/// The document is expected to look like
/// `{"now": 1700000000.5, "aircraft": [{...}, ...]}`; every element of
/// `aircraft` becomes one [`LogEntry`].
#[derive(Clone, Debug)]
pub struct SnapshotFetcher {
    client: Client,
    url: String,
    labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, Default)]
struct Snapshot {
    #[serde(default)]
    now: Option<f64>,
    #[serde(default)]
    aircraft: Vec<serde_json::Value>,
}

/// Fields copied from each record into structured metadata.
const METADATA_FIELDS: [&str; 2] = ["hex", "flight"];

impl SnapshotFetcher {
    pub fn new(config: SnapshotConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let source = Url::parse(&config.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| config.url.clone());

        let labels = BTreeMap::from([
            ("service".to_string(), config.service_name),
            ("source".to_string(), source),
        ]);

        Ok(SnapshotFetcher {
            client,
            url: config.url,
            labels,
        })
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Download and decode one snapshot.
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<LogEntry>, FetchError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = self.client.get(&self.url).send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.bytes() => result?,
        };

        let snapshot: Snapshot = serde_json::from_slice(&body)?;
        Ok(entries_from_snapshot(snapshot, &self.labels, Utc::now()))
    }
}

fn entries_from_snapshot(
    snapshot: Snapshot,
    labels: &BTreeMap<String, String>,
    fallback: DateTime<Utc>,
) -> Vec<LogEntry> {
    let timestamp = snapshot
        .now
        .and_then(timestamp_from_secs)
        .unwrap_or(fallback);

    snapshot
        .aircraft
        .into_iter()
        .map(|record| {
            let mut entry = LogEntry::new(timestamp, labels.clone(), record.to_string());
            for field in METADATA_FIELDS {
                if let Some(value) = record.get(field).and_then(|v| v.as_str()) {
                    let value = value.trim();
                    if !value.is_empty() {
                        entry = entry.with_metadata(field, value);
                    }
                }
            }
            entry
        })
        .collect()
}

fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[async_trait]
impl Fetcher for SnapshotFetcher {
    async fn fetch_and_deliver(
        &self,
        cancel: &CancellationToken,
        sink: &dyn LogSink,
    ) -> Result<(), FetchError> {
        let entries = self.fetch(cancel).await?;
        debug!(count = entries.len(), "fetched snapshot");
        sink.deliver(&entries, cancel).await?;
        Ok(())
    }
}
