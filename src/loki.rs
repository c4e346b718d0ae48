use crate::entry::LogEntry;
use crate::sink::{DeliveryError, LogSink};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Path of the Loki push endpoint, appended to [`LokiConfig::url`].
pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// Configuration for [`LokiSink`].
#[derive(Clone, Debug)]
pub struct LokiConfig {
    /// Base URL without the push path, e.g. "http://localhost:3100".
    pub url: String,
    /// Upper bound on a single push request.
    pub timeout: Duration,
}

impl LokiConfig {
    pub fn new(url: impl Into<String>) -> Self {
        LokiConfig {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Loki implementation of [`LogSink`] using the JSON push API.
///
/// Every call to `deliver` issues exactly one POST. Each entry becomes its
/// own stream; entries sharing a label set are not merged.
#[derive(Clone, Debug)]
pub struct LokiSink {
    client: Client,
    push_url: String,
}

impl LokiSink {
    /// Construct a new sink instance using the provided configuration.
    ///
    /// **Returns**
    /// - A ready-to-use [`LokiSink`].
    /// - `Err(..)` if the underlying HTTP client could not be built.
    pub fn new(config: LokiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            push_url: push_url(&config.url),
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }
}

fn push_url(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), PUSH_PATH)
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: Vec<Stream<'a>>,
}

#[derive(Serialize)]
struct Stream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: [Value<'a>; 1],
}

/// One `[ts, line]` or `[ts, line, metadata]` tuple.
struct Value<'a> {
    timestamp: String,
    line: &'a str,
    metadata: Option<&'a BTreeMap<String, String>>,
}

impl<'a> PushRequest<'a> {
    fn from_entries(entries: &'a [LogEntry]) -> Self {
        let streams = entries
            .iter()
            .map(|entry| Stream {
                stream: &entry.labels,
                values: [Value {
                    timestamp: entry.unix_nanos().to_string(),
                    line: &entry.line,
                    metadata: Some(&entry.structured_metadata).filter(|m| !m.is_empty()),
                }],
            })
            .collect();
        PushRequest { streams }
    }
}

impl Serialize for Value<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.metadata.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(self.line)?;
        if let Some(metadata) = self.metadata {
            seq.serialize_element(metadata)?;
        }
        seq.end()
    }
}

/// Serialize `entries` into the push API body.
pub fn encode_push_body(entries: &[LogEntry]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&PushRequest::from_entries(entries))
}

#[async_trait]
impl LogSink for LokiSink {
    async fn deliver(
        &self,
        entries: &[LogEntry],
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        if entries.is_empty() {
            return Ok(());
        }

        let body = encode_push_body(entries)?;
        let request = self
            .client
            .post(&self.push_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
            result = request => result?,
        };

        // The status is reported but never turned into an error: a rejected
        // push still counts as delivered.
        let status = response.status();
        if status.is_success() {
            debug!(%status, streams = entries.len(), "pushed entries to loki");
        } else {
            warn!(%status, streams = entries.len(), "loki rejected push, not retried");
        }
        drop(response);

        Ok(())
    }
}
