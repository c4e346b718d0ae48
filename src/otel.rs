use crate::entry::LogEntry;
use crate::sink::{DeliveryError, Instrumented, LogSink};
use async_trait::async_trait;
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider as _, Severity};
use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{LogExporter, MetricExporter};
use opentelemetry_sdk::logs::{Logger, LoggerProvider};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::{runtime, Resource};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Instrumentation scope for the logger and the meter.
pub const SCOPE_NAME: &str = env!("CARGO_PKG_NAME");

pub const AIRCRAFT_COUNT: &str = "adsb.aircraft.count";
pub const FETCH_DURATION: &str = "adsb.fetch.duration";
pub const PUSH_ERRORS: &str = "adsb.push.errors";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("failed to create log exporter: {0}")]
    LogExporter(String),

    #[error("failed to create metric exporter: {0}")]
    MetricExporter(String),

    #[error("failed to shutdown telemetry providers: {0}")]
    Shutdown(String),

    #[error("telemetry shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Owned logger and meter providers.
///
/// Cheap to clone; clones share the same pipelines. Nothing is registered
/// globally, so teardown happens only through [`TelemetryHandle::shutdown`].
#[derive(Clone, Debug)]
pub struct TelemetryHandle {
    logger_provider: LoggerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryHandle {
    /// Flush and release both providers.
    ///
    /// Both shutdowns are always attempted, even if the first one fails.
    /// The SDK shutdown calls block, so they run on the blocking pool and
    /// are bounded by `deadline`.
    pub async fn shutdown(self, deadline: Duration) -> Result<(), TelemetryError> {
        let task = tokio::task::spawn_blocking(move || {
            let logs = self.logger_provider.shutdown().map_err(|e| e.to_string());
            let metrics = self.meter_provider.shutdown().map_err(|e| e.to_string());
            (logs, metrics)
        });

        match tokio::time::timeout(deadline, task).await {
            Err(_) => Err(TelemetryError::ShutdownTimeout(deadline)),
            Ok(Err(join)) => Err(TelemetryError::Shutdown(join.to_string())),
            Ok(Ok((logs, metrics))) => combine_shutdown_results(logs, metrics),
        }
    }
}

fn combine_shutdown_results(
    logs: Result<(), String>,
    metrics: Result<(), String>,
) -> Result<(), TelemetryError> {
    let failures: Vec<String> = [("logger provider", logs), ("meter provider", metrics)]
        .into_iter()
        .filter_map(|(name, result)| result.err().map(|e| format!("{name}: {e}")))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TelemetryError::Shutdown(failures.join("; ")))
    }
}

struct Instruments {
    aircraft_count: Counter<u64>,
    fetch_duration: Histogram<f64>,
    push_errors: Counter<u64>,
}

/// OpenTelemetry implementation of [`LogSink`].
///
/// Entries are emitted as OTLP log records; the sink also owns the counters
/// and histogram the scheduler reports into.
pub struct TelemetrySink {
    logger: Logger,
    instruments: Instruments,
    handle: TelemetryHandle,
}

impl TelemetrySink {
    /// Build OTLP/HTTP exporters from the standard `OTEL_EXPORTER_OTLP_*`
    /// environment and wire them into fresh providers.
    ///
    /// Must be called from within a Tokio runtime: the batch log processor
    /// and the periodic metric reader spawn their workers on it.
    pub fn new(service_name: &str) -> Result<Self, TelemetryError> {
        let resource = service_resource(service_name);

        let log_exporter = LogExporter::builder()
            .with_http()
            .build()
            .map_err(|e| TelemetryError::LogExporter(e.to_string()))?;
        let logger_provider = LoggerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(log_exporter, runtime::Tokio)
            .build();

        let metric_exporter = MetricExporter::builder()
            .with_http()
            .build()
            .map_err(|e| TelemetryError::MetricExporter(e.to_string()))?;
        let reader = PeriodicReader::builder(metric_exporter, runtime::Tokio).build();
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build();

        Ok(Self::from_providers(logger_provider, meter_provider))
    }

    /// Build the sink on top of already configured providers.
    pub fn from_providers(logger_provider: LoggerProvider, meter_provider: SdkMeterProvider) -> Self {
        let logger = logger_provider.logger(SCOPE_NAME);
        let meter = meter_provider.meter(SCOPE_NAME);

        let instruments = Instruments {
            aircraft_count: meter
                .u64_counter(AIRCRAFT_COUNT)
                .with_description("Number of aircraft processed")
                .with_unit("1")
                .build(),
            fetch_duration: meter
                .f64_histogram(FETCH_DURATION)
                .with_description("Duration of aircraft data fetch operations")
                .with_unit("s")
                .build(),
            push_errors: meter
                .u64_counter(PUSH_ERRORS)
                .with_description("Number of errors pushing data")
                .with_unit("1")
                .build(),
        };

        TelemetrySink {
            logger,
            instruments,
            handle: TelemetryHandle {
                logger_provider,
                meter_provider,
            },
        }
    }

    pub fn handle(&self) -> TelemetryHandle {
        self.handle.clone()
    }
}

fn service_resource(service_name: &str) -> Resource {
    Resource::default().merge(&Resource::new([
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]))
}

/// Attributes attached to the log record for `entry`.
///
/// Only labels are forwarded; structured metadata is dropped on this path.
fn record_attributes(entry: &LogEntry) -> Vec<(String, String)> {
    entry
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl LogSink for TelemetrySink {
    async fn deliver(
        &self,
        entries: &[LogEntry],
        _cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        self.instruments
            .aircraft_count
            .add(entries.len() as u64, &[]);

        for entry in entries {
            let timestamp = SystemTime::from(entry.timestamp);
            let mut record = self.logger.create_log_record();
            record.set_timestamp(timestamp);
            record.set_observed_timestamp(timestamp);
            record.set_severity_number(Severity::Info);
            record.set_severity_text("INFO");
            record.set_body(AnyValue::String(entry.line.clone().into()));
            for (key, value) in record_attributes(entry) {
                record.add_attribute(key, value);
            }
            self.logger.emit(record);
        }

        Ok(())
    }

    fn instruments(&self) -> Option<&dyn Instrumented> {
        Some(self)
    }
}

impl Instrumented for TelemetrySink {
    fn record_fetch_duration(&self, duration: Duration) {
        self.instruments
            .fetch_duration
            .record(duration.as_secs_f64(), &[]);
    }

    fn record_push_error(&self) {
        self.instruments.push_errors.add(1, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use opentelemetry_sdk::metrics::data::{Histogram as HistogramData, Sum};
    use opentelemetry_sdk::testing::logs::InMemoryLogExporter;
    use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;
    use std::collections::BTreeMap;

    struct Harness {
        sink: TelemetrySink,
        logs: InMemoryLogExporter,
        metrics: InMemoryMetricExporter,
    }

    impl Harness {
        fn new() -> Self {
            let logs = InMemoryLogExporter::default();
            let metrics = InMemoryMetricExporter::default();
            let logger_provider = LoggerProvider::builder()
                .with_simple_exporter(logs.clone())
                .build();
            let reader = PeriodicReader::builder(metrics.clone(), runtime::Tokio).build();
            let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
            Harness {
                sink: TelemetrySink::from_providers(logger_provider, meter_provider),
                logs,
                metrics,
            }
        }

        fn flush(&self) {
            self.sink.handle.meter_provider.force_flush().unwrap();
        }

        fn counter(&self, name: &str) -> u64 {
            self.flush();
            let exported = self.metrics.get_finished_metrics().unwrap();
            exported
                .iter()
                .rev()
                .flat_map(|rm| rm.scope_metrics.iter())
                .flat_map(|sm| sm.metrics.iter())
                .find(|m| m.name == name)
                .and_then(|m| m.data.as_any().downcast_ref::<Sum<u64>>())
                .map(|sum| sum.data_points.iter().map(|p| p.value).sum())
                .unwrap_or(0)
        }

        fn histogram(&self, name: &str) -> (u64, f64) {
            self.flush();
            let exported = self.metrics.get_finished_metrics().unwrap();
            exported
                .iter()
                .rev()
                .flat_map(|rm| rm.scope_metrics.iter())
                .flat_map(|sm| sm.metrics.iter())
                .find(|m| m.name == name)
                .and_then(|m| m.data.as_any().downcast_ref::<HistogramData<f64>>())
                .map(|h| {
                    h.data_points
                        .iter()
                        .fold((0, 0.0), |(count, sum), p| (count + p.count, sum + p.sum))
                })
                .unwrap_or((0, 0.0))
        }

        fn emitted(&self) -> usize {
            self.logs.get_emitted_logs().unwrap().len()
        }
    }

    fn entry(line: &str) -> LogEntry {
        LogEntry::new(
            Utc::now(),
            BTreeMap::from([
                ("service".to_string(), "adsb2loki".to_string()),
                ("source".to_string(), "test".to_string()),
            ]),
            line,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deliver_counts_and_emits_every_entry() {
        let harness = Harness::new();
        let entries = vec![entry("a"), entry("b"), entry("c")];

        harness
            .sink
            .deliver(&entries, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.counter(AIRCRAFT_COUNT), 3);
        assert_eq!(harness.emitted(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn emitted_record_carries_line_severity_time_and_labels_only() {
        let harness = Harness::new();
        let entry = LogEntry::new(
            Utc::now(),
            BTreeMap::from([("service".to_string(), "x".to_string())]),
            r#"{"a":1}"#,
        )
        .with_metadata("hex", "abc123");

        harness
            .sink
            .deliver(std::slice::from_ref(&entry), &CancellationToken::new())
            .await
            .unwrap();

        let emitted = harness.logs.get_emitted_logs().unwrap();
        assert_eq!(emitted.len(), 1);
        let record = &emitted[0].record;

        assert_eq!(
            record.body,
            Some(AnyValue::String(r#"{"a":1}"#.to_string().into()))
        );
        assert_eq!(record.severity_number, Some(Severity::Info));
        assert_eq!(record.timestamp, Some(SystemTime::from(entry.timestamp)));

        let attributes: Vec<(String, AnyValue)> = record
            .attributes_iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect();
        assert_eq!(
            attributes,
            vec![("service".to_string(), AnyValue::String("x".to_string().into()))]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deliver_empty_batch_adds_zero_and_emits_nothing() {
        let harness = Harness::new();

        harness
            .sink
            .deliver(&[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.counter(AIRCRAFT_COUNT), 0);
        assert_eq!(harness.emitted(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn counter_accumulates_across_deliveries() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();

        harness.sink.deliver(&[entry("a")], &cancel).await.unwrap();
        harness
            .sink
            .deliver(&[entry("b"), entry("c")], &cancel)
            .await
            .unwrap();

        assert_eq!(harness.counter(AIRCRAFT_COUNT), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fetch_duration_is_recorded_in_seconds() {
        let harness = Harness::new();

        harness
            .sink
            .record_fetch_duration(Duration::from_millis(1500));

        let (count, sum) = harness.histogram(FETCH_DURATION);
        assert_eq!(count, 1);
        assert!((sum - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn push_error_increments_by_one() {
        let harness = Harness::new();

        harness.sink.record_push_error();
        assert_eq!(harness.counter(PUSH_ERRORS), 1);

        harness.sink.record_push_error();
        assert_eq!(harness.counter(PUSH_ERRORS), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sink_exposes_instruments() {
        let harness = Harness::new();
        assert!(harness.sink.instruments().is_some());
    }

    #[test]
    fn attributes_mirror_labels_and_drop_metadata() {
        let entry = entry("a").with_metadata("hex", "abc123");

        let attributes = record_attributes(&entry);

        assert_eq!(
            attributes,
            vec![
                ("service".to_string(), "adsb2loki".to_string()),
                ("source".to_string(), "test".to_string()),
            ]
        );
        assert!(!attributes.iter().any(|(k, _)| k == "hex"));
    }

    #[test]
    fn shutdown_reports_every_failing_provider() {
        assert!(combine_shutdown_results(Ok(()), Ok(())).is_ok());

        let err = combine_shutdown_results(Err("flush failed".into()), Err("closed".into()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("logger provider: flush failed"));
        assert!(err.contains("meter provider: closed"));

        let err = combine_shutdown_results(Ok(()), Err("closed".into()))
            .unwrap_err()
            .to_string();
        assert!(!err.contains("logger provider"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_flushes_both_providers() {
        let harness = Harness::new();
        harness
            .sink
            .deliver(&[entry("a")], &CancellationToken::new())
            .await
            .unwrap();

        harness
            .sink
            .handle()
            .shutdown(Duration::from_secs(5))
            .await
            .unwrap();
    }
}
