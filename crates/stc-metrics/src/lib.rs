#![forbid(unsafe_code)]

//! Latency instrumentation for the telemetry protocol.
//!
//! An append-only CSV sink of timestamped samples, one file per role
//! instance. Recording is fire-and-forget: samples cross an unbounded
//! channel to a background writer task, and sink failures are logged
//! without ever touching protocol control flow.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

/// CSV header written when a metrics file is first created.
pub const CSV_HEADER: &str = "timestamp_iso,metric_name,value\n";

/// The instrumented operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Key-pair generation latency (first boot only).
    KeyGeneration,
    /// Directory read latency for peer-key resolution.
    DirectoryRead,
    /// Per-message encapsulation latency.
    Encapsulation,
    /// Per-message decapsulation latency.
    Decapsulation,
    /// Publish timestamp to successful decrypt timestamp.
    EndToEnd,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::KeyGeneration => "key_generation",
            Metric::DirectoryRead => "directory_read_latency",
            Metric::Encapsulation => "encapsulation",
            Metric::Decapsulation => "decapsulation",
            Metric::EndToEnd => "end_to_end_latency",
        }
    }
}

/// A single timestamped sample. Never mutated after write.
#[derive(Clone, Debug)]
pub struct MetricSample {
    pub timestamp_iso: String,
    pub metric: Metric,
    pub value_ms: f64,
}

impl MetricSample {
    fn csv_row(&self) -> String {
        format!("{},{},{}\n", self.timestamp_iso, self.metric.name(), self.value_ms)
    }
}

/// Cloneable fire-and-forget recorder handle.
///
/// `record` never blocks and never fails from the caller's perspective;
/// a recorder built with [`MetricsRecorder::disabled`] drops every
/// sample.
#[derive(Clone)]
pub struct MetricsRecorder {
    tx: Option<mpsc::UnboundedSender<MetricSample>>,
}

impl MetricsRecorder {
    /// Recorder appending to a CSV file at `path`, writing the header
    /// when the file is new. Must be called within a tokio runtime.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(path, rx));
        Self { tx: Some(tx) }
    }

    /// Recorder that discards every sample.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Record one sample, stamped with the current UTC time.
    pub fn record(&self, metric: Metric, value_ms: f64) {
        let Some(tx) = &self.tx else { return };
        let sample = MetricSample {
            timestamp_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            metric,
            value_ms,
        };
        // Receiver gone means the writer task died; protocol flow is
        // unaffected either way.
        let _ = tx.send(sample);
    }
}

async fn write_loop(path: PathBuf, mut rx: mpsc::UnboundedReceiver<MetricSample>) {
    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "metrics sink unavailable, dropping samples");
            while rx.recv().await.is_some() {}
            return;
        }
    };

    match file.metadata().await {
        Ok(meta) if meta.len() == 0 => {
            if let Err(e) = file.write_all(CSV_HEADER.as_bytes()).await {
                warn!(error = %e, "failed to write metrics header");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to stat metrics file"),
    }

    while let Some(sample) = rx.recv().await {
        if let Err(e) = file.write_all(sample.csv_row().as_bytes()).await {
            warn!(error = %e, "failed to append metric sample");
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!(error = %e, "failed to flush metrics file");
        }
    }
}

/// Time a synchronous operation, returning its result and elapsed
/// milliseconds.
pub fn time_sync<T>(f: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed().as_secs_f64() * 1000.0)
}

/// Time a future, returning its output and elapsed milliseconds.
pub async fn time_async<F, T>(fut: F) -> (T, f64)
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed().as_secs_f64() * 1000.0)
}
