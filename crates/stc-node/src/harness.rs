//! Test harness for the telemetry channel.
//!
//! Provides a collecting sink and an end-to-end flow helper used by
//! both the role unit tests and the integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::config::NodeConfig;
use crate::error::RoleError;
use crate::publisher::PublisherRole;
use crate::subscriber::SubscriberRole;
use crate::telemetry::{TelemetryReading, TelemetrySink};
use stc_directory::testing::InMemoryDirectory;
use stc_metrics::MetricsRecorder;
use stc_transport::{telemetry_topic, InMemoryBroker};

/// Sink that forwards every delivered reading into a channel.
pub struct CollectSink {
    tx: mpsc::UnboundedSender<TelemetryReading>,
}

impl CollectSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TelemetryReading>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl TelemetrySink for CollectSink {
    async fn deliver(&self, reading: TelemetryReading) {
        let _ = self.tx.send(reading);
    }
}

/// Config for a harness node. Key files land under `dir`, the retry
/// backoff is shortened so failure tests stay fast.
pub fn harness_config(device_id: &str, peer_id: &str, dir: &Path) -> NodeConfig {
    NodeConfig {
        device_id: device_id.to_string(),
        peer_id: peer_id.to_string(),
        key_file: dir.join(format!("{device_id}-keys.json")),
        publish_interval_secs: 1,
        register_backoff_ms: 1,
        ..NodeConfig::default()
    }
}

/// Run a complete publish/subscribe flow over the in-memory directory
/// and broker, and return the first `count` readings the subscriber
/// delivers.
///
/// 1. Subscriber starts: keys, registration, subscription on the
///    publisher's topic.
/// 2. Publisher starts: keys, registration, peer resolution, then
///    periodic encrypted publishes.
/// 3. The harness collects `count` decrypted readings and shuts both
///    roles down.
pub async fn run_telemetry_flow(
    dir: &Path,
    count: usize,
) -> Result<Vec<TelemetryReading>, RoleError> {
    let directory = InMemoryDirectory::new();
    let broker = InMemoryBroker::new();

    let publisher_cfg = harness_config("UAV-1", "GCS-1", dir);
    let subscriber_cfg = harness_config("GCS-1", "UAV-1", dir);
    let topic = telemetry_topic(&publisher_cfg.topic_namespace, &publisher_cfg.device_id);

    let (sink, mut received) = CollectSink::new();
    let mut subscriber = SubscriberRole::new(
        subscriber_cfg,
        directory.clone(),
        broker.clone(),
        MetricsRecorder::disabled(),
        sink,
    );
    let (sub_tx, sub_rx) = watch::channel(false);
    let sub_handle = tokio::spawn(async move { subscriber.run(sub_rx).await });

    // The subscriber must be listening before the publisher's first
    // tick, or that envelope is lost.
    for _ in 0..200 {
        if broker.subscriber_count(&topic) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut publisher = PublisherRole::new(
        publisher_cfg,
        directory,
        broker,
        MetricsRecorder::disabled(),
    );
    let (pub_tx, pub_rx) = watch::channel(false);
    let pub_handle = tokio::spawn(async move { publisher.run(pub_rx).await });

    let mut readings = Vec::with_capacity(count);
    while readings.len() < count {
        match tokio::time::timeout(Duration::from_secs(10), received.recv()).await {
            Ok(Some(reading)) => readings.push(reading),
            Ok(None) | Err(_) => break,
        }
    }

    let _ = pub_tx.send(true);
    let _ = sub_tx.send(true);
    pub_handle.await.map_err(|e| RoleError::Transport(
        stc_transport::TransportError::Other(format!("publisher task panicked: {e}")),
    ))??;
    sub_handle.await.map_err(|e| RoleError::Transport(
        stc_transport::TransportError::Other(format!("subscriber task panicked: {e}")),
    ))??;

    Ok(readings)
}
