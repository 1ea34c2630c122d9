//! Subscriber role: listens on the peer's topic and decrypts inbound
//! envelopes with its own private key.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::RoleError;
use crate::keystore::KeyStore;
use crate::telemetry::{TelemetryReading, TelemetrySink};
use stc_crypto::{Envelope, HybridCipher, Kem, PrivateKey, X25519Kem};
use stc_directory::{DirectoryClient, RegistrationCoordinator};
use stc_metrics::{time_sync, Metric, MetricsRecorder};
use stc_transport::{telemetry_topic, PubSubTransport, TransportError};

/// Subscriber lifecycle. No peer resolution: decryption needs only the
/// local private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Init,
    KeysReady,
    Registered,
    Connected,
    Subscribed,
    Listening,
    Stopped,
}

pub struct SubscriberRole<D: DirectoryClient, T: PubSubTransport, K: Kem = X25519Kem> {
    config: NodeConfig,
    coordinator: RegistrationCoordinator<D>,
    transport: T,
    cipher: HybridCipher<K>,
    metrics: MetricsRecorder,
    sink: Arc<dyn TelemetrySink>,
    state: SubscriberState,
}

impl<D: DirectoryClient, T: PubSubTransport> SubscriberRole<D, T, X25519Kem> {
    pub fn new(
        config: NodeConfig,
        directory: D,
        transport: T,
        metrics: MetricsRecorder,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self::with_kem(config, directory, transport, X25519Kem, metrics, sink)
    }
}

impl<D: DirectoryClient, T: PubSubTransport, K: Kem> SubscriberRole<D, T, K> {
    pub fn with_kem(
        config: NodeConfig,
        directory: D,
        transport: T,
        kem: K,
        metrics: MetricsRecorder,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let coordinator = RegistrationCoordinator::with_policies(
            directory,
            config.register_policy(),
            config.lookup_policy(),
        );
        Self {
            config,
            coordinator,
            transport,
            cipher: HybridCipher::with_kem(kem),
            metrics,
            sink,
            state: SubscriberState::Init,
        }
    }

    pub fn state(&self) -> &SubscriberState {
        &self.state
    }

    /// Run the subscriber until the shutdown signal flips to `true`, its
    /// sender is dropped, or the subscription itself ends.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), RoleError> {
        info!(device_id = %self.config.device_id, "subscriber starting");

        let keys =
            KeyStore::load_or_create(&self.config.key_file, self.cipher.kem(), &self.metrics)
                .await?;
        self.state = SubscriberState::KeysReady;

        self.coordinator
            .ensure_registered(&self.config.device_id, &keys.public)
            .await?;
        self.state = SubscriberState::Registered;

        if !self.transport.is_connected() {
            return Err(TransportError::Disconnected.into());
        }
        self.state = SubscriberState::Connected;

        // Subscribers listen on their peer's topic.
        let topic = telemetry_topic(&self.config.topic_namespace, &self.config.peer_id);
        let mut subscription = self.transport.subscribe(&topic).await?;
        info!(topic = %topic, "subscribed");
        self.state = SubscriberState::Subscribed;

        self.state = SubscriberState::Listening;
        let outcome = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
                next = subscription.next() => {
                    match next {
                        Some(payload) => self.handle_message(&keys.private, payload).await,
                        None => {
                            warn!(topic = %topic, "subscription closed by transport");
                            break Err(RoleError::Transport(TransportError::Closed));
                        }
                    }
                }
            }
        };

        self.state = SubscriberState::Stopped;
        info!(device_id = %self.config.device_id, "subscriber stopped");
        outcome
    }

    /// Handle one inbound payload. A malformed or undecryptable message
    /// is logged and dropped; it never terminates the subscription.
    async fn handle_message(&self, private: &PrivateKey, payload: Bytes) {
        let received_at = Utc::now().timestamp_millis();

        let envelope = match Envelope::from_bytes(&payload) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "discarding malformed wire payload");
                return;
            }
        };

        let (opened, elapsed_ms) =
            time_sync(|| self.cipher.decrypt_with_private_key(private, &envelope));
        let plaintext = match opened {
            Ok(pt) => pt,
            Err(e) => {
                warn!(error = %e, "decryption failed, dropping message");
                return;
            }
        };
        self.metrics.record(Metric::Decapsulation, elapsed_ms);

        if let Some(sent_at) = envelope.sent_at {
            let latency_ms = (received_at - sent_at as i64).max(0) as f64;
            self.metrics.record(Metric::EndToEnd, latency_ms);
        }

        let reading = match TelemetryReading::from_bytes(&plaintext) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "decrypted payload is not telemetry, dropping");
                return;
            }
        };

        self.sink.deliver(reading).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::CollectSink;
    use std::time::Duration;
    use stc_directory::testing::InMemoryDirectory;
    use stc_transport::InMemoryBroker;

    fn test_config(dir: &std::path::Path) -> NodeConfig {
        NodeConfig {
            device_id: "GCS-1".to_string(),
            peer_id: "UAV-1".to_string(),
            key_file: dir.join("subscriber-keys.json"),
            register_backoff_ms: 1,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bad_messages_never_end_the_subscription() {
        let tmp = tempfile::tempdir().unwrap();
        let directory = InMemoryDirectory::new();
        let broker = InMemoryBroker::new();
        let (sink, mut received) = CollectSink::new();

        let mut role = SubscriberRole::new(
            test_config(tmp.path()),
            directory.clone(),
            broker.clone(),
            MetricsRecorder::disabled(),
            sink,
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            role.run(rx).await.unwrap();
            role
        });

        // Wait until the subscription is attached before injecting.
        for _ in 0..200 {
            if broker.subscriber_count("uav/data/UAV-1") > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(broker.subscriber_count("uav/data/UAV-1") > 0);

        let own_key = directory.lookup("GCS-1").await.unwrap();

        // Garbage bytes, then a valid envelope with a corrupt capsule,
        // then a real message.
        broker.inject("uav/data/UAV-1", Bytes::from_static(b"\x00not json")).await;

        let cipher = HybridCipher::new();
        let mut corrupted = cipher
            .encrypt_for_recipient(&own_key, &TelemetryReading::sample_now().to_bytes())
            .unwrap();
        corrupted.capsule[5] ^= 0xFF;
        broker
            .inject("uav/data/UAV-1", Bytes::from(corrupted.to_bytes().unwrap()))
            .await;

        let good = cipher
            .encrypt_for_recipient(&own_key, &TelemetryReading::sample_now().to_bytes())
            .unwrap();
        broker.inject("uav/data/UAV-1", Bytes::from(good.to_bytes().unwrap())).await;

        let reading = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reading.location.lat, 34.0522);

        tx.send(true).unwrap();
        let role = handle.await.unwrap();
        assert_eq!(*role.state(), SubscriberState::Stopped);
    }

    #[tokio::test]
    async fn test_subscriber_registers_before_listening() {
        let tmp = tempfile::tempdir().unwrap();
        let directory = InMemoryDirectory::new();
        let broker = InMemoryBroker::new();
        let (sink, _received) = CollectSink::new();

        let mut role = SubscriberRole::new(
            test_config(tmp.path()),
            directory.clone(),
            broker,
            MetricsRecorder::disabled(),
            sink,
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { role.run(rx).await });

        for _ in 0..100 {
            if directory.lookup("GCS-1").await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(directory.lookup("GCS-1").await.is_ok());

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
