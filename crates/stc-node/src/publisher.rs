//! Publisher role: encrypts telemetry for its peer and publishes on its
//! own topic at a fixed interval.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::RoleError;
use crate::keystore::KeyStore;
use crate::telemetry::TelemetryReading;
use stc_crypto::{HybridCipher, Kem, PublicKey, X25519Kem};
use stc_directory::{DirectoryClient, RegistrationCoordinator};
use stc_metrics::{time_async, time_sync, Metric, MetricsRecorder};
use stc_transport::{telemetry_topic, PubSubTransport, TransportError};

/// Publisher lifecycle. The startup chain is strictly sequential; any
/// failure before `Publishing` aborts the role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublisherState {
    Init,
    KeysReady,
    Registered,
    PeerResolved,
    Connected,
    Publishing,
    Stopped,
}

pub struct PublisherRole<D: DirectoryClient, T: PubSubTransport, K: Kem = X25519Kem> {
    config: NodeConfig,
    coordinator: RegistrationCoordinator<D>,
    transport: T,
    cipher: HybridCipher<K>,
    metrics: MetricsRecorder,
    state: PublisherState,
}

impl<D: DirectoryClient, T: PubSubTransport> PublisherRole<D, T, X25519Kem> {
    pub fn new(config: NodeConfig, directory: D, transport: T, metrics: MetricsRecorder) -> Self {
        Self::with_kem(config, directory, transport, X25519Kem, metrics)
    }
}

impl<D: DirectoryClient, T: PubSubTransport, K: Kem> PublisherRole<D, T, K> {
    pub fn with_kem(
        config: NodeConfig,
        directory: D,
        transport: T,
        kem: K,
        metrics: MetricsRecorder,
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
            state: PublisherState::Init,
        }
    }

    pub fn state(&self) -> &PublisherState {
        &self.state
    }

    /// Run the publisher until the shutdown signal flips to `true` or
    /// its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), RoleError> {
        info!(device_id = %self.config.device_id, "publisher starting");

        let keys =
            KeyStore::load_or_create(&self.config.key_file, self.cipher.kem(), &self.metrics)
                .await?;
        self.state = PublisherState::KeysReady;

        self.coordinator
            .ensure_registered(&self.config.device_id, &keys.public)
            .await?;
        self.state = PublisherState::Registered;

        let (resolved, elapsed_ms) =
            time_async(self.coordinator.resolve_peer(&self.config.peer_id)).await;
        let peer_key = resolved?;
        self.metrics.record(Metric::DirectoryRead, elapsed_ms);
        self.state = PublisherState::PeerResolved;

        if !self.transport.is_connected() {
            return Err(TransportError::Disconnected.into());
        }
        self.state = PublisherState::Connected;

        let topic = telemetry_topic(&self.config.topic_namespace, &self.config.device_id);
        info!(topic = %topic, interval_secs = self.config.publish_interval_secs, "publishing");
        self.state = PublisherState::Publishing;

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.publish_interval_secs));
        // Tick work runs inline below, so a slow tick delays the next
        // one instead of overlapping it.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.publish_tick(&peer_key, &topic).await;
                }
            }
        }

        self.state = PublisherState::Stopped;
        info!(device_id = %self.config.device_id, "publisher stopped");
        Ok(())
    }

    /// One publish tick. Failures here are logged and dropped; the loop
    /// is never terminated by a single bad tick.
    async fn publish_tick(&self, peer_key: &PublicKey, topic: &str) {
        let reading = TelemetryReading::sample_now();

        let (sealed, elapsed_ms) =
            time_sync(|| self.cipher.encrypt_for_recipient(peer_key, &reading.to_bytes()));
        let mut envelope = match sealed {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "encryption failed, skipping tick");
                return;
            }
        };
        self.metrics.record(Metric::Encapsulation, elapsed_ms);

        envelope.sent_at = Some(Utc::now().timestamp_millis() as u64);

        let bytes = match envelope.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "envelope encode failed, skipping tick");
                return;
            }
        };

        match self.transport.publish(topic, Bytes::from(bytes)).await {
            Ok(()) => debug!(topic = %topic, "published telemetry envelope"),
            Err(e) => warn!(error = %e, "publish failed, skipping tick"),
        }
    }
}
