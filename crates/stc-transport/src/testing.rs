//! In-memory broker for tests and the end-to-end harness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::traits::{PubSubTransport, Subscription, TransportError};

const SUBSCRIPTION_BUFFER: usize = 64;

/// In-memory broker: every payload published on a topic is fanned out to
/// all live subscriptions for that topic. Cloned handles share state, so
/// one broker serves both ends of a test.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<DashMap<String, Mutex<Vec<mpsc::Sender<Bytes>>>>>,
    connected: Arc<AtomicBool>,
    latency: Option<Duration>,
    fail_publishes: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            connected: Arc::new(AtomicBool::new(true)),
            latency: None,
            fail_publishes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulated per-operation delivery latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate broker disconnect; publish and subscribe start failing.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Relaxed);
    }

    /// Make publishes fail without marking the broker disconnected.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    /// Publish raw bytes onto a topic, bypassing the trait. Lets tests
    /// inject malformed wire payloads.
    pub async fn inject(&self, topic: &str, payload: Bytes) {
        self.fan_out(topic, payload).await;
    }

    /// Live subscriptions for a topic. Lets tests wait until a
    /// subscriber is actually attached before publishing.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|entry| entry.lock().iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    async fn fan_out(&self, topic: &str, payload: Bytes) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        let senders: Vec<mpsc::Sender<Bytes>> = match self.topics.get(topic) {
            Some(entry) => entry.lock().clone(),
            None => return,
        };
        for tx in senders {
            // A full or closed subscription drops the message, like a
            // real broker with a bounded consumer queue.
            let _ = tx.try_send(payload.clone());
        }
        // Prune closed subscriptions.
        if let Some(entry) = self.topics.get(topic) {
            entry.lock().retain(|tx| !tx.is_closed());
        }
    }
}

#[async_trait]
impl PubSubTransport for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if self.fail_publishes.load(Ordering::Relaxed) {
            return Err(TransportError::Other("injected publish failure".to_string()));
        }
        self.fan_out(topic, payload).await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .lock()
            .push(tx);
        Ok(Subscription::new(rx))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
