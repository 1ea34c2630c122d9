//! Pub/sub transport traits.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Common transport error type.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("operation timed out")]
    Timeout,
    #[error("subscription closed")]
    Closed,
    #[error("http error: {0}")]
    Http(String),
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("other error: {0}")]
    Other(String),
}

/// Stream of messages delivered for one subscribed topic.
///
/// Delivery ordering is whatever the external broker guarantees; nothing
/// stronger is promised here.
pub struct Subscription {
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Next payload on this topic, or `None` once the subscription ends.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Topic-based publish/subscribe transport.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish opaque payload bytes on a topic.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe to a topic, receiving every payload published to it
    /// from now on.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError>;

    /// Whether the transport currently holds a connection to the broker.
    fn is_connected(&self) -> bool;
}
