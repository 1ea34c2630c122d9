//! HTTP broker client: topic publish via POST, subscribe via long-poll.
//!
//! Broker contract:
//! - `POST /v1/topic/{topic}` with raw payload bytes -> 202
//! - `GET  /v1/topic/{topic}?wait_ms={n}` -> 200 payload | 204 empty

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::warn;

use crate::traits::{PubSubTransport, Subscription, TransportError};

const POLL_WAIT_MS: u64 = 25_000;
const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Clone)]
pub struct HttpBrokerClient {
    base_url: String,
    client: reqwest::Client,
    connected: Arc<AtomicBool>,
}

impl HttpBrokerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/v1/topic/{}", self.base_url, topic)
    }

    /// One long-poll round. Returns `None` when the broker had nothing
    /// within the wait window.
    async fn poll(&self, topic: &str, wait_ms: u64) -> Result<Option<Bytes>, TransportError> {
        let url = format!("{}?wait_ms={}", self.topic_url(topic), wait_ms);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let b = resp.bytes().await.map_err(|e| TransportError::Http(e.to_string()))?;
                Ok(Some(b))
            }
            StatusCode::NO_CONTENT => Ok(None),
            other => Err(TransportError::BadResponse(format!(
                "status={} body={:?}",
                other,
                resp.text().await.ok()
            ))),
        }
    }
}

#[async_trait]
impl PubSubTransport for HttpBrokerClient {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(self.topic_url(topic))
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| {
                self.connected.store(false, Ordering::Relaxed);
                TransportError::Http(e.to_string())
            })?;

        self.connected.store(true, Ordering::Relaxed);
        if resp.status() == StatusCode::ACCEPTED {
            Ok(())
        } else {
            Err(TransportError::BadResponse(format!(
                "status={} body={:?}",
                resp.status(),
                resp.text().await.ok()
            )))
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let client = self.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                match client.poll(&topic, POLL_WAIT_MS).await {
                    Ok(Some(payload)) => {
                        client.connected.store(true, Ordering::Relaxed);
                        if tx.send(payload).await.is_err() {
                            // Subscriber dropped the subscription.
                            return;
                        }
                    }
                    Ok(None) => {
                        client.connected.store(true, Ordering::Relaxed);
                        // A quiet topic must not keep the task alive
                        // after the subscription is gone.
                        if tx.is_closed() {
                            return;
                        }
                    }
                    Err(e) => {
                        client.connected.store(false, Ordering::Relaxed);
                        warn!(topic = %topic, error = %e, "broker poll failed, backing off");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        if tx.is_closed() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
