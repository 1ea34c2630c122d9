//! Telemetry payloads and the consumer seam.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One telemetry sample, the plaintext that crosses the channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// ISO-8601 capture time.
    pub timestamp: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl TelemetryReading {
    /// Demo reading with a fixed position, stamped now.
    pub fn sample_now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            location: Location { lat: 34.0522, lon: -118.2437 },
            altitude: None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("telemetry serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Consumer of successfully decrypted telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn deliver(&self, reading: TelemetryReading);
}

/// Default sink: log and discard.
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn deliver(&self, reading: TelemetryReading) {
        info!(
            timestamp = %reading.timestamp,
            lat = reading.location.lat,
            lon = reading.location.lon,
            "telemetry received"
        );
    }
}
