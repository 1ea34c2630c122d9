#![forbid(unsafe_code)]

//! Device roles for the secure telemetry channel.
//!
//! A node runs as either a publisher (encrypts telemetry for its peer
//! and publishes on its own topic) or a subscriber (listens on the
//! peer's topic and decrypts with its own private key). Startup is a
//! strictly sequential chain (keys, registration, peer resolution,
//! transport) and every startup failure aborts the role; steady-state
//! per-message failures are logged and isolated.

pub mod config;
pub mod error;
pub mod harness;
pub mod keystore;
pub mod publisher;
pub mod subscriber;
pub mod telemetry;

pub use config::NodeConfig;
pub use error::RoleError;
pub use keystore::{KeyStore, KeyStoreError};
pub use publisher::{PublisherRole, PublisherState};
pub use subscriber::{SubscriberRole, SubscriberState};
pub use telemetry::{LogSink, TelemetryReading, TelemetrySink};
