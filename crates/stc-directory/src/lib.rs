#![forbid(unsafe_code)]

//! Identity directory access for telemetry devices.
//!
//! The directory is an external append-only store binding device IDs to
//! public keys, reached through a registration gateway. This crate owns
//! the device-side view of it: a typed client trait, the HTTP gateway
//! client, and the idempotent registration coordinator.

pub mod client;
pub mod http;
pub mod registration;
pub mod testing;

pub use client::{DirectoryClient, DirectoryError, RegisterOutcome};
pub use http::HttpDirectoryClient;
pub use registration::{RegistrationCoordinator, RetryPolicy};
