#![forbid(unsafe_code)]

//! Pub/sub transport abstraction for telemetry envelopes.
//!
//! The broker itself is external; devices see only publish and subscribe
//! over named topics. This crate provides the trait, the topic naming
//! scheme, an HTTP broker client, and an in-memory broker for tests.

pub mod traits;
pub mod topic;
pub mod http;
pub mod testing;

pub use traits::*;
pub use topic::*;
pub use http::*;
pub use testing::*;
