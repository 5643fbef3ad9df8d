//! # gateway-transport
//!
//! Upstream Transport Client: per-upstream connection
//! pool, outbound JSON-RPC, SSE re-emission, and the health ping primitive
//! that `gateway-registry`'s health loop builds on.

pub mod client;
pub mod error;

pub use client::{TransportClient, UpstreamOutcome};
pub use error::TransportError;
