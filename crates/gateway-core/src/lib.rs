//! # gateway-core
//!
//! Shared domain types for the MCP gateway: the entity model, the
//! uniform error-kind decision type, the JSON-RPC wire envelope, and the
//! startup config / Config Store.

pub mod config;
pub mod error;
pub mod model;
pub mod rpc;

pub use error::{ErrorKind, GatewayError};
