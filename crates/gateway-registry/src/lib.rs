//! # gateway-registry
//!
//! Upstream Registry and Tool Discovery & Namespacing: registering and
//! unregistering upstream MCP servers, tracking their health, and
//! resolving tool names to the upstream that serves them.

pub mod catalog;
pub mod error;
pub mod store;

pub use catalog::{resolve_unique, HealthConfig, Registry};
pub use error::RegistryError;
pub use store::{RegistryStore, Snapshot};
