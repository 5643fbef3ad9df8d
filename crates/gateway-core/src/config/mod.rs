//! Configuration: the bootstrap [`GatewayConfig`] loaded once at startup
//! (§6.4 environment variables plus a config file) and the mutable
//! [`store::ConfigStore`] that the Admin Control Plane
//! writes through at runtime.

pub mod file;
pub mod store;

pub use file::{AdminConfig, AuditConfig, GatewayConfig, JwtConfig, OriginConfig, SessionConfig};
pub use store::{ConfigError, ConfigStore};
