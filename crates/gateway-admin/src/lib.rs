//! The Admin Control Plane: the `/admin/*` and `/auth/*` HTTP surface an
//! operator or a logged-in user drives, built over the same
//! [`gateway_protocol::GatewayState`] the Protocol Gateway's `/mcp`
//! endpoint shares.

pub mod audit;
pub mod auth;
pub mod config;
pub mod guard;
pub mod roles;
pub mod router;
pub mod servers;
pub mod users;
pub mod view;

pub use router::router;
