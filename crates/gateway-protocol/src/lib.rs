//! # gateway-protocol
//!
//! The Protocol Gateway: the single client-facing MCP
//! Streamable HTTP endpoint. Wires origin validation, identity
//! resolution, session lifecycle, and RBAC enforcement around JSON-RPC
//! dispatch for `initialize`, `tools/list`, and `tools/call`, mirroring
//! each upstream response's shape (unary JSON or SSE) back to the
//! caller.

pub mod error;
pub mod protocol;
pub mod router;
pub mod state;

pub use router::{check_origin, router};
pub use state::GatewayState;
