//! # gateway-rbac
//!
//! RBAC Engine: users, roles, coarse permissions, and
//! role->(server,tool) grants, plus the decision functions the Protocol
//! Gateway calls on every `tools/list` and `tools/call` (`can_view_tool`,
//! `can_execute_tool`, `visible_tools`).

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod store;

pub use bootstrap::bootstrap_admin_if_empty;
pub use engine::RbacEngine;
pub use error::RbacError;
pub use store::{RbacStore, Snapshot};
