//! # gateway-audit
//!
//! Audit Log: an append-only, totally-ordered record of
//! security-relevant gateway events — origin decisions, authentication
//! outcomes, RBAC grants/denials, config mutations, session lifecycle.
//!
//! Every write is atomic and persists before the originating request
//! returns to the client; read APIs support filtering by kind, user, time
//! window, and pagination.

pub mod error;
pub mod logger;
pub mod storage;

pub use error::AuditError;
pub use logger::AuditLogger;
pub use storage::{AuditFilter, AuditStorage, NewAuditEvent, SqliteAuditStorage};
