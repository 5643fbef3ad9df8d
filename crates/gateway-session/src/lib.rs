//! # gateway-session
//!
//! Session Manager: per-session state machine, bounded
//! ring event buffer with `Last-Event-ID` resume, SSE backpressure, and
//! the inactivity reaper.

pub mod error;
pub mod manager;
pub mod session;

pub use error::SessionError;
pub use manager::{SessionManager, SessionManagerConfig};
pub use session::{new_session_id, Session, SessionState};
