use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no such session: {0}")]
    Unknown(String),
    #[error("session is closed")]
    Closed,
    #[error("requested event id {requested} is older than the buffer's oldest retained id {oldest}")]
    StreamGap { requested: u64, oldest: u64 },
    #[error("session closed: consumer fell too far behind")]
    BackpressureExceeded,
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Unknown(_) => "SESSION_UNKNOWN",
            SessionError::Closed => "SESSION_UNKNOWN",
            SessionError::StreamGap { .. } => "STREAM_GAP",
            SessionError::BackpressureExceeded => "BACKPRESSURE_EXCEEDED",
        }
    }
}

impl From<SessionError> for gateway_core::GatewayError {
    fn from(e: SessionError) -> Self {
        gateway_core::GatewayError::new(gateway_core::ErrorKind::from_wire(e.kind()), e.to_string())
    }
}
