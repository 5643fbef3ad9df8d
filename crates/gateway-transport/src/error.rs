use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream unreachable: {0}")]
    Connect(String),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("upstream at in-flight capacity")]
    Saturated,
    #[error("upstream call cancelled")]
    Cancelled,
}

impl TransportError {
    /// The structured error kind this maps to at the Protocol Gateway
    /// boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Saturated => "UPSTREAM_SATURATED",
            _ => "UPSTREAM_ERROR",
        }
    }
}
