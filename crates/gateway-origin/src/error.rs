//! Error types for the origin validation crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("no origin could be extracted from the request")]
    Missing,
    #[error("origin failed sanitization: {0}")]
    Malformed(String),
    #[error("origin is not in the allowlist and no permissive mode applies")]
    NotAllowed,
}

impl OriginError {
    pub fn kind(&self) -> &'static str {
        "ORIGIN_DENIED"
    }
}

impl From<OriginError> for gateway_core::GatewayError {
    fn from(e: OriginError) -> Self {
        gateway_core::GatewayError::new(gateway_core::ErrorKind::from_wire(e.kind()), e.to_string())
    }
}
