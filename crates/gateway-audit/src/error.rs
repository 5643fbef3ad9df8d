//! Error types for the audit crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    pub fn kind(&self) -> &'static str {
        "INTERNAL"
    }
}

impl From<AuditError> for gateway_core::GatewayError {
    fn from(e: AuditError) -> Self {
        gateway_core::GatewayError::new(gateway_core::ErrorKind::from_wire(e.kind()), e.to_string())
    }
}
