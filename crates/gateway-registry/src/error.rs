use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
    #[error("upstream transport error: {0}")]
    Transport(#[from] gateway_transport::TransportError),
    #[error("no such upstream: {0}")]
    NotFound(String),
    #[error("tool '{0}' resolves to more than one upstream for this caller")]
    Ambiguous(String),
    #[error("no such tool: {0}")]
    UnknownTool(String),
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Transport(e) => e.kind(),
            RegistryError::Ambiguous(_) => "TOOL_AMBIGUOUS",
            RegistryError::UnknownTool(_) => "TOOL_UNKNOWN",
            RegistryError::InvalidUrl(_) => "CONFIG_INVALID",
            _ => "INTERNAL",
        }
    }
}

impl From<RegistryError> for gateway_core::GatewayError {
    fn from(e: RegistryError) -> Self {
        gateway_core::GatewayError::new(gateway_core::ErrorKind::from_wire(e.kind()), e.to_string())
    }
}
