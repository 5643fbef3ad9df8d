//! Error types for the RBAC engine crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("cannot delete a system role: {0}")]
    SystemRoleImmutable(String),
    #[error("cannot shrink permissions of a system role: {0}")]
    SystemRolePermissionShrink(String),
    #[error("user already exists: {0}")]
    UserExists(String),
}

impl RbacError {
    pub fn kind(&self) -> &'static str {
        match self {
            RbacError::UserNotFound(_) | RbacError::RoleNotFound(_) => "CONFIG_INVALID",
            RbacError::SystemRoleImmutable(_) | RbacError::SystemRolePermissionShrink(_) | RbacError::UserExists(_) => "CONFIG_INVALID",
            _ => "INTERNAL",
        }
    }
}

impl From<RbacError> for gateway_core::GatewayError {
    fn from(e: RbacError) -> Self {
        gateway_core::GatewayError::new(gateway_core::ErrorKind::from_wire(e.kind()), e.to_string())
    }
}
