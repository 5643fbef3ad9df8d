//! Error types for the identity & token service crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("token encode failed: {0}")]
    Encode(String),
    #[error("token expired")]
    Expired,
    #[error("token signature or format invalid")]
    Invalid,
    #[error("unknown key id in token header")]
    UnknownKid,
    #[error("no credential presented")]
    NoCredential,
    #[error("user not found or disabled")]
    UserUnavailable,
    #[error("invalid email or password")]
    BadCredentials,
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("rbac error: {0}")]
    Rbac(#[from] gateway_rbac::RbacError),
}

impl IdentityError {
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityError::Expired => "TOKEN_EXPIRED",
            IdentityError::Invalid | IdentityError::UnknownKid => "TOKEN_INVALID",
            IdentityError::NoCredential => "AUTH_REQUIRED",
            IdentityError::UserUnavailable | IdentityError::BadCredentials => "AUTH_REQUIRED",
            _ => "INTERNAL",
        }
    }
}

impl From<IdentityError> for gateway_core::GatewayError {
    fn from(e: IdentityError) -> Self {
        gateway_core::GatewayError::new(gateway_core::ErrorKind::from_wire(e.kind()), e.to_string())
    }
}
