//! Token issuance and verification: RS256 primary,
//! signed against the current [`crate::keys::Keyring`] key; HS256
//! legacy fallback only when explicitly enabled, and only for
//! *verification* — the gateway never issues HS256 tokens itself.

use std::sync::RwLock;

use chrono::Utc;
use gateway_core::model::User;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};

use crate::claims::AccessClaims;
use crate::error::IdentityError;
use crate::keys::Keyring;

/// Which verification path accepted the token, so the caller can log the
/// legacy path at WARN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedVia {
    Rs256,
    Hs256Legacy,
}

pub struct VerifiedToken {
    pub claims: AccessClaims,
    pub via: VerifiedVia,
}

pub struct TokenService {
    keyring: RwLock<Keyring>,
    legacy_hs256_secret: Option<String>,
    legacy_hs256_enabled: bool,
    access_token_ttl_hours: i64,
}

impl TokenService {
    pub fn new(
        keyring: Keyring,
        legacy_hs256_secret: Option<String>,
        legacy_hs256_enabled: bool,
        access_token_ttl_hours: i64,
    ) -> Self {
        Self {
            keyring: RwLock::new(keyring),
            legacy_hs256_secret,
            legacy_hs256_enabled,
            access_token_ttl_hours,
        }
    }

    pub fn rotate(&self) -> Result<(), IdentityError> {
        self.keyring.write().unwrap().rotate()
    }

    pub fn jwks_document(&self) -> serde_json::Value {
        self.keyring.read().unwrap().jwks_document()
    }

    pub fn legacy_hs256_enabled(&self) -> bool {
        self.legacy_hs256_enabled && self.legacy_hs256_secret.is_some()
    }

    /// Issues a new access token for `user` with an 8h default lifetime.
    /// Always RS256, always signed by the current keyring key.
    pub fn issue(&self, user: &User) -> Result<String, IdentityError> {
        let keyring = self.keyring.read().unwrap();
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            provider: provider_label(&user.provider),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(self.access_token_ttl_hours)).timestamp(),
            token_type: "access".to_string(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(keyring.current.kid.clone());

        encode(&header, &claims, &keyring.current.encoding_key()?).map_err(|e| IdentityError::Encode(e.to_string()))
    }

    /// Verifies `token`, trying RS256 against the JWKS first and falling
    /// back to the HS256 legacy secret only if that path is explicitly
    /// enabled.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, IdentityError> {
        let header = decode_header(token).map_err(|_| IdentityError::Invalid)?;

        if header.alg == Algorithm::RS256 {
            let kid = header.kid.as_deref().ok_or(IdentityError::UnknownKid)?;
            let decoding_key = {
                let keyring = self.keyring.read().unwrap();
                keyring.find_decoding_key(kid)
            };
            let Some(decoding_key) = decoding_key else {
                return Err(IdentityError::UnknownKid);
            };
            return self.finish_decode(token, &decoding_key, Algorithm::RS256, VerifiedVia::Rs256);
        }

        if header.alg == Algorithm::HS256 && self.legacy_hs256_enabled() {
            let secret = self.legacy_hs256_secret.as_ref().unwrap();
            let decoding_key = DecodingKey::from_secret(secret.as_bytes());
            tracing::warn!("token verified via legacy HS256 path");
            return self.finish_decode(token, &decoding_key, Algorithm::HS256, VerifiedVia::Hs256Legacy);
        }

        Err(IdentityError::Invalid)
    }

    fn finish_decode(
        &self,
        token: &str,
        decoding_key: &DecodingKey,
        alg: Algorithm,
        via: VerifiedVia,
    ) -> Result<VerifiedToken, IdentityError> {
        let mut validation = Validation::new(alg);
        validation.validate_exp = true;
        let data = decode::<AccessClaims>(token, decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::Expired,
                _ => IdentityError::Invalid,
            }
        })?;
        Ok(VerifiedToken { claims: data.claims, via })
    }
}

fn provider_label(provider: &gateway_core::model::AuthProvider) -> String {
    use gateway_core::model::AuthProvider;
    match provider {
        AuthProvider::Local => "local".to_string(),
        AuthProvider::Oauth(id) => id.clone(),
        AuthProvider::Ad => "ad".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keyring;
    use gateway_core::model::AuthProvider;
    use std::collections::HashSet;

    fn service() -> TokenService {
        let dir = tempfile::tempdir().unwrap();
        let keyring = Keyring::load_or_generate(&dir.path().join("k"), &[1u8; 32]).unwrap();
        TokenService::new(keyring, Some("legacy-secret".to_string()), true, 8)
    }

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "u1@x.com".to_string(),
            display_name: "U1".to_string(),
            provider: AuthProvider::Local,
            password_hash: None,
            enabled: true,
            role_ids: HashSet::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issue_then_verify_round_trips_rs256() {
        let svc = service();
        let token = svc.issue(&user()).unwrap();
        let verified = svc.verify(&token).unwrap();
        assert_eq!(verified.via, VerifiedVia::Rs256);
        assert_eq!(verified.claims.sub, "u1");
    }

    #[test]
    fn tampered_signature_rejected() {
        let svc = service();
        let mut token = svc.issue(&user()).unwrap();
        token.push('x');
        assert!(svc.verify(&token).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = Keyring::load_or_generate(&dir.path().join("k"), &[1u8; 32]).unwrap();
        let svc = TokenService::new(keyring, None, false, 8);
        let keyring = svc.keyring.read().unwrap();
        let claims = AccessClaims {
            sub: "u1".into(),
            email: "u1@x.com".into(),
            name: "U1".into(),
            provider: "local".into(),
            iat: Utc::now().timestamp() - 10_000,
            exp: Utc::now().timestamp() - 1,
            token_type: "access".into(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(keyring.current.kid.clone());
        let token = encode(&header, &claims, &keyring.current.encoding_key().unwrap()).unwrap();
        drop(keyring);
        assert!(matches!(svc.verify(&token), Err(IdentityError::Expired)));
    }

    #[test]
    fn legacy_hs256_disabled_rejects_hs256_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = Keyring::load_or_generate(&dir.path().join("k"), &[1u8; 32]).unwrap();
        let svc = TokenService::new(keyring, Some("legacy-secret".to_string()), false, 8);

        let claims = AccessClaims {
            sub: "u1".into(),
            email: "u1@x.com".into(),
            name: "U1".into(),
            provider: "local".into(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
            token_type: "access".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"legacy-secret"),
        )
        .unwrap();

        assert!(svc.verify(&token).is_err());
    }
}
