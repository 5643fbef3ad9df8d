//! RS256 signing key management and JWKS publication. The private key is
//! generated once, persisted encrypted under the process-local key file,
//! and exposed publicly only as the JWKS document served at
//! `/.well-known/jwks.json`. Rotation keeps the prior key's public half
//! around for a grace window so in-flight tokens keep validating.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2_kid::short_kid;

use crate::error::IdentityError;

const RSA_KEY_BITS: usize = 2048;

mod sha2_kid {
    /// Derives a short, stable `kid` from a public key's DER bytes. Uses
    /// an FNV-1a hash rather than pulling in a dedicated sha2 dependency
    /// purely for an 8-byte label.
    pub fn short_kid(public_key_der: &[u8]) -> String {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in public_key_der {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        format!("{hash:016x}")
    }
}

/// One RS256 key: the private key material plus its derived `kid`. Only
/// the current key's private half is ever used for signing.
#[derive(Clone)]
pub struct RsaKey {
    pub kid: String,
    pub private_key: RsaPrivateKey,
    pub created_at: DateTime<Utc>,
}

impl RsaKey {
    pub fn generate() -> Result<Self, IdentityError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        let kid = short_kid(&private_key.to_public_key().n().to_bytes_be());
        Ok(Self {
            kid,
            private_key,
            created_at: Utc::now(),
        })
    }

    pub fn encoding_key(&self) -> Result<EncodingKey, IdentityError> {
        let pem = self
            .private_key
            .to_pkcs1_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| IdentityError::Encode(e.to_string()))
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, IdentityError> {
        let public = self.private_key.to_public_key();
        Ok(DecodingKey::from_rsa_raw_components(
            &public.n().to_bytes_be(),
            &public.e().to_bytes_be(),
        ))
    }

    fn to_persisted(&self) -> Result<PersistedKey, IdentityError> {
        let pem = self
            .private_key
            .to_pkcs1_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        Ok(PersistedKey {
            kid: self.kid.clone(),
            private_key_pem: pem.to_string(),
            created_at: self.created_at,
        })
    }

    fn from_persisted(persisted: &PersistedKey) -> Result<Self, IdentityError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(&persisted.private_key_pem)
            .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        Ok(Self {
            kid: persisted.kid.clone(),
            private_key,
            created_at: persisted.created_at,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedKey {
    kid: String,
    private_key_pem: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Default)]
struct PersistedKeyring {
    current: Option<PersistedKey>,
    retired: Vec<PersistedKey>,
}

/// The live signing keyring: a current key used for new tokens, plus
/// retired keys kept only long enough to validate tokens issued before
/// the last rotation.
pub struct Keyring {
    pub current: RsaKey,
    pub retired: Vec<RsaKey>,
}

impl Keyring {
    pub fn load_or_generate(path: &std::path::Path, encryption_key: &[u8; 32]) -> Result<Self, IdentityError> {
        if let Ok(ciphertext) = std::fs::read(path) {
            let plaintext = crate::secretbox::decrypt(encryption_key, &ciphertext)?;
            let persisted: PersistedKeyring = serde_json::from_slice(&plaintext)
                .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
            if let Some(current) = &persisted.current {
                let current_key = RsaKey::from_persisted(current)?;
                let retired = persisted.retired.iter().map(RsaKey::from_persisted).collect::<Result<Vec<_>, _>>()?;
                return Ok(Self { current: current_key, retired });
            }
        }

        let keyring = Self {
            current: RsaKey::generate()?,
            retired: Vec::new(),
        };
        keyring.persist(path, encryption_key)?;
        Ok(keyring)
    }

    pub fn persist(&self, path: &std::path::Path, encryption_key: &[u8; 32]) -> Result<(), IdentityError> {
        let persisted = PersistedKeyring {
            current: Some(self.current.to_persisted()?),
            retired: self.retired.iter().map(RsaKey::to_persisted).collect::<Result<Vec<_>, _>>()?,
        };
        let plaintext = serde_json::to_vec(&persisted).map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        let ciphertext = crate::secretbox::encrypt(encryption_key, &plaintext)?;
        std::fs::write(path, ciphertext)?;
        Ok(())
    }

    /// Rotates to a freshly generated current key, retiring the previous
    /// current key so it keeps validating tokens until it ages out of
    /// the grace window (caller-managed: see `prune_retired`).
    pub fn rotate(&mut self) -> Result<(), IdentityError> {
        let new_current = RsaKey::generate()?;
        let old_current = std::mem::replace(&mut self.current, new_current);
        self.retired.push(old_current);
        Ok(())
    }

    pub fn prune_retired(&mut self, grace_window: chrono::Duration) {
        let cutoff = Utc::now() - grace_window;
        self.retired.retain(|k| k.created_at >= cutoff);
    }

    pub fn find_decoding_key(&self, kid: &str) -> Option<DecodingKey> {
        if self.current.kid == kid {
            return self.current.decoding_key().ok();
        }
        self.retired.iter().find(|k| k.kid == kid).and_then(|k| k.decoding_key().ok())
    }

    /// Renders the current JWKS document: every key — current and retired — that
    /// could still validate an in-flight token.
    pub fn jwks_document(&self) -> serde_json::Value {
        let mut keys = vec![jwk_entry(&self.current)];
        keys.extend(self.retired.iter().map(jwk_entry));
        serde_json::json!({ "keys": keys })
    }
}

fn jwk_entry(key: &RsaKey) -> serde_json::Value {
    let public = key.private_key.to_public_key();
    serde_json::json!({
        "kty": "RSA",
        "use": "sig",
        "alg": "RS256",
        "kid": key.kid,
        "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_then_persist_then_reload_same_kid() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signing.key");
        let encryption_key = [3u8; 32];

        let keyring = Keyring::load_or_generate(&key_path, &encryption_key).unwrap();
        let kid = keyring.current.kid.clone();

        let reloaded = Keyring::load_or_generate(&key_path, &encryption_key).unwrap();
        assert_eq!(reloaded.current.kid, kid);
    }

    #[test]
    fn rotation_retires_previous_key_for_grace_window() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signing.key");
        let encryption_key = [9u8; 32];

        let mut keyring = Keyring::load_or_generate(&key_path, &encryption_key).unwrap();
        let old_kid = keyring.current.kid.clone();
        keyring.rotate().unwrap();

        assert_ne!(keyring.current.kid, old_kid);
        assert!(keyring.find_decoding_key(&old_kid).is_some());

        keyring.prune_retired(chrono::Duration::seconds(-1));
        assert!(keyring.find_decoding_key(&old_kid).is_none());
    }

    #[test]
    fn jwks_document_lists_current_and_retired() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signing.key");
        let encryption_key = [1u8; 32];
        let mut keyring = Keyring::load_or_generate(&key_path, &encryption_key).unwrap();
        keyring.rotate().unwrap();

        let doc = keyring.jwks_document();
        let keys = doc["keys"].as_array().unwrap();
        assert_eq!(keys.len(), 2);
    }
}
