//! The process-local encryption key file and the AES-GCM helpers that use it to
//! encrypt the RS256 private key and the legacy HS256 secret before they
//! touch durable storage.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::IdentityError;

/// Loads the 32-byte key from `path`, generating and persisting a fresh
/// one with `0600` permissions if it doesn't exist yet.
pub fn load_or_generate_key_file(path: impl AsRef<Path>) -> Result<[u8; 32], IdentityError> {
    let path = path.as_ref();
    if let Ok(existing) = std::fs::read(path) {
        if existing.len() == 32 {
            let mut key = [0u8; 32];
            key.copy_from_slice(&existing);
            return Ok(key);
        }
        tracing::warn!(?path, "encryption key file has unexpected length, regenerating");
    }

    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    std::fs::write(path, key)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(key)
}

/// Encrypts `plaintext` with AES-256-GCM under `key`, returning
/// `nonce || ciphertext` as a single buffer.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| IdentityError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(12 + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`encrypt`]: splits off the leading 12-byte nonce and
/// decrypts the remainder.
pub fn decrypt(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, IdentityError> {
    if blob.len() < 12 {
        return Err(IdentityError::Encryption("ciphertext too short".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| IdentityError::Encryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = [7u8; 32];
        let plaintext = b"super secret signing key material";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn key_file_generated_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.key");
        let k1 = load_or_generate_key_file(&path).unwrap();
        let k2 = load_or_generate_key_file(&path).unwrap();
        assert_eq!(k1, k2);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_has_0600_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.key");
        load_or_generate_key_file(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
