//! Local login and OAuth-callback upsert. OAuth's
//! provider-side flow is out of scope; this module only
//! covers the surface the gateway core owns: verifying a local password
//! and upserting a user record once a provider hands back a verified
//! profile.

use std::collections::HashSet;

use chrono::Utc;
use gateway_core::model::{AuthProvider, User};
use gateway_rbac::RbacEngine;
use uuid::Uuid;

use crate::error::IdentityError;
use crate::token::TokenService;

/// `POST /auth/login/local`: verifies the
/// caller's password against the stored hash and, on success, issues an
/// access token.
pub async fn local_login(
    rbac: &RbacEngine,
    tokens: &TokenService,
    email: &str,
    password: &str,
) -> Result<(String, User), IdentityError> {
    let user = rbac.find_user_by_email(email).ok_or(IdentityError::BadCredentials)?;
    if !user.enabled {
        return Err(IdentityError::UserUnavailable);
    }
    let Some(hash) = &user.password_hash else {
        return Err(IdentityError::BadCredentials);
    };
    if !RbacEngine::verify_password(password, hash) {
        return Err(IdentityError::BadCredentials);
    }

    let token = tokens.issue(&user)?;
    Ok((token, user))
}

/// OAuth callback upsert surface: given a
/// provider id and a provider-verified profile, creates the user on
/// first sign-in or returns the existing one, then issues a gateway
/// token. The provider-side exchange that produced `provider_user_id` is
/// out of scope; this function trusts its caller to have verified it.
pub async fn oauth_upsert(
    rbac: &RbacEngine,
    tokens: &TokenService,
    provider_id: &str,
    email: &str,
    display_name: &str,
) -> Result<(String, User), IdentityError> {
    if let Some(existing) = rbac.find_user_by_email(email) {
        if !existing.enabled {
            return Err(IdentityError::UserUnavailable);
        }
        let token = tokens.issue(&existing)?;
        return Ok((token, existing));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        provider: AuthProvider::Oauth(provider_id.to_string()),
        password_hash: None,
        enabled: true,
        role_ids: HashSet::from(["user".to_string()]),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    rbac.store().create_user(user.clone()).await?;

    let token = tokens.issue(&user)?;
    Ok((token, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keyring;
    use gateway_rbac::RbacStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn setup() -> (RbacEngine, TokenService) {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let store = RbacStore::new(pool).await.unwrap();
        store.upsert_system_roles().await.unwrap();
        let rbac = RbacEngine::new(Arc::new(store));

        let dir = tempfile::tempdir().unwrap();
        let keyring = Keyring::load_or_generate(&dir.path().join("k"), &[2u8; 32]).unwrap();
        let tokens = TokenService::new(keyring, None, false, 8);
        (rbac, tokens)
    }

    #[tokio::test]
    async fn local_login_succeeds_with_correct_password() {
        let (rbac, tokens) = setup().await;
        let hash = RbacEngine::hash_password("admin").unwrap();
        let user = User {
            id: "admin-id".into(),
            email: "admin".into(),
            display_name: "Administrator".into(),
            provider: AuthProvider::Local,
            password_hash: Some(hash),
            enabled: true,
            role_ids: HashSet::from(["admin".to_string()]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rbac.store().create_user(user).await.unwrap();

        let (token, user) = local_login(&rbac, &tokens, "admin", "admin").await.unwrap();
        assert!(!token.is_empty());
        assert_eq!(user.email, "admin");
    }

    #[tokio::test]
    async fn local_login_rejects_wrong_password() {
        let (rbac, tokens) = setup().await;
        let hash = RbacEngine::hash_password("admin").unwrap();
        let user = User {
            id: "admin-id".into(),
            email: "admin".into(),
            display_name: "Administrator".into(),
            provider: AuthProvider::Local,
            password_hash: Some(hash),
            enabled: true,
            role_ids: HashSet::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rbac.store().create_user(user).await.unwrap();

        assert!(local_login(&rbac, &tokens, "admin", "wrong").await.is_err());
    }

    #[tokio::test]
    async fn oauth_upsert_creates_once_then_reuses() {
        let (rbac, tokens) = setup().await;
        let (_, user1) = oauth_upsert(&rbac, &tokens, "google", "a@x.com", "A").await.unwrap();
        let (_, user2) = oauth_upsert(&rbac, &tokens, "google", "a@x.com", "A").await.unwrap();
        assert_eq!(user1.id, user2.id);
    }
}
