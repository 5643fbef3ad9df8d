//! Per-request identity resolution: `Authorization: Bearer` header first, then a `token=`
//! query parameter, for clients that cannot set headers.

use axum::http::HeaderMap;
use gateway_core::model::User;

use crate::error::IdentityError;
use crate::token::{TokenService, VerifiedVia};

pub struct Resolved {
    pub user: User,
    pub via: VerifiedVia,
}

pub enum Resolution {
    Identified(Resolved),
    Anonymous,
}

/// Extracts the bearer credential from `Authorization` or `?token=`.
pub fn extract_credential(headers: &HeaderMap, query: &str) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Resolves the caller's identity given the extracted credential (or
/// none). Returns `Anonymous` when no credential was presented; the
/// caller (Protocol Gateway) decides whether anonymous access is
/// permitted for the method being dispatched.
pub fn resolve(
    token_service: &TokenService,
    rbac: &gateway_rbac::RbacEngine,
    credential: Option<&str>,
) -> Result<Resolution, IdentityError> {
    let Some(credential) = credential else {
        return Ok(Resolution::Anonymous);
    };

    let verified = token_service.verify(credential)?;
    let user = rbac.find_user(&verified.claims.sub).ok_or(IdentityError::UserUnavailable)?;
    if !user.enabled {
        return Err(IdentityError::UserUnavailable);
    }

    Ok(Resolution::Identified(Resolved { user, via: verified.via }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn prefers_header_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        let cred = extract_credential(&headers, "token=query-token");
        assert_eq!(cred.as_deref(), Some("header-token"));
    }

    #[test]
    fn falls_back_to_query_param() {
        let headers = HeaderMap::new();
        let cred = extract_credential(&headers, "token=query-token");
        assert_eq!(cred.as_deref(), Some("query-token"));
    }

    #[test]
    fn no_credential_is_none() {
        let headers = HeaderMap::new();
        assert!(extract_credential(&headers, "").is_none());
    }
}
