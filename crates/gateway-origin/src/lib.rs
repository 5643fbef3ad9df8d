//! Origin Validator: sanitized extraction of the caller's
//! origin — including load-balancer forwarding headers — and a decision
//! of whether that origin may reach the protocol gateway.
//!
//! `extract` and `validate` are deliberately split: extraction only ever
//! produces a syntactically sane [`Origin`] or nothing, validation is the
//! only place a policy decision is made. `sanitize_for_allowlist` is the
//! same sanitizer the Admin Control Plane calls before persisting an
//! operator-supplied origin string.

pub mod error;

pub use error::OriginError;

use axum::http::HeaderMap;
use gateway_core::model::OriginPolicy;

/// A sanitized, scheme-and-host-only origin. No path, query, fragment,
/// port beyond what the host component already carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
}

impl Origin {
    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    pub fn as_str(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

const MAX_HOSTNAME_LEN: usize = 253;

/// Reads headers in priority order: `Origin`; else synthesize from
/// `X-Forwarded-Proto` + `X-Forwarded-Host`; else `X-Original-Host` with
/// HTTPS assumed. `Referer` is never consulted — it is trivially
/// spoofable.
pub fn extract(headers: &HeaderMap) -> Option<Origin> {
    if let Some(raw) = header_str(headers, "origin") {
        return sanitize(raw).ok();
    }

    if let Some(host) = header_str(headers, "x-forwarded-host") {
        let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("https");
        return sanitize(&format!("{scheme}://{host}")).ok();
    }

    if let Some(host) = header_str(headers, "x-original-host") {
        return sanitize(&format!("https://{host}")).ok();
    }

    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty())
}

/// Parses and sanitizes a raw `scheme://host[:port]` candidate. Rejects
/// non-http(s) schemes, path/query/fragment components, malformed or
/// overlong hostnames, and control characters. Accepts an optional
/// trailing port on the host (stripped before allowlist comparison is not
/// done here — callers compare the full host including port if present,
/// matching how browsers send `Origin`).
pub fn sanitize(raw: &str) -> Result<Origin, OriginError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OriginError::Missing);
    }
    if raw.bytes().any(|b| b.is_ascii_control()) {
        return Err(OriginError::Malformed("control character in origin".into()));
    }

    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| OriginError::Malformed("missing scheme".into()))?;

    let scheme_lower = scheme.to_ascii_lowercase();
    if scheme_lower != "http" && scheme_lower != "https" {
        return Err(OriginError::Malformed(format!("unsupported scheme: {scheme}")));
    }

    // Reject anything beyond authority: a lone '/' marks path, '?' query,
    // '#' fragment. A raw Origin header never legitimately carries these.
    if rest.contains('/') || rest.contains('?') || rest.contains('#') {
        return Err(OriginError::Malformed("origin must not contain a path".into()));
    }

    let host = rest;
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return Err(OriginError::Malformed("hostname length out of range".into()));
    }
    if !host
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b':'))
    {
        return Err(OriginError::Malformed("hostname contains disallowed characters".into()));
    }

    Ok(Origin {
        scheme: scheme_lower,
        host: host.to_string(),
    })
}

/// Sanitizes a bare hostname (no scheme) for persistence into an
/// [`OriginPolicy`] allowlist: ASCII letters/digits/`.`/`-` only, ≤253
/// chars, no control chars or `;'"/\ `.
pub fn sanitize_for_allowlist(raw: &str) -> Result<String, OriginError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OriginError::Malformed("empty hostname".into()));
    }
    if raw.len() > MAX_HOSTNAME_LEN {
        return Err(OriginError::Malformed("hostname exceeds 253 characters".into()));
    }
    let forbidden = [';', '\'', '"', '/', '\\', ' '];
    if raw.bytes().any(|b| b.is_ascii_control()) || raw.chars().any(|c| forbidden.contains(&c)) {
        return Err(OriginError::Malformed("hostname contains forbidden characters".into()));
    }
    if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-')) {
        return Err(OriginError::Malformed("hostname contains non-ASCII or disallowed characters".into()));
    }
    Ok(raw.to_string())
}

/// Outcome of validating an [`Origin`] against an [`OriginPolicy`], plus
/// the reason, so the caller can pick the right log level.
pub enum Decision {
    AllowListed,
    AllowPermissiveHttps,
    AllowPermissiveNgrok,
    AllowLocalDev,
    Deny,
}

const NGROK_SUFFIXES: [&str; 2] = [".ngrok-free.app", ".ngrok.io"];

/// `validate(origin) -> allow | deny`. `dev_mode` gates the "no origin
/// at all" escape hatch, which must only ever apply to localhost
/// development.
pub fn validate(origin: Option<&Origin>, policy: &OriginPolicy, dev_mode: bool) -> Decision {
    let Some(origin) = origin else {
        return if dev_mode { Decision::AllowLocalDev } else { Decision::Deny };
    };

    let bare_host = origin.host.split(':').next().unwrap_or(&origin.host);

    if policy.allowlist.contains(&origin.host) || policy.allowlist.contains(bare_host) {
        return Decision::AllowListed;
    }

    if origin.is_https() && policy.allow_https_any {
        return Decision::AllowPermissiveHttps;
    }

    if policy.allow_ngrok && NGROK_SUFFIXES.iter().any(|suf| bare_host.ends_with(suf)) {
        return Decision::AllowPermissiveNgrok;
    }

    Decision::Deny
}

/// Logs `decision` at the appropriate severity and returns whether the
/// request may proceed.
pub fn enforce(decision: Decision, origin: Option<&Origin>) -> bool {
    match decision {
        Decision::AllowListed | Decision::AllowLocalDev => {
            tracing::info!(origin = ?origin.map(Origin::as_str), "origin allowed");
            true
        }
        Decision::AllowPermissiveHttps => {
            tracing::warn!(origin = ?origin.map(Origin::as_str), "origin allowed via allow_https_any");
            true
        }
        Decision::AllowPermissiveNgrok => {
            tracing::warn!(origin = ?origin.map(Origin::as_str), "origin allowed via allow_ngrok");
            true
        }
        Decision::Deny => {
            tracing::error!(origin = ?origin.map(Origin::as_str), "origin rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        h
    }

    #[test]
    fn extracts_origin_header_first() {
        let h = headers(&[
            ("origin", "https://app.example.com"),
            ("x-forwarded-host", "evil.example.com"),
        ]);
        let o = extract(&h).unwrap();
        assert_eq!(o.host, "app.example.com");
        assert!(o.is_https());
    }

    #[test]
    fn synthesizes_from_forwarded_headers() {
        let h = headers(&[("x-forwarded-proto", "https"), ("x-forwarded-host", "lb.internal")]);
        let o = extract(&h).unwrap();
        assert_eq!(o.scheme, "https");
        assert_eq!(o.host, "lb.internal");
    }

    #[test]
    fn original_host_assumes_https() {
        let h = headers(&[("x-original-host", "app.internal")]);
        let o = extract(&h).unwrap();
        assert_eq!(o.scheme, "https");
    }

    #[test]
    fn referer_is_never_consulted() {
        let h = headers(&[("referer", "https://trusted.example.com/page")]);
        assert!(extract(&h).is_none());
    }

    #[test]
    fn rejects_javascript_scheme() {
        assert!(sanitize("javascript:alert(1)").is_err());
    }

    #[test]
    fn rejects_path_in_origin() {
        assert!(sanitize("https://example.com/../etc/passwd").is_err());
    }

    #[test]
    fn rejects_overlong_hostname() {
        let long = "a".repeat(260);
        assert!(sanitize(&format!("https://{long}")).is_err());
    }

    #[test]
    fn allowlist_sanitizer_rejects_injection_characters() {
        assert!(sanitize_for_allowlist("evil.com; DROP TABLE x").is_err());
        assert!(sanitize_for_allowlist("a/b").is_err());
        assert!(sanitize_for_allowlist("valid-host.example.com").is_ok());
    }

    #[test]
    fn validate_allows_allowlisted_host() {
        let mut policy = OriginPolicy::default();
        policy.allowlist.insert("app.example.com".to_string());
        let origin = sanitize("https://app.example.com").unwrap();
        assert!(matches!(validate(Some(&origin), &policy, false), Decision::AllowListed));
    }

    #[test]
    fn validate_denies_unlisted_https_without_permissive_flag() {
        let policy = OriginPolicy::default();
        let origin = sanitize("https://evil.com").unwrap();
        assert!(matches!(validate(Some(&origin), &policy, false), Decision::Deny));
    }

    #[test]
    fn validate_allows_https_any_when_enabled() {
        let mut policy = OriginPolicy::default();
        policy.allow_https_any = true;
        let origin = sanitize("https://anything.example.com").unwrap();
        assert!(matches!(
            validate(Some(&origin), &policy, false),
            Decision::AllowPermissiveHttps
        ));
    }

    #[test]
    fn validate_allows_ngrok_suffix_when_enabled() {
        let mut policy = OriginPolicy::default();
        policy.allow_ngrok = true;
        let origin = sanitize("https://foo.ngrok-free.app").unwrap();
        assert!(matches!(
            validate(Some(&origin), &policy, false),
            Decision::AllowPermissiveNgrok
        ));
    }

    #[test]
    fn validate_denies_ngrok_when_disabled() {
        let policy = OriginPolicy::default();
        let origin = sanitize("https://foo.ngrok-free.app").unwrap();
        assert!(matches!(validate(Some(&origin), &policy, false), Decision::Deny));
    }

    #[test]
    fn missing_origin_denies_without_dev_mode() {
        let policy = OriginPolicy::default();
        assert!(matches!(validate(None, &policy, false), Decision::Deny));
    }
}
