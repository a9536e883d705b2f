use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};

/// Short SHA-256 fingerprint for logging which secret is armed without ever
/// logging the secret itself.
pub fn secret_fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Constant-time string comparison to prevent timing side-channel attacks.
/// The length check leaks length information, which is acceptable for
/// fixed-format shared secrets.
fn ct_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

/// Admin endpoints accept the token via `X-Admin-Token` or a bearer header.
pub fn ensure_admin_authorized(
    headers: &HeaderMap,
    expected: &str,
) -> std::result::Result<(), (StatusCode, String)> {
    if expected.is_empty() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "admin endpoints are disabled: no admin token configured".to_string(),
        ));
    }

    let token = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
        });

    match token {
        Some(provided) if ct_eq(provided, expected) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            "admin auth failed (missing/invalid token)".to_string(),
        )),
    }
}

/// The order-monitor endpoint requires the shared secret in its own header.
pub fn ensure_monitor_authorized(
    headers: &HeaderMap,
    expected: &str,
) -> std::result::Result<(), (StatusCode, String)> {
    if expected.is_empty() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "monitor endpoint is disabled: no shared secret configured".to_string(),
        ));
    }

    let provided = headers
        .get("x-monitor-secret")
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    match provided {
        Some(provided) if ct_eq(provided, expected) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            "monitor auth failed (missing/invalid secret)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn monitor_secret_must_match_exactly() {
        let ok = headers_with("x-monitor-secret", "s3cret");
        assert!(ensure_monitor_authorized(&ok, "s3cret").is_ok());

        let wrong = headers_with("x-monitor-secret", "guess");
        assert!(ensure_monitor_authorized(&wrong, "s3cret").is_err());

        let missing = HeaderMap::new();
        assert!(ensure_monitor_authorized(&missing, "s3cret").is_err());
    }

    #[test]
    fn unconfigured_secret_disables_the_endpoint() {
        let headers = headers_with("x-monitor-secret", "anything");
        let err = ensure_monitor_authorized(&headers, "").unwrap_err();
        assert_eq!(err.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn admin_accepts_bearer_or_custom_header() {
        let custom = headers_with("x-admin-token", "tok");
        assert!(ensure_admin_authorized(&custom, "tok").is_ok());

        let bearer = headers_with("authorization", "Bearer tok");
        assert!(ensure_admin_authorized(&bearer, "tok").is_ok());

        let wrong = headers_with("authorization", "Bearer nope");
        assert!(ensure_admin_authorized(&wrong, "tok").is_err());
    }

    #[test]
    fn ct_eq_rejects_different_lengths() {
        assert!(!ct_eq("abc", "abcd"));
        assert!(ct_eq("abcd", "abcd"));
        assert!(!ct_eq("abcd", "abce"));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(secret_fingerprint("s3cret"), secret_fingerprint("s3cret"));
        assert_ne!(secret_fingerprint("s3cret"), secret_fingerprint("other"));
        assert_eq!(secret_fingerprint("s3cret").len(), 8);
    }
}
