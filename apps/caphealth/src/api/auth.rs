//! # Authentication
//!
//! Bearer API-key authentication for the capability health API.
//!
//! Set `CAPHEALTH_API_KEY` to require `Authorization: Bearer <key>` on every
//! route except `/health`. When it is unset or empty, every request passes.

use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Environment variable holding the expected API key.
pub const API_KEY_ENV: &str = "CAPHEALTH_API_KEY";

/// Routes that never require a key.
const PUBLIC_PATHS: [&str; 1] = ["/health"];

/// The configured API key, if authentication is enabled.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Token carried in the `Authorization` header. Accepts `Bearer <key>` or
/// the bare key.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value).trim())
}

/// Constant-time comparison over equal-length buffers.
///
/// Both sides are zero-padded to the longer length so the comparison cost
/// does not depend on where the keys differ or on the presented length.
pub(crate) fn keys_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    let len = presented.len().max(expected.len());

    let mut left = vec![0u8; len];
    let mut right = vec![0u8; len];
    left[..presented.len()].copy_from_slice(presented);
    right[..expected.len()].copy_from_slice(expected);

    let same_bytes: bool = left.ct_eq(&right).into();
    same_bytes && presented.len() == expected.len()
}

fn unauthorized(reason: &'static str) -> (StatusCode, Json<ErrorResponse>) {
    tracing::warn!(event = "auth_failure", reason, "request rejected");
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized", "Unauthorized")),
    )
}

/// Reject requests without a matching API key.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };

    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    match presented_key(request.headers()) {
        Some(key) if keys_match(key, &expected) => Ok(next.run(request).await),
        Some(_) => Err(unauthorized("invalid_api_key")),
        None => Err(unauthorized("missing_authorization_header")),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn keys_match_requires_exact_equality() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secreT"));
        assert!(!keys_match("secret", "secret-longer"));
        assert!(!keys_match("", "secret"));
    }

    #[test]
    fn presented_key_strips_bearer_prefix() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_key(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(presented_key(&headers), Some("abc"));
    }
}
