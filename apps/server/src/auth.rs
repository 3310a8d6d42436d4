//! Viewer token authentication.
//!
//! Tokens have the form `userId:hex(sha256(userId || sha256(apiKey)))` so a
//! browser can pass them in a query parameter when it cannot set headers.
//! Validation is a constant-time comparison of the hex digests; outside
//! production mode a missing or invalid token falls back to a development
//! identity.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use polyglass_relay::Engine;

/// Identity used by the development fallback when no user is active.
pub const DEV_USER: &str = "dev-user";

/// Build the token a viewer presents for `user_id`.
pub fn user_token(user_id: &str, api_key: &str) -> String {
    format!("{user_id}:{}", token_digest(user_id, api_key))
}

/// Verify a presented token, returning the authenticated user id.
pub fn verify_token(token: &str, api_key: &str) -> Option<String> {
    let (user_id, presented) = token.split_once(':')?;
    if user_id.is_empty() {
        return None;
    }
    let expected = token_digest(user_id, api_key);
    constant_time_eq(presented.as_bytes(), expected.as_bytes()).then(|| user_id.to_string())
}

fn token_digest(user_id: &str, api_key: &str) -> String {
    let key_hash = Sha256::digest(api_key.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(key_hash);
    format!("{:x}", hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract the token from the `Authorization` header or the `token` query
/// parameter (browser `EventSource` cannot set headers).
pub fn extract_token<'a>(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Option<&'a str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .or(query_token)
}

/// Resolve the requesting viewer to a user id.
///
/// Production requires a valid token. In development an absent or invalid
/// token resolves to the single active user when there is exactly one, or
/// to [`DEV_USER`].
pub fn resolve_user(
    token: Option<&str>,
    api_key: &str,
    production: bool,
    engine: &Engine,
) -> Option<String> {
    if let Some(user_id) = token.and_then(|t| verify_token(t, api_key)) {
        return Some(user_id);
    }
    if production {
        return None;
    }
    let active = engine.active_users();
    match active.as_slice() {
        [only] => Some(only.clone()),
        _ => Some(DEV_USER.to_string()),
    }
}
