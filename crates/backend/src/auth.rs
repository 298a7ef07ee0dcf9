//! Password hashing and bearer tokens.

use crate::error::ApiError;
use crate::AppState;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use chrono::Utc;
use persistence::db;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Hex SHA-256 of `salt` followed by `password`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    format!("{:x}", digest)
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

/// Issue and store a login token for `email`.
pub async fn issue_token(state: &AppState, email: &str) -> Result<String, ApiError> {
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now().timestamp_millis() + state.config.token_ttl_millis();
    db::create_session(&state.pool, &token, email, expires_at).await?;
    Ok(token)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Email of the account owning the request's bearer token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
    let session = db::find_session(&state.pool, token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired token".into()))?;
    Ok(session.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hashing_depends_on_salt() {
        let a = hash_password("hunter22", "s1");
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_password("hunter22", "s2"));
        assert!(verify_password("hunter22", "s1", &a));
        assert!(!verify_password("hunter23", "s1", &a));
    }

    #[test]
    fn hash_is_lowercase_hex_sha256_of_salt_then_password() {
        assert_eq!(
            hash_password("c", "ab"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn bearer_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer_token(&h), None);
        h.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&h), None);
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(bearer_token(&h), Some("tok-1"));
    }
}
