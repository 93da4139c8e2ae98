//! Passwords, sessions and the socket authentication header.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::prelude::*;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::db::Store;
use crate::error::{ApiError, ApiResult};
use crate::models::{unix_now, Session, User};

pub const SESSION_TOKEN_BYTES: usize = 32;

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::Internal(format!("password hashing failed: {err}")))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Session tokens are client-generated secrets; only their digest is
/// stored, so a leaked sessions table cannot be replayed.
pub fn hash_session_token(token: &[u8]) -> String {
    let digest = Sha256::digest(token);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Generate a 6-character verification token (uppercase letters and
/// digits).
pub fn generate_verification_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Create a session for a 32-byte client token.
pub async fn create_session(
    store: &Store,
    user_id: i64,
    token: &[u8],
    max_age_days: i64,
) -> ApiResult<Session> {
    if token.len() != SESSION_TOKEN_BYTES {
        return Err(ApiError::BadSessionTokenLength);
    }
    let now = unix_now();
    store
        .create_session(
            user_id,
            &hash_session_token(token),
            now,
            now + max_age_days * 24 * 60 * 60,
        )
        .await
}

/// Validate a session id / base64 token pair and load its user.
///
/// Expired sessions are deleted on sight.
pub async fn validate_session_key(
    store: &Store,
    session_id: i64,
    token_b64: &str,
) -> ApiResult<(Session, User)> {
    let token = BASE64_STANDARD
        .decode(token_b64)
        .map_err(|_| ApiError::InvalidBase64)?;
    let session = store
        .session_by_id(session_id)
        .await?
        .ok_or(ApiError::SessionNotFound)?;
    if session.expired(unix_now()) {
        store.delete_session(session.id).await?;
        return Err(ApiError::SessionExpired);
    }
    if hash_session_token(&token) != session.token_hash {
        return Err(ApiError::WrongSessionToken);
    }
    let user = store
        .user_by_id(session.user_id)
        .await?
        .ok_or(ApiError::SessionNotFound)?;
    Ok((session, user))
}

/// Parse `Authorization: SessionKey <id>|<base64 token>` as used by socket
/// connections.
pub fn parse_session_header(value: Option<&str>) -> ApiResult<(i64, String)> {
    let value = value.ok_or(ApiError::MissingAuthHeader)?;
    let (scheme, key) = value
        .split_once(' ')
        .ok_or(ApiError::BadAuthHeaderType)?;
    if !scheme.eq_ignore_ascii_case("SessionKey") {
        return Err(ApiError::BadAuthHeaderType);
    }
    let (id, token) = key.split_once('|').ok_or(ApiError::BadAuthHeaderFormat)?;
    let id: i64 = id.parse().map_err(|_| ApiError::BadAuthHeaderFormat)?;
    Ok((id, token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("correct horse battery").expect("hash");
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("incorrect horse", &hash));
    }

    #[test]
    fn verification_tokens_are_six_chars_from_the_charset() {
        let token = generate_verification_token();
        assert_eq!(token.len(), 6);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn session_header_parses_the_documented_grammar() {
        let (id, token) = parse_session_header(Some("SessionKey 12|c2VjcmV0")).expect("parse");
        assert_eq!(id, 12);
        assert_eq!(token, "c2VjcmV0");
    }

    #[test]
    fn session_header_errors_are_distinct() {
        assert_eq!(
            parse_session_header(None).unwrap_err().code(),
            3411,
        );
        assert_eq!(
            parse_session_header(Some("Bearer abc")).unwrap_err().code(),
            3412,
        );
        assert_eq!(
            parse_session_header(Some("SessionKey noseparator"))
                .unwrap_err()
                .code(),
            3413,
        );
    }

    #[test]
    fn token_digest_is_stable() {
        let a = hash_session_token(b"0123456789abcdef0123456789abcdef");
        let b = hash_session_token(b"0123456789abcdef0123456789abcdef");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
