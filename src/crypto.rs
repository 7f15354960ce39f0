use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use password_hash::{PasswordHash, SaltString};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

/// Random bytes behind every bearer and reset token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// hash_password
///
/// Produces an Argon2 PHC string with a fresh 16-byte salt. Runs on the
/// blocking pool, off the async workers.
pub async fn hash_password(password: &str) -> AuthResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password))
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
}

fn hash_password_blocking(password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Internal(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| AuthError::Internal(e.to_string()))
}

/// verify_password
///
/// A malformed stored hash verifies as `false` rather than erroring; the caller
/// treats it like any other credential mismatch. Runs on the blocking pool; a
/// failed task also counts as a mismatch.
pub async fn verify_password(hash: &str, password: &str) -> bool {
    let hash = hash.to_string();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password_blocking(&hash, &password))
        .await
        .unwrap_or(false)
}

fn verify_password_blocking(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// generate_token
///
/// Unguessable URL-safe token string drawn from the OS RNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// token_digest
///
/// Hex SHA-256 of a token. This is the only form in which tokens are persisted.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// normalize_email
///
/// Canonical form of an email address: trimmed and lowercased. Every lookup,
/// uniqueness check and reset record goes through it, so `Ada@Example.com` and
/// `ada@example.com` are one identity.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_verifies_only_its_own_password() {
        let hash = hash_password("correct horse").await.unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse").await);
        assert!(!verify_password(&hash, "battery staple").await);
        assert!(!verify_password("not-a-phc-string", "correct horse").await);
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
