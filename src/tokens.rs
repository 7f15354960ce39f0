use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::models::TokenRecord;
use crate::repository::TokenState;

/// IssuedToken
///
/// The only place the plaintext bearer string exists. Callers hand `token` to
/// the client and drop it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

/// TokenRegistry
///
/// Issues, validates and revokes opaque bearer tokens bound to a user id.
///
/// - Each `issue` creates an independent binding; prior tokens stay valid.
/// - Revocation deletes the binding, so a revoked token validates exactly like
///   one that never existed.
/// - Tokens do not expire unless a TTL is configured. With a TTL, `validate`
///   rejects and lazily deletes bindings older than the TTL.
#[derive(Clone)]
pub struct TokenRegistry {
    store: TokenState,
    ttl: Option<Duration>,
}

impl TokenRegistry {
    pub fn new(store: TokenState, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    pub async fn issue(&self, user_id: Uuid) -> AuthResult<IssuedToken> {
        let token = crypto::generate_token();
        let issued_at = Utc::now();
        self.store
            .insert_token(TokenRecord {
                token_hash: crypto::token_digest(&token),
                user_id,
                issued_at,
            })
            .await?;
        tracing::debug!(%user_id, "bearer token issued");
        Ok(IssuedToken {
            token,
            user_id,
            issued_at,
        })
    }

    /// validate
    ///
    /// Resolves a bearer string to its user id or fails with `Unauthenticated`.
    /// Store failures propagate as-is.
    pub async fn validate(&self, token: &str) -> AuthResult<Uuid> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        let digest = crypto::token_digest(token);
        let record = self
            .store
            .find_token(&digest)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if self.is_expired(&record) {
            self.store.delete_token(&digest).await?;
            tracing::debug!(user_id = %record.user_id, "expired bearer token removed");
            return Err(AuthError::Unauthenticated);
        }
        Ok(record.user_id)
    }

    /// Removes every binding of `user_id`. Returns how many were removed.
    pub async fn revoke(&self, user_id: Uuid) -> AuthResult<u64> {
        let removed = self.store.delete_user_tokens(user_id).await?;
        tracing::info!(%user_id, removed, "bearer tokens revoked");
        Ok(removed)
    }

    /// Removes one binding. Revoking an unknown or already revoked token succeeds.
    pub async fn revoke_token(&self, token: &str) -> AuthResult<()> {
        let removed = self.store.delete_token(&crypto::token_digest(token)).await?;
        tracing::debug!(removed, "bearer token revoke requested");
        Ok(())
    }

    fn is_expired(&self, record: &TokenRecord) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - record.issued_at >= ttl,
            // A TTL too large for chrono never elapses.
            Err(_) => false,
        }
    }
}
