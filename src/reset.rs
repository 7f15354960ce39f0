use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::models::ResetRecord;
use crate::notifier::{NotifierState, ResetNotice};
use crate::repository::{CredentialState, ResetState};

/// ResetTokenState
///
/// Classification of a presented reset token against the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetTokenState {
    Valid,
    Expired,
    Consumed,
    /// No record for the email, or the digest does not match.
    Invalid,
}

impl fmt::Display for ResetTokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetTokenState::Valid => "valid",
            ResetTokenState::Expired => "expired",
            ResetTokenState::Consumed => "consumed",
            ResetTokenState::Invalid => "invalid",
        })
    }
}

/// PasswordResets
///
/// Short-lived, single-use password reset tokens. Separate from bearer tokens:
/// completing a reset neither issues nor revokes session tokens.
#[derive(Clone)]
pub struct PasswordResets {
    users: CredentialState,
    store: ResetState,
    notifier: NotifierState,
    ttl: Duration,
}

impl PasswordResets {
    pub fn new(
        users: CredentialState,
        store: ResetState,
        notifier: NotifierState,
        ttl: Duration,
    ) -> Self {
        Self {
            users,
            store,
            notifier,
            ttl,
        }
    }

    /// request_reset
    ///
    /// Unknown emails return `Ok` without emitting anything, so the endpoint
    /// cannot be used to probe for accounts. A new request replaces any
    /// outstanding token for the same email.
    pub async fn request_reset(&self, email: &str) -> AuthResult<()> {
        let email = crypto::normalize_email(email);
        if self.users.find_by_email(&email).await?.is_none() {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        }

        let token = crypto::generate_token();
        self.store
            .put_reset(ResetRecord {
                email: email.clone(),
                token_hash: crypto::token_digest(&token),
                created_at: Utc::now(),
                consumed_at: None,
            })
            .await?;

        self.notifier
            .send_reset(ResetNotice {
                email: email.clone(),
                reset_token: token,
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "reset notifier failed");
                AuthError::Internal(format!("reset notifier: {e}"))
            })?;

        tracing::info!(%email, "password reset requested");
        Ok(())
    }

    /// Classifies `token` for `email` without changing anything.
    pub async fn inspect(&self, email: &str, token: &str) -> AuthResult<ResetTokenState> {
        let email = crypto::normalize_email(email);
        let Some(record) = self.store.find_reset(&email).await? else {
            return Ok(ResetTokenState::Invalid);
        };
        Ok(self.classify(&record, token))
    }

    /// complete_reset
    ///
    /// Only a `Valid` token proceeds. The record is claimed first, and only if it
    /// still carries this token's digest: of two concurrent completions exactly
    /// one changes the password, and a token superseded by a newer request
    /// cannot consume its replacement.
    pub async fn complete_reset(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let email = crypto::normalize_email(email);
        let state = self.inspect(&email, token).await?;
        if state != ResetTokenState::Valid {
            tracing::info!(%email, %state, "password reset rejected");
            return Err(AuthError::ResetToken(state));
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::ResetToken(ResetTokenState::Invalid))?;
        let hash = crypto::hash_password(new_password).await?;

        let digest = crypto::token_digest(token);
        if !self.store.consume_reset(&email, &digest, Utc::now()).await? {
            // Lost the claim: report what the record says now.
            let state = match self.inspect(&email, token).await? {
                ResetTokenState::Valid => ResetTokenState::Consumed,
                other => other,
            };
            tracing::info!(%email, %state, "password reset lost claim");
            return Err(AuthError::ResetToken(state));
        }
        self.users.set_password_hash(user.id, &hash).await?;

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(())
    }

    fn classify(&self, record: &ResetRecord, token: &str) -> ResetTokenState {
        if record.token_hash != crypto::token_digest(token) {
            return ResetTokenState::Invalid;
        }
        if record.consumed_at.is_some() {
            return ResetTokenState::Consumed;
        }
        let expired = chrono::Duration::from_std(self.ttl)
            .map(|ttl| Utc::now() - record.created_at >= ttl)
            .unwrap_or(false);
        if expired {
            ResetTokenState::Expired
        } else {
            ResetTokenState::Valid
        }
    }
}
