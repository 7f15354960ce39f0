use uuid::Uuid;

use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::models::{NewUser, User};
use crate::permissions::PermissionGraph;
use crate::repository::CredentialState;
use crate::throttle::SessionThrottle;
use crate::tokens::{IssuedToken, TokenRegistry};

/// SessionService
///
/// Registration, login and logout. Writes to the credential store and the token
/// registry; touches the permission graph only to attach default roles.
#[derive(Clone)]
pub struct SessionService {
    users: CredentialState,
    graph: PermissionGraph,
    tokens: TokenRegistry,
    throttle: SessionThrottle,
    default_roles: Vec<String>,
}

impl SessionService {
    pub fn new(
        users: CredentialState,
        graph: PermissionGraph,
        tokens: TokenRegistry,
        throttle: SessionThrottle,
        default_roles: Vec<String>,
    ) -> Self {
        Self {
            users,
            graph,
            tokens,
            throttle,
            default_roles,
        }
    }

    pub fn throttle(&self) -> &SessionThrottle {
        &self.throttle
    }

    /// register
    ///
    /// Creates a non-admin user and attaches every configured default role.
    /// The email is stored normalized, so addresses differing only in case
    /// conflict. The roles are resolved before the user is written, so a missing
    /// default role fails with `NotFound` and leaves no half-registered account.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> AuthResult<User> {
        let email = crypto::normalize_email(email);
        let mut role_ids = Vec::with_capacity(self.default_roles.len());
        for role_name in &self.default_roles {
            let role = self
                .graph
                .find_role(role_name)
                .await?
                .ok_or_else(|| AuthError::NotFound(format!("role {role_name}")))?;
            role_ids.push(role.id);
        }

        let user = self
            .users
            .create_user(NewUser {
                name: name.to_string(),
                email,
                password_hash: crypto::hash_password(password).await?,
                is_admin: false,
            })
            .await?;

        for role_id in role_ids {
            self.graph.assign_role(user.id, role_id).await?;
        }

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// login
    ///
    /// 1. Throttle gate: a locked key fails with `RateLimited` before the
    ///    credential store is consulted.
    /// 2. Credential check: unknown email and wrong password are both
    ///    `InvalidCredentials` and both count as a failure.
    /// 3. Success clears the key and issues a fresh token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        origin: &str,
    ) -> AuthResult<(IssuedToken, User)> {
        let email = crypto::normalize_email(email);
        let key = SessionThrottle::key(&email, origin);

        if self.throttle.too_many_attempts(&key) {
            let retry_after = self.throttle.available_in(&key).as_secs().max(1);
            tracing::warn!(%origin, retry_after, "login rejected: throttled");
            return Err(AuthError::RateLimited { retry_after });
        }

        let user = match self.users.find_by_email(&email).await? {
            Some(user) if self.users.verify_password(&user, password).await => user,
            _ => {
                let failures = self.throttle.record_failure(&key);
                tracing::info!(%origin, failures, "login failed");
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.throttle.clear(&key);
        let issued = self.tokens.issue(user.id).await?;
        tracing::info!(user_id = %user.id, "login succeeded");
        Ok((issued, user))
    }

    /// Revokes every token of the user, ending all sessions.
    pub async fn logout(&self, user_id: Uuid) -> AuthResult<u64> {
        self.tokens.revoke(user_id).await
    }

    /// Revokes only the presented token; other sessions stay valid.
    pub async fn logout_current(&self, token: &str) -> AuthResult<()> {
        self.tokens.revoke_token(token).await
    }
}
