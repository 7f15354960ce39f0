use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AuthError;
use crate::policy::Actor;
use crate::repository::CredentialState;
use crate::tokens::TokenRegistry;

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request. Handlers pass `actor()`
/// into the Authorization Engine explicitly; there is no ambient current user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub is_admin: bool,
    /// The presented bearer string, kept so `/logout/current` can revoke it.
    pub token: String,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            is_admin: self.is_admin,
        }
    }
}

/// bearer_token
///
/// Returns the token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse: `auth_middleware` already resolved the identity for this request.
/// 2. Token Extraction: bearer header, otherwise `Unauthenticated`.
/// 3. Token Validation: the Token Registry maps the token to a user id.
/// 4. User Lookup: a token whose user has vanished is rejected as well.
///
/// Rejection: `AuthError`, rendered as 401 for every token failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenRegistry: FromRef<S>,
    CredentialState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Reuse
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        // 2. Token Extraction
        let token = bearer_token(parts)
            .ok_or(AuthError::Unauthenticated)?
            .to_string();

        // 3. Token Validation
        let tokens = TokenRegistry::from_ref(state);
        let user_id = tokens.validate(&token).await?;

        // 4. User Lookup
        let users = CredentialState::from_ref(state);
        let user = users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let auth_user = AuthUser {
            id: user.id,
            is_admin: user.is_admin,
            token,
        };
        parts.extensions.insert(auth_user.clone());
        Ok(auth_user)
    }
}

/// ClientOrigin
///
/// Client address used as the origin half of the login throttle key: the socket
/// peer address, or `"unknown"` without `ConnectInfo`. The first
/// `x-forwarded-for` entry takes precedence only when
/// `AppConfig::trust_forwarded_for` is set; by default the header is ignored,
/// since any client can write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

impl<S> FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = if AppConfig::from_ref(state).trust_forwarded_for {
            parts
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        let origin = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientOrigin(origin))
    }
}
