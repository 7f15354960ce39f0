use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::authorization::DenyReason;
use crate::reset::ResetTokenState;

/// StoreError
///
/// Failure kinds surfaced by the external record store. Backends translate their
/// native errors (e.g. a Postgres unique violation) into these variants so the
/// core never sees driver-specific types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// AuthError
///
/// The error taxonomy of the authorization subsystem. Token Registry and
/// Permission Graph failures propagate through the Authorization Engine unchanged;
/// the only locally computed outcome is `Forbidden(reason)`.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed, unknown, revoked or expired bearer token.
    #[error("unauthenticated")]
    Unauthenticated,
    /// Login rejected. Never reveals whether the email or the password was wrong.
    #[error("the provided credentials are incorrect")]
    InvalidCredentials,
    #[error("forbidden: {0}")]
    Forbidden(DenyReason),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("too many attempts, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("password reset token is {0}")]
    ResetToken(ResetTokenState),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AuthError::NotFound(what),
            StoreError::Conflict(what) => AuthError::Conflict(what),
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}

impl AuthError {
    /// Stable machine-readable kind used in response bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::NotFound(_) => "not_found",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Conflict(_) => "conflict",
            AuthError::ResetToken(_) => "invalid_reset_token",
            AuthError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::ResetToken(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// ErrorBody
///
/// JSON payload returned for every failed request.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Backend details stay in the logs; clients get a generic message.
        let message = match &self {
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "internal failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
        };

        let mut response = (status, Json(body)).into_response();
        if let AuthError::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
