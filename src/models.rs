use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authorization::DenyReason;

// --- Identity Records (Mapped to the Record Store) ---

/// User
///
/// Canonical identity record from the `users` table. Carries the password hash,
/// so it is never serialized to clients; handlers respond with `UserResponse`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    // Unique, compared case-sensitively by the store.
    pub email: String,
    // Argon2 PHC string.
    pub password_hash: String,
    // Coarse override: dominates every role and ownership rule.
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// NewUser
///
/// Fields required by `CredentialStore::create_user`. The hash is computed
/// before it reaches the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Role
///
/// Named bundle of permissions. `name` is a case-sensitive unique key.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

/// Permission
///
/// Atomic named capability such as `manage_posts`. Referenced by roles, never owned.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
}

/// TokenRecord
///
/// A bearer token binding as persisted. Only the SHA-256 digest of the token is
/// stored; the plaintext is handed to the client once at issue time.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct TokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

/// ResetRecord
///
/// The single outstanding password-reset token for an email address.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct ResetRecord {
    pub email: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Post
///
/// The owned resource of this system. `author_id` is the owner consulted by the
/// built-in Post ownership policy.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    // "draft" | "published"
    pub status: String,
    pub author_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for the public registration endpoint (POST /register).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// LoginRequest
///
/// Input payload for POST /login. The password is verified and dropped; it is
/// never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub status: String,
}

/// UpdatePostRequest
///
/// Partial update payload for PUT /posts/{id}. Absent fields keep their value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// NamedRequest
///
/// Payload for creating a role or a permission (POST /admin/roles, /admin/permissions).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NamedRequest {
    pub name: String,
}

/// AuthorizeRequest
///
/// Body of POST /authorize. The bearer token comes from the `Authorization`
/// header; `action` and `resource_type` are the lowercase names, e.g. `"update"`
/// and `"post"`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthorizeRequest {
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
}

// --- Responses (Output Schemas) ---

/// UserResponse
///
/// Client-facing view of a `User`, without credential material.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterResponse {
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// UserProfile
///
/// Output schema for GET /me and GET /admin/users/{id}/permissions: the user plus
/// the effective permission set (union over all assigned roles, sorted).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub user: UserResponse,
    pub permissions: Vec<String>,
}

/// AuthorizeResponse
///
/// `reason` is present only when `allowed` is false.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
