use crate::error::{StoreError, StoreResult};
use crate::models::{
    CreatePostRequest, NewUser, Permission, Post, ResetRecord, Role, TokenRecord,
    UpdatePostRequest, User,
};
use crate::crypto;
use crate::policy::ResourceType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// The record store is an external collaborator. Each concern gets its own trait so
// that components only see the slice they need and tests can replace one slice
// (e.g. a spy around `verify_password`) without touching the others.
//
// **Send + Sync + async_trait** are required to make the trait objects
// (`Arc<dyn ...>`) shareable across Axum's task boundaries.

/// CredentialStore
///
/// Persists user records: lookup, creation, password hash mutation and
/// password verification.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    // Fails with `Conflict` if the email is already registered.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn set_password_hash(&self, user_id: Uuid, hash: &str) -> StoreResult<()>;

    /// Checks `plaintext` against the stored Argon2 hash.
    async fn verify_password(&self, user: &User, plaintext: &str) -> bool {
        crypto::verify_password(&user.password_hash, plaintext).await
    }
}

/// TokenStore
///
/// Bearer token bindings keyed by the token digest. Every operation is a single
/// keyed read or write, so concurrent revoke + validate on one token is ordered
/// by the store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, record: TokenRecord) -> StoreResult<()>;
    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<TokenRecord>>;
    // Returns whether a binding was removed.
    async fn delete_token(&self, token_hash: &str) -> StoreResult<bool>;
    // Returns the number of bindings removed.
    async fn delete_user_tokens(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// RoleStore
///
/// The two associative sets behind the Permission Graph
/// (`role -> permissions`, `user -> roles`) plus the role/permission catalogues.
/// Unknown ids fail with `NotFound`; set inserts are idempotent.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create_role(&self, name: &str) -> StoreResult<Role>;
    async fn create_permission(&self, name: &str) -> StoreResult<Permission>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>>;
    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<()>;
    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<()>;
    async fn user_role_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>>;
    async fn role_permission_names(&self, role_id: Uuid) -> StoreResult<Vec<String>>;
}

/// PostStore
///
/// Plain CRUD over posts. Authorization happens before these calls; the store
/// itself performs no ownership filtering.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn list_posts(&self) -> StoreResult<Vec<Post>>;
    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>>;
    async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> StoreResult<Post>;
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> StoreResult<Post>;
    async fn delete_post(&self, id: Uuid) -> StoreResult<()>;
}

/// ResourceStore
///
/// Read-only owner lookup used by the Authorization Engine for ownership checks.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // `NotFound` if the resource does not exist or the type has no owner column.
    async fn author_id(&self, resource_type: ResourceType, id: Uuid) -> StoreResult<Uuid>;
}

/// ResetTokenStore
///
/// One outstanding reset token per email; a new request replaces the old one.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn put_reset(&self, record: ResetRecord) -> StoreResult<()>;
    async fn find_reset(&self, email: &str) -> StoreResult<Option<ResetRecord>>;
    // Marks the record consumed if it still holds `token_hash` and is unconsumed.
    // Returns whether this call performed the transition, so two racing
    // completions cannot both win and a replaced record is never claimed.
    async fn consume_reset(
        &self,
        email: &str,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

pub type CredentialState = Arc<dyn CredentialStore>;
pub type TokenState = Arc<dyn TokenStore>;
pub type RoleState = Arc<dyn RoleStore>;
pub type PostState = Arc<dyn PostStore>;
pub type ResourceState = Arc<dyn ResourceStore>;
pub type ResetState = Arc<dyn ResetTokenStore>;

/// PostgresRepository
///
/// Implements every store trait against PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations. Called once at startup.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn exists(&self, sql: &str, id: Uuid) -> StoreResult<bool> {
        let found: bool = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, is_admin, created_at";
const POST_COLUMNS: &str = "id, title, content, status, author_id, created_at, updated_at";

#[async_trait]
impl CredentialStore for PostgresRepository {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_user
    ///
    /// The unique index on `users.email` turns a duplicate registration into
    /// `StoreError::Conflict`.
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, is_admin, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.is_admin)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_password_hash(&self, user_id: Uuid, hash: &str) -> StoreResult<()> {
        let res = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PostgresRepository {
    async fn insert_token(&self, record: TokenRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO personal_access_tokens (token_hash, user_id, issued_at) VALUES ($1, $2, $3)",
        )
        .bind(record.token_hash)
        .bind(record.user_id)
        .bind(record.issued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(sqlx::query_as::<_, TokenRecord>(
            "SELECT token_hash, user_id, issued_at FROM personal_access_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_token(&self, token_hash: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM personal_access_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_user_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM personal_access_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl RoleStore for PostgresRepository {
    async fn create_role(&self, name: &str) -> StoreResult<Role> {
        Ok(sqlx::query_as::<_, Role>(
            "INSERT INTO roles (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_permission(&self, name: &str) -> StoreResult<Permission> {
        Ok(sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(
            sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        Ok(
            sqlx::query_as::<_, Permission>("SELECT id, name FROM permissions WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// grant_permission
    ///
    /// Idempotent via `ON CONFLICT DO NOTHING` on the composite primary key.
    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<()> {
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1)", role_id)
            .await?
        {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if !self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM permissions WHERE id = $1)",
                permission_id,
            )
            .await?
        {
            return Err(StoreError::NotFound(format!("permission {permission_id}")));
        }
        sqlx::query(
            "INSERT INTO role_permission (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<()> {
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)", user_id)
            .await?
        {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1)", role_id)
            .await?
        {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        sqlx::query(
            "INSERT INTO user_role (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_role_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)", user_id)
            .await?
        {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(
            sqlx::query_scalar("SELECT role_id FROM user_role WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn role_permission_names(&self, role_id: Uuid) -> StoreResult<Vec<String>> {
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1)", role_id)
            .await?
        {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        Ok(sqlx::query_scalar(
            "SELECT p.name FROM role_permission rp \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE rp.role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl PostStore for PostgresRepository {
    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Post>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> StoreResult<Post> {
        let sql = format!(
            "INSERT INTO posts (id, title, content, status, author_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.title)
            .bind(req.content)
            .bind(req.status)
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_post
    ///
    /// Uses `COALESCE` so only the fields present in `req` are written.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> StoreResult<Post> {
        let sql = format!(
            "UPDATE posts SET title = COALESCE($2, title), \
             content = COALESCE($3, content), \
             status = COALESCE($4, status), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<()> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for PostgresRepository {
    async fn author_id(&self, resource_type: ResourceType, id: Uuid) -> StoreResult<Uuid> {
        match resource_type {
            ResourceType::Post => {
                sqlx::query_scalar::<_, Uuid>("SELECT author_id FROM posts WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("post {id}")))
            }
            other => Err(StoreError::NotFound(format!("{other} {id}"))),
        }
    }
}

#[async_trait]
impl ResetTokenStore for PostgresRepository {
    async fn put_reset(&self, record: ResetRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (email, token_hash, created_at, consumed_at) \
             VALUES ($1, $2, $3, NULL) \
             ON CONFLICT (email) DO UPDATE SET token_hash = EXCLUDED.token_hash, \
             created_at = EXCLUDED.created_at, consumed_at = NULL",
        )
        .bind(record.email)
        .bind(record.token_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_reset(&self, email: &str) -> StoreResult<Option<ResetRecord>> {
        Ok(sqlx::query_as::<_, ResetRecord>(
            "SELECT email, token_hash, created_at, consumed_at FROM password_reset_tokens WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn consume_reset(
        &self,
        email: &str,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE password_reset_tokens SET consumed_at = $2 \
             WHERE email = $1 AND token_hash = $3 AND consumed_at IS NULL",
        )
        .bind(email)
        .bind(at)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
