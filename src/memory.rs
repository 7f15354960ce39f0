//! In-memory implementation of every record-store trait.
//!
//! Used for local development, tests, and any deployment started without
//! `DATABASE_URL`. State is lost on restart.
//!
//! Token and reset records live in `DashMap`s so each keyed operation is atomic
//! per key (a revoke and a validate on the same token are ordered by the shard
//! lock). Users, the role graph, and posts sit behind `tokio::sync::RwLock`:
//! reads run concurrently, writes are short and serialized per map.
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CreatePostRequest, NewUser, Permission, Post, ResetRecord, Role, TokenRecord,
    UpdatePostRequest, User,
};
use crate::policy::ResourceType;
use crate::repository::{
    CredentialStore, PostStore, ResetTokenStore, ResourceStore, RoleStore, TokenStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct UserTable {
    by_id: HashMap<Uuid, User>,
    // email -> id, enforces the unique constraint.
    by_email: HashMap<String, Uuid>,
}

/// The two associative sets plus the name catalogues that keep role and
/// permission names unique.
#[derive(Default)]
struct RoleGraph {
    roles: HashMap<Uuid, Role>,
    role_names: HashMap<String, Uuid>,
    permissions: HashMap<Uuid, Permission>,
    permission_names: HashMap<String, Uuid>,
    role_permissions: HashMap<Uuid, HashSet<Uuid>>,
    user_roles: HashMap<Uuid, HashSet<Uuid>>,
}

/// InMemoryRepository
///
/// Thread-safe, clone-free store shared as `Arc<InMemoryRepository>` and coerced
/// into each `Arc<dyn ...>` state the application needs.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<UserTable>,
    graph: RwLock<RoleGraph>,
    posts: RwLock<HashMap<Uuid, Post>>,
    tokens: DashMap<String, TokenRecord>,
    resets: DashMap<String, ResetRecord>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live token bindings. Exposed for tests and diagnostics.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    async fn user_exists(&self, id: Uuid) -> bool {
        self.users.read().await.by_id.contains_key(&id)
    }
}

#[async_trait]
impl CredentialStore for InMemoryRepository {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .by_email
            .get(email)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.by_id.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users.by_email.contains_key(&user.email) {
            return Err(StoreError::Conflict(format!("email {}", user.email)));
        }
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            created_at: Utc::now(),
        };
        users.by_email.insert(record.email.clone(), record.id);
        users.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    async fn set_password_hash(&self, user_id: Uuid, hash: &str) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .by_id
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.password_hash = hash.to_string();
        Ok(())
    }
}

#[async_trait]
impl TokenStore for InMemoryRepository {
    async fn insert_token(&self, record: TokenRecord) -> StoreResult<()> {
        self.tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self.tokens.get(token_hash).map(|r| r.value().clone()))
    }

    async fn delete_token(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.tokens.remove(token_hash).is_some())
    }

    async fn delete_user_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut removed = 0u64;
        self.tokens.retain(|_, record| {
            let keep = record.user_id != user_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[async_trait]
impl RoleStore for InMemoryRepository {
    async fn create_role(&self, name: &str) -> StoreResult<Role> {
        let mut graph = self.graph.write().await;
        if graph.role_names.contains_key(name) {
            return Err(StoreError::Conflict(format!("role {name}")));
        }
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        graph.role_names.insert(role.name.clone(), role.id);
        graph.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn create_permission(&self, name: &str) -> StoreResult<Permission> {
        let mut graph = self.graph.write().await;
        if graph.permission_names.contains_key(name) {
            return Err(StoreError::Conflict(format!("permission {name}")));
        }
        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        graph
            .permission_names
            .insert(permission.name.clone(), permission.id);
        graph.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let graph = self.graph.read().await;
        Ok(graph
            .role_names
            .get(name)
            .and_then(|id| graph.roles.get(id))
            .cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        let graph = self.graph.read().await;
        Ok(graph
            .permission_names
            .get(name)
            .and_then(|id| graph.permissions.get(id))
            .cloned())
    }

    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<()> {
        let mut graph = self.graph.write().await;
        if !graph.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if !graph.permissions.contains_key(&permission_id) {
            return Err(StoreError::NotFound(format!("permission {permission_id}")));
        }
        graph
            .role_permissions
            .entry(role_id)
            .or_default()
            .insert(permission_id);
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<()> {
        if !self.user_exists(user_id).await {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        let mut graph = self.graph.write().await;
        if !graph.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        graph.user_roles.entry(user_id).or_default().insert(role_id);
        Ok(())
    }

    async fn user_role_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        if !self.user_exists(user_id).await {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        let graph = self.graph.read().await;
        Ok(graph
            .user_roles
            .get(&user_id)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn role_permission_names(&self, role_id: Uuid) -> StoreResult<Vec<String>> {
        let graph = self.graph.read().await;
        if !graph.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        Ok(graph
            .role_permissions
            .get(&role_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| graph.permissions.get(id))
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PostStore for InMemoryRepository {
    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let mut posts: Vec<Post> = self.posts.read().await.values().cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> StoreResult<Post> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            title: req.title,
            content: req.content,
            status: req.status,
            author_id,
            created_at: now,
            updated_at: now,
        };
        self.posts.write().await.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> StoreResult<Post> {
        let mut posts = self.posts.write().await;
        let post = posts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))?;
        if let Some(title) = req.title {
            post.title = title;
        }
        if let Some(content) = req.content {
            post.content = content;
        }
        if let Some(status) = req.status {
            post.status = status;
        }
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<()> {
        self.posts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))
    }
}

#[async_trait]
impl ResourceStore for InMemoryRepository {
    async fn author_id(&self, resource_type: ResourceType, id: Uuid) -> StoreResult<Uuid> {
        match resource_type {
            ResourceType::Post => self
                .posts
                .read()
                .await
                .get(&id)
                .map(|p| p.author_id)
                .ok_or_else(|| StoreError::NotFound(format!("post {id}"))),
            other => Err(StoreError::NotFound(format!("{other} {id}"))),
        }
    }
}

#[async_trait]
impl ResetTokenStore for InMemoryRepository {
    async fn put_reset(&self, record: ResetRecord) -> StoreResult<()> {
        self.resets.insert(record.email.clone(), record);
        Ok(())
    }

    async fn find_reset(&self, email: &str) -> StoreResult<Option<ResetRecord>> {
        Ok(self.resets.get(email).map(|r| r.value().clone()))
    }

    async fn consume_reset(
        &self,
        email: &str,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.resets.get_mut(email) {
            Some(mut record)
                if record.token_hash == token_hash && record.consumed_at.is_none() =>
            {
                record.consumed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
