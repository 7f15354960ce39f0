use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// ResourceType
///
/// Every kind of thing an action can target. Only `Post` carries an owner today;
/// the rest are governed purely by capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ResourceType {
    Post,
    Category,
    Tag,
    Image,
    Role,
    Permission,
    User,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Post => "post",
            ResourceType::Category => "category",
            ResourceType::Tag => "tag",
            ResourceType::Image => "image",
            ResourceType::Role => "role",
            ResourceType::Permission => "permission",
            ResourceType::User => "user",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ResourceType::Post),
            "category" => Ok(ResourceType::Category),
            "tag" => Ok(ResourceType::Tag),
            "image" => Ok(ResourceType::Image),
            "role" => Ok(ResourceType::Role),
            "permission" => Ok(ResourceType::Permission),
            "user" => Ok(ResourceType::User),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

/// Action
///
/// Verbs the engine understands. `Update` and `Delete` are resource-scoped: when
/// they target a specific owned resource, ownership policies apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Action {
    Create,
    Read,
    List,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::List => "list",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn is_resource_scoped(&self) -> bool {
        matches!(self, Action::Update | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "list" => Ok(Action::List),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Actor
///
/// The resolved identity an authorization question is asked about. Always passed
/// explicitly; there is no ambient "current user".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub is_admin: bool,
}

/// OwnedResource
///
/// What an ownership predicate sees of a resource. The engine receives the owner
/// id from the resource store and never touches the resource itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedResource {
    pub id: Uuid,
    pub author_id: Uuid,
}

pub type OwnershipPredicate = fn(&Actor, &OwnedResource) -> bool;

/// PolicyMode
///
/// An authoritative predicate that returns false denies immediately with
/// `NotOwner`; an advisory one lets resolution fall through to the capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Authoritative,
    Advisory,
}

#[derive(Clone, Copy)]
pub struct OwnershipPolicy {
    pub predicate: OwnershipPredicate,
    pub mode: PolicyMode,
}

impl fmt::Debug for OwnershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipPolicy")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Capability
///
/// The coarse requirement declared for an action class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// The actor's effective permission set must contain this name.
    Permission(String),
    /// Any authenticated actor qualifies.
    Authenticated,
}

/// Built-in Post rule: the author or an admin may mutate a post.
pub fn author_or_admin(actor: &Actor, resource: &OwnedResource) -> bool {
    actor.id == resource.author_id || actor.is_admin
}

pub const MANAGE_POSTS: &str = "manage_posts";
pub const PUBLISH_POSTS: &str = "publish_posts";
pub const EDIT_POSTS: &str = "edit_posts";
pub const DELETE_POSTS: &str = "delete_posts";
pub const MANAGE_CATEGORIES: &str = "manage_categories";
pub const MANAGE_USERS: &str = "manage_users";

type PolicyKey = (ResourceType, Action);

/// PolicyRegistry
///
/// Static table built once at process start, keyed by `(resource type, action)`.
/// Holds the ownership predicates and the capability each action class requires.
/// Immutable after `build()`; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    ownership: HashMap<PolicyKey, OwnershipPolicy>,
    capabilities: HashMap<PolicyKey, Capability>,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// The table this service ships with: author-or-admin for post mutation,
    /// plus the capability each route family requires.
    pub fn with_defaults() -> Self {
        let posts = Capability::Permission(MANAGE_POSTS.to_string());
        let categories = Capability::Permission(MANAGE_CATEGORIES.to_string());
        let users = Capability::Permission(MANAGE_USERS.to_string());
        let mutations = [Action::Create, Action::Update, Action::Delete];

        let mut builder = Self::builder()
            .ownership(
                ResourceType::Post,
                Action::Update,
                author_or_admin,
                PolicyMode::Authoritative,
            )
            .ownership(
                ResourceType::Post,
                Action::Delete,
                author_or_admin,
                PolicyMode::Authoritative,
            )
            .capability(ResourceType::Image, Action::Create, posts.clone());

        for action in mutations {
            builder = builder
                .capability(ResourceType::Post, action, posts.clone())
                .capability(ResourceType::Category, action, categories.clone())
                .capability(ResourceType::Tag, action, Capability::Authenticated);
        }
        for resource in [ResourceType::Role, ResourceType::Permission, ResourceType::User] {
            for action in [
                Action::Create,
                Action::Read,
                Action::List,
                Action::Update,
                Action::Delete,
            ] {
                builder = builder.capability(resource, action, users.clone());
            }
        }
        builder.build()
    }

    pub fn ownership_policy(
        &self,
        resource_type: ResourceType,
        action: Action,
    ) -> Option<&OwnershipPolicy> {
        self.ownership.get(&(resource_type, action))
    }

    pub fn capability(&self, resource_type: ResourceType, action: Action) -> Option<&Capability> {
        self.capabilities.get(&(resource_type, action))
    }
}

/// PolicyRegistryBuilder
///
/// Registering the same key twice keeps the last entry.
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    ownership: HashMap<PolicyKey, OwnershipPolicy>,
    capabilities: HashMap<PolicyKey, Capability>,
}

impl PolicyRegistryBuilder {
    pub fn ownership(
        mut self,
        resource_type: ResourceType,
        action: Action,
        predicate: OwnershipPredicate,
        mode: PolicyMode,
    ) -> Self {
        self.ownership
            .insert((resource_type, action), OwnershipPolicy { predicate, mode });
        self
    }

    pub fn capability(
        mut self,
        resource_type: ResourceType,
        action: Action,
        capability: Capability,
    ) -> Self {
        self.capabilities.insert((resource_type, action), capability);
        self
    }

    pub fn build(self) -> PolicyRegistry {
        PolicyRegistry {
            ownership: self.ownership,
            capabilities: self.capabilities,
        }
    }
}
