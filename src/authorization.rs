use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::permissions::{PermissionGraph, PermissionSet, ScopedPermissions};
use crate::policy::{Action, Actor, Capability, OwnedResource, PolicyMode, PolicyRegistry, ResourceType};
use crate::repository::{CredentialState, ResourceState};
use crate::tokens::TokenRegistry;

/// DenyReason
///
/// Why a valid actor was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DenyReason {
    /// An authoritative ownership predicate rejected the actor.
    NotOwner,
    /// The declared capability is not in the actor's permission set.
    MissingPermission,
    /// Nothing in the policy table covers this action (fail-closed).
    NoRuleMatched,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenyReason::NotOwner => "not_owner",
            DenyReason::MissingPermission => "missing_permission",
            DenyReason::NoRuleMatched => "no_rule_matched",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turns a denial into `AuthError::Forbidden` for `?` in handlers.
    pub fn require(self) -> AuthResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AuthError::Forbidden(reason)),
        }
    }
}

/// Resolution
///
/// Outcome of the structural part of the algorithm: either a final decision, or
/// the name of the permission still to be checked against the actor's roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Decided(Decision),
    RequiresPermission(String),
}

/// resolve
///
/// Steps 1, 2 and the rule lookup of step 3/4, first match wins:
/// 1. admin actors are allowed outright;
/// 2. a resource-scoped action on an owned resource with a registered ownership
///    policy evaluates its predicate (true allows; false denies `NotOwner` unless
///    the policy is advisory);
/// 3. the declared capability decides;
/// 4. no rule denies `NoRuleMatched`.
pub fn resolve(
    policies: &PolicyRegistry,
    actor: &Actor,
    action: Action,
    resource_type: ResourceType,
    target: Option<&OwnedResource>,
) -> Resolution {
    if actor.is_admin {
        return Resolution::Decided(Decision::Allow);
    }

    if action.is_resource_scoped() {
        if let (Some(policy), Some(resource)) =
            (policies.ownership_policy(resource_type, action), target)
        {
            if (policy.predicate)(actor, resource) {
                return Resolution::Decided(Decision::Allow);
            }
            if policy.mode == PolicyMode::Authoritative {
                return Resolution::Decided(Decision::Deny(DenyReason::NotOwner));
            }
        }
    }

    match policies.capability(resource_type, action) {
        Some(Capability::Authenticated) => Resolution::Decided(Decision::Allow),
        Some(Capability::Permission(name)) => Resolution::RequiresPermission(name.clone()),
        None => Resolution::Decided(Decision::Deny(DenyReason::NoRuleMatched)),
    }
}

/// decide
///
/// Pure form of the algorithm over fully supplied inputs.
pub fn decide(
    policies: &PolicyRegistry,
    actor: &Actor,
    action: Action,
    resource_type: ResourceType,
    target: Option<&OwnedResource>,
    permissions: &PermissionSet,
) -> Decision {
    match resolve(policies, actor, action, resource_type, target) {
        Resolution::Decided(decision) => decision,
        Resolution::RequiresPermission(name) if permissions.contains(&name) => Decision::Allow,
        Resolution::RequiresPermission(_) => Decision::Deny(DenyReason::MissingPermission),
    }
}

/// AuthenticatedRequest
///
/// Transport-neutral authorization question: a bearer token plus what it wants
/// to do. `action` and `resource_type` arrive as strings; unknown values are
/// denied with `NoRuleMatched`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthenticatedRequest {
    pub token: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
}

/// AuthorizationEngine
///
/// Answers "may actor A perform action P on resource R?". Reads the actor record,
/// the resource owner, and the permission graph; never writes. Cheap to clone
/// and safe to call from any number of tasks at once.
#[derive(Clone)]
pub struct AuthorizationEngine {
    users: CredentialState,
    graph: PermissionGraph,
    resources: ResourceState,
    tokens: TokenRegistry,
    policies: Arc<PolicyRegistry>,
}

impl AuthorizationEngine {
    pub fn new(
        users: CredentialState,
        graph: PermissionGraph,
        resources: ResourceState,
        tokens: TokenRegistry,
        policies: Arc<PolicyRegistry>,
    ) -> Self {
        Self {
            users,
            graph,
            resources,
            tokens,
            policies,
        }
    }

    /// Loads the actor record. A token bound to a vanished user is `NotFound`.
    pub async fn actor(&self, user_id: Uuid) -> AuthResult<Actor> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;
        Ok(Actor {
            id: user.id,
            is_admin: user.is_admin,
        })
    }

    /// authorize
    ///
    /// Full resolution for `actor_id`. The resource owner is fetched only when an
    /// ownership policy will actually be consulted, and the permission set only
    /// when the decision still depends on it.
    pub async fn authorize(
        &self,
        actor_id: Uuid,
        action: Action,
        resource_type: ResourceType,
        resource_id: Option<Uuid>,
    ) -> AuthResult<Decision> {
        let actor = self.actor(actor_id).await?;
        let permissions = self.graph.scope(actor.id);
        self.authorize_actor(&actor, &permissions, action, resource_type, resource_id)
            .await
    }

    /// Same as `authorize` but reuses an already-resolved actor and a
    /// request-scoped permission cache.
    pub async fn authorize_actor(
        &self,
        actor: &Actor,
        permissions: &ScopedPermissions,
        action: Action,
        resource_type: ResourceType,
        resource_id: Option<Uuid>,
    ) -> AuthResult<Decision> {
        let target = match resource_id {
            Some(id)
                if !actor.is_admin
                    && action.is_resource_scoped()
                    && self.policies.ownership_policy(resource_type, action).is_some() =>
            {
                let author_id = self.resources.author_id(resource_type, id).await?;
                Some(OwnedResource { id, author_id })
            }
            _ => None,
        };

        let decision = match resolve(&self.policies, actor, action, resource_type, target.as_ref())
        {
            Resolution::Decided(decision) => decision,
            Resolution::RequiresPermission(name) => {
                if permissions.has(&name).await? {
                    Decision::Allow
                } else {
                    Decision::Deny(DenyReason::MissingPermission)
                }
            }
        };

        if let Decision::Deny(reason) = decision {
            tracing::info!(
                actor = %actor.id,
                action = %action,
                resource_type = %resource_type,
                resource_id = ?resource_id,
                %reason,
                "authorization denied"
            );
        }
        Ok(decision)
    }

    /// check
    ///
    /// End-to-end gate for an inbound request: token → user id → decision.
    /// `Unauthenticated` and `NotFound` propagate unchanged.
    pub async fn check(&self, request: &AuthenticatedRequest) -> AuthResult<Decision> {
        let actor_id = self.tokens.validate(&request.token).await?;

        let action = request.action.parse::<Action>();
        let resource_type = match request.resource_type.as_deref() {
            Some(raw) => raw.parse::<ResourceType>().map(Some),
            None => Ok(None),
        };

        if let (Ok(action), Ok(Some(resource_type))) = (action, resource_type) {
            return self
                .authorize(actor_id, action, resource_type, request.resource_id)
                .await;
        }

        // Unknown verb, unknown type or no type at all: only the admin override applies.
        let actor = self.actor(actor_id).await?;
        let decision = if actor.is_admin {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NoRuleMatched)
        };
        if !decision.is_allowed() {
            tracing::info!(actor = %actor.id, action = %request.action, "authorization denied: no rule");
        }
        Ok(decision)
    }
}
