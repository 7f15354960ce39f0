use cms_portal::{
    AuthError, InMemoryRepository, PermissionGraph, RoleState,
    models::NewUser,
    permissions::PermissionSet,
    repository::CredentialStore,
    seed,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helpers ---

fn graph() -> (Arc<InMemoryRepository>, PermissionGraph) {
    let repo = Arc::new(InMemoryRepository::new());
    let graph = PermissionGraph::new(repo.clone() as RoleState);
    (repo, graph)
}

async fn create_user(repo: &InMemoryRepository, email: &str) -> Uuid {
    repo.create_user(NewUser {
        name: "Test".to_string(),
        email: email.to_string(),
        password_hash: "unused".to_string(),
        is_admin: false,
    })
    .await
    .unwrap()
    .id
}

/// Creates a role holding exactly `permissions`, creating missing permissions.
async fn role_with(graph: &PermissionGraph, name: &str, permissions: &[&str]) -> Uuid {
    let role = graph.create_role(name).await.unwrap();
    for permission in permissions {
        let id = match graph.find_permission(permission).await.unwrap() {
            Some(existing) => existing.id,
            None => graph.create_permission(permission).await.unwrap().id,
        };
        graph.grant_permission(role.id, id).await.unwrap();
    }
    role.id
}

// --- Tests ---

#[tokio::test]
async fn test_editor_scenario() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "editor@example.com").await;
    let editor = role_with(&graph, "Editor", &["publish_posts", "edit_posts"]).await;
    graph.create_permission("manage_users").await.unwrap();

    graph.assign_role(user, editor).await.unwrap();

    assert!(!graph.has_permission(user, "manage_users").await.unwrap());
    assert!(graph.has_permission(user, "edit_posts").await.unwrap());
}

#[tokio::test]
async fn test_permissions_are_union_over_roles_in_any_order() {
    let (repo, graph) = graph();
    let a = role_with(&graph, "A", &["p1", "p2"]).await;
    let b = role_with(&graph, "B", &["p2", "p3"]).await;
    let c = role_with(&graph, "C", &[]).await;

    let forward = create_user(&repo, "f@example.com").await;
    let backward = create_user(&repo, "b@example.com").await;
    for role in [a, b, c] {
        graph.assign_role(forward, role).await.unwrap();
    }
    for role in [c, b, a] {
        graph.assign_role(backward, role).await.unwrap();
    }

    let expected: PermissionSet = ["p1", "p2", "p3"].into_iter().collect();
    assert_eq!(graph.permissions_of(forward).await.unwrap(), expected);
    assert_eq!(graph.permissions_of(backward).await.unwrap(), expected);
}

#[tokio::test]
async fn test_user_without_roles_has_empty_set() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "nobody@example.com").await;

    assert!(graph.permissions_of(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_assign_role_twice_is_idempotent() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "twice@example.com").await;
    let role = role_with(&graph, "Author", &["edit_posts"]).await;

    graph.assign_role(user, role).await.unwrap();
    let once = graph.permissions_of(user).await.unwrap();
    graph.assign_role(user, role).await.unwrap();

    assert_eq!(graph.permissions_of(user).await.unwrap(), once);
}

#[tokio::test]
async fn test_grant_permission_twice_is_noop() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "grant@example.com").await;
    let role = graph.create_role("Writer").await.unwrap();
    let permission = graph.create_permission("edit_posts").await.unwrap();

    graph.grant_permission(role.id, permission.id).await.unwrap();
    graph.grant_permission(role.id, permission.id).await.unwrap();
    graph.assign_role(user, role.id).await.unwrap();

    assert_eq!(graph.permissions_of(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_grants_are_visible_to_later_queries() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "late@example.com").await;
    let role = graph.create_role("Growing").await.unwrap();
    graph.assign_role(user, role.id).await.unwrap();
    assert!(!graph.has_permission(user, "manage_posts").await.unwrap());

    let permission = graph.create_permission("manage_posts").await.unwrap();
    graph.grant_permission(role.id, permission.id).await.unwrap();

    assert!(graph.has_permission(user, "manage_posts").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_names_conflict_and_are_case_sensitive() {
    let (_, graph) = graph();
    graph.create_role("Editor").await.unwrap();
    graph.create_permission("manage_posts").await.unwrap();

    assert!(matches!(
        graph.create_role("Editor").await,
        Err(AuthError::Conflict(_))
    ));
    assert!(matches!(
        graph.create_permission("manage_posts").await,
        Err(AuthError::Conflict(_))
    ));
    // Different case is a different key.
    graph.create_role("editor").await.unwrap();
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "ghost@example.com").await;
    let role = graph.create_role("Real").await.unwrap();
    let permission = graph.create_permission("real").await.unwrap();

    assert!(matches!(
        graph.assign_role(Uuid::new_v4(), role.id).await,
        Err(AuthError::NotFound(_))
    ));
    assert!(matches!(
        graph.assign_role(user, Uuid::new_v4()).await,
        Err(AuthError::NotFound(_))
    ));
    assert!(matches!(
        graph.grant_permission(Uuid::new_v4(), permission.id).await,
        Err(AuthError::NotFound(_))
    ));
    assert!(matches!(
        graph.grant_permission(role.id, Uuid::new_v4()).await,
        Err(AuthError::NotFound(_))
    ));
    assert!(matches!(
        graph.permissions_of(Uuid::new_v4()).await,
        Err(AuthError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_scoped_permissions_load_lazily_once() {
    let (repo, graph) = graph();
    let user = create_user(&repo, "scoped@example.com").await;
    let role = role_with(&graph, "Scoped", &["edit_posts"]).await;
    graph.assign_role(user, role).await.unwrap();

    let scope = graph.scope(user);
    assert!(!scope.is_loaded());
    assert!(scope.has("edit_posts").await.unwrap());
    assert!(scope.is_loaded());

    // A grant made mid-request is not seen by the already-warmed scope.
    let late = graph.create_permission("manage_posts").await.unwrap();
    graph.grant_permission(role, late.id).await.unwrap();
    assert!(!scope.has("manage_posts").await.unwrap());
    assert!(graph.scope(user).has("manage_posts").await.unwrap());
}

#[tokio::test]
async fn test_seed_defaults_builds_catalogue_idempotently() {
    let (repo, graph) = graph();
    seed::seed_defaults(&graph).await.unwrap();
    seed::seed_defaults(&graph).await.unwrap();

    let user = create_user(&repo, "seeded@example.com").await;
    for (role_name, expected) in seed::default_roles() {
        let role = graph.find_role(role_name).await.unwrap().unwrap();
        let member = create_user(&repo, &format!("{role_name}@example.com")).await;
        graph.assign_role(member, role.id).await.unwrap();
        let set = graph.permissions_of(member).await.unwrap();
        let expected: PermissionSet = expected.into_iter().collect();
        assert_eq!(set, expected, "role {role_name}");
    }

    let admin = graph.find_role(seed::ADMIN_ROLE).await.unwrap().unwrap();
    graph.assign_role(user, admin.id).await.unwrap();
    assert_eq!(
        graph.permissions_of(user).await.unwrap().len(),
        seed::DEFAULT_PERMISSIONS.len()
    );
}
