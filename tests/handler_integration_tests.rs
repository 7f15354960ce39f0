use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use cms_portal::{
    AppConfig, AppState, AuthError, DenyReason, InMemoryRepository, MockNotifier, Stores,
    auth::{AuthUser, ClientOrigin},
    handlers,
    models::{
        AuthorizeRequest, CreatePostRequest, LoginRequest, NamedRequest, RegisterRequest,
        UpdatePostRequest,
    },
    seed,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Test State Scaffolding ---

async fn create_test_state() -> AppState {
    let repo = Arc::new(InMemoryRepository::new());
    let config = AppConfig {
        admin_email: Some("admin@example.com".to_string()),
        admin_password: Some("admin-password".to_string()),
        ..AppConfig::default()
    };
    let state = AppState::build(
        config,
        Stores::from_repository(repo),
        Arc::new(MockNotifier::new()),
    );
    seed::bootstrap(&state).await.unwrap();
    state
}

/// Registers a user, optionally attaches a seeded role, and logs in.
async fn signed_in(state: &AppState, email: &str, role: Option<&str>) -> AuthUser {
    let user = state
        .sessions
        .register("Test", email, "password123")
        .await
        .unwrap();
    if let Some(role) = role {
        let role = state.graph.find_role(role).await.unwrap().unwrap();
        state.graph.assign_role(user.id, role.id).await.unwrap();
    }
    let (issued, _) = state
        .sessions
        .login(email, "password123", "127.0.0.1")
        .await
        .unwrap();
    AuthUser {
        id: user.id,
        is_admin: user.is_admin,
        token: issued.token,
    }
}

async fn admin(state: &AppState) -> AuthUser {
    let (issued, user) = state
        .sessions
        .login("admin@example.com", "admin-password", "127.0.0.1")
        .await
        .unwrap();
    AuthUser {
        id: user.id,
        is_admin: user.is_admin,
        token: issued.token,
    }
}

fn new_post() -> CreatePostRequest {
    CreatePostRequest {
        title: "First".to_string(),
        content: "Body".to_string(),
        status: "draft".to_string(),
    }
}

// --- Session Handlers ---

#[tokio::test]
async fn test_register_returns_201() {
    let state = create_test_state().await;

    let response = handlers::register_user(
        State(state),
        Json(RegisterRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "password123".to_string(),
        }),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_login_wrong_password_is_401() {
    let state = create_test_state().await;
    signed_in(&state, "ada@example.com", None).await;

    let response = handlers::login(
        State(state),
        ClientOrigin("127.0.0.1".to_string()),
        Json(LoginRequest {
            email: "ada@example.com".to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_me_lists_effective_permissions() {
    let state = create_test_state().await;
    let user = signed_in(&state, "editor@example.com", Some(seed::EDITOR_ROLE)).await;

    let Json(profile) = handlers::get_me(user, State(state)).await.unwrap();

    assert_eq!(profile.user.email, "editor@example.com");
    assert!(!profile.user.is_admin);
    // Reader (default) plus Editor, sorted.
    assert_eq!(
        profile.permissions,
        vec!["edit_posts", "manage_posts", "publish_posts"]
    );
}

// --- Post Handlers ---

#[tokio::test]
async fn test_reader_cannot_create_post() {
    let state = create_test_state().await;
    let reader = signed_in(&state, "reader@example.com", None).await;

    let result = handlers::create_post(reader, State(state), Json(new_post())).await;

    assert!(matches!(
        result.map(|_| ()),
        Err(AuthError::Forbidden(DenyReason::MissingPermission))
    ));
}

#[tokio::test]
async fn test_editor_creates_and_updates_own_post() {
    let state = create_test_state().await;
    let editor = signed_in(&state, "editor@example.com", Some(seed::EDITOR_ROLE)).await;

    let response = handlers::create_post(editor.clone(), State(state.clone()), Json(new_post()))
        .await
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);

    let post = state.posts.list_posts().await.unwrap().remove(0);
    assert_eq!(post.author_id, editor.id);

    let Json(updated) = handlers::update_post(
        editor,
        State(state),
        Path(post.id),
        Json(UpdatePostRequest {
            status: Some("published".to_string()),
            ..UpdatePostRequest::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.status, "published");
    assert_eq!(updated.title, "First");
}

#[tokio::test]
async fn test_other_editor_gets_not_owner() {
    let state = create_test_state().await;
    let author = signed_in(&state, "author@example.com", Some(seed::EDITOR_ROLE)).await;
    let rival = signed_in(&state, "rival@example.com", Some(seed::EDITOR_ROLE)).await;
    let post = state.posts.create_post(author.id, new_post()).await.unwrap();

    let update = handlers::update_post(
        rival.clone(),
        State(state.clone()),
        Path(post.id),
        Json(UpdatePostRequest::default()),
    )
    .await;
    let delete = handlers::delete_post(rival, State(state.clone()), Path(post.id)).await;

    assert!(matches!(
        update,
        Err(AuthError::Forbidden(DenyReason::NotOwner))
    ));
    assert!(matches!(
        delete,
        Err(AuthError::Forbidden(DenyReason::NotOwner))
    ));
    assert!(state.posts.get_post(post.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_admin_deletes_any_post() {
    let state = create_test_state().await;
    let author = signed_in(&state, "author@example.com", Some(seed::AUTHOR_ROLE)).await;
    let admin = admin(&state).await;
    let post = state.posts.create_post(author.id, new_post()).await.unwrap();

    let status = handlers::delete_post(admin, State(state.clone()), Path(post.id))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.posts.get_post(post.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_missing_post_is_404() {
    let state = create_test_state().await;
    let editor = signed_in(&state, "editor@example.com", Some(seed::EDITOR_ROLE)).await;

    let response = handlers::update_post(
        editor,
        State(state),
        Path(Uuid::new_v4()),
        Json(UpdatePostRequest::default()),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Authorize Handler ---

#[tokio::test]
async fn test_authorize_reports_reason_without_error() {
    let state = create_test_state().await;
    let reader = signed_in(&state, "reader@example.com", None).await;

    let Json(answer) = handlers::authorize_request(
        reader,
        State(state),
        Json(AuthorizeRequest {
            action: "create".to_string(),
            resource_type: Some("category".to_string()),
            resource_id: None,
        }),
    )
    .await
    .unwrap();

    assert!(!answer.allowed);
    assert_eq!(answer.reason, Some(DenyReason::MissingPermission));
}

// --- Admin Handlers ---

#[tokio::test]
async fn test_admin_builds_role_and_assigns_it() {
    let state = create_test_state().await;
    let admin = admin(&state).await;
    let target = signed_in(&state, "target@example.com", None).await;

    let role = state.graph.create_role("Moderator").await.unwrap();
    let permission = handlers::create_permission(
        admin.clone(),
        State(state.clone()),
        Json(NamedRequest {
            name: "moderate_comments".to_string(),
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(permission.status(), StatusCode::CREATED);
    let permission = state
        .graph
        .find_permission("moderate_comments")
        .await
        .unwrap()
        .unwrap();

    let granted = handlers::grant_permission(
        admin.clone(),
        State(state.clone()),
        Path((role.id, permission.id)),
    )
    .await
    .unwrap();
    let assigned =
        handlers::assign_role(admin.clone(), State(state.clone()), Path((target.id, role.id)))
            .await
            .unwrap();
    assert_eq!(granted, StatusCode::NO_CONTENT);
    assert_eq!(assigned, StatusCode::NO_CONTENT);

    let Json(profile) = handlers::get_user_permissions(admin, State(state), Path(target.id))
        .await
        .unwrap();
    assert_eq!(profile.permissions, vec!["moderate_comments"]);
}

#[tokio::test]
async fn test_admin_routes_refuse_without_manage_users() {
    let state = create_test_state().await;
    let editor = signed_in(&state, "editor@example.com", Some(seed::EDITOR_ROLE)).await;

    let response = handlers::create_role(
        editor,
        State(state),
        Json(NamedRequest {
            name: "Sneaky".to_string(),
        }),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_role_is_409() {
    let state = create_test_state().await;
    let admin = admin(&state).await;

    let response = handlers::create_role(
        admin,
        State(state),
        Json(NamedRequest {
            name: seed::EDITOR_ROLE.to_string(),
        }),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_assign_unknown_role_is_404() {
    let state = create_test_state().await;
    let admin = admin(&state).await;
    let target = signed_in(&state, "target@example.com", None).await;

    let response = handlers::assign_role(admin, State(state), Path((target.id, Uuid::new_v4())))
        .await
        .into_response();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
