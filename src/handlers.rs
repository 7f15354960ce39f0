use crate::{
    AppState,
    auth::{AuthUser, ClientOrigin},
    authorization::{AuthenticatedRequest, Decision},
    error::{AuthError, AuthResult, ErrorBody},
    models::{
        AuthorizeRequest, AuthorizeResponse, CreatePostRequest, ForgotPasswordRequest,
        LoginRequest, LoginResponse, MessageResponse, NamedRequest, Permission, Post,
        RegisterRequest, RegisterResponse, ResetPasswordRequest, Role, UpdatePostRequest,
        UserProfile, UserResponse,
    },
    policy::{Action, ResourceType},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// require
///
/// Runs the Authorization Engine for the authenticated caller and turns a denial
/// into `403`. The permission set is loaded at most once per request.
async fn require(
    state: &AppState,
    user: &AuthUser,
    action: Action,
    resource_type: ResourceType,
    resource_id: Option<Uuid>,
) -> AuthResult<()> {
    let permissions = state.graph.scope(user.id);
    state
        .engine
        .authorize_actor(&user.actor(), &permissions, action, resource_type, resource_id)
        .await?
        .require()
}

async fn load_profile(state: &AppState, user_id: Uuid) -> AuthResult<UserProfile> {
    let user = state
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;
    let permissions = state.graph.permissions_of(user_id).await?;
    Ok(UserProfile {
        user: UserResponse::from(&user),
        permissions: permissions.into_vec(),
    })
}

// --- Session Handlers ---

/// register_user
///
/// [Public Route] Creates an account and attaches the configured default roles.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User Created", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = ErrorBody)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .sessions
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges credentials for a new bearer token. Throttled per
/// email + client origin.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged In", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let (issued, user) = state
        .sessions
        .login(&payload.email, &payload.password, &origin)
        .await?;
    Ok(Json(LoginResponse {
        token: issued.token,
        user: UserResponse::from(&user),
    }))
}

/// logout
///
/// [Authenticated Route] Revokes every token of the caller.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 200, description = "Logged Out", body = MessageResponse))
)]
pub async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
) -> AuthResult<Json<MessageResponse>> {
    state.sessions.logout(user.id).await?;
    Ok(Json(MessageResponse::new("Logged out successfully.")))
}

/// logout_current
///
/// [Authenticated Route] Revokes only the token used for this request.
#[utoipa::path(
    post,
    path = "/logout/current",
    responses((status = 200, description = "Session Ended", body = MessageResponse))
)]
pub async fn logout_current(
    user: AuthUser,
    State(state): State<AppState>,
) -> AuthResult<Json<MessageResponse>> {
    state.sessions.logout_current(&user.token).await?;
    Ok(Json(MessageResponse::new("Logged out successfully.")))
}

/// forgot_password
///
/// [Public Route] Always answers with the same message, whether or not the
/// email belongs to an account.
#[utoipa::path(
    post,
    path = "/password/forgot",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Reset Requested", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<MessageResponse>> {
    state.resets.request_reset(&payload.email).await?;
    Ok(Json(MessageResponse::new("Password reset link sent.")))
}

#[utoipa::path(
    post,
    path = "/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password Reset", body = MessageResponse),
        (status = 400, description = "Invalid, expired or used token", body = ErrorBody)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<Json<MessageResponse>> {
    state
        .resets
        .complete_reset(&payload.email, &payload.token, &payload.password)
        .await?;
    Ok(Json(MessageResponse::new("Password reset successful.")))
}

/// get_me
///
/// [Authenticated Route] The caller's profile plus effective permissions.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current User", body = UserProfile),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn get_me(
    user: AuthUser,
    State(state): State<AppState>,
) -> AuthResult<Json<UserProfile>> {
    Ok(Json(load_profile(&state, user.id).await?))
}

/// authorize_request
///
/// [Authenticated Route] Asks the engine whether the caller may perform an
/// action, without performing it. Denials are a normal `200` answer here.
#[utoipa::path(
    post,
    path = "/authorize",
    request_body = AuthorizeRequest,
    responses((status = 200, description = "Decision", body = AuthorizeResponse))
)]
pub async fn authorize_request(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AuthorizeRequest>,
) -> AuthResult<Json<AuthorizeResponse>> {
    let decision = state
        .engine
        .check(&AuthenticatedRequest {
            token: user.token,
            action: payload.action,
            resource_type: payload.resource_type,
            resource_id: payload.resource_id,
        })
        .await?;

    let reason = match decision {
        Decision::Allow => None,
        Decision::Deny(reason) => Some(reason),
    };
    Ok(Json(AuthorizeResponse {
        allowed: reason.is_none(),
        reason,
    }))
}

// --- Post Handlers ---

#[utoipa::path(
    get,
    path = "/posts",
    responses((status = 200, description = "All Posts", body = [Post]))
)]
pub async fn get_posts(State(state): State<AppState>) -> AuthResult<Json<Vec<Post>>> {
    Ok(Json(state.posts.list_posts().await?))
}

#[utoipa::path(
    get,
    path = "/posts/{id}",
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AuthResult<Json<Post>> {
    state
        .posts
        .get_post(id)
        .await?
        .map(Json)
        .ok_or_else(|| AuthError::NotFound(format!("post {id}")))
}

/// create_post
///
/// [Authenticated Route] Requires `manage_posts`. The caller becomes the author.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post Created", body = Post),
        (status = 403, description = "Missing permission", body = ErrorBody)
    )
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AuthResult<impl IntoResponse> {
    require(&state, &user, Action::Create, ResourceType::Post, None).await?;
    let post = state.posts.create_post(user.id, payload).await?;
    tracing::info!(post_id = %post.id, author_id = %user.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Author or admin only: a non-author is refused with
/// `not_owner` even when holding `manage_posts`.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post Updated", body = Post),
        (status = 403, description = "Not Owner", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AuthResult<Json<Post>> {
    require(&state, &user, Action::Update, ResourceType::Post, Some(id)).await?;
    Ok(Json(state.posts.update_post(id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    require(&state, &user, Action::Delete, ResourceType::Post, Some(id)).await?;
    state.posts.delete_post(id).await?;
    tracing::info!(post_id = %id, actor = %user.id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Admin Handlers ---

/// create_role
///
/// [Admin Route] Requires `manage_users`. Duplicate names are `409`.
#[utoipa::path(
    post,
    path = "/admin/roles",
    request_body = NamedRequest,
    responses(
        (status = 201, description = "Role Created", body = Role),
        (status = 409, description = "Duplicate name", body = ErrorBody)
    )
)]
pub async fn create_role(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NamedRequest>,
) -> AuthResult<impl IntoResponse> {
    require(&state, &user, Action::Create, ResourceType::Role, None).await?;
    let role = state.graph.create_role(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    post,
    path = "/admin/permissions",
    request_body = NamedRequest,
    responses(
        (status = 201, description = "Permission Created", body = Permission),
        (status = 409, description = "Duplicate name", body = ErrorBody)
    )
)]
pub async fn create_permission(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NamedRequest>,
) -> AuthResult<impl IntoResponse> {
    require(&state, &user, Action::Create, ResourceType::Permission, None).await?;
    let permission = state.graph.create_permission(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

/// grant_permission
///
/// [Admin Route] Idempotent: granting twice still answers `204`.
#[utoipa::path(
    put,
    path = "/admin/roles/{role_id}/permissions/{permission_id}",
    responses(
        (status = 204, description = "Granted"),
        (status = 404, description = "Unknown role or permission", body = ErrorBody)
    )
)]
pub async fn grant_permission(
    user: AuthUser,
    State(state): State<AppState>,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> AuthResult<StatusCode> {
    require(&state, &user, Action::Update, ResourceType::Role, Some(role_id)).await?;
    state.graph.grant_permission(role_id, permission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/roles/{role_id}",
    responses(
        (status = 204, description = "Assigned"),
        (status = 404, description = "Unknown user or role", body = ErrorBody)
    )
)]
pub async fn assign_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AuthResult<StatusCode> {
    require(&state, &user, Action::Update, ResourceType::User, Some(user_id)).await?;
    state.graph.assign_role(user_id, role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/admin/users/{user_id}/permissions",
    responses(
        (status = 200, description = "User and effective permissions", body = UserProfile),
        (status = 404, description = "Unknown user", body = ErrorBody)
    )
)]
pub async fn get_user_permissions(
    user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AuthResult<Json<UserProfile>> {
    require(&state, &user, Action::Read, ResourceType::User, Some(user_id)).await?;
    Ok(Json(load_profile(&state, user_id).await?))
}
