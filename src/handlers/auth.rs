use axum::{Json, extract::State, http::StatusCode};

use super::ValidatedJson;
use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult, Envelope},
    models::{LoginRequest, LoginResponse, NewUser, RegisterRequest, RegisteredUser, Role, User},
    password::{hash_password_blocking, verify_decoy_blocking, verify_password_blocking},
};

/// register
///
/// [Public Route] Creates an account. The role is always `regular_user`; a taken
/// username is a 409.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = RegisteredUser),
        (status = 400, description = "Validation failure"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<RegisteredUser>>)> {
    let password_hash = hash_password_blocking(payload.password).await?;

    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            password_hash,
            role: Role::RegularUser,
            phone: payload.phone,
            student_no: payload.student_no,
            full_name: payload.full_name,
            avatar_url: payload.avatar_url,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");

    let body = Envelope::ok(RegisteredUser {
        id: user.id,
        username: user.username,
        role: user.role,
    })
    .with_message("registration successful");
    Ok((StatusCode::CREATED, Json(body)))
}

/// login
///
/// [Public Route] Exchanges a username and password for a signed identity token.
/// Unknown user and wrong password are indistinguishable to the client.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<Envelope<LoginResponse>>> {
    let Some(credentials) = state.repo.get_credentials(payload.username.trim()).await? else {
        verify_decoy_blocking(payload.password).await?;
        return Err(ApiError::LoginFailed);
    };

    if !verify_password_blocking(payload.password, credentials.password_hash.clone()).await? {
        return Err(ApiError::LoginFailed);
    }

    let identity = AuthUser {
        id: credentials.id,
        username: credentials.username,
        role: credentials.role,
    };
    let token = state
        .tokens
        .issue(&identity)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let user = state
        .repo
        .get_user(identity.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    tracing::info!(user_id = user.id, role = %user.role, "login succeeded");
    Ok(Json(
        Envelope::ok(LoginResponse { token, user }).with_message("login successful"),
    ))
}

/// me
///
/// [Authenticated Route] The caller's current profile. Also mounted at
/// `GET /api/users/profile`. A token for a since-deleted account yields 404.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Account no longer exists")
    )
)]
pub async fn me(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Envelope<User>>> {
    let profile = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(Envelope::ok(profile)))
}
