use axum::{Json, extract::State};

use super::ValidatedJson;
use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult, Envelope},
    models::{ChangePasswordRequest, UpdateProfileRequest, User, UserStats},
    password::{hash_password_blocking, verify_password_blocking},
};

/// update_profile
///
/// [Authenticated Route] Partial update of the caller's own profile. Username and
/// role are not editable here.
#[utoipa::path(
    put,
    path = "/api/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = User),
        (status = 400, description = "No fields or invalid fields")
    )
)]
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<Envelope<User>>> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }

    let profile = state
        .repo
        .update_profile(user.id, payload)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(Envelope::ok(profile).with_message("profile updated")))
}

/// change_password
///
/// [Authenticated Route] Requires the current password. Tokens issued before the
/// change stay valid until they expire.
#[utoipa::path(
    put,
    path = "/api/users/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Old password incorrect")
    )
)]
pub async fn change_password(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    let current_hash = state
        .repo
        .get_password_hash(user.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if !verify_password_blocking(payload.old_password, current_hash).await? {
        return Err(ApiError::BadRequest("old password is incorrect".to_string()));
    }

    let new_hash = hash_password_blocking(payload.new_password).await?;
    if !state.repo.update_password(user.id, new_hash).await? {
        return Err(ApiError::NotFound("user"));
    }

    tracing::info!(user_id = user.id, "password changed");
    Ok(Json(Envelope::done("password changed")))
}

/// get_stats
///
/// [Authenticated Route] How many items and messages the caller has posted.
#[utoipa::path(
    get,
    path = "/api/users/stats",
    responses((status = 200, description = "Activity counters", body = UserStats))
)]
pub async fn get_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<UserStats>>> {
    let stats = state.repo.get_user_stats(user.id).await?;
    Ok(Json(Envelope::ok(stats)))
}
