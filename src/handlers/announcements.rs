use axum::{Json, extract::State, http::StatusCode};

use super::{ApiPath, ValidatedJson};
use crate::{
    AppState,
    auth::AdminUser,
    error::{ApiError, ApiResult, Envelope},
    models::{Announcement, CreateAnnouncementRequest, UpdateAnnouncementRequest},
};

/// list_announcements
///
/// [Public Route] Newest first.
#[utoipa::path(
    get,
    path = "/api/announcements",
    responses((status = 200, description = "All announcements", body = [Announcement]))
)]
pub async fn list_announcements(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<Vec<Announcement>>>> {
    let announcements = state.repo.list_announcements().await?;
    Ok(Json(Envelope::ok(announcements)))
}

/// get_announcement
#[utoipa::path(
    get,
    path = "/api/announcements/{id}",
    params(("id" = i64, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Found", body = Announcement),
        (status = 404, description = "No such announcement")
    )
)]
pub async fn get_announcement(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<Announcement>>> {
    let announcement = state
        .repo
        .get_announcement(id)
        .await?
        .ok_or(ApiError::NotFound("announcement"))?;
    Ok(Json(Envelope::ok(announcement)))
}

/// create_announcement
///
/// [Admin Route] `author` falls back to the publishing administrator's username.
#[utoipa::path(
    post,
    path = "/api/announcements",
    request_body = CreateAnnouncementRequest,
    responses(
        (status = 201, description = "Published", body = Announcement),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn create_announcement(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ValidatedJson(mut payload): ValidatedJson<CreateAnnouncementRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Announcement>>)> {
    let author = payload
        .author
        .take()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| admin.username.clone());

    let announcement = state.repo.create_announcement(payload, author).await?;
    tracing::info!(announcement_id = announcement.id, admin = admin.id, "announcement published");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(announcement).with_message("announcement published")),
    ))
}

/// update_announcement
#[utoipa::path(
    put,
    path = "/api/announcements/{id}",
    params(("id" = i64, Path, description = "Announcement ID")),
    request_body = UpdateAnnouncementRequest,
    responses(
        (status = 200, description = "Updated", body = Announcement),
        (status = 404, description = "No such announcement")
    )
)]
pub async fn update_announcement(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateAnnouncementRequest>,
) -> ApiResult<Json<Envelope<Announcement>>> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }
    let announcement = state
        .repo
        .update_announcement(id, payload)
        .await?
        .ok_or(ApiError::NotFound("announcement"))?;
    Ok(Json(Envelope::ok(announcement).with_message("announcement updated")))
}

/// delete_announcement
#[utoipa::path(
    delete,
    path = "/api/announcements/{id}",
    params(("id" = i64, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "No such announcement")
    )
)]
pub async fn delete_announcement(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<()>>> {
    if !state.repo.delete_announcement(id).await? {
        return Err(ApiError::NotFound("announcement"));
    }
    tracing::info!(announcement_id = id, admin = admin.id, "announcement deleted");
    Ok(Json(Envelope::done("announcement deleted")))
}
