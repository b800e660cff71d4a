use axum::{Json, extract::State};

use super::{ApiPath, ApiQuery, ValidatedJson};
use crate::{
    AppState,
    auth::AdminUser,
    error::{ApiError, ApiResult, Envelope},
    models::{
        AdminDashboardStats, Item, ItemStatus, ItemStatusRequest, PageFilter, PageRequest, Role,
        RoleChangeRequest, User, UserPage,
    },
};

/// get_stats
///
/// [Admin Route] Dashboard counters: items by status, users, messages.
#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses(
        (status = 200, description = "Dashboard counters", body = AdminDashboardStats),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<Envelope<AdminDashboardStats>>> {
    let stats = state.repo.get_stats().await?;
    Ok(Json(Envelope::ok(stats)))
}

/// list_users
///
/// [Admin Route] All accounts ordered by id.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(PageFilter),
    responses((status = 200, description = "One page of users", body = UserPage))
)]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<PageFilter>,
) -> ApiResult<Json<Envelope<UserPage>>> {
    let page = PageRequest::new(filter.page, filter.limit, 20);
    let (users, total) = state.repo.list_users(page).await?;
    Ok(Json(Envelope::ok(UserPage { users, total })))
}

/// change_user_role
///
/// [Admin Route] Escalation guard: only a `super_admin` may grant `super_admin` or
/// change the role of an account that currently holds it. Nobody changes their own
/// role.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/role",
    params(("id" = i64, Path, description = "User ID")),
    request_body = RoleChangeRequest,
    responses(
        (status = 200, description = "Role changed", body = User),
        (status = 400, description = "Unknown role or own account"),
        (status = 403, description = "Super admin required"),
        (status = 404, description = "No such user")
    )
)]
pub async fn change_user_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(payload): ValidatedJson<RoleChangeRequest>,
) -> ApiResult<Json<Envelope<User>>> {
    let target = state.repo.get_user(id).await?.ok_or(ApiError::NotFound("user"))?;

    let new_role: Role = payload
        .role
        .parse()
        .map_err(|e: crate::models::UnknownRole| ApiError::BadRequest(e.to_string()))?;

    if target.id == admin.id {
        return Err(ApiError::BadRequest("cannot change your own role".to_string()));
    }
    let touches_super_admin = target.role == Role::SuperAdmin || new_role == Role::SuperAdmin;
    if touches_super_admin {
        admin.require_role(&[Role::SuperAdmin])?;
    }

    let updated = state
        .repo
        .set_user_role(id, new_role)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    tracing::info!(
        target_id = id,
        from = %target.role,
        to = %new_role,
        admin = admin.id,
        "role changed"
    );
    Ok(Json(Envelope::ok(updated).with_message("role updated")))
}

/// set_item_status
///
/// [Admin Route] Moderation. Only `pending → approved` and `pending → rejected` exist;
/// anything else is a 409. Rejecting requires a reason.
#[utoipa::path(
    put,
    path = "/api/admin/items/{id}/status",
    params(("id" = i64, Path, description = "Item ID")),
    request_body = ItemStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Item),
        (status = 400, description = "Rejection without a reason"),
        (status = 404, description = "No such item"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn set_item_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(payload): ValidatedJson<ItemStatusRequest>,
) -> ApiResult<Json<Envelope<Item>>> {
    let item = state.repo.get_item(id).await?.ok_or(ApiError::NotFound("item"))?;

    let next = payload.status;
    if !item.status.can_transition_to(next) {
        return Err(ApiError::Conflict(format!(
            "cannot move item from {} to {}",
            item.status.as_str(),
            next.as_str()
        )));
    }

    let reason = match next {
        ItemStatus::Rejected => Some(
            payload
                .rejection_reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .ok_or_else(|| ApiError::BadRequest("a rejection reason is required".to_string()))?,
        ),
        _ => None,
    };

    let updated = state
        .repo
        .set_item_status(id, item.status, next, reason)
        .await?
        .ok_or_else(|| ApiError::Conflict("item status changed concurrently".to_string()))?;

    tracing::info!(item_id = id, status = next.as_str(), admin = admin.id, "item moderated");
    Ok(Json(Envelope::ok(updated).with_message("item status updated")))
}
