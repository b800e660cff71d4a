use axum::{Json, extract::State, http::StatusCode};
use bytes::Bytes;

use super::{ApiPath, ApiQuery, ValidatedJson, parse_body};
use crate::{
    AppState,
    auth::{AuthUser, authorize_owner},
    error::{ApiError, ApiResult, Envelope},
    models::{
        CreateItemRequest, Item, ItemFilter, ItemPage, PageFilter, PageRequest, Pagination,
        UpdateItemRequest,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MY_ITEMS_PAGE_SIZE: i64 = 10;

/// list_items
///
/// [Public Route] Every item, newest first, with pagination and an optional
/// case-insensitive search over title and description.
#[utoipa::path(
    get,
    path = "/api/items",
    params(ItemFilter),
    responses((status = 200, description = "One page of items", body = ItemPage))
)]
pub async fn list_items(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ItemFilter>,
) -> ApiResult<Json<Envelope<ItemPage>>> {
    let page = PageRequest::new(filter.page, filter.limit, DEFAULT_PAGE_SIZE);
    let (items, total) = state.repo.list_items(filter.search, page).await?;
    Ok(Json(Envelope::ok(ItemPage {
        items,
        pagination: Pagination::new(page, total),
    })))
}

/// get_item
///
/// [Public Route] Item detail with photos and the publisher's phone.
#[utoipa::path(
    get,
    path = "/api/items/{id}",
    params(("id" = i64, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Found", body = Item),
        (status = 404, description = "No such item")
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<Item>>> {
    let item = state.repo.get_item(id).await?.ok_or(ApiError::NotFound("item"))?;
    Ok(Json(Envelope::ok(item)))
}

/// my_items
///
/// [Authenticated Route] The caller's own items in every moderation state.
#[utoipa::path(
    get,
    path = "/api/items/user/my-items",
    params(PageFilter),
    responses((status = 200, description = "Caller's items", body = ItemPage))
)]
pub async fn my_items(
    user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<PageFilter>,
) -> ApiResult<Json<Envelope<ItemPage>>> {
    let page = PageRequest::new(filter.page, filter.limit, MY_ITEMS_PAGE_SIZE);
    let (items, total) = state.repo.list_items_by_publisher(user.id, page).await?;
    Ok(Json(Envelope::ok(ItemPage {
        items,
        pagination: Pagination::new(page, total),
    })))
}

/// create_item
///
/// [Authenticated Route] Publishes a report owned by the caller. It enters
/// moderation as `pending`; the photo URLs are attached in the same transaction.
#[utoipa::path(
    post,
    path = "/api/items",
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Created", body = Item),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn create_item(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateItemRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Item>>)> {
    let item = state.repo.create_item(user.id, payload).await?;
    tracing::info!(item_id = item.id, publisher_id = user.id, "item published");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(item).with_message("item published")),
    ))
}

/// update_item
///
/// [Authenticated Route] Owner or administrator only. Order of checks: existence
/// (404), ownership (403), then the body (400).
#[utoipa::path(
    put,
    path = "/api/items/{id}",
    params(("id" = i64, Path, description = "Item ID")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Updated", body = Item),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such item")
    )
)]
pub async fn update_item(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    body: Bytes,
) -> ApiResult<Json<Envelope<Item>>> {
    let existing = state.repo.get_item(id).await?.ok_or(ApiError::NotFound("item"))?;
    authorize_owner(&user, &existing)?;

    let payload: UpdateItemRequest = parse_body(&body)?;
    if payload.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }

    let item = state
        .repo
        .update_item(id, payload)
        .await?
        .ok_or(ApiError::NotFound("item"))?;
    Ok(Json(Envelope::ok(item).with_message("item updated")))
}

/// delete_item
///
/// [Authenticated Route] Owner or administrator only. Photo rows go with the item.
#[utoipa::path(
    delete,
    path = "/api/items/{id}",
    params(("id" = i64, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such item")
    )
)]
pub async fn delete_item(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<()>>> {
    let existing = state.repo.get_item(id).await?.ok_or(ApiError::NotFound("item"))?;
    authorize_owner(&user, &existing)?;

    if !state.repo.delete_item(id).await? {
        return Err(ApiError::NotFound("item"));
    }
    tracing::info!(item_id = id, actor = user.id, "item deleted");
    Ok(Json(Envelope::done("item deleted")))
}
