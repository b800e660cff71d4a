use axum::{Json, extract::State, http::StatusCode};

use super::{ApiPath, ApiQuery, ValidatedJson};
use crate::{
    AppState,
    auth::{AuthUser, authorize_owner},
    error::{ApiError, ApiResult, Envelope},
    models::{
        CreateMessageRequest, LikeState, Message, MessagePage, MessageThread, PageFilter,
        PageRequest,
    },
};

const MESSAGE_PAGE_SIZE: i64 = 10;

/// list_messages
///
/// [Public Route] Top-level messages, newest first, each with like and reply counts.
#[utoipa::path(
    get,
    path = "/api/messages",
    params(PageFilter),
    responses((status = 200, description = "One page of messages", body = MessagePage))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<PageFilter>,
) -> ApiResult<Json<Envelope<MessagePage>>> {
    let page = PageRequest::new(filter.page, filter.limit, MESSAGE_PAGE_SIZE);
    let (messages, total) = state.repo.list_messages(page).await?;
    Ok(Json(Envelope::ok(MessagePage { messages, total })))
}

/// get_message
///
/// [Public Route] A message with all of its replies.
#[utoipa::path(
    get,
    path = "/api/messages/{id}",
    params(("id" = i64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Found", body = MessageThread),
        (status = 404, description = "No such message")
    )
)]
pub async fn get_message(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<MessageThread>>> {
    let message = state
        .repo
        .get_message(id)
        .await?
        .ok_or(ApiError::NotFound("message"))?;
    let replies = state.repo.get_replies(id).await?;
    Ok(Json(Envelope::ok(MessageThread { message, replies })))
}

/// create_message
///
/// [Authenticated Route] Posts a message, or a reply when `parent_id` is set. Replies
/// must point at an existing top-level message: the board is two levels deep.
#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Posted", body = Message),
        (status = 400, description = "Empty content or reply to a reply"),
        (status = 404, description = "Parent message not found")
    )
)]
pub async fn create_message(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateMessageRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Message>>)> {
    if let Some(parent_id) = payload.parent_id {
        let parent = state
            .repo
            .get_message(parent_id)
            .await?
            .ok_or(ApiError::NotFound("parent message"))?;
        if parent.parent_id.is_some() {
            return Err(ApiError::BadRequest(
                "replies can only target top-level messages".to_string(),
            ));
        }
    }

    let message = state.repo.create_message(user.id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(message).with_message("message posted")),
    ))
}

/// delete_message
///
/// [Authenticated Route] Author or administrator only. Replies and likes go with it.
#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    params(("id" = i64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such message")
    )
)]
pub async fn delete_message(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<()>>> {
    let message = state
        .repo
        .get_message(id)
        .await?
        .ok_or(ApiError::NotFound("message"))?;
    authorize_owner(&user, &message)?;

    if !state.repo.delete_message(id).await? {
        return Err(ApiError::NotFound("message"));
    }
    tracing::info!(message_id = id, actor = user.id, "message deleted");
    Ok(Json(Envelope::done("message deleted")))
}

/// like_message
///
/// [Authenticated Route] Idempotent: liking twice leaves one like.
#[utoipa::path(
    post,
    path = "/api/messages/{id}/like",
    params(("id" = i64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Liked", body = LikeState),
        (status = 404, description = "No such message")
    )
)]
pub async fn like_message(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<LikeState>>> {
    let like = state
        .repo
        .like_message(id, user.id)
        .await?
        .ok_or(ApiError::NotFound("message"))?;
    Ok(Json(Envelope::ok(like)))
}

/// unlike_message
///
/// [Authenticated Route] Idempotent: removing a like that is not there succeeds.
#[utoipa::path(
    delete,
    path = "/api/messages/{id}/like",
    params(("id" = i64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Unliked", body = LikeState)
    )
)]
pub async fn unlike_message(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<LikeState>>> {
    let like = state.repo.unlike_message(id, user.id).await?;
    Ok(Json(Envelope::ok(like)))
}
