use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any caller holding a valid bearer token. `create_router` wraps this
/// router in `require_auth`, so every handler here receives a verified `AuthUser`.
/// Handlers that mutate an owned resource additionally run `authorize_owner` after
/// loading it.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Identity ---
        .route("/auth/me", get(handlers::auth::me))
        // GET/PUT /users/profile: the GET is an alias of /auth/me.
        .route(
            "/users/profile",
            get(handlers::auth::me).put(handlers::users::update_profile),
        )
        .route("/users/password", put(handlers::users::change_password))
        .route("/users/stats", get(handlers::users::get_stats))
        // --- Items ---
        .route("/items", post(handlers::items::create_item))
        .route("/items/user/my-items", get(handlers::items::my_items))
        // PUT/DELETE /items/{id}: owner or administrator.
        .route(
            "/items/{id}",
            put(handlers::items::update_item).delete(handlers::items::delete_item),
        )
        // --- Photos ---
        // DELETE /photos/{filename}: owner of every item the image is attached to.
        .route("/photos/{filename}", delete(handlers::photos::delete_photo))
        // --- Message board ---
        .route("/messages", post(handlers::messages::create_message))
        // DELETE /messages/{id}: author or administrator.
        .route("/messages/{id}", delete(handlers::messages::delete_message))
        // POST/DELETE /messages/{id}/like: idempotent set membership.
        .route(
            "/messages/{id}/like",
            post(handlers::messages::like_message).delete(handlers::messages::unlike_message),
        )
}
