use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that are **unauthenticated** and reachable by any client. Mounted under
/// `/api`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // --- Identity gateway ---
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // --- Items ---
        // GET /items?page=&limit=&search=
        .route("/items", get(handlers::items::list_items))
        .route("/items/{id}", get(handlers::items::get_item))
        // --- Photos ---
        // POST /photos/upload
        // Multipart field `image`. The body limit leaves headroom above the 5 MiB file cap
        // so oversized files reach the handler's own check.
        .route(
            "/photos/upload",
            post(handlers::photos::upload_photo).layer(DefaultBodyLimit::max(
                handlers::photos::MAX_UPLOAD_BYTES + 1024 * 1024,
            )),
        )
        // --- Message board ---
        .route("/messages", get(handlers::messages::list_messages))
        .route("/messages/{id}", get(handlers::messages::get_message))
        // --- Announcements ---
        .route("/announcements", get(handlers::announcements::list_announcements))
        .route("/announcements/{id}", get(handlers::announcements::get_announcement))
}
