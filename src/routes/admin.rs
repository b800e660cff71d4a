use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Routes restricted to `regular_admin` and `super_admin`. `create_router` wraps this
/// router in `require_admin`: no token is a 401, a non-elevated role is a 403, and
/// neither reaches a handler.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        .route("/admin/stats", get(handlers::admin::get_stats))
        // GET /admin/users?page=&limit=
        .route("/admin/users", get(handlers::admin::list_users))
        // PUT /admin/users/{id}/role
        // Changing anything involving super_admin additionally needs super_admin.
        .route("/admin/users/{id}/role", put(handlers::admin::change_user_role))
        // PUT /admin/items/{id}/status
        // The moderation transition: pending → approved | rejected.
        .route("/admin/items/{id}/status", put(handlers::admin::set_item_status))
        // GET /photos
        .route("/photos", get(handlers::photos::list_photos))
        // --- Announcement publishing ---
        .route("/announcements", post(handlers::announcements::create_announcement))
        .route(
            "/announcements/{id}",
            put(handlers::announcements::update_announcement)
                .delete(handlers::announcements::delete_announcement),
        )
}
