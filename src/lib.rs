use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use std::any::Any;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod storage;
pub mod token;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs).
pub use config::{AppConfig, StorageConfig};
pub use error::{ApiError, ApiResult, Envelope};
pub use repository::{PoolGate, PostgresRepository, RepositoryState};
pub use storage::{LocalDiskStorage, MockStorageService, S3StorageClient, StorageState};
pub use token::TokenService;

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation from every `#[utoipa::path]` handler and
/// `ToSchema` model. Served at `/api-docs/openapi.json`, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::register, handlers::auth::login, handlers::auth::me,
        handlers::users::update_profile, handlers::users::change_password, handlers::users::get_stats,
        handlers::items::list_items, handlers::items::get_item, handlers::items::my_items,
        handlers::items::create_item, handlers::items::update_item, handlers::items::delete_item,
        handlers::photos::upload_photo, handlers::photos::delete_photo, handlers::photos::list_photos,
        handlers::messages::list_messages, handlers::messages::get_message,
        handlers::messages::create_message, handlers::messages::delete_message,
        handlers::messages::like_message, handlers::messages::unlike_message,
        handlers::announcements::list_announcements, handlers::announcements::get_announcement,
        handlers::announcements::create_announcement, handlers::announcements::update_announcement,
        handlers::announcements::delete_announcement,
        handlers::admin::get_stats, handlers::admin::list_users,
        handlers::admin::change_user_role, handlers::admin::set_item_status,
    ),
    components(
        schemas(
            models::Role, models::ItemKind, models::ItemStatus, models::AnnouncementPriority,
            models::User, models::Item, models::Photo, models::Message, models::MessageThread,
            models::Announcement, models::RegisterRequest, models::LoginRequest,
            models::LoginResponse, models::RegisteredUser, models::UpdateProfileRequest,
            models::ChangePasswordRequest, models::CreateItemRequest, models::UpdateItemRequest,
            models::ItemStatusRequest, models::CreateMessageRequest,
            models::CreateAnnouncementRequest, models::UpdateAnnouncementRequest,
            models::RoleChangeRequest, models::Pagination, models::ItemPage, models::MessagePage,
            models::UserPage, models::PhotoPage, models::UploadResponse, models::LikeState,
            models::UserStats, models::AdminDashboardStats, models::HealthStatus,
            error::ErrorBody, error::FieldError,
        )
    ),
    tags(
        (name = "campus-lost-found", description = "Campus Lost & Found API. Every response is wrapped in {success, message?, data?, error?}.")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding every service a handler may need.
/// Cloned per request; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: database access behind the admission gate.
    pub repo: RepositoryState,
    /// Storage Layer: where uploaded images are written.
    pub storage: StorageState,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Token Service: signs and verifies identity tokens with the configured secret.
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let tokens = TokenService::new(&config.jwt_secret, config.token_ttl);
        Self {
            repo,
            storage,
            config,
            tokens,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// These let handlers and extractors pull single components out of the shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

/// enforce_timeout
///
/// Bounds every request by `config.request_timeout`. On expiry the handler future is
/// dropped, which rolls back any open transaction, and the client gets a 504.
async fn enforce_timeout(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match tokio::time::timeout(state.config.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::RequestTimeout.into_response(),
    }
}

/// handle_panic
///
/// Turns a handler panic into the standard `internal_failure` envelope.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

async fn fallback() -> ApiError {
    ApiError::NotFound("route")
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = match HeaderValue::from_str(&config.cors_origin) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!(origin = %config.cors_origin, "CORS_ORIGIN is not a valid header value; cross-origin requests will be refused");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
}

/// create_router
///
/// Assembles the routing structure, applies the gates and global middleware, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 1. The API: three access tiers merged under /api.
    let api = Router::new()
        // Public Routes: No gate.
        .merge(public::public_routes())
        // Authenticated Routes: the Authentication Gate runs before any handler.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_auth,
            )),
        )
        // Admin Routes: authentication first (401), then the elevated-role check (403).
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_admin,
            )),
        );

    // 2. Base Router Assembly
    let mut base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api);

    // Uploaded images are served straight from disk when stored locally.
    if let StorageConfig::Local { upload_dir } = &state.config.storage {
        base_router = base_router.nest_service("/uploads", ServeDir::new(upload_dir));
    }

    let cors = cors_layer(&state.config);

    let base_router = base_router
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), enforce_timeout))
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (outermost first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: the whole request/response lifecycle in one span
                // carrying the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // 3d. Panics become a 500 envelope inside the request span.
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        // 4. CORS Layer (outermost, so preflights never reach the gates)
        .layer(cors)
}

/// trace_span_logger
///
/// Used by `TraceLayer` to build the per-request span. It extracts the `x-request-id`
/// header (set by the layer above) and records it next to the method and URI, so
/// every log line of one request is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
