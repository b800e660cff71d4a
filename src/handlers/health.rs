use axum::{Json, extract::State, http::StatusCode};

use crate::{AppState, error::Envelope, models::HealthStatus};

/// health_check
///
/// [Public Route] Liveness plus a datastore round trip, for load balancers and
/// monitoring. 503 when the database cannot be reached.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database up", body = HealthStatus),
        (status = 503, description = "Database unreachable", body = HealthStatus)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Envelope<HealthStatus>>) {
    match state.repo.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok(HealthStatus {
                status: "ok".to_string(),
                database: "connected".to_string(),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            let mut body = Envelope::ok(HealthStatus {
                status: "degraded".to_string(),
                database: "unreachable".to_string(),
            });
            body.success = false;
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}
