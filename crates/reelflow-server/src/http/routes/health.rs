use axum::extract::State;
use axum::Json;
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::dto::HealthResponse;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(health))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
        environment: format!("{:?}", state.settings.environment).to_lowercase(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
