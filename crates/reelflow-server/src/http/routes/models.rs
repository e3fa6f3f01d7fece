//! `GET /api/models` (§4.2): lists the Model Registry catalog. Not in the
//! distilled route table, but a natural, read-only surface over a component
//! the spec documents in full (capabilities, parameters, pricing, and
//! availability per model) — a client choosing a model before calling
//! `POST /api/generations` needs this. Public, like `/api/queue/*`.

use axum::Json;
use axum::extract::State;
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::dto::ModelListResponse;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(list_models))
}

#[utoipa::path(
    get,
    path = "/api/models",
    responses((status = 200, description = "Model catalog", body = ModelListResponse))
)]
async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    Json(ModelListResponse { models: state.workflow.models().all() })
}
