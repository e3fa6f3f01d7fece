//! `POST /api/workers/*` (§6): public per §4.8 ("worker-registration routes
//! are public"). Rate-limited per worker id rather than per IP — this
//! service has no reverse-proxy-supplied client IP to key on, and the
//! worker id is the more meaningful principal for this route class anyway.

use axum::Json;
use axum::extract::State;
use axum_valid::Garde;
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::dto::{GenericOk, WorkerHeartbeatRequest, WorkerRegisterRequest};
use crate::http::error::WebResult;
use crate::http::rate_limit::RouteClass;
use reelflow_core::models::worker::Worker;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(register)).routes(utoipa_axum::routes!(heartbeat))
}

#[utoipa::path(
    post,
    path = "/api/workers/register",
    request_body = WorkerRegisterRequest,
    responses((status = 201, description = "Worker registered", body = GenericOk))
)]
async fn register(
    State(state): State<AppState>,
    Garde(Json(body)): Garde<Json<WorkerRegisterRequest>>,
) -> WebResult<(axum::http::StatusCode, axum::http::HeaderMap, Json<GenericOk>)> {
    let limit = state.rate_limiter.check(&body.worker_id, RouteClass::Workers).await.map_err(|e| state.map_error(e))?;
    let worker = Worker::new(body.worker_id, body.worker_info.name, body.worker_info.capabilities, body.worker_info.max_concurrency);
    state.workflow.queue().register_worker(worker).await.map_err(|e| state.map_error(e))?;
    Ok((axum::http::StatusCode::CREATED, limit.headers(), Json(GenericOk::ok())))
}

#[utoipa::path(
    post,
    path = "/api/workers/heartbeat",
    request_body = WorkerHeartbeatRequest,
    responses((status = 200, description = "Heartbeat recorded", body = GenericOk))
)]
async fn heartbeat(State(state): State<AppState>, Garde(Json(body)): Garde<Json<WorkerHeartbeatRequest>>) -> WebResult<(axum::http::HeaderMap, Json<GenericOk>)> {
    let limit = state.rate_limiter.check(&body.worker_id, RouteClass::Workers).await.map_err(|e| state.map_error(e))?;
    state.workflow.queue().update_worker_heartbeat(&body.worker_id).await.map_err(|e| state.map_error(e))?;
    Ok((limit.headers(), Json(GenericOk::ok())))
}
