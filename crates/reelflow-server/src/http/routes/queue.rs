//! `GET /api/queue/*` (§6): queue introspection. Public per §4.8 ("queue-stats
//! ... routes are public"); unlike `/api/generations/:id` this path carries
//! no ownership check.

use axum::Json;
use axum::extract::{Path, State};
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::dto::{QueueJobResponse, QueueStatsBody, QueueStatsResponse, QueueStatusBody, QueueStatusResponse};
use crate::http::error::WebResult;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(job_by_id)).routes(utoipa_axum::routes!(stats)).routes(utoipa_axum::routes!(status))
}

#[utoipa::path(
    get,
    path = "/api/queue/jobs/{id}",
    responses((status = 200, description = "Job state", body = QueueJobResponse))
)]
async fn job_by_id(State(state): State<AppState>, Path(id): Path<String>) -> WebResult<Json<QueueJobResponse>> {
    let job = state.workflow.jobs().get(&id).await.map_err(|e| state.map_error(e))?;
    Ok(Json(QueueJobResponse { success: true, job }))
}

#[utoipa::path(
    get,
    path = "/api/queue/stats",
    responses((status = 200, description = "Queue throughput stats", body = QueueStatsResponse))
)]
async fn stats(State(state): State<AppState>) -> Json<QueueStatsResponse> {
    let stats = state.workflow.queue().stats().await;
    Json(QueueStatsResponse {
        success: true,
        stats: QueueStatsBody {
            waiting: stats.waiting,
            active: stats.active,
            completed: stats.completed,
            failed: stats.failed,
            delayed: stats.delayed,
            total_processed: stats.total_processed,
            avg_processing_time: stats.avg_processing_time_ms,
        },
    })
}

#[utoipa::path(
    get,
    path = "/api/queue/status",
    responses((status = 200, description = "Queue pause/capacity status", body = QueueStatusResponse))
)]
async fn status(State(state): State<AppState>) -> Json<QueueStatusResponse> {
    let status = state.workflow.queue().status().await;
    Json(QueueStatusResponse {
        success: true,
        status: QueueStatusBody { is_paused: status.is_paused, queue_length: status.queue_length, active_jobs: status.active_jobs, worker_count: status.worker_count },
    })
}
