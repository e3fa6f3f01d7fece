//! `POST /api/cron/cleanup` (§6, §4.8 "scheduled cleanup"): the same hook the
//! daily scheduled task in `app.rs` invokes, exposed for manual/external
//! triggering (e.g. an operator-managed cron rather than an in-process one).
//! Scoped behind `ReelflowAuth` like the user-facing routes — the spec names
//! no separate operator credential, so the same bearer gate stands in for one
//! rather than leaving an unauthenticated cleanup endpoint exposed.

use axum::Json;
use axum::extract::State;
use axum_valid::Garde;
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::dto::{CronCleanupRequest, CronCleanupResponse};
use crate::http::error::WebResult;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(cleanup))
}

#[utoipa::path(
    post,
    path = "/api/cron/cleanup",
    request_body = CronCleanupRequest,
    responses((status = 200, description = "Cleanup counts", body = CronCleanupResponse))
)]
async fn cleanup(State(state): State<AppState>, Garde(Json(body)): Garde<Json<CronCleanupRequest>>) -> WebResult<Json<CronCleanupResponse>> {
    let retention_days = body.older_than_days.or(Some(state.settings.retention.cleanup_retention_days));
    let jobs_cleaned = state.workflow.jobs().cleanup(retention_days).await.map_err(|e| state.map_error(e))?;
    let videos_cleaned = state.workflow.artifacts().cleanup(retention_days.unwrap_or(state.settings.retention.cleanup_retention_days)).await.map_err(|e| state.map_error(e))?;
    let workers_cleaned =
        state.workflow.queue().cleanup_inactive_workers(state.settings.retention.worker_heartbeat_threshold_min).await.map_err(|e| state.map_error(e))?;
    Ok(Json(CronCleanupResponse { jobs_cleaned, videos_cleaned, workers_cleaned }))
}
