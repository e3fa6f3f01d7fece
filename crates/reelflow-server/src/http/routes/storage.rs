//! `/api/storage/videos*` (§6): the Artifact Store surface. Scoped behind
//! `ReelflowAuth`; ownership is implicit in the Artifact Store's
//! `user_id`-partitioned key space, not a separate check.

use axum::extract::{Extension, Path, State};
use axum::Json;
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::auth::AuthContext;
use crate::http::dto::{GenericOk, VideoUrlResponse, VideosResponse};
use crate::http::error::WebResult;
use crate::http::rate_limit::RouteClass;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(list_videos)).routes(utoipa_axum::routes!(video_url)).routes(utoipa_axum::routes!(delete_video))
}

#[utoipa::path(
    get,
    path = "/api/storage/videos",
    responses((status = 200, description = "Videos owned by the caller", body = VideosResponse))
)]
async fn list_videos(State(state): State<AppState>, Extension(auth): Extension<AuthContext>) -> WebResult<(axum::http::HeaderMap, Json<VideosResponse>)> {
    let limit = state.rate_limiter.check(&auth.user_id, RouteClass::Storage).await.map_err(|e| state.map_error(e))?;
    let videos = state.workflow.artifacts().list(&auth.user_id).await.map_err(|e| state.map_error(e))?;
    Ok((limit.headers(), Json(VideosResponse { videos })))
}

#[utoipa::path(
    get,
    path = "/api/storage/videos/{id}",
    responses((status = 200, description = "Time-bounded signed URL", body = VideoUrlResponse))
)]
async fn video_url(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> WebResult<(axum::http::HeaderMap, Json<VideoUrlResponse>)> {
    let limit = state.rate_limiter.check(&auth.user_id, RouteClass::Storage).await.map_err(|e| state.map_error(e))?;
    let video_url = state.workflow.artifacts().signed_url(&auth.user_id, &id).await.map_err(|e| state.map_error(e))?;
    Ok((limit.headers(), Json(VideoUrlResponse { video_url })))
}

#[utoipa::path(
    delete,
    path = "/api/storage/videos/{id}",
    responses((status = 200, description = "Video deleted", body = GenericOk))
)]
async fn delete_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> WebResult<(axum::http::HeaderMap, Json<GenericOk>)> {
    let limit = state.rate_limiter.check(&auth.user_id, RouteClass::Storage).await.map_err(|e| state.map_error(e))?;
    state.workflow.artifacts().delete(&auth.user_id, &id).await.map_err(|e| state.map_error(e))?;
    Ok((limit.headers(), Json(GenericOk::ok())))
}
