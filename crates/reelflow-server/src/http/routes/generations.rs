//! `POST/GET /api/generations*` (§6): the user-facing slice of the
//! Orchestration Workflow. Every route here is scoped behind `ReelflowAuth`.

use axum::extract::{Extension, Path, State};
use axum::Json;
use axum_valid::Garde;
use reelflow_core::models::job::ClarificationResponse;
use utoipa_axum::router::OpenApiRouter;

use crate::http::AppState;
use crate::http::auth::AuthContext;
use crate::http::dto::{ClarifyRequest, CreateGenerationRequest, CreateGenerationResponse, GenerationResponse};
use crate::http::error::WebResult;
use crate::http::rate_limit::RouteClass;
use reelflow_core::ReelflowError;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(create_generation))
        .routes(utoipa_axum::routes!(get_generation))
        .routes(utoipa_axum::routes!(clarify_generation))
        .routes(utoipa_axum::routes!(confirm_generation))
        .routes(utoipa_axum::routes!(cancel_generation))
}

async fn own_or_reject(state: &AppState, auth: &AuthContext, job_id: &str) -> WebResult<reelflow_core::models::job::Job> {
    let job = state.workflow.jobs().get(job_id).await.map_err(|e| state.map_error(e))?;
    if job.user_id != auth.user_id {
        return Err(state.map_error(ReelflowError::authorization("not the owner of this generation")));
    }
    Ok(job)
}

#[utoipa::path(
    post,
    path = "/api/generations",
    request_body = CreateGenerationRequest,
    responses((status = 201, description = "Generation created", body = CreateGenerationResponse))
)]
async fn create_generation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Garde(Json(body)): Garde<Json<CreateGenerationRequest>>,
) -> WebResult<(axum::http::StatusCode, axum::http::HeaderMap, Json<CreateGenerationResponse>)> {
    let limit = state.rate_limiter.check(&auth.user_id, RouteClass::Generations).await.map_err(|e| state.map_error(e))?;

    let outcome = state
        .workflow
        .start(auth.user_id, body.prompt, body.parameters.unwrap_or_default(), body.model.as_deref(), body.priority)
        .await
        .map_err(|e| state.map_error(e))?;

    Ok((
        axum::http::StatusCode::CREATED,
        limit.headers(),
        Json(CreateGenerationResponse {
            success: true,
            generation_id: outcome.job.id,
            queue_position: outcome.queue_position,
            clarification_required: outcome.clarification_required,
            clarification_questions: outcome.clarification_questions,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/generations/{id}",
    responses((status = 200, description = "Generation state", body = GenerationResponse))
)]
async fn get_generation(State(state): State<AppState>, Extension(auth): Extension<AuthContext>, Path(id): Path<String>) -> WebResult<Json<GenerationResponse>> {
    let job = own_or_reject(&state, &auth, &id).await?;
    Ok(Json(GenerationResponse { success: true, generation: job }))
}

#[utoipa::path(
    post,
    path = "/api/generations/{id}/clarify",
    request_body = ClarifyRequest,
    responses((status = 200, description = "Clarification recorded", body = GenerationResponse))
)]
async fn clarify_generation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Garde(Json(body)): Garde<Json<ClarifyRequest>>,
) -> WebResult<Json<GenerationResponse>> {
    own_or_reject(&state, &auth, &id).await?;
    let job = state
        .workflow
        .submit_clarification(&id, ClarificationResponse { response: body.response, question_id: body.question_id })
        .await
        .map_err(|e| state.map_error(e))?;
    Ok(Json(GenerationResponse { success: true, generation: job }))
}

#[utoipa::path(
    post,
    path = "/api/generations/{id}/confirm",
    responses((status = 200, description = "Generation confirmed and dispatched", body = GenerationResponse))
)]
async fn confirm_generation(State(state): State<AppState>, Extension(auth): Extension<AuthContext>, Path(id): Path<String>) -> WebResult<Json<GenerationResponse>> {
    own_or_reject(&state, &auth, &id).await?;
    let job = state.workflow.confirm_generation(&id).await.map_err(|e| state.map_error(e))?;
    Ok(Json(GenerationResponse { success: true, generation: job }))
}

/// Not in the distilled route table, but §8 scenario 5 narrates a cancel
/// call against this workflow step; `cancel_generation` already exists and
/// needs an HTTP entry point, so this is added as a supplemental route.
#[utoipa::path(
    post,
    path = "/api/generations/{id}/cancel",
    responses((status = 200, description = "Generation cancelled", body = GenerationResponse))
)]
async fn cancel_generation(State(state): State<AppState>, Extension(auth): Extension<AuthContext>, Path(id): Path<String>) -> WebResult<Json<GenerationResponse>> {
    own_or_reject(&state, &auth, &id).await?;
    let job = state.workflow.cancel_generation(&id).await.map_err(|e| state.map_error(e))?;
    Ok(Json(GenerationResponse { success: true, generation: job }))
}
