//! HTTP Front-End (C8, §4.8): route dispatch, auth, rate limiting,
//! request-id stamping, uniform error mapping, CORS, and the OpenAPI/Swagger
//! surface — built on plain `axum`/`utoipa_axum` rather than the teacher's
//! internal `fusion_web` router, which isn't available outside its own
//! workspace (see DESIGN.md).

pub mod auth;
pub mod dto;
pub mod error;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use tower_http::auth::AsyncRequireAuthorizationLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::settings::Settings;
use crate::workflow::OrchestrationWorkflow;
use auth::ReelflowAuth;
use error::WebError;
use rate_limit::RateLimiter;
use reelflow_core::ReelflowError;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<OrchestrationWorkflow>,
    pub settings: Arc<Settings>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(workflow: Arc<OrchestrationWorkflow>, settings: Arc<Settings>) -> Self {
        let rate_limiter = RateLimiter::new(settings.rate_limit.clone());
        Self { workflow, settings, rate_limiter }
    }

    /// Maps a core error into the HTTP envelope, honoring
    /// `AppEnvironment::includes_error_details` (§7).
    pub fn map_error(&self, e: ReelflowError) -> WebError {
        WebError::from_core(e, None, self.settings.environment.includes_error_details())
    }
}

#[derive(OpenApi)]
#[openapi(info(title = "Reelflow API", version = env!("CARGO_PKG_VERSION"), description = "Video-generation orchestration service"))]
struct ApiDoc;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns a per-request id (§4.8 "structured request logging with
/// request-ids"), stamps it on the response header, and for error responses
/// splices it into the JSON envelope's `request_id` field.
async fn stamp_request_id(request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::now_v7().to_string();
    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    if !parts.status.is_client_error() && !parts.status.is_server_error() {
        return Response::from_parts(parts, body);
    }
    let Ok(bytes) = axum::body::to_bytes(body, 1024 * 1024).await else {
        return Response::from_parts(parts, Body::empty());
    };
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };
    if let Some(obj) = value.as_object_mut() {
        obj.insert("request_id".to_string(), serde_json::Value::String(request_id));
    }
    let rebuilt = serde_json::to_vec(&value).unwrap_or_else(|_| bytes.to_vec());
    Response::from_parts(parts, Body::from(rebuilt))
}

/// Catches panics/unmatched routes with a last-resort `WebError` rather than
/// an opaque 500 with no envelope.
async fn fallback() -> impl IntoResponse {
    WebError::not_found("no such route")
}

pub fn router(state: AppState) -> Router {
    let cors = if state.settings.http.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT, axum::http::Method::DELETE, axum::http::Method::OPTIONS])
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let auth = AsyncRequireAuthorizationLayer::new(ReelflowAuth::new(
        vec!["/api/generations".to_string(), "/api/storage".to_string(), "/api/cron".to_string()],
        vec![],
    ));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(routes::health::routes())
        .merge(routes::generations::routes())
        .merge(routes::models::routes())
        .merge(routes::queue::routes())
        .merge(routes::storage::routes())
        .merge(routes::workers::routes())
        .merge(routes::cron::routes())
        .with_state(state)
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .fallback(fallback)
        .layer(auth)
        .layer(middleware::from_fn(stamp_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
