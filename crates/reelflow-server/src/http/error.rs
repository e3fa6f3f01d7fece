//! Uniform error mapping (§4.8, §7): every tagged `ReelflowError` becomes a
//! `{error, message, timestamp, request_id, details?}` JSON body with the
//! status derived from the tag. The `request_id` field starts `null` here and
//! is filled in by `stamp_request_id` (`http/mod.rs`), which already has to
//! parse every error body to set the `x-request-id` response header.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use reelflow_core::ReelflowError;
use reelflow_core::types::ErrorCode;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

pub type WebResult<T> = core::result::Result<T, WebError>;

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Authentication => StatusCode::UNAUTHORIZED,
        ErrorCode::Authorization => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::ExternalService => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebError {
    #[serde(skip)]
    #[schema(ignore)]
    status: StatusCode,
    #[serde(skip)]
    #[schema(ignore)]
    retry_after_secs: Option<u64>,
    error: ErrorCode,
    message: String,
    timestamp: chrono::DateTime<Utc>,
    request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl WebError {
    /// `include_details` gates §7's "outside production only" rule; the
    /// caller (the error-mapping middleware) decides based on `AppEnvironment`.
    pub fn from_core(e: ReelflowError, request_id: Option<String>, include_details: bool) -> Self {
        Self {
            status: status_for(e.code),
            retry_after_secs: e.retry_after_secs,
            error: e.code,
            message: e.message,
            timestamp: Utc::now(),
            request_id,
            details: if include_details { e.details } else { None },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::from_core(ReelflowError::validation(message), None, false)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::from_core(ReelflowError::authentication(message), None, false)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_core(ReelflowError::not_found(message), None, false)
    }

    pub fn rate_limit(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::from_core(ReelflowError::rate_limit(message, retry_after_secs), None, false)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        let retry_after = self.retry_after_secs;
        let mut response = Json(self).into_response();
        *response.status_mut() = status;
        if let Some(secs) = retry_after {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, secs.into());
        }
        response
    }
}
