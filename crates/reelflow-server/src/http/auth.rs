//! Authentication middleware (§4.8): resolves `userId` from a `Bearer`
//! credential and inserts it into request extensions for downstream
//! ownership checks. Shaped after the teacher's `WebAuth` (an
//! `AsyncAuthorizeRequest` with path include/exclude lists) but the
//! credential itself is opaque here — there is no external identity
//! provider to call out to, so the bearer token *is* the user id.

use axum::body::Body;
use futures::future::BoxFuture;
use http::{Request, Response, StatusCode, header::CONTENT_TYPE};
use tower_http::auth::AsyncAuthorizeRequest;

/// Resolved caller identity, inserted into request extensions on success.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
}

#[derive(Clone, Default)]
pub struct ReelflowAuth {
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl ReelflowAuth {
    /// `includes`: path prefixes that require auth. `excludes`: path
    /// prefixes that bypass it regardless (checked after `includes`).
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self { includes, excludes }
    }
}

fn unauthorized(message: impl Into<String>) -> Response<Body> {
    let body = serde_json::to_vec(&serde_json::json!({ "error": "authentication", "message": message.into() })).unwrap_or_default();
    Response::builder().status(StatusCode::UNAUTHORIZED).header(CONTENT_TYPE, "application/json; charset=utf-8").body(Body::from(body)).unwrap()
}

impl AsyncAuthorizeRequest<Body> for ReelflowAuth {
    type RequestBody = Body;
    type ResponseBody = Body;
    type Future = BoxFuture<'static, Result<Request<Body>, Response<Self::ResponseBody>>>;

    fn authorize(&mut self, request: Request<Self::RequestBody>) -> Self::Future {
        let path = request.uri().path().to_string();
        if self.excludes.iter().any(|excluded| path.starts_with(excluded)) {
            return Box::pin(async move { Ok(request) });
        }
        if !self.includes.iter().any(|included| path.starts_with(included)) {
            return Box::pin(async move { Ok(request) });
        }

        let token = request
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Box::pin(async move {
            let Some(user_id) = token else { return Err(unauthorized("missing or invalid Bearer credential")) };
            let (mut parts, body) = request.into_parts();
            parts.extensions.insert(AuthContext { user_id });
            Ok(Request::from_parts(parts, body))
        })
    }
}
