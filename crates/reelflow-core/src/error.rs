//! The core error type, tagged per the §7 taxonomy.
//!
//! Every fallible operation in this workspace returns `Result<T, ReelflowError>`.
//! The HTTP layer wraps this in `WebError` (in `reelflow-server`) to derive a
//! status code and a JSON body; nothing below this module knows about HTTP.

use serde::Serialize;
use serde_json::Value;

use crate::types::ErrorCode;

pub type Result<T> = std::result::Result<T, ReelflowError>;

#[derive(Debug, Clone, Serialize)]
pub struct ReelflowError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Set only for `ExternalService` errors; identifies which provider failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Set only for `RateLimit` errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl std::fmt::Display for ReelflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ReelflowError {}

impl ReelflowError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None, provider: None, retry_after_secs: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn rate_limit(message: impl Into<String>, retry_after_secs: u64) -> Self {
        let mut e = Self::new(ErrorCode::RateLimit, message);
        e.retry_after_secs = Some(retry_after_secs);
        e
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn external_service(provider: impl Into<String>, message: impl Into<String>) -> Self {
        let mut e = Self::new(ErrorCode::ExternalService, message);
        e.provider = Some(provider.into());
        e
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn is_transition_rejection(&self) -> bool {
        self.code == ErrorCode::Conflict
    }
}

impl From<serde_json::Error> for ReelflowError {
    fn from(e: serde_json::Error) -> Self {
        ReelflowError::internal(format!("json error: {e}"))
    }
}

impl From<std::io::Error> for ReelflowError {
    fn from(e: std::io::Error) -> Self {
        ReelflowError::internal(format!("io error: {e}"))
    }
}

impl From<config::ConfigError> for ReelflowError {
    fn from(e: config::ConfigError) -> Self {
        ReelflowError::internal(format!("config error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        let e = ReelflowError::rate_limit("too many requests", 42);
        assert_eq!(e.code, ErrorCode::RateLimit);
        assert_eq!(e.retry_after_secs, Some(42));
    }

    #[test]
    fn external_service_carries_provider_tag() {
        let e = ReelflowError::external_service("veo", "upstream 503");
        assert_eq!(e.provider.as_deref(), Some("veo"));
        assert_eq!(e.code, ErrorCode::ExternalService);
    }
}
