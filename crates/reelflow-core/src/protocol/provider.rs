//! The uniform interface over external video-generation providers (§4.1).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Result;
use crate::models::job::GenerationParameters;
use crate::types::OperationState;

/// The canonical request shape an adapter maps onto its own wire vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderRequest {
    pub model_id: String,
    pub prompt: String,
    pub parameters: GenerationParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { valid: true, error: None, suggestions: vec![] }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self { valid: false, error: Some(error.into()), suggestions: vec![] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitResult {
    pub operation_id: String,
    pub status: OperationState,
}

/// The provider's video, normalized from whatever shape it actually returns
/// (e.g. Google/Veo's `generatedSamples[0].video`) — §4.1.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VideoResult {
    pub uri: String,
    pub duration_seconds: Option<u32>,
    pub resolution: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub thumbnail_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PollResult {
    pub status: OperationState,
    pub progress: Option<u8>,
    pub result: Option<VideoResult>,
    pub error: Option<String>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CostEstimate {
    pub cost: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unreachable,
}

/// Uniform interface over an external generation API (§4.1). Implementors
/// must not propagate raw transport errors: every `Err` is already a tagged
/// `ExternalService` or `ServiceUnavailable` `ReelflowError`, and retry/backoff
/// is the implementor's responsibility (capped exponential, 4xx non-retryable).
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider id this adapter implements (e.g. `"veo"`).
    fn provider_id(&self) -> &str;

    async fn validate(&self, request: &ProviderRequest) -> Result<ValidationResult>;
    async fn submit(&self, request: &ProviderRequest) -> Result<SubmitResult>;
    async fn poll(&self, operation_id: &str) -> Result<PollResult>;
    async fn fetch_result(&self, operation_id: &str) -> Result<VideoResult>;
    async fn cancel(&self, operation_id: &str) -> Result<()>;
    async fn estimate_cost(&self, request: &ProviderRequest) -> Result<CostEstimate>;
    async fn health(&self) -> Result<HealthStatus>;
}
