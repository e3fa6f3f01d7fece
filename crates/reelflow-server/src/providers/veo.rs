//! Adapter for the Google/Veo family of long-running video generation
//! operations (§4.1).
//!
//! Per the spec's flagged open question (§9), only the long-running
//! operation path (`submit` -> `poll` until `done`) is treated as
//! normative; no speculative `validate-prompt`/`estimate-cost` auxiliary
//! endpoints are bound, since they do not match the documented operation
//! shape.

use std::time::Duration;

use reelflow_core::protocol::provider::{CostEstimate, HealthStatus, PollResult, ProviderRequest, SubmitResult, ValidationResult, VideoResult};
use reelflow_core::protocol::ProviderAdapter;
use reelflow_core::types::OperationState;
use reelflow_core::{ReelflowError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{is_retryable, retry_policy};

pub struct VeoAdapterSettings {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub default_cost_per_second: Decimal,
}

pub struct VeoAdapter {
    http: reqwest::Client,
    settings: VeoAdapterSettings,
}

/// The provider's wire shape for an operation, normalized from Veo's
/// long-running-operation envelope (§4.1).
#[derive(Debug, Deserialize)]
struct VeoOperation {
    done: bool,
    #[serde(default)]
    response: Option<VeoOperationResponse>,
    #[serde(default)]
    error: Option<VeoOperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoOperationResponse {
    #[serde(default)]
    generated_samples: Vec<VeoGeneratedSample>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoGeneratedSample {
    video: VeoVideo,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    thumbnail_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VeoVideo {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct VeoOperationError {
    message: String,
}

/// Maps the core's canonical parameter names onto Veo's wire vocabulary
/// (§4.1: `aspectRatio`, `negativePrompt`, `guidanceScale`,
/// `numInferenceSteps`, `seed`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoRequestBody<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_inference_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl VeoAdapter {
    pub fn new(settings: VeoAdapterSettings) -> Self {
        let http = reqwest::Client::builder().timeout(settings.request_timeout).build().expect("reqwest client builds with static config");
        Self { http, settings }
    }

    fn request_body(request: &ProviderRequest) -> VeoRequestBody<'_> {
        VeoRequestBody {
            prompt: &request.prompt,
            duration_seconds: request.parameters.duration,
            aspect_ratio: request.parameters.aspect_ratio.as_deref(),
            negative_prompt: request.parameters.negative_prompt.as_deref(),
            guidance_scale: request.parameters.guidance_scale,
            num_inference_steps: request.parameters.inference_steps,
            seed: request.parameters.seed,
        }
    }

    /// Sends one HTTP call and maps the outcome to the retryable/terminal
    /// split §4.1 requires: a received 4xx response is `ExternalService`
    /// (not retried); anything else failing to produce a response is
    /// `ServiceUnavailable` (retried by the caller).
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await.map_err(|e| ReelflowError::service_unavailable(format!("veo transport error: {e}")))?;
        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReelflowError::external_service("veo", format!("veo rejected request ({status}): {body}")));
        }
        if status.is_server_error() {
            return Err(ReelflowError::service_unavailable(format!("veo server error: {status}")));
        }
        Ok(resp)
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        use backon::Retryable;
        op.retry(retry_policy()).when(|e: &ReelflowError| is_retryable(e)).await
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for VeoAdapter {
    fn provider_id(&self) -> &str {
        "veo"
    }

    /// Veo has no real `validate-prompt` endpoint (§9's flagged open
    /// question); validation here is local and conservative: reject only
    /// what the model's own parameter bounds already reject (checked by the
    /// caller via `ModelRegistry`), so this always reports valid.
    async fn validate(&self, _request: &ProviderRequest) -> Result<ValidationResult> {
        Ok(ValidationResult::ok())
    }

    async fn submit(&self, request: &ProviderRequest) -> Result<SubmitResult> {
        let body = Self::request_body(request);
        let url = format!("{}/v1/models/{}:generateVideo", self.settings.base_url, request.model_id);
        let resp = self
            .with_retry(|| async {
                self.send(self.http.post(&url).bearer_auth(&self.settings.api_key).json(&body)).await
            })
            .await?;
        let parsed: serde_json::Value = resp.json().await.map_err(|e| ReelflowError::external_service("veo", format!("malformed submit response: {e}")))?;
        let operation_id = parsed
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ReelflowError::external_service("veo", "submit response missing operation name"))?;
        Ok(SubmitResult { operation_id: operation_id.to_string(), status: OperationState::Pending })
    }

    async fn poll(&self, operation_id: &str) -> Result<PollResult> {
        let url = format!("{}/v1/{}", self.settings.base_url, operation_id);
        let resp = self.with_retry(|| async { self.send(self.http.get(&url).bearer_auth(&self.settings.api_key)).await }).await?;
        let op: VeoOperation =
            resp.json().await.map_err(|e| ReelflowError::external_service("veo", format!("malformed poll response: {e}")))?;

        if !op.done {
            return Ok(PollResult { status: OperationState::Processing, progress: None, result: None, error: None, estimated_completion: None });
        }
        if let Some(err) = op.error {
            return Ok(PollResult { status: OperationState::Failed, progress: None, result: None, error: Some(err.message), estimated_completion: None });
        }
        let sample = op
            .response
            .and_then(|r| r.generated_samples.into_iter().next())
            .ok_or_else(|| ReelflowError::external_service("veo", "done operation missing generatedSamples[0]"))?;
        let result = VideoResult {
            uri: sample.video.uri,
            duration_seconds: sample.duration,
            resolution: sample.resolution,
            file_size_bytes: sample.file_size,
            thumbnail_uri: sample.thumbnail_uri,
        };
        Ok(PollResult { status: OperationState::Completed, progress: Some(100), result: Some(result), error: None, estimated_completion: None })
    }

    async fn fetch_result(&self, operation_id: &str) -> Result<VideoResult> {
        match self.poll(operation_id).await?.result {
            Some(result) => Ok(result),
            None => Err(ReelflowError::conflict("operation has no result yet")),
        }
    }

    async fn cancel(&self, operation_id: &str) -> Result<()> {
        let url = format!("{}/v1/{}:cancel", self.settings.base_url, operation_id);
        self.with_retry(|| async { self.send(self.http.post(&url).bearer_auth(&self.settings.api_key)).await }).await?;
        Ok(())
    }

    async fn estimate_cost(&self, request: &ProviderRequest) -> Result<CostEstimate> {
        let duration = request.parameters.duration.unwrap_or(5);
        Ok(CostEstimate { cost: self.settings.default_cost_per_second * Decimal::from(duration), currency: "USD".to_string() })
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}/v1/health", self.settings.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded),
            Err(_) => Ok(HealthStatus::Unreachable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_maps_canonical_names_to_veo_vocabulary() {
        let request = ProviderRequest {
            model_id: "veo-3".into(),
            prompt: "a cat on a skateboard".into(),
            parameters: reelflow_core::models::job::GenerationParameters {
                duration: Some(5),
                aspect_ratio: Some("16:9".into()),
                negative_prompt: Some("blurry".into()),
                guidance_scale: Some(7.5),
                inference_steps: Some(30),
                seed: Some(42),
                quality: None,
            },
        };
        let body = VeoAdapter::request_body(&request);
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["aspectRatio"], "16:9");
        assert_eq!(encoded["numInferenceSteps"], 30);
        assert_eq!(encoded["seed"], 42);
    }
}
