//! Deterministic in-memory adapter used by tests and local development
//! (§4.1: "a trivial reference adapter alongside the real one").

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use reelflow_core::protocol::provider::{CostEstimate, HealthStatus, PollResult, ProviderRequest, SubmitResult, ValidationResult, VideoResult};
use reelflow_core::protocol::ProviderAdapter;
use reelflow_core::types::OperationState;
use reelflow_core::{ReelflowError, Result};
use rust_decimal::Decimal;

#[derive(Clone, Copy, Debug)]
enum MockOutcome {
    Succeed,
    Fail,
}

struct MockOperation {
    outcome: MockOutcome,
    /// Number of `poll` calls before the operation reports done, letting
    /// tests exercise the "still working" path deterministically.
    polls_until_done: u32,
    polls_seen: u32,
}

/// Configurable, deterministic adapter: every `submit` starts an operation
/// that completes after a fixed number of polls, injected latency is a
/// `tokio::time::sleep`, and failure/success is decided up front from the
/// prompt text (prompts containing `"__fail__"` fail) so tests don't need
/// randomness.
pub struct MockAdapter {
    operations: DashMap<String, MockOperation>,
    next_id: AtomicU64,
    latency: Duration,
    cost_per_second: Decimal,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self { operations: DashMap::new(), next_id: AtomicU64::new(1), latency: Duration::ZERO, cost_per_second: Decimal::new(5, 2) }
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn validate(&self, request: &ProviderRequest) -> Result<ValidationResult> {
        if request.prompt.trim().is_empty() {
            return Ok(ValidationResult::invalid("prompt must not be empty"));
        }
        Ok(ValidationResult::ok())
    }

    async fn submit(&self, request: &ProviderRequest) -> Result<SubmitResult> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let operation_id = format!("mock-op-{id}");
        let outcome = if request.prompt.contains("__fail__") { MockOutcome::Fail } else { MockOutcome::Succeed };
        self.operations.insert(operation_id.clone(), MockOperation { outcome, polls_until_done: 2, polls_seen: 0 });
        Ok(SubmitResult { operation_id, status: OperationState::Pending })
    }

    async fn poll(&self, operation_id: &str) -> Result<PollResult> {
        let mut op = self
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| ReelflowError::not_found(format!("unknown mock operation {operation_id}")))?;
        op.polls_seen += 1;
        if op.polls_seen < op.polls_until_done {
            let progress = (100 * op.polls_seen / op.polls_until_done) as u8;
            return Ok(PollResult { status: OperationState::Processing, progress: Some(progress), result: None, error: None, estimated_completion: None });
        }
        match op.outcome {
            MockOutcome::Succeed => Ok(PollResult {
                status: OperationState::Completed,
                progress: Some(100),
                result: Some(VideoResult {
                    uri: format!("mock://videos/{operation_id}.mp4"),
                    duration_seconds: Some(5),
                    resolution: Some("1080p".to_string()),
                    file_size_bytes: Some(4),
                    thumbnail_uri: None,
                }),
                error: None,
                estimated_completion: None,
            }),
            MockOutcome::Fail => {
                Ok(PollResult { status: OperationState::Failed, progress: None, result: None, error: Some("mock provider failure".to_string()), estimated_completion: None })
            }
        }
    }

    async fn fetch_result(&self, operation_id: &str) -> Result<VideoResult> {
        match self.poll(operation_id).await?.result {
            Some(result) => Ok(result),
            None => Err(ReelflowError::conflict("operation has no result yet")),
        }
    }

    async fn cancel(&self, operation_id: &str) -> Result<()> {
        self.operations.remove(operation_id);
        Ok(())
    }

    async fn estimate_cost(&self, request: &ProviderRequest) -> Result<CostEstimate> {
        let duration = request.parameters.duration.unwrap_or(5);
        Ok(CostEstimate { cost: self.cost_per_second * Decimal::from(duration), currency: "USD".to_string() })
    }

    async fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> ProviderRequest {
        ProviderRequest { model_id: "mock-1".into(), prompt: prompt.into(), parameters: Default::default() }
    }

    #[tokio::test]
    async fn submit_then_poll_until_done_reports_completion() {
        let adapter = MockAdapter::new();
        let submitted = adapter.submit(&request("a cat on a skateboard")).await.unwrap();
        let first = adapter.poll(&submitted.operation_id).await.unwrap();
        assert_eq!(first.status, OperationState::Processing);
        let second = adapter.poll(&submitted.operation_id).await.unwrap();
        assert_eq!(second.status, OperationState::Completed);
        assert!(second.result.unwrap().uri.contains(&submitted.operation_id));
    }

    #[tokio::test]
    async fn prompt_marker_drives_deterministic_failure() {
        let adapter = MockAdapter::new();
        let submitted = adapter.submit(&request("__fail__ this one")).await.unwrap();
        adapter.poll(&submitted.operation_id).await.unwrap();
        let final_poll = adapter.poll(&submitted.operation_id).await.unwrap();
        assert_eq!(final_poll.status, OperationState::Failed);
    }
}
