//! Provider Adapters (C1): a uniform interface over external
//! video-generation APIs, plus the registry that resolves a provider id to
//! its adapter (§4.1, §4.2 "resolves model-id -> provider").

pub mod mock;
pub mod veo;

use std::collections::HashMap;
use std::sync::Arc;

use reelflow_core::protocol::ProviderAdapter;
use reelflow_core::{ReelflowError, Result};

/// Registers every configured adapter under its provider id and resolves
/// by id. A process-wide singleton, assembled once at boot (A4).
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider_id().to_string(), adapter);
    }

    pub fn get(&self, provider_id: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned().ok_or_else(|| ReelflowError::not_found(format!("provider {provider_id} not configured")))
    }
}

/// Shared retry policy for adapter calls (§4.1): capped exponential backoff,
/// 3 attempts, 1s initial delay doubled each attempt, aborted on a
/// non-retryable (4xx-equivalent) error.
pub(crate) fn retry_policy() -> backon::ExponentialBuilder {
    backon::ExponentialBuilder::default()
        .with_min_delay(std::time::Duration::from_secs(1))
        .with_factor(2.0)
        .with_max_times(3)
}

/// An adapter's transport layer maps a failed call to `ServiceUnavailable`
/// when it's worth retrying (network error, 5xx) and to `ExternalService`
/// when it isn't (4xx — §4.1: "4xx responses are non-retryable").
pub(crate) fn is_retryable(e: &ReelflowError) -> bool {
    e.code == reelflow_core::types::ErrorCode::ServiceUnavailable
}
