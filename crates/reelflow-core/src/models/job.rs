use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::JobStatus;

pub type JobId = String;

pub fn new_job_id() -> JobId {
    Uuid::now_v7().to_string()
}

/// The provider-agnostic parameter set a user (or a clarification round) may
/// supply. Keys are the core's canonical vocabulary; a provider adapter maps
/// these onto its own wire names (§4.1, §9 "dynamic parameter objects").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GenerationParameters {
    pub duration: Option<u32>,
    pub aspect_ratio: Option<String>,
    pub quality: Option<String>,
    pub negative_prompt: Option<String>,
    pub guidance_scale: Option<f64>,
    pub inference_steps: Option<u32>,
    pub seed: Option<i64>,
}

impl GenerationParameters {
    pub fn is_fully_specified(&self) -> bool {
        self.duration.is_some() && self.aspect_ratio.is_some() && self.quality.is_some()
    }

    /// Fills any field left unset by `self` from `other`, without overwriting
    /// anything already present. Used when merging clarification responses.
    pub fn merge(&mut self, other: GenerationParameters) {
        self.duration = self.duration.or(other.duration);
        self.aspect_ratio = self.aspect_ratio.or(other.aspect_ratio);
        self.quality = self.quality.or(other.quality);
        self.negative_prompt = self.negative_prompt.or(other.negative_prompt);
        self.guidance_scale = self.guidance_scale.or(other.guidance_scale);
        self.inference_steps = self.inference_steps.or(other.inference_steps);
        self.seed = self.seed.or(other.seed);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobResult {
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<u32>,
    pub resolution: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobErrorInfo {
    pub message: String,
    pub code: Option<String>,
}

impl JobErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None }
    }
}

/// A clarification question generated from missing/ambiguous input, paired
/// with the answer once supplied (§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClarificationQuestion {
    pub id: usize,
    pub question: String,
    pub answer: Option<String>,
}

/// The body of `POST /api/generations/:id/clarify` (§6, SPEC_FULL §3). When
/// `question_id` names a generated question it is answered individually;
/// otherwise the free-text response is treated as covering every open
/// question at once (e.g. "5s, 16:9, standard").
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClarificationResponse {
    pub response: String,
    pub question_id: Option<usize>,
}

/// The unit of work (§3). Field invariants are enforced by `JobStore`, not by
/// this type — a `Job` value constructed off the happy path (e.g. in a test)
/// is not guaranteed consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: JobId,
    pub user_id: String,
    pub prompt: String,
    pub model_id: String,
    pub provider_id: String,
    pub parameters: GenerationParameters,
    pub priority: i32,
    pub status: JobStatus,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub operation_id: Option<String>,
    pub cost_estimate: Decimal,
    pub result: Option<JobResult>,
    pub error: Option<JobErrorInfo>,
    pub clarification_questions: Vec<ClarificationQuestion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// §3 invariants (a)+(b)+(c)+(d), checked defensively wherever a `Job` is
    /// persisted. A violation here is a bug in the job store, not user input.
    pub fn check_invariants(&self) -> Result<(), String> {
        if (self.result.is_some()) != (self.status == JobStatus::Completed) {
            return Err("result must be set iff status = completed".into());
        }
        let error_expected = matches!(self.status, JobStatus::Failed | JobStatus::Cancelled);
        if self.error.is_some() != error_expected {
            return Err("error must be set iff status in {failed, cancelled}".into());
        }
        if self.retry_count > self.max_retries {
            return Err("retryCount must not exceed maxRetries".into());
        }
        Ok(())
    }
}

/// Parameters for `JobStore::create` (§4.4, §4.6 `start`).
#[derive(Debug, Clone)]
pub struct JobForCreate {
    pub user_id: String,
    pub prompt: String,
    pub model_id: String,
    pub provider_id: String,
    pub parameters: GenerationParameters,
    pub priority: i32,
    pub max_retries: u32,
    pub cost_estimate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> Job {
        Job {
            id: new_job_id(),
            user_id: "u1".into(),
            prompt: "a cat on a skateboard".into(),
            model_id: "veo-3".into(),
            provider_id: "veo".into(),
            parameters: GenerationParameters::default(),
            priority: 0,
            status: JobStatus::PendingClarification,
            progress: 0,
            retry_count: 0,
            max_retries: 3,
            operation_id: None,
            cost_estimate: Decimal::new(0, 0),
            result: None,
            error: None,
            clarification_questions: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
        }
    }

    #[test]
    fn invariants_hold_for_fresh_job() {
        assert!(base_job().check_invariants().is_ok());
    }

    #[test]
    fn completed_without_result_violates_invariant() {
        let mut j = base_job();
        j.status = JobStatus::Completed;
        assert!(j.check_invariants().is_err());
    }

    #[test]
    fn merge_does_not_overwrite_existing_values() {
        let mut p = GenerationParameters { duration: Some(5), ..Default::default() };
        p.merge(GenerationParameters { duration: Some(99), aspect_ratio: Some("16:9".into()), ..Default::default() });
        assert_eq!(p.duration, Some(5));
        assert_eq!(p.aspect_ratio, Some("16:9".into()));
    }
}
