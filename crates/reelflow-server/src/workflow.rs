//! Orchestration Workflow (C6): the multi-phase pipeline tying the Job
//! Store, Queue Manager, Model Registry, Provider Adapters, and Artifact
//! Store together (§4.6). The workflow itself owns no state; every
//! mutation goes through C4/C5.

use std::sync::Arc;

use reelflow_core::models::catalog::Model;
use reelflow_core::models::job::{ClarificationQuestion, ClarificationResponse, GenerationParameters, Job, JobErrorInfo, JobForCreate, JobId, JobResult};
use reelflow_core::protocol::provider::ProviderRequest;
use reelflow_core::types::{JobStatus, OperationState};
use reelflow_core::{ModelRegistry, ReelflowError, Result};

use crate::providers::ProviderRegistry;
use crate::settings::WorkflowSetting;
use crate::store::{ArtifactStore, JobStore, QueueManager};

/// Outcome of [`OrchestrationWorkflow::start`] (§4.6 phase 1, §6
/// `POST /api/generations`).
pub struct StartOutcome {
    pub job: Job,
    pub clarification_required: bool,
    pub clarification_questions: Vec<String>,
    pub queue_position: Option<usize>,
}

/// Outcome of [`OrchestrationWorkflow::process_generation`] (§4.6 phase 4).
pub enum ProcessOutcome {
    StillWorking { progress: Option<u8> },
    Completed(Job),
    Failed(Job),
    /// The job was already terminal; `process_generation` is idempotent for
    /// terminal jobs and this is a no-op (§4.6).
    AlreadyTerminal,
}

pub struct OrchestrationWorkflow {
    jobs: Arc<JobStore>,
    queue: Arc<QueueManager>,
    artifacts: Arc<ArtifactStore>,
    models: Arc<ModelRegistry>,
    providers: Arc<ProviderRegistry>,
    setting: WorkflowSetting,
}

/// Deterministic clarification-question generation (§4.6): triggered by
/// missing/ambiguous input, never by chance.
fn generate_clarification_questions(model: &Model, prompt: &str, parameters: &GenerationParameters) -> Vec<ClarificationQuestion> {
    let mut questions = Vec::new();
    if parameters.duration.is_none() {
        questions.push(format!("How long should the video be? (1-{} seconds)", model.capabilities.max_duration_sec));
    }
    if parameters.aspect_ratio.is_none() {
        questions.push(format!("What aspect ratio do you prefer? ({})", model.parameters.aspect_ratio.options.join(", ")));
    }
    if parameters.quality.is_none() {
        questions.push(format!("What quality level would you like? ({})", model.parameters.quality.options.join(", ")));
    }
    if prompt.trim().chars().count() < 20 {
        questions.push("Could you describe the scene in more detail?".to_string());
    }
    questions.into_iter().enumerate().map(|(id, question)| ClarificationQuestion { id, question, answer: None }).collect()
}

impl OrchestrationWorkflow {
    pub fn new(
        jobs: Arc<JobStore>,
        queue: Arc<QueueManager>,
        artifacts: Arc<ArtifactStore>,
        models: Arc<ModelRegistry>,
        providers: Arc<ProviderRegistry>,
        setting: WorkflowSetting,
    ) -> Self {
        Self { jobs, queue, artifacts, models, providers, setting }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    fn resolve_model(&self, model_id: Option<&str>) -> Result<Model> {
        match model_id {
            Some(id) => self.models.get(id).ok_or_else(|| ReelflowError::not_found(format!("model {id} not found"))),
            None => self.models.default_model(),
        }
    }

    /// §4.6 phase 1: resolves the model/provider, validates with the
    /// provider, estimates cost, creates the job, and (when clarifications
    /// are enabled) returns the generated question set.
    pub async fn start(&self, user_id: String, prompt: String, parameters: GenerationParameters, model_id: Option<&str>, priority: i32) -> Result<StartOutcome> {
        if !(3..=5000).contains(&prompt.chars().count()) {
            return Err(ReelflowError::validation("prompt must be between 3 and 5000 characters"));
        }
        if !(0..=10).contains(&priority) {
            return Err(ReelflowError::validation("priority must be between 0 and 10"));
        }
        let model = self.resolve_model(model_id)?;
        if !model.is_available {
            return Err(ReelflowError::service_unavailable(format!("model {} is not available", model.id)));
        }
        if let Some(violation) = model.validate_parameters(&parameters) {
            return Err(ReelflowError::validation(violation));
        }

        let provider = self.providers.get(&model.provider)?;
        let request = ProviderRequest { model_id: model.id.clone(), prompt: prompt.clone(), parameters: parameters.clone() };
        let validation = provider.validate(&request).await?;
        if !validation.valid {
            return Err(ReelflowError::validation(validation.error.unwrap_or_else(|| "request rejected by provider".to_string())).with_details(
                serde_json::json!({ "suggestions": validation.suggestions }),
            ));
        }

        let cost_estimate = provider.estimate_cost(&request).await?.cost;
        let job = self
            .jobs
            .create(JobForCreate {
                user_id,
                prompt: prompt.clone(),
                model_id: model.id.clone(),
                provider_id: model.provider.clone(),
                parameters: parameters.clone(),
                priority,
                max_retries: self.setting.max_retries,
                cost_estimate,
            })
            .await?;

        if !self.setting.enable_clarifications {
            let job = self.jobs.mark_queued(&job.id).await?;
            let position = self.queue.add_to_queue(job.id.clone(), job.priority).await?;
            return Ok(StartOutcome { job, clarification_required: false, clarification_questions: vec![], queue_position: Some(position) });
        }

        let questions = generate_clarification_questions(&model, &prompt, &parameters);
        if questions.is_empty() {
            let job = self.jobs.submit_clarification(&job.id, vec![]).await?;
            let job = self.jobs.mark_queued(&job.id).await?;
            let position = self.queue.add_to_queue(job.id.clone(), job.priority).await?;
            return Ok(StartOutcome { job, clarification_required: false, clarification_questions: vec![], queue_position: Some(position) });
        }

        let question_texts = questions.iter().map(|q| q.question.clone()).collect();
        Ok(StartOutcome { job, clarification_required: true, clarification_questions: question_texts, queue_position: None })
    }

    /// §4.6 phase 2: records the clarification answer(s) and transitions to
    /// `pending_confirmation`.
    pub async fn submit_clarification(&self, job_id: &JobId, response: ClarificationResponse) -> Result<Job> {
        if !(1..=2000).contains(&response.response.chars().count()) {
            return Err(ReelflowError::validation("clarification response must be between 1 and 2000 characters"));
        }
        let job = self.jobs.get(job_id).await?;
        let mut questions = job.clarification_questions.clone();
        match response.question_id {
            Some(id) => {
                if let Some(q) = questions.iter_mut().find(|q| q.id == id) {
                    q.answer = Some(response.response.clone());
                }
            }
            None => {
                for q in questions.iter_mut() {
                    q.answer = Some(response.response.clone());
                }
            }
        }
        self.jobs.submit_clarification(job_id, questions).await
    }

    /// §4.6 phase 3: rebuilds the canonical request, submits to the
    /// provider, stamps `operationId`, transitions to `active`, and
    /// re-adds the job to the queue carrying `operationId` implicitly
    /// (the job itself is the queue entry's payload).
    pub async fn confirm_generation(&self, job_id: &JobId) -> Result<Job> {
        let job = self.jobs.get(job_id).await?;
        let model = self.models.get(&job.model_id).ok_or_else(|| ReelflowError::not_found(format!("model {} not found", job.model_id)))?;
        let provider = self.providers.get(&job.provider_id)?;

        let mut parameters = job.parameters.clone();
        for q in &job.clarification_questions {
            apply_clarification_answer(&mut parameters, q);
        }

        let request = ProviderRequest { model_id: model.id.clone(), prompt: job.prompt.clone(), parameters };
        let submitted = provider.submit(&request).await?;
        let job = self.jobs.mark_active(job_id, submitted.operation_id).await?;
        self.queue.add_to_queue(job.id.clone(), job.priority).await?;
        Ok(job)
    }

    /// §4.6 phase 4, called from the worker loop. Safe to call repeatedly
    /// for the same job: terminal jobs are a no-op.
    pub async fn process_generation(&self, job_id: &JobId) -> Result<ProcessOutcome> {
        let job = self.jobs.get(job_id).await?;
        if job.status.is_terminal() {
            return Ok(ProcessOutcome::AlreadyTerminal);
        }
        let operation_id = job.operation_id.as_ref().ok_or_else(|| ReelflowError::conflict("job has no active operation to poll"))?;
        let provider = self.providers.get(&job.provider_id)?;
        let poll = provider.poll(operation_id).await?;

        match poll.status {
            OperationState::Pending | OperationState::Processing => {
                if let Some(progress) = poll.progress {
                    self.jobs.update_progress(job_id, progress).await?;
                }
                Ok(ProcessOutcome::StillWorking { progress: poll.progress })
            }
            OperationState::Completed => {
                let video = poll.result.ok_or_else(|| ReelflowError::external_service(job.provider_id.clone(), "completed operation missing result"))?;
                let bytes = download_provider_video(&video.uri).await?;
                let filename = format!("{job_id}.mp4");
                let artifact = self.artifacts.upload(&job.user_id, job_id, &filename, "video/mp4", bytes).await?;
                let video_url = self.artifacts.signed_url(&job.user_id, &artifact.id).await?;
                let result = JobResult {
                    video_url,
                    thumbnail_url: artifact.thumbnail_url.clone(),
                    duration_seconds: video.duration_seconds,
                    resolution: video.resolution,
                    file_size_bytes: Some(artifact.size_bytes),
                    format: Some("mp4".to_string()),
                };
                let job = self.jobs.complete(job_id, result).await?;
                self.queue.complete_job(job_id, None).await?;
                Ok(ProcessOutcome::Completed(job))
            }
            OperationState::Failed | OperationState::Cancelled => self.route_failure(&job, poll.error).await,
        }
    }

    /// Routes a provider-reported failure/cancellation through retry or
    /// terminal failure, per the retry bound in §4.4.
    async fn route_failure(&self, job: &Job, error_message: Option<String>) -> Result<ProcessOutcome> {
        let message = error_message.unwrap_or_else(|| "provider reported failure".to_string());
        let failed = self.jobs.fail(&job.id, JobErrorInfo::new(message)).await?;
        if failed.retry_count < failed.max_retries {
            let retried = self.jobs.retry(&job.id).await?;
            // The job is still leased in the queue's active set here; `fail_job`
            // atomically moves it back to pending rather than racing a separate
            // `add_to_queue` call against that still-held lease (`add_to_queue`
            // would reject it with `Conflict` since it's still active).
            self.queue.fail_job(&job.id, None, retried.status == JobStatus::Queued).await?;
            Ok(ProcessOutcome::Failed(retried))
        } else {
            self.queue.fail_job(&job.id, None, false).await?;
            Ok(ProcessOutcome::Failed(failed))
        }
    }

    /// §4.6 phase 5: provider cancellation is best-effort (failures are
    /// logged and swallowed — §9's flagged Open Question); the local cancel
    /// always commits.
    pub async fn cancel_generation(&self, job_id: &JobId) -> Result<Job> {
        let job = self.jobs.get(job_id).await?;
        if let Some(operation_id) = &job.operation_id
            && let Ok(provider) = self.providers.get(&job.provider_id)
            && let Err(e) = provider.cancel(operation_id).await
        {
            log::warn!("provider cancel failed for job {job_id}, proceeding with local cancel anyway: {e}");
        }
        let cancelled = self.jobs.cancel(job_id, JobErrorInfo::new("Generation was cancelled")).await?;
        self.queue.fail_job(job_id, None, false).await?;
        Ok(cancelled)
    }
}

/// Merges a clarification answer into the canonical parameter set, applying
/// the obvious field for each of the four deterministic question kinds
/// (§4.6). A free-text answer to a bundled ("answers everything") response
/// is parsed permissively: numeric-looking tokens become `duration`,
/// tokens containing `:` become `aspect_ratio`, the rest are tried against
/// the recognized quality vocabulary.
fn apply_clarification_answer(parameters: &mut GenerationParameters, question: &ClarificationQuestion) {
    let Some(answer) = &question.answer else { return };
    for token in answer.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
        if parameters.duration.is_none()
            && let Some(digits) = token.trim_end_matches('s').parse::<u32>().ok()
        {
            parameters.duration = Some(digits);
        } else if parameters.aspect_ratio.is_none() && token.contains(':') {
            parameters.aspect_ratio = Some(token.to_string());
        } else if parameters.quality.is_none() && matches!(token.to_lowercase().as_str(), "standard" | "high" | "low" | "premium" | "economy") {
            parameters.quality = Some(token.to_lowercase());
        }
    }
}

/// Downloads the provider's result video so it can be re-uploaded into the
/// durable Artifact Store (§4.6 "downloads bytes from the returned provider
/// URL"). The `mock://` scheme used by [`crate::providers::mock::MockAdapter`]
/// is handled locally since it names no real network resource.
async fn download_provider_video(uri: &str) -> Result<bytes::Bytes> {
    if let Some(rest) = uri.strip_prefix("mock://") {
        return Ok(bytes::Bytes::from(format!("mock-video-bytes:{rest}").into_bytes()));
    }
    let resp = reqwest::get(uri).await.map_err(|e| ReelflowError::external_service("provider", format!("video download failed: {e}")))?;
    resp.bytes().await.map_err(|e| ReelflowError::external_service("provider", format!("video download failed: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use opendal::{Operator, services};
    use reelflow_core::models::catalog::{ChoiceParameter, ModelCapabilities, ModelParameters, ModelPricing, PricingTier, RangeParameter};
    use rust_decimal::Decimal;

    use super::*;
    use crate::kv::InMemoryKv;
    use crate::providers::mock::MockAdapter;
    use crate::store::ArtifactStoreSettings;

    fn mock_model() -> Model {
        Model {
            id: "mock-1".into(),
            provider: "mock".into(),
            capabilities: ModelCapabilities {
                max_duration_sec: 30,
                aspect_ratios: vec!["16:9".into(), "9:16".into()],
                resolutions: vec!["1080p".into()],
                supports_audio: false,
                supports_image_input: false,
                supports_negative_prompt: true,
            },
            parameters: ModelParameters {
                duration: RangeParameter { min: 1, max: 30, default: 5 },
                aspect_ratio: ChoiceParameter { options: vec!["16:9".into(), "9:16".into()], default: "16:9".into() },
                quality: ChoiceParameter { options: vec!["standard".into(), "high".into()], default: "standard".into() },
                guidance_scale: None,
                inference_steps: None,
            },
            pricing: ModelPricing { cost_per_second: Decimal::new(5, 2), currency: "USD".into(), tier: PricingTier::Standard },
            is_available: true,
        }
    }

    fn workflow(enable_clarifications: bool) -> OrchestrationWorkflow {
        let kv = Arc::new(InMemoryKv::new());
        let jobs = Arc::new(JobStore::new(kv.clone(), enable_clarifications, 7));
        let queue = Arc::new(QueueManager::new(kv, None));
        let operator = Operator::new(services::Memory::default()).unwrap().finish();
        let artifacts = Arc::new(ArtifactStore::new(
            operator,
            ArtifactStoreSettings {
                max_file_size_bytes: 1024 * 1024,
                accepted_content_types: vec!["video/mp4".to_string()],
                thumbnail_generation_enabled: false,
                signed_url_ttl: Duration::from_secs(3600),
            },
        ));
        let models = Arc::new(ModelRegistry::new(vec![mock_model()], "mock-1"));
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockAdapter::new()));
        let providers = Arc::new(registry);
        let setting = WorkflowSetting { enable_clarifications, max_retries: 3, default_model_id: "mock-1".into() };
        OrchestrationWorkflow::new(jobs, queue, artifacts, models, providers, setting)
    }

    #[tokio::test]
    async fn start_with_full_parameters_skips_clarification() {
        let wf = workflow(true);
        let params = GenerationParameters { duration: Some(5), aspect_ratio: Some("16:9".into()), quality: Some("standard".into()), ..Default::default() };
        let outcome = wf.start("u1".into(), "a cat on a skateboard doing tricks".into(), params, None, 0).await.unwrap();
        assert!(!outcome.clarification_required);
        assert_eq!(outcome.job.status, JobStatus::Queued);
        assert_eq!(outcome.queue_position, Some(1));
    }

    #[tokio::test]
    async fn start_with_missing_parameters_asks_clarification_questions() {
        let wf = workflow(true);
        let outcome = wf.start("u1".into(), "scene".into(), GenerationParameters::default(), None, 0).await.unwrap();
        assert!(outcome.clarification_required);
        assert!(outcome.clarification_questions.iter().any(|q| q.contains("long")));
        assert!(outcome.clarification_questions.iter().any(|q| q.contains("aspect ratio")));
        assert!(outcome.clarification_questions.iter().any(|q| q.contains("quality")));
        assert!(outcome.clarification_questions.iter().any(|q| q.contains("detail")));
    }

    #[tokio::test]
    async fn short_prompt_is_rejected() {
        let wf = workflow(true);
        let err = wf.start("u1".into(), "hi".into(), GenerationParameters::default(), None, 0).await.unwrap_err();
        assert_eq!(err.code, reelflow_core::types::ErrorCode::Validation);
    }

    #[tokio::test]
    async fn full_happy_path_completes_and_produces_a_video_url() {
        let wf = workflow(false);
        let params = GenerationParameters { duration: Some(5), aspect_ratio: Some("16:9".into()), quality: Some("standard".into()), ..Default::default() };
        let outcome = wf.start("u1".into(), "a cat on a skateboard doing tricks".into(), params, None, 0).await.unwrap();
        let confirmed = wf.confirm_generation(&outcome.job.id).await.unwrap();
        assert_eq!(confirmed.status, JobStatus::Active);

        // MockAdapter completes after 2 polls.
        let first = wf.process_generation(&outcome.job.id).await.unwrap();
        assert!(matches!(first, ProcessOutcome::StillWorking { .. }));
        let second = wf.process_generation(&outcome.job.id).await.unwrap();
        match second {
            ProcessOutcome::Completed(job) => {
                assert_eq!(job.status, JobStatus::Completed);
                assert!(job.result.unwrap().video_url.len() > 0);
            }
            _ => panic!("expected completion"),
        }

        // process_generation is idempotent on terminal jobs.
        let third = wf.process_generation(&outcome.job.id).await.unwrap();
        assert!(matches!(third, ProcessOutcome::AlreadyTerminal));
    }

    #[tokio::test]
    async fn cancel_mid_flight_commits_locally_even_if_provider_cancel_fails() {
        let wf = workflow(false);
        let params = GenerationParameters { duration: Some(5), aspect_ratio: Some("16:9".into()), quality: Some("standard".into()), ..Default::default() };
        let outcome = wf.start("u1".into(), "a cat on a skateboard doing tricks".into(), params, None, 0).await.unwrap();
        wf.confirm_generation(&outcome.job.id).await.unwrap();
        let cancelled = wf.cancel_generation(&outcome.job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.error.unwrap().message, "Generation was cancelled");
    }

    #[tokio::test]
    async fn provider_failure_within_retry_budget_requeues_the_job() {
        let wf = workflow(false);
        let params = GenerationParameters { duration: Some(5), aspect_ratio: Some("16:9".into()), quality: Some("standard".into()), ..Default::default() };
        let outcome = wf.start("u1".into(), "__fail__ a cat on a skateboard".into(), params, None, 0).await.unwrap();
        wf.confirm_generation(&outcome.job.id).await.unwrap();

        // MockAdapter reports one "still working" poll before failing.
        wf.process_generation(&outcome.job.id).await.unwrap();
        let second = wf.process_generation(&outcome.job.id).await.unwrap();
        let retried = match second {
            ProcessOutcome::Failed(job) => job,
            _ => panic!("expected a retryable failure"),
        };
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.retry_count, 1);

        // The failed attempt must have fully vacated the active set: the
        // job is poppable again rather than leaked there forever.
        let popped = wf.queue().get_next_job(None).await.unwrap().expect("requeued job should be poppable");
        assert_eq!(popped.job_id, outcome.job.id);
    }
}
