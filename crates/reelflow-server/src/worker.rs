//! Worker Runtime (C7): the heartbeat loop and processing loop that turn
//! queued jobs into provider calls (§4.7). One `WorkerRuntime` owns one
//! registered worker id; several can run in the same process (each with its
//! own id) or across processes sharing the same KV/queue backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mea::shutdown::ShutdownRecv;
use reelflow_core::models::job::JobId;
use reelflow_core::models::worker::{Worker, WorkerId};
use tokio::sync::Mutex as AsyncMutex;

use crate::store::QueueManager;
use crate::workflow::{OrchestrationWorkflow, ProcessOutcome};

pub struct WorkerRuntimeSetting {
    pub name: String,
    pub capabilities: Vec<String>,
    pub max_concurrency: u32,
    pub poll_interval: Duration,
}

/// Owns one registered worker's lifecycle: register -> heartbeat (every 30s,
/// 5s backoff on a failed heartbeat) + claim-and-process loop, bounded by
/// `max_concurrency` in-flight jobs, until `shutdown_rx` fires.
pub struct WorkerRuntime {
    worker_id: WorkerId,
    queue: Arc<QueueManager>,
    workflow: Arc<OrchestrationWorkflow>,
    setting: WorkerRuntimeSetting,
    in_flight: AsyncMutex<HashSet<JobId>>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
/// How long a `process_generation` step sleeps between polls of a single
/// in-flight job while it is still working.
const STEP_POLL_INTERVAL: Duration = Duration::from_secs(3);

impl WorkerRuntime {
    pub async fn register(queue: Arc<QueueManager>, workflow: Arc<OrchestrationWorkflow>, setting: WorkerRuntimeSetting) -> reelflow_core::Result<Arc<Self>> {
        let worker_id = reelflow_core::models::job::new_job_id();
        let worker = Worker::new(worker_id.clone(), setting.name.clone(), setting.capabilities.clone(), setting.max_concurrency);
        queue.register_worker(worker).await?;
        Ok(Arc::new(Self { worker_id, queue, workflow, setting, in_flight: AsyncMutex::new(HashSet::new()) }))
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Spawns the heartbeat and processing loops; returns their join handles
    /// so the caller (A4) can await them during shutdown.
    pub fn spawn(self: Arc<Self>, shutdown_rx: ShutdownRecv) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop(shutdown_rx.clone()));
        let processing = tokio::spawn(self.clone().processing_loop(shutdown_rx));
        (heartbeat, processing)
    }

    async fn heartbeat_loop(self: Arc<Self>, shutdown_rx: ShutdownRecv) {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.queue.update_worker_heartbeat(&self.worker_id).await {
                        log::warn!("worker {} heartbeat failed, retrying shortly: {e}", self.worker_id);
                        tokio::time::sleep(HEARTBEAT_RETRY_BACKOFF).await;
                    }
                }
                _ = shutdown_rx.is_shutdown() => {
                    log::info!("worker {} heartbeat loop shutting down", self.worker_id);
                    break;
                }
            }
        }
    }

    async fn processing_loop(self: Arc<Self>, shutdown_rx: ShutdownRecv) {
        let mut ticker = tokio::time::interval(self.setting.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().claim_up_to_capacity().await;
                }
                _ = shutdown_rx.is_shutdown() => {
                    log::info!("worker {} processing loop shutting down, interrupting in-flight jobs", self.worker_id);
                    self.interrupt_in_flight().await;
                    break;
                }
            }
        }
    }

    /// Claims as many pending jobs as this worker has free capacity for and
    /// spawns one driver task per claimed job (§4.7 "bounded by
    /// maxConcurrency").
    async fn claim_up_to_capacity(self: Arc<Self>) {
        loop {
            let free = {
                let in_flight = self.in_flight.lock().await;
                (self.setting.max_concurrency as usize).saturating_sub(in_flight.len())
            };
            if free == 0 {
                return;
            }
            let Ok(Some(entry)) = self.queue.get_next_job(Some(&self.worker_id)).await else { return };
            let job_id = entry.job_id.clone();
            self.in_flight.lock().await.insert(job_id.clone());
            let this = self.clone();
            tokio::spawn(async move {
                this.drive_job(job_id.clone()).await;
                this.in_flight.lock().await.remove(&job_id);
            });
        }
    }

    /// Repeatedly steps a single claimed job's operation until it reaches a
    /// terminal outcome, sleeping between polls (§4.6 phase 4 loop).
    async fn drive_job(&self, job_id: JobId) {
        loop {
            match self.workflow.process_generation(&job_id).await {
                Ok(ProcessOutcome::StillWorking { .. }) => {
                    tokio::time::sleep(STEP_POLL_INTERVAL).await;
                }
                Ok(ProcessOutcome::Completed(_)) | Ok(ProcessOutcome::Failed(_)) | Ok(ProcessOutcome::AlreadyTerminal) => {
                    return;
                }
                Err(e) => {
                    log::warn!("worker {} failed to process job {job_id}: {e}", self.worker_id);
                    return;
                }
            }
        }
    }

    /// Graceful-shutdown path: rather than leave claimed jobs for
    /// `cleanup_inactive_workers` to discover once this worker's heartbeat
    /// goes stale, fail them immediately with a `"worker stopping"` message
    /// and retry them onto the queue for another worker to pick up.
    async fn interrupt_in_flight(&self) {
        let job_ids: Vec<JobId> = self.in_flight.lock().await.iter().cloned().collect();
        for job_id in job_ids {
            let job = match self.workflow.jobs().get(&job_id).await {
                Ok(job) => job,
                Err(_) => continue,
            };
            if job.status.is_terminal() {
                continue;
            }
            if self
                .workflow
                .jobs()
                .fail(&job_id, reelflow_core::models::job::JobErrorInfo::new("worker stopping"))
                .await
                .is_err()
            {
                continue;
            }
            let should_retry = job.retry_count < job.max_retries
                && self.workflow.jobs().retry(&job_id).await.is_ok_and(|retried| retried.status == reelflow_core::types::JobStatus::Queued);
            // The job is still leased in this worker's active-set entry here;
            // `fail_job` atomically requeues it to pending rather than racing a
            // separate `add_to_queue` call against that still-held lease.
            let _ = self.queue.fail_job(&job_id, Some(&self.worker_id), should_retry).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use opendal::{Operator, services};
    use reelflow_core::ModelRegistry;
    use reelflow_core::models::catalog::{ChoiceParameter, Model, ModelCapabilities, ModelParameters, ModelPricing, PricingTier, RangeParameter};
    use reelflow_core::models::job::GenerationParameters;
    use reelflow_core::types::JobStatus;
    use rust_decimal::Decimal;

    use super::*;
    use crate::kv::InMemoryKv;
    use crate::providers::ProviderRegistry;
    use crate::providers::mock::MockAdapter;
    use crate::settings::WorkflowSetting;
    use crate::store::{ArtifactStore, ArtifactStoreSettings, JobStore};

    fn mock_model() -> Model {
        Model {
            id: "mock-1".into(),
            provider: "mock".into(),
            capabilities: ModelCapabilities {
                max_duration_sec: 30,
                aspect_ratios: vec!["16:9".into()],
                resolutions: vec!["1080p".into()],
                supports_audio: false,
                supports_image_input: false,
                supports_negative_prompt: true,
            },
            parameters: ModelParameters {
                duration: RangeParameter { min: 1, max: 30, default: 5 },
                aspect_ratio: ChoiceParameter { options: vec!["16:9".into()], default: "16:9".into() },
                quality: ChoiceParameter { options: vec!["standard".into()], default: "standard".into() },
                guidance_scale: None,
                inference_steps: None,
            },
            pricing: ModelPricing { cost_per_second: Decimal::new(5, 2), currency: "USD".into(), tier: PricingTier::Standard },
            is_available: true,
        }
    }

    async fn workflow() -> Arc<OrchestrationWorkflow> {
        let kv = Arc::new(InMemoryKv::new());
        let jobs = Arc::new(JobStore::new(kv.clone(), false, 7));
        let queue = Arc::new(QueueManager::new(kv, None));
        let operator = Operator::new(services::Memory::default()).unwrap().finish();
        let artifacts = Arc::new(ArtifactStore::new(
            operator,
            ArtifactStoreSettings { max_file_size_bytes: 1024 * 1024, accepted_content_types: vec!["video/mp4".into()], thumbnail_generation_enabled: false, signed_url_ttl: Duration::from_secs(3600) },
        ));
        let models = Arc::new(ModelRegistry::new(vec![mock_model()], "mock-1"));
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockAdapter::new()));
        let setting = WorkflowSetting { enable_clarifications: false, max_retries: 3, default_model_id: "mock-1".into() };
        Arc::new(OrchestrationWorkflow::new(jobs, queue, artifacts, models, Arc::new(registry), setting))
    }

    #[tokio::test]
    async fn worker_claims_and_drives_a_queued_job_to_completion() {
        let workflow = workflow().await;
        let queue = workflow.queue().clone();
        let runtime = WorkerRuntime::register(
            queue.clone(),
            workflow.clone(),
            WorkerRuntimeSetting { name: "w1".into(), capabilities: vec![], max_concurrency: 2, poll_interval: Duration::from_millis(10) },
        )
        .await
        .unwrap();

        let params = GenerationParameters { duration: Some(5), aspect_ratio: Some("16:9".into()), quality: Some("standard".into()), ..Default::default() };
        let outcome = workflow.start("u1".into(), "a cat on a skateboard doing tricks".into(), params, None, 0).await.unwrap();
        workflow.confirm_generation(&outcome.job.id).await.unwrap();

        runtime.clone().claim_up_to_capacity().await;
        assert!(runtime.in_flight.lock().await.contains(&outcome.job.id));
        runtime.drive_job(outcome.job.id.clone()).await;

        let job = workflow.jobs().get(&outcome.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn shutdown_requeues_in_flight_jobs_instead_of_orphaning_them() {
        let workflow = workflow().await;
        let queue = workflow.queue().clone();
        let runtime = WorkerRuntime::register(
            queue.clone(),
            workflow.clone(),
            WorkerRuntimeSetting { name: "w1".into(), capabilities: vec![], max_concurrency: 2, poll_interval: Duration::from_millis(10) },
        )
        .await
        .unwrap();

        let params = GenerationParameters { duration: Some(5), aspect_ratio: Some("16:9".into()), quality: Some("standard".into()), ..Default::default() };
        let outcome = workflow.start("u1".into(), "a cat on a skateboard doing tricks".into(), params, None, 0).await.unwrap();
        workflow.confirm_generation(&outcome.job.id).await.unwrap();

        runtime.clone().claim_up_to_capacity().await;
        assert!(runtime.in_flight.lock().await.contains(&outcome.job.id));

        runtime.interrupt_in_flight().await;

        let job = workflow.jobs().get(&outcome.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);

        // The interrupted job must have fully vacated the queue's active set:
        // it's poppable again rather than orphaned there forever.
        let popped = queue.get_next_job(None).await.unwrap().expect("requeued job should be poppable");
        assert_eq!(popped.job_id, outcome.job.id);
    }
}
