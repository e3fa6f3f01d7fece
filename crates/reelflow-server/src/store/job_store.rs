//! Job Store (C4): per-job state with guarded transitions, progress updates,
//! history, retry, cancel, retention cleanup (§4.4).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use reelflow_core::models::history::JobHistoryEntry;
use reelflow_core::models::job::{ClarificationQuestion, Job, JobErrorInfo, JobForCreate, JobId, JobResult, new_job_id};
use reelflow_core::types::{HistoryAction, JobStatus};
use reelflow_core::{ReelflowError, Result};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::kv::{KvStore, keys};

pub struct JobStore {
    kv: Arc<dyn KvStore>,
    locks: DashMap<JobId, Arc<AsyncMutex<()>>>,
    enable_clarifications: bool,
    retention_days: i64,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KvStore>, enable_clarifications: bool, retention_days: i64) -> Self {
        Self { kv, locks: DashMap::new(), enable_clarifications, retention_days }
    }

    fn lock_for(&self, job_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks.entry(job_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>> {
        match self.kv.get(&keys::job(job_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, job: &Job) -> Result<()> {
        self.kv.set(&keys::job(&job.id), &serde_json::to_string(job)?).await?;
        self.kv.set_add(keys::jobs_index(), &job.id).await
    }

    async fn append_history(&self, job_id: &str, action: HistoryAction, message: Option<String>, data: Option<Value>) -> Result<()> {
        let seq = self.kv.incr(&keys::history_seq(job_id)).await?;
        let entry = JobHistoryEntry { id: seq as u64, job_id: job_id.to_string(), action, timestamp: Utc::now(), data, message };
        self.kv.set(&keys::history_entry(job_id, seq), &serde_json::to_string(&entry)?).await
    }

    pub async fn get(&self, job_id: &str) -> Result<Job> {
        self.load(job_id).await?.ok_or_else(|| ReelflowError::not_found(format!("job {job_id} not found")))
    }

    pub async fn history(&self, job_id: &str) -> Result<Vec<JobHistoryEntry>> {
        let seq: i64 = self.kv.get(&keys::history_seq(job_id)).await?.and_then(|s| s.parse().ok()).unwrap_or(0);
        let mut out = Vec::with_capacity(seq.max(0) as usize);
        for s in 1..=seq {
            if let Some(raw) = self.kv.get(&keys::history_entry(job_id, s)).await? {
                out.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(out)
    }

    /// §4.6 `start`: always lands in `pending_clarification`, the literal
    /// initial status (§4.4's `*initial*` row).
    pub async fn create(&self, fc: JobForCreate) -> Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: new_job_id(),
            user_id: fc.user_id,
            prompt: fc.prompt,
            model_id: fc.model_id,
            provider_id: fc.provider_id,
            parameters: fc.parameters,
            priority: fc.priority,
            status: JobStatus::PendingClarification,
            progress: 0,
            retry_count: 0,
            max_retries: fc.max_retries,
            operation_id: None,
            cost_estimate: fc.cost_estimate,
            result: None,
            error: None,
            clarification_questions: vec![],
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
        };
        self.save(&job).await?;
        self.append_history(&job.id, HistoryAction::Created, None, None).await?;
        Ok(job)
    }

    /// Generic guarded transition (§4.4). `mutate` applies transition-specific
    /// field changes (operation id, result, error, …) before the job is saved.
    async fn transition<F>(&self, job_id: &str, to: JobStatus, action: HistoryAction, message: Option<String>, mutate: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        let mut job = self.load(job_id).await?.ok_or_else(|| ReelflowError::not_found(format!("job {job_id} not found")))?;
        if !JobStatus::is_valid_transition(job.status, to) {
            return Err(ReelflowError::conflict(format!("invalid transition {} -> {} for job {job_id}", job.status, to)));
        }
        let now = Utc::now();
        job.status = to;
        job.updated_at = now;
        match to {
            JobStatus::Active if job.started_at.is_none() => job.started_at = Some(now),
            JobStatus::Completed => job.completed_at = Some(now),
            JobStatus::Failed => job.failed_at = Some(now),
            _ => {}
        }
        mutate(&mut job);
        self.save(&job).await?;
        self.append_history(job_id, action, message, None).await?;
        Ok(job)
    }

    pub async fn submit_clarification(&self, job_id: &str, questions: Vec<ClarificationQuestion>) -> Result<Job> {
        self.transition(job_id, JobStatus::PendingConfirmation, HistoryAction::Progress, Some("clarification submitted".into()), |job| {
            job.clarification_questions = questions;
        })
        .await
    }

    /// `confirmGeneration` dispatch step (§4.6 phase 3): moves into `active`
    /// and stamps the provider's `operationId`.
    pub async fn mark_active(&self, job_id: &str, operation_id: String) -> Result<Job> {
        self.transition(job_id, JobStatus::Active, HistoryAction::Started, None, |job| {
            job.operation_id = Some(operation_id);
        })
        .await
    }

    /// Used when `confirmGeneration` re-queues the job instead of dispatching
    /// directly (e.g. before a worker picks it up).
    pub async fn mark_queued(&self, job_id: &str) -> Result<Job> {
        self.transition(job_id, JobStatus::Queued, HistoryAction::Progress, Some("queued".into()), |_| {}).await
    }

    /// Progress updates are accepted only while `active`; they do not
    /// transition state (§4.4).
    pub async fn update_progress(&self, job_id: &str, progress: u8) -> Result<Job> {
        if progress > 100 {
            return Err(ReelflowError::validation("progress must be between 0 and 100"));
        }
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;
        let mut job = self.load(job_id).await?.ok_or_else(|| ReelflowError::not_found(format!("job {job_id} not found")))?;
        if job.status != JobStatus::Active {
            return Err(ReelflowError::conflict("progress can only be updated while active"));
        }
        job.progress = progress;
        job.updated_at = Utc::now();
        self.save(&job).await?;
        self.append_history(job_id, HistoryAction::Progress, None, Some(serde_json::json!({ "progress": progress }))).await?;
        Ok(job)
    }

    pub async fn complete(&self, job_id: &str, result: JobResult) -> Result<Job> {
        self.transition(job_id, JobStatus::Completed, HistoryAction::Completed, None, |job| {
            job.progress = 100;
            job.result = Some(result);
        })
        .await
    }

    pub async fn fail(&self, job_id: &str, error: JobErrorInfo) -> Result<Job> {
        self.transition(job_id, JobStatus::Failed, HistoryAction::Failed, Some(error.message.clone()), |job| {
            job.error = Some(error);
        })
        .await
    }

    pub async fn cancel(&self, job_id: &str, error: JobErrorInfo) -> Result<Job> {
        self.transition(job_id, JobStatus::Cancelled, HistoryAction::Cancelled, Some(error.message.clone()), |job| {
            job.error = Some(error);
        })
        .await
    }

    /// §4.4 `retry`: requires `failed` and `retryCount < maxRetries`. The
    /// transition table only allows `failed -> retrying -> {queued,
    /// pending_clarification}`, so this hops through `retrying` rather than
    /// landing on the target directly. Per §9's Open-Question pick, the
    /// final hop lands in `queued` directly (skipping `pending_clarification`)
    /// when clarifications are disabled.
    pub async fn retry(&self, job_id: &str) -> Result<Job> {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;
        let job = self.load(job_id).await?.ok_or_else(|| ReelflowError::not_found(format!("job {job_id} not found")))?;
        if job.status != JobStatus::Failed {
            return Err(ReelflowError::conflict("retry requires a failed job"));
        }
        if job.retry_count >= job.max_retries {
            return Err(ReelflowError::conflict("retry limit reached"));
        }
        let target = if self.enable_clarifications { JobStatus::PendingClarification } else { JobStatus::Queued };
        drop(_guard);
        self.transition(job_id, JobStatus::Retrying, HistoryAction::Retried, None, |job| {
            job.retry_count += 1;
            job.error = None;
            job.failed_at = None;
            job.progress = 0;
        })
        .await?;
        self.transition(job_id, target, HistoryAction::Retried, None, |_| {}).await
    }

    /// Cleanup walks jobs whose status is terminal (or otherwise retired) and
    /// whose last relevant timestamp is older than the configured retention;
    /// removes the job and its history together (§4.4).
    pub async fn cleanup(&self, retention_days: Option<i64>) -> Result<usize> {
        let retention = chrono::Duration::days(retention_days.unwrap_or(self.retention_days));
        let cutoff = Utc::now() - retention;
        let mut removed = 0usize;
        for job_id in self.kv.set_members(keys::jobs_index()).await? {
            let Some(job) = self.load(&job_id).await? else { continue };
            let last_relevant = job.completed_at.or(job.failed_at).or(Some(job.updated_at));
            let is_retired = matches!(job.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled);
            if is_retired && last_relevant.map(|t| t < cutoff).unwrap_or(false) {
                let seq: i64 = self.kv.get(&keys::history_seq(&job_id)).await?.and_then(|s| s.parse().ok()).unwrap_or(0);
                for s in 1..=seq {
                    self.kv.delete(&keys::history_entry(&job_id, s)).await?;
                }
                self.kv.delete(&keys::history_seq(&job_id)).await?;
                self.kv.delete(&keys::job(&job_id)).await?;
                self.kv.set_remove(keys::jobs_index(), &job_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reelflow_core::models::job::GenerationParameters;
    use rust_decimal::Decimal;

    use super::*;
    use crate::kv::InMemoryKv;

    fn store(enable_clarifications: bool) -> JobStore {
        JobStore::new(Arc::new(InMemoryKv::new()), enable_clarifications, 7)
    }

    fn create_args() -> JobForCreate {
        JobForCreate {
            user_id: "u1".into(),
            prompt: "a cat on a skateboard".into(),
            model_id: "veo-3".into(),
            provider_id: "veo".into(),
            parameters: GenerationParameters::default(),
            priority: 0,
            max_retries: 3,
            cost_estimate: Decimal::new(0, 0),
        }
    }

    #[tokio::test]
    async fn create_lands_in_pending_clarification() {
        let store = store(true);
        let job = store.create(create_args()).await.unwrap();
        assert_eq!(job.status, JobStatus::PendingClarification);
        let history = store.history(&job.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_as_conflict() {
        let store = store(true);
        let job = store.create(create_args()).await.unwrap();
        let err = store.complete(&job.id, JobResult {
            video_url: "https://x/v.mp4".into(),
            thumbnail_url: None,
            duration_seconds: None,
            resolution: None,
            file_size_bytes: None,
            format: None,
        }).await.unwrap_err();
        assert!(err.is_transition_rejection());
    }

    #[tokio::test]
    async fn progress_requires_active_and_bounded_value() {
        let store = store(true);
        let job = store.create(create_args()).await.unwrap();
        assert!(store.update_progress(&job.id, 50).await.is_err());
        let active = store.mark_active(&job.id, "op-1".into()).await.unwrap();
        assert_eq!(active.status, JobStatus::Active);
        assert!(store.update_progress(&job.id, 101).await.is_err());
        let updated = store.update_progress(&job.id, 50).await.unwrap();
        assert_eq!(updated.progress, 50);
    }

    #[tokio::test]
    async fn retry_respects_max_retries_and_disabled_clarifications() {
        let store = store(false);
        let job = store.create(create_args()).await.unwrap();
        store.mark_active(&job.id, "op-1".into()).await.unwrap();
        store.fail(&job.id, JobErrorInfo::new("transient")).await.unwrap();
        let retried = store.retry(&job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_stops_at_max_retries() {
        let store = store(false);
        let job = store.create(create_args()).await.unwrap();
        // Drive three fail -> retry cycles: retry_count reaches max_retries (3).
        for _ in 0..3 {
            store.mark_active(&job.id, "op".into()).await.unwrap();
            store.fail(&job.id, JobErrorInfo::new("boom")).await.unwrap();
            store.retry(&job.id).await.unwrap();
        }
        let final_job = store.get(&job.id).await.unwrap();
        assert_eq!(final_job.retry_count, 3);
        assert_eq!(final_job.status, JobStatus::Queued);

        // One more fail at the retry limit must be rejected.
        store.mark_active(&job.id, "op".into()).await.unwrap();
        store.fail(&job.id, JobErrorInfo::new("boom again")).await.unwrap();
        let err = store.retry(&job.id).await.unwrap_err();
        assert!(err.is_transition_rejection());
    }
}
