//! Queue Manager (C5): a single global priority queue of ready jobs, an
//! active set, and a worker registry — persisted so restarts recover both
//! (§4.5).

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use reelflow_core::models::job::JobId;
use reelflow_core::models::queue::QueueEntry;
use reelflow_core::models::worker::{Worker, WorkerId};
use reelflow_core::types::QueueEntryStatus;
use reelflow_core::{ReelflowError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::kv::{KvStore, keys};

#[derive(Debug, Serialize, Deserialize)]
struct QueueSnapshot {
    pending: Vec<QueueEntry>,
    active: Vec<QueueEntry>,
    paused: bool,
}

struct Inner {
    pending: BinaryHeap<QueueEntry>,
    active: HashMap<JobId, QueueEntry>,
    workers: HashMap<WorkerId, Worker>,
    paused: bool,
}

pub struct QueueStatus {
    pub is_paused: bool,
    pub queue_length: usize,
    pub active_jobs: usize,
    pub worker_count: usize,
}

pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub delayed: usize,
    pub total_processed: u64,
    pub avg_processing_time_ms: u64,
}

pub struct QueueManager {
    kv: Arc<dyn KvStore>,
    inner: AsyncMutex<Inner>,
    bounded_capacity: Option<usize>,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_processing_ms: AtomicU64,
}

impl QueueManager {
    pub fn new(kv: Arc<dyn KvStore>, bounded_capacity: Option<usize>) -> Self {
        Self {
            kv,
            inner: AsyncMutex::new(Inner { pending: BinaryHeap::new(), active: HashMap::new(), workers: HashMap::new(), paused: false }),
            bounded_capacity,
            total_completed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_processing_ms: AtomicU64::new(0),
        }
    }

    /// Reconstructs queue/active/worker state from the KV store on boot.
    pub async fn restore(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if let Some(raw) = self.kv.get(keys::queue_state()).await? {
            let snapshot: QueueSnapshot = serde_json::from_str(&raw)?;
            guard.pending = snapshot.pending.into_iter().collect();
            guard.active = snapshot.active.into_iter().map(|e| (e.job_id.clone(), e)).collect();
            guard.paused = snapshot.paused;
        }
        for worker_id in self.kv.set_members(keys::workers_index()).await? {
            if let Some(raw) = self.kv.get(&keys::worker(&worker_id)).await? {
                let worker: Worker = serde_json::from_str(&raw)?;
                guard.workers.insert(worker_id, worker);
            }
        }
        Ok(())
    }

    async fn persist_queue(&self, guard: &Inner) -> Result<()> {
        let snapshot = QueueSnapshot {
            pending: guard.pending.iter().cloned().collect(),
            active: guard.active.values().cloned().collect(),
            paused: guard.paused,
        };
        self.kv.set(keys::queue_state(), &serde_json::to_string(&snapshot)?).await
    }

    async fn persist_worker(&self, worker: &Worker) -> Result<()> {
        self.kv.set(&keys::worker(&worker.id), &serde_json::to_string(worker)?).await?;
        self.kv.set_add(keys::workers_index(), &worker.id).await
    }

    /// `addToQueue`: rejects if paused, already present, or the (bounded)
    /// queue is full. Returns the 1-based queue position.
    pub async fn add_to_queue(&self, job_id: JobId, priority: i32) -> Result<usize> {
        let mut guard = self.inner.lock().await;
        if guard.paused {
            return Err(ReelflowError::service_unavailable("queue is paused"));
        }
        if guard.active.contains_key(&job_id) || guard.pending.iter().any(|e| e.job_id == job_id) {
            return Err(ReelflowError::conflict(format!("job {job_id} is already queued or active")));
        }
        if let Some(cap) = self.bounded_capacity
            && guard.pending.len() >= cap
        {
            return Err(ReelflowError::service_unavailable("queue is full"));
        }
        let entry = QueueEntry::new(job_id.clone(), priority, Utc::now());
        guard.pending.push(entry);
        // `BinaryHeap::Ord` ranks "pops first" as greatest; sort descending to
        // find this job's 1-based lease rank among all pending entries.
        let mut ranked: Vec<&QueueEntry> = guard.pending.iter().collect();
        ranked.sort_by(|a, b| b.cmp(a));
        let position = ranked.iter().position(|e| e.job_id == job_id).map(|i| i + 1).unwrap_or(ranked.len());
        self.persist_queue(&guard).await?;
        Ok(position)
    }

    /// `getNextJob`: returns the highest-priority pending entry, moving it to
    /// the active set. Empty (not error) when the queue is empty or paused.
    pub async fn get_next_job(&self, worker_id: Option<&str>) -> Result<Option<QueueEntry>> {
        let mut guard = self.inner.lock().await;
        if guard.paused {
            return Ok(None);
        }
        let Some(mut entry) = guard.pending.pop() else { return Ok(None) };
        entry.status = QueueEntryStatus::Active;
        guard.active.insert(entry.job_id.clone(), entry.clone());
        if let Some(wid) = worker_id
            && let Some(worker) = guard.workers.get_mut(wid)
        {
            worker.current_jobs.insert(entry.job_id.clone());
            worker.last_heartbeat = Utc::now();
            let worker = worker.clone();
            self.persist_worker(&worker).await?;
        }
        self.persist_queue(&guard).await?;
        Ok(Some(entry))
    }

    pub async fn complete_job(&self, job_id: &str, worker_id: Option<&str>) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.active.remove(job_id);
        if let Some(wid) = worker_id
            && let Some(worker) = guard.workers.get_mut(wid)
        {
            worker.current_jobs.remove(job_id);
            worker.processed_count += 1;
            let worker = worker.clone();
            self.persist_worker(&worker).await?;
        }
        self.total_completed.fetch_add(1, Ordering::Relaxed);
        self.persist_queue(&guard).await
    }

    /// `failJob`: when `should_retry`, re-enqueues at the job's original
    /// priority (does not preempt unrelated higher-priority jobs); otherwise
    /// drops silently (the Job Store already recorded the failure).
    pub async fn fail_job(&self, job_id: &str, worker_id: Option<&str>, should_retry: bool) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let removed = guard.active.remove(job_id);
        if let Some(wid) = worker_id
            && let Some(worker) = guard.workers.get_mut(wid)
        {
            worker.current_jobs.remove(job_id);
            worker.failed_count += 1;
            let worker = worker.clone();
            self.persist_worker(&worker).await?;
        }
        if should_retry && let Some(mut entry) = removed {
            entry.status = QueueEntryStatus::Pending;
            entry.enqueued_at = Utc::now();
            guard.pending.push(entry);
        } else {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.persist_queue(&guard).await
    }

    pub async fn record_processing_duration_ms(&self, ms: u64) {
        self.total_processing_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub async fn pause(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.paused = true;
        self.persist_queue(&guard).await
    }

    pub async fn resume(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.paused = false;
        self.persist_queue(&guard).await
    }

    /// Empties queue and active set; does not terminate external operations.
    pub async fn clear(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.pending.clear();
        guard.active.clear();
        self.persist_queue(&guard).await
    }

    pub async fn register_worker(&self, worker: Worker) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.workers.insert(worker.id.clone(), worker.clone());
        self.persist_worker(&worker).await
    }

    pub async fn update_worker_heartbeat(&self, worker_id: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let worker = guard
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| ReelflowError::not_found(format!("worker {worker_id} not found")))?;
        worker.last_heartbeat = Utc::now();
        let worker = worker.clone();
        self.persist_worker(&worker).await
    }

    /// Finds workers whose `lastHeartbeat` is older than the threshold,
    /// re-queues each of their `currentJobs` at the original priority, and
    /// removes the worker (§4.5, the crashed-worker recovery path).
    pub async fn cleanup_inactive_workers(&self, threshold_min: i64) -> Result<usize> {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();
        let stale: Vec<WorkerId> = guard.workers.values().filter(|w| w.is_stale(now, threshold_min)).map(|w| w.id.clone()).collect();
        for worker_id in &stale {
            if let Some(worker) = guard.workers.remove(worker_id) {
                for job_id in &worker.current_jobs {
                    if let Some(mut entry) = guard.active.remove(job_id) {
                        entry.status = QueueEntryStatus::Pending;
                        guard.pending.push(entry);
                    }
                }
            }
            self.kv.delete(&keys::worker(worker_id)).await?;
            self.kv.set_remove(keys::workers_index(), worker_id).await?;
        }
        self.persist_queue(&guard).await?;
        Ok(stale.len())
    }

    pub async fn status(&self) -> QueueStatus {
        let guard = self.inner.lock().await;
        QueueStatus { is_paused: guard.paused, queue_length: guard.pending.len(), active_jobs: guard.active.len(), worker_count: guard.workers.len() }
    }

    pub async fn stats(&self) -> QueueStats {
        let guard = self.inner.lock().await;
        let completed = self.total_completed.load(Ordering::Relaxed);
        let failed = self.total_failed.load(Ordering::Relaxed);
        let total_ms = self.total_processing_ms.load(Ordering::Relaxed);
        QueueStats {
            waiting: guard.pending.len(),
            active: guard.active.len(),
            completed,
            failed,
            delayed: 0,
            total_processed: completed + failed,
            avg_processing_time_ms: if completed > 0 { total_ms / completed } else { 0 },
        }
    }

    pub async fn worker(&self, worker_id: &str) -> Option<Worker> {
        self.inner.lock().await.workers.get(worker_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::kv::InMemoryKv;

    fn manager() -> QueueManager {
        QueueManager::new(Arc::new(InMemoryKv::new()), None)
    }

    #[tokio::test]
    async fn strict_priority_ordering_on_lease() {
        let qm = manager();
        qm.add_to_queue("low".into(), 1).await.unwrap();
        qm.add_to_queue("high".into(), 9).await.unwrap();
        let first = qm.get_next_job(None).await.unwrap().unwrap();
        assert_eq!(first.job_id, "high");
        let second = qm.get_next_job(None).await.unwrap().unwrap();
        assert_eq!(second.job_id, "low");
    }

    #[tokio::test]
    async fn duplicate_admission_is_rejected() {
        let qm = manager();
        qm.add_to_queue("j1".into(), 1).await.unwrap();
        assert!(qm.add_to_queue("j1".into(), 1).await.is_err());
    }

    #[tokio::test]
    async fn paused_queue_refuses_admission_and_lease() {
        let qm = manager();
        qm.pause().await.unwrap();
        assert!(qm.add_to_queue("j1".into(), 1).await.is_err());
        assert!(qm.get_next_job(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn crashed_worker_requeues_its_jobs_at_original_priority() {
        let qm = manager();
        qm.register_worker(Worker::new("w1".into(), "worker-1".into(), vec![], 2)).await.unwrap();
        qm.add_to_queue("j1".into(), 5).await.unwrap();
        qm.add_to_queue("j2".into(), 1).await.unwrap();
        qm.get_next_job(Some("w1")).await.unwrap();
        qm.get_next_job(Some("w1")).await.unwrap();
        {
            let mut guard = qm.inner.lock().await;
            if let Some(w) = guard.workers.get_mut("w1") {
                w.last_heartbeat = Utc::now() - chrono::Duration::minutes(10);
            }
        }
        let cleaned = qm.cleanup_inactive_workers(5).await.unwrap();
        assert_eq!(cleaned, 1);
        assert!(qm.worker("w1").await.is_none());
        let first = qm.get_next_job(None).await.unwrap().unwrap();
        assert_eq!(first.job_id, "j1");
        let second = qm.get_next_job(None).await.unwrap().unwrap();
        assert_eq!(second.job_id, "j2");
    }
}
