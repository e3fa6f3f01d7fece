use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::job::JobId;

pub type WorkerId = String;

/// A worker process instance (§3). Lifecycle: registered on boot, marked
/// inactive if no heartbeat within the configured threshold, `currentJobs`
/// re-queued on cleanup (§4.5, §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub capabilities: Vec<String>,
    pub is_active: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub max_concurrency: u32,
    pub processed_count: u64,
    pub failed_count: u64,
    pub current_jobs: HashSet<JobId>,
}

impl Worker {
    pub fn new(id: WorkerId, name: String, capabilities: Vec<String>, max_concurrency: u32) -> Self {
        Self {
            id,
            name,
            capabilities,
            is_active: true,
            last_heartbeat: Utc::now(),
            max_concurrency,
            processed_count: 0,
            failed_count: 0,
            current_jobs: HashSet::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        (self.current_jobs.len() as u32) < self.max_concurrency
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold_min: i64) -> bool {
        now - self.last_heartbeat > chrono::Duration::minutes(threshold_min)
    }
}

/// Registration payload for `POST /api/workers/register` (§6).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkerForRegister {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrency: u32,
}
