//! The small persistence abstraction underlying the Job Store, Queue Manager,
//! and worker registry (§6 "Persisted state layout", §9 "durable object actor
//! per job / per queue").
//!
//! Rather than relying on a single store's object identity, every durable
//! entity is a value at a well-known key (`job:<jobId>`, `queue:state`,
//! `worker:<workerId>`, …); this module is the thin interface those values
//! are read and written through. A Redis-compatible backend (`fred`) is used
//! in deployment; an in-memory backend serves local development and tests.

mod memory;
mod redis;

pub use memory::InMemoryKv;
pub use redis::RedisKv;
use reelflow_core::Result;

/// A minimal KV interface: single-value get/set/delete, an atomically
/// incrementing counter (used for the history sequence number), and a small
/// unordered-set primitive (used for the job/worker id indexes that back
/// listing and cleanup, since the literal `job:<jobId>` keyspace is not
/// itself enumerable without one).
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()>;
    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()>;
    async fn set_members(&self, set_key: &str) -> Result<Vec<String>>;
}

pub mod keys {
    pub fn job(job_id: &str) -> String {
        format!("job:{job_id}")
    }

    pub fn jobs_index() -> &'static str {
        "jobs:index"
    }

    pub fn history_entry(job_id: &str, seq: i64) -> String {
        format!("history:{job_id}:{seq}")
    }

    pub fn history_seq(job_id: &str) -> String {
        format!("history:{job_id}:_seq")
    }

    pub fn queue_state() -> &'static str {
        "queue:state"
    }

    pub fn worker(worker_id: &str) -> String {
        format!("worker:{worker_id}")
    }

    pub fn workers_index() -> &'static str {
        "workers:index"
    }
}
