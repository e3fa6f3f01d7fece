use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::job::JobId;
use crate::types::QueueEntryStatus;

/// An entry in the priority queue (§3, §4.5). Exists only while the job is
/// not terminal; removed on complete/fail/cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub status: QueueEntryStatus,
}

impl QueueEntry {
    pub fn new(job_id: JobId, priority: i32, enqueued_at: DateTime<Utc>) -> Self {
        Self { job_id, priority, enqueued_at, status: QueueEntryStatus::Pending }
    }
}

/// Ordering for the binary heap backing the Queue Manager: strictly higher
/// `priority` first, ties broken by earlier `enqueued_at` (§4.5). `BinaryHeap`
/// is a max-heap, so `Ord` is defined directly in "bigger = goes first" sense.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
            .then_with(|| other.job_id.cmp(&self.job_id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn entry(job_id: &str, priority: i32, secs_ago: i64) -> QueueEntry {
        QueueEntry::new(job_id.to_string(), priority, Utc::now() - chrono::Duration::seconds(secs_ago))
    }

    #[test]
    fn strictly_higher_priority_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(entry("low", 1, 0));
        heap.push(entry("high", 5, 0));
        assert_eq!(heap.pop().unwrap().job_id, "high");
        assert_eq!(heap.pop().unwrap().job_id, "low");
    }

    #[test]
    fn ties_broken_by_earlier_enqueue() {
        let mut heap = BinaryHeap::new();
        heap.push(entry("newer", 3, 1));
        heap.push(entry("older", 3, 10));
        assert_eq!(heap.pop().unwrap().job_id, "older");
        assert_eq!(heap.pop().unwrap().job_id, "newer");
    }
}
