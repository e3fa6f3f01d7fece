use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::models::job::JobId;
use crate::types::HistoryAction;

/// One append-only entry in a job's history (§3 `JobHistory`). Retained with
/// its job, pruned together — see `JobStore::cleanup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobHistoryEntry {
    pub id: u64,
    pub job_id: JobId,
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
