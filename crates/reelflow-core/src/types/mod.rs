//! Shared enums and small value types used across the job/queue/artifact models.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Outward status of a [`crate::models::job::Job`].
///
/// Transitions are enforced by the job store, not by this type — see
/// `JobStatus::is_valid_transition`, which mirrors the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    PendingClarification,
    PendingConfirmation,
    Queued,
    Active,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Mirrors §4.4's transition table. `None` covers the initial creation,
    /// which is handled by `JobStore::create` rather than a transition call.
    pub fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (from, to),
            (PendingClarification, PendingConfirmation)
                | (PendingClarification, Queued)
                | (PendingClarification, Active)
                | (PendingClarification, Cancelled)
                | (PendingConfirmation, Queued)
                | (PendingConfirmation, Active)
                | (PendingConfirmation, Cancelled)
                | (Queued, Active)
                | (Queued, Cancelled)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Cancelled)
                | (Failed, Cancelled)
                | (Failed, Retrying)
                | (Retrying, PendingClarification)
                | (Retrying, Queued)
                | (Retrying, Cancelled)
        )
    }
}

/// One entry in a job's append-only history (§3 `JobHistory`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
    Retried,
}

/// Status of a [`crate::models::queue::QueueEntry`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueueEntryStatus {
    Pending,
    Active,
}

/// Status reported by a provider adapter's `poll` call (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// The §7 error taxonomy tag. Kept separate from `ReelflowError` so the HTTP
/// layer and logging can match on it without depending on error internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    ServiceUnavailable,
    ExternalService,
    Internal,
}
