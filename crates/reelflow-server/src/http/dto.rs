//! Request/response bodies for the HTTP front-end (§6). Request bodies carry
//! `garde::Validate` so `Garde<Json<T>>` rejects malformed input before a
//! handler ever sees it; response bodies carry `utoipa::ToSchema` for the
//! generated OpenAPI document.

use chrono::{DateTime, Utc};
use garde::Validate;
use reelflow_core::models::job::{GenerationParameters, Job};
use reelflow_core::models::{Model, VideoArtifact};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateGenerationRequest {
    #[garde(length(min = 3, max = 5000))]
    pub prompt: String,
    #[garde(skip)]
    pub parameters: Option<GenerationParameters>,
    #[garde(skip)]
    pub provider: Option<String>,
    #[garde(skip)]
    pub model: Option<String>,
    #[garde(range(min = 0, max = 10))]
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateGenerationResponse {
    pub success: bool,
    pub generation_id: String,
    pub queue_position: Option<usize>,
    pub clarification_required: bool,
    pub clarification_questions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerationResponse {
    pub success: bool,
    pub generation: Job,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ClarifyRequest {
    #[garde(length(min = 1, max = 2000))]
    pub response: String,
    #[garde(skip)]
    pub question_id: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueJobResponse {
    pub success: bool,
    pub job: Job,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatsResponse {
    pub success: bool,
    pub stats: QueueStatsBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatsBody {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub delayed: usize,
    pub total_processed: u64,
    pub avg_processing_time: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatusResponse {
    pub success: bool,
    pub status: QueueStatusBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatusBody {
    pub is_paused: bool,
    pub queue_length: usize,
    pub active_jobs: usize,
    pub worker_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideosResponse {
    pub videos: Vec<VideoArtifact>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoUrlResponse {
    pub video_url: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WorkerRegisterRequest {
    #[garde(length(min = 1))]
    pub worker_id: String,
    #[garde(skip)]
    pub worker_info: WorkerInfo,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WorkerInfo {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrency: u32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WorkerHeartbeatRequest {
    #[garde(length(min = 1))]
    pub worker_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CronCleanupRequest {
    #[garde(range(min = 1))]
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CronCleanupResponse {
    pub jobs_cleaned: usize,
    pub videos_cleaned: usize,
    pub workers_cleaned: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelListResponse {
    pub models: Vec<Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenericOk {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl GenericOk {
    pub fn ok() -> Self {
        Self { success: true, data: None }
    }
}
