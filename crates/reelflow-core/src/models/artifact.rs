use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A finished video (and optional thumbnail/metadata) stored in the object
/// store (§3, §4.3). Immutable after upload — metadata mutates only via
/// access stats (`access_count`/`last_accessed_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VideoArtifact {
    pub id: String,
    pub generation_id: String,
    pub user_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub duration_seconds: Option<u32>,
    pub resolution: Option<String>,
    pub thumbnail_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl VideoArtifact {
    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Some(Utc::now());
    }
}
