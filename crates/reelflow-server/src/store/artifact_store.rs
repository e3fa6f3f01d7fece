//! Artifact Store (C3): object storage for finished videos, thumbnails, and
//! per-video metadata records; signed URLs, listing, TTL cleanup (§4.3).

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use opendal::Operator;
use reelflow_core::models::artifact::VideoArtifact;
use reelflow_core::{ReelflowError, Result};
use uuid::Uuid;

/// A fixed 1x1-pixel JPEG used as the thumbnail placeholder (§4.3: "may be a
/// best-effort placeholder … a deterministic cover image").
const PLACEHOLDER_THUMBNAIL_JPEG: &[u8] =
    &[0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x03, 0x02, 0x02, 0x02, 0x02, 0x02, 0x03, 0x02, 0x02, 0x02, 0x03, 0xFF, 0xD9];

pub struct ArtifactStoreSettings {
    pub max_file_size_bytes: u64,
    pub accepted_content_types: Vec<String>,
    pub thumbnail_generation_enabled: bool,
    pub signed_url_ttl: Duration,
}

pub struct ArtifactStore {
    operator: Operator,
    settings: ArtifactStoreSettings,
}

fn valid_filename(filename: &str) -> bool {
    !filename.is_empty() && filename.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn map_opendal_err(e: opendal::Error) -> ReelflowError {
    if e.kind() == opendal::ErrorKind::NotFound {
        ReelflowError::not_found(format!("artifact not found: {e}"))
    } else {
        ReelflowError::internal(format!("storage error: {e}"))
    }
}

impl ArtifactStore {
    pub fn new(operator: Operator, settings: ArtifactStoreSettings) -> Self {
        Self { operator, settings }
    }

    fn video_key(user_id: &str, video_id: &str, filename: &str) -> String {
        format!("videos/{user_id}/{video_id}/{filename}")
    }

    fn thumbnail_key(user_id: &str, video_id: &str) -> String {
        format!("thumbnails/{user_id}/{video_id}/thumbnail.jpg")
    }

    fn metadata_key(user_id: &str, video_id: &str) -> String {
        format!("metadata/{user_id}/{video_id}.json")
    }

    /// Upload validates size/content-type/non-empty before any write. The
    /// bytes write and the metadata write are not transactional — a
    /// metadata-without-bytes record is garbage collected by `cleanup`.
    pub async fn upload(&self, user_id: &str, generation_id: &str, filename: &str, content_type: &str, bytes: Bytes) -> Result<VideoArtifact> {
        if bytes.is_empty() {
            return Err(ReelflowError::validation("upload must not be empty"));
        }
        if bytes.len() as u64 > self.settings.max_file_size_bytes {
            return Err(ReelflowError::validation(format!("upload exceeds max size of {} bytes", self.settings.max_file_size_bytes)));
        }
        if !valid_filename(filename) {
            return Err(ReelflowError::validation("filename must match [A-Za-z0-9._-]+"));
        }
        if !self.settings.accepted_content_types.iter().any(|t| t == content_type) {
            return Err(ReelflowError::validation(format!("content type {content_type} is not accepted")));
        }

        let video_id = Uuid::now_v7().to_string();
        let size_bytes = bytes.len() as u64;
        self.operator.write(&Self::video_key(user_id, &video_id, filename), bytes).await.map_err(map_opendal_err)?;

        let thumbnail_url = if self.settings.thumbnail_generation_enabled {
            self.operator.write(&Self::thumbnail_key(user_id, &video_id), PLACEHOLDER_THUMBNAIL_JPEG).await.map_err(map_opendal_err)?;
            Some(Self::thumbnail_key(user_id, &video_id))
        } else {
            None
        };

        let artifact = VideoArtifact {
            id: video_id.clone(),
            generation_id: generation_id.to_string(),
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            duration_seconds: None,
            resolution: None,
            thumbnail_url,
            uploaded_at: Utc::now(),
            last_accessed_at: None,
            access_count: 0,
        };
        self.put_metadata(&artifact).await?;
        Ok(artifact)
    }

    async fn get_metadata(&self, user_id: &str, video_id: &str) -> Result<VideoArtifact> {
        let raw = self.operator.read(&Self::metadata_key(user_id, video_id)).await.map_err(map_opendal_err)?;
        Ok(serde_json::from_slice(&raw.to_bytes())?)
    }

    async fn put_metadata(&self, artifact: &VideoArtifact) -> Result<()> {
        let bytes = serde_json::to_vec(artifact)?;
        self.operator.write(&Self::metadata_key(&artifact.user_id, &artifact.id), bytes).await.map_err(map_opendal_err)
    }

    pub async fn get(&self, user_id: &str, video_id: &str) -> Result<VideoArtifact> {
        self.get_metadata(user_id, video_id).await
    }

    pub async fn download(&self, user_id: &str, video_id: &str) -> Result<(VideoArtifact, Bytes)> {
        let meta = self.get_metadata(user_id, video_id).await?;
        let buf = self.operator.read(&Self::video_key(user_id, video_id, &meta.filename)).await.map_err(map_opendal_err)?;
        Ok((meta, buf.to_bytes()))
    }

    /// Signed URL issuance mutates access stats (§9's flagged Open Question,
    /// resolved: it does).
    pub async fn signed_url(&self, user_id: &str, video_id: &str) -> Result<String> {
        let mut meta = self.get_metadata(user_id, video_id).await?;
        let key = Self::video_key(user_id, video_id, &meta.filename);
        let url = match self.operator.presign_read(&key, self.settings.signed_url_ttl).await {
            Ok(presigned) => presigned.uri().to_string(),
            // Backends without presign support (e.g. local `fs` in development)
            // fall back to a stable, non-public reference the caller resolves
            // through the same API.
            Err(_) => format!("reelflow-storage://{key}"),
        };
        meta.record_access();
        self.put_metadata(&meta).await?;
        Ok(url)
    }

    /// Removes bytes, thumbnail (if present), and metadata; succeeds if any
    /// component is already missing.
    pub async fn delete(&self, user_id: &str, video_id: &str) -> Result<()> {
        if let Ok(meta) = self.get_metadata(user_id, video_id).await {
            let _ = self.operator.delete(&Self::video_key(user_id, video_id, &meta.filename)).await;
            if meta.thumbnail_url.is_some() {
                let _ = self.operator.delete(&Self::thumbnail_key(user_id, video_id)).await;
            }
        }
        self.operator.delete(&Self::metadata_key(user_id, video_id)).await.map_err(map_opendal_err)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<VideoArtifact>> {
        let prefix = format!("metadata/{user_id}/");
        let entries = self.operator.list(&prefix).await.map_err(map_opendal_err)?;
        let mut out = Vec::new();
        for entry in entries {
            if !entry.path().ends_with(".json") {
                continue;
            }
            if let Ok(raw) = self.operator.read(entry.path()).await {
                if let Ok(artifact) = serde_json::from_slice::<VideoArtifact>(&raw.to_bytes()) {
                    out.push(artifact);
                }
            }
        }
        Ok(out)
    }

    /// Walks metadata, deleting artifacts whose `uploadedAt` is older than
    /// the configured retention; returns the count removed.
    pub async fn cleanup(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let entries = self.operator.list_with("metadata/").recursive(true).await.map_err(map_opendal_err)?;
        let mut removed = 0usize;
        for entry in entries {
            if !entry.path().ends_with(".json") {
                continue;
            }
            let Ok(raw) = self.operator.read(entry.path()).await else { continue };
            let Ok(artifact) = serde_json::from_slice::<VideoArtifact>(&raw.to_bytes()) else { continue };
            if artifact.uploaded_at < cutoff {
                self.delete(&artifact.user_id, &artifact.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use opendal::services;

    use super::*;

    fn store_with_tmp(size_cap: u64) -> ArtifactStore {
        let builder = services::Memory::default();
        let operator = Operator::new(builder).unwrap().finish();
        ArtifactStore::new(
            operator,
            ArtifactStoreSettings {
                max_file_size_bytes: size_cap,
                accepted_content_types: vec!["video/mp4".to_string()],
                thumbnail_generation_enabled: true,
                signed_url_ttl: Duration::from_secs(3600),
            },
        )
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        let store = store_with_tmp(1024 * 1024);
        let artifact = store.upload("u1", "gen1", "clip.mp4", "video/mp4", Bytes::from_static(b"AAAA")).await.unwrap();
        let (meta, bytes) = store.download("u1", &artifact.id).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"AAAA"));
        assert_eq!(meta.content_type, "video/mp4");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let store = store_with_tmp(2);
        let err = store.upload("u1", "gen1", "clip.mp4", "video/mp4", Bytes::from_static(b"AAAA")).await.unwrap_err();
        assert_eq!(err.code, reelflow_core::types::ErrorCode::Validation);
    }

    #[tokio::test]
    async fn signed_url_increments_access_stats() {
        let store = store_with_tmp(1024 * 1024);
        let artifact = store.upload("u1", "gen1", "clip.mp4", "video/mp4", Bytes::from_static(b"AAAA")).await.unwrap();
        store.signed_url("u1", &artifact.id).await.unwrap();
        let reloaded = store.get("u1", &artifact.id).await.unwrap();
        assert_eq!(reloaded.access_count, 1);
        assert!(reloaded.last_accessed_at.is_some());
    }

    #[tokio::test]
    async fn delete_tolerates_already_missing_components() {
        let store = store_with_tmp(1024 * 1024);
        let artifact = store.upload("u1", "gen1", "clip.mp4", "video/mp4", Bytes::from_static(b"AAAA")).await.unwrap();
        store.delete("u1", &artifact.id).await.unwrap();
        store.delete("u1", &artifact.id).await.unwrap();
    }
}
