//! Settings (A1): typed configuration loaded from a layered `config::Config`
//! (embedded defaults, then `config/*.toml`, then `REELFLOW_`-prefixed
//! environment variables), in the teacher's hand-written
//! `TryFrom<&config::Config>` shape (the `Configuration` derive macro that
//! would otherwise generate this is not carried — see DESIGN.md).

use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment as EnvSource, File, FileFormat};
use serde::{Deserialize, Serialize};

const DEFAULTS_TOML: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl AppEnvironment {
    /// §7: error `details` are included only outside production.
    pub fn includes_error_details(self) -> bool {
        !matches!(self, AppEnvironment::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSetting {
    pub addr: String,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSetting {
    pub max_concurrent_jobs: u32,
    pub bounded_capacity: Option<usize>,
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub job_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSetting {
    pub cleanup_retention_days: i64,
    pub worker_heartbeat_threshold_min: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Fs,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSetting {
    pub max_file_size_bytes: u64,
    pub thumbnail_generation_enabled: bool,
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub signed_url_ttl: Duration,
    pub operator: OperatorKind,
    pub fs_root: String,
    pub s3_bucket: Option<String>,
    pub accepted_content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSetting {
    pub generations_per_hour: u32,
    pub storage_per_hour: u32,
    pub workers_per_minute: u32,
    pub general_per_15min: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSetting {
    pub api_key: String,
    pub base_url: String,
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvSetting {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogWriterKind {
    Stdout,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSetting {
    pub enable: bool,
    pub level: String,
    pub writers: Vec<LogWriterKind>,
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSetting {
    pub enable_clarifications: bool,
    pub max_retries: u32,
    pub default_model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub environment: AppEnvironment,
    pub http: HttpSetting,
    pub queue: QueueSetting,
    pub retention: RetentionSetting,
    pub storage: StorageSetting,
    pub rate_limit: RateLimitSetting,
    pub providers: HashMap<String, ProviderSetting>,
    pub kv: KvSetting,
    pub log: LogSetting,
    pub workflow: WorkflowSetting,
}

impl Settings {
    /// Layers embedded defaults, an optional `config/local.toml`, and
    /// `REELFLOW_`-prefixed environment variables (double-underscore
    /// nested, e.g. `REELFLOW_QUEUE__MAX_CONCURRENT_JOBS`).
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(DEFAULTS_TOML, FileFormat::Toml))
            .add_source(File::new("config/local.toml", FileFormat::Toml).required(false))
            .add_source(EnvSource::with_prefix("REELFLOW").separator("__"))
            .build()?;
        Self::try_from(&config)
    }
}

impl TryFrom<&Config> for Settings {
    type Error = ConfigError;

    fn try_from(value: &Config) -> Result<Self, Self::Error> {
        value.clone().try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse_and_load() {
        let settings = Settings::load().expect("embedded config/default.toml must parse");
        assert!(settings.queue.max_concurrent_jobs > 0);
        assert!(settings.retention.cleanup_retention_days > 0);
    }

    #[test]
    fn environment_variable_override_takes_precedence() {
        // SAFETY: test-only, single-threaded within this process's test harness slot.
        unsafe { std::env::set_var("REELFLOW_QUEUE__MAX_CONCURRENT_JOBS", "77") };
        let settings = Settings::load().unwrap();
        assert_eq!(settings.queue.max_concurrent_jobs, 77);
        unsafe { std::env::remove_var("REELFLOW_QUEUE__MAX_CONCURRENT_JOBS") };
    }
}
