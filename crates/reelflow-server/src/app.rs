//! Application (A4): the composition root. Builds every store, registry,
//! and runtime from [`Settings`], then owns their lifecycle through a
//! `mea::shutdown` pair, mirroring the teacher's `ServerApplication`
//! (`new`/`start`/`shutdown`, a held `(ShutdownSend, ShutdownRecv)`, and a
//! `Vec` of task handles joined on shutdown) — see DESIGN.md.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use mea::shutdown::{ShutdownRecv, ShutdownSend};
use opendal::{Operator, services};
use reelflow_core::ModelRegistry;
use reelflow_core::models::catalog::{ChoiceParameter, Model, ModelCapabilities, ModelParameters, ModelPricing, PricingTier, RangeParameter};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::http::{self, AppState};
use crate::kv::{InMemoryKv, KvStore, RedisKv};
use crate::providers::ProviderRegistry;
use crate::providers::mock::MockAdapter;
use crate::providers::veo::{VeoAdapter, VeoAdapterSettings};
use crate::settings::{OperatorKind, Settings};
use crate::store::{ArtifactStore, ArtifactStoreSettings, JobStore, QueueManager};
use crate::worker::{WorkerRuntime, WorkerRuntimeSetting};
use crate::workflow::OrchestrationWorkflow;

/// The veo-3 and mock-1 model catalog (§4.2). Not user-editable at runtime;
/// a real deployment would load this from an admin surface, but the spec
/// names no such surface, so it is seeded at boot alongside the provider
/// configuration it corresponds to.
fn default_catalog() -> Vec<Model> {
    vec![
        Model {
            id: "veo-3".to_string(),
            provider: "veo".to_string(),
            capabilities: ModelCapabilities {
                max_duration_sec: 60,
                aspect_ratios: vec!["16:9".to_string(), "9:16".to_string(), "1:1".to_string()],
                resolutions: vec!["720p".to_string(), "1080p".to_string()],
                supports_audio: true,
                supports_image_input: false,
                supports_negative_prompt: true,
            },
            parameters: ModelParameters {
                duration: RangeParameter { min: 1, max: 60, default: 5 },
                aspect_ratio: ChoiceParameter { options: vec!["16:9".to_string(), "9:16".to_string(), "1:1".to_string()], default: "16:9".to_string() },
                quality: ChoiceParameter { options: vec!["standard".to_string(), "high".to_string()], default: "standard".to_string() },
                guidance_scale: Some(RangeParameter { min: 0.0, max: 20.0, default: 7.5 }),
                inference_steps: Some(RangeParameter { min: 10, max: 50, default: 30 }),
            },
            pricing: ModelPricing { cost_per_second: Decimal::new(10, 2), currency: "USD".to_string(), tier: PricingTier::Standard },
            is_available: true,
        },
        Model {
            id: "mock-1".to_string(),
            provider: "mock".to_string(),
            capabilities: ModelCapabilities {
                max_duration_sec: 30,
                aspect_ratios: vec!["16:9".to_string(), "9:16".to_string()],
                resolutions: vec!["1080p".to_string()],
                supports_audio: false,
                supports_image_input: false,
                supports_negative_prompt: true,
            },
            parameters: ModelParameters {
                duration: RangeParameter { min: 1, max: 30, default: 5 },
                aspect_ratio: ChoiceParameter { options: vec!["16:9".to_string(), "9:16".to_string()], default: "16:9".to_string() },
                quality: ChoiceParameter { options: vec!["standard".to_string(), "high".to_string()], default: "standard".to_string() },
                guidance_scale: None,
                inference_steps: None,
            },
            pricing: ModelPricing { cost_per_second: Decimal::new(5, 2), currency: "USD".to_string(), tier: PricingTier::Economy },
            is_available: true,
        },
    ]
}

async fn build_kv(settings: &Settings) -> Result<Arc<dyn KvStore>> {
    match &settings.kv.url {
        Some(url) => {
            let kv = RedisKv::connect(url).await.context("connecting to the configured redis/valkey kv backend")?;
            Ok(Arc::new(kv))
        }
        None => Ok(Arc::new(InMemoryKv::new())),
    }
}

fn build_operator(settings: &Settings) -> Result<Operator> {
    match settings.storage.operator {
        OperatorKind::Fs => {
            let builder = services::Fs::default().root(&settings.storage.fs_root);
            Ok(Operator::new(builder)?.finish())
        }
        OperatorKind::S3 => {
            let bucket = settings.storage.s3_bucket.as_deref().context("storage.operator is \"s3\" but storage.s3_bucket is unset")?;
            let builder = services::S3::default().bucket(bucket);
            Ok(Operator::new(builder)?.finish())
        }
    }
}

/// §7 "missing required secrets at startup is fatal": every non-mock
/// provider must carry a non-empty `api_key`. The `mock` provider is the
/// dev/test stand-in and is exempt.
fn check_required_secrets(settings: &Settings) -> Result<()> {
    for (name, provider) in &settings.providers {
        if name == "mock" {
            continue;
        }
        if provider.api_key.trim().is_empty() {
            bail!("provider \"{name}\" has no api_key configured; refusing to start");
        }
    }
    Ok(())
}

fn build_providers(settings: &Settings) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    if let Some(veo) = settings.providers.get("veo") {
        registry.register(Arc::new(VeoAdapter::new(VeoAdapterSettings {
            base_url: veo.base_url.clone(),
            api_key: veo.api_key.clone(),
            request_timeout: veo.timeout,
            default_cost_per_second: Decimal::new(10, 2),
        })));
    }
    registry.register(Arc::new(MockAdapter::new()));
    registry
}

pub struct Application {
    settings: Arc<Settings>,
    workflow: Arc<OrchestrationWorkflow>,
    worker: Arc<WorkerRuntime>,
    shutdown: Arc<Mutex<Option<(ShutdownSend, ShutdownRecv)>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Application {
    pub async fn new() -> Result<Self> {
        let settings = Arc::new(Settings::load().context("loading settings")?);
        crate::logging::init(&settings.log);
        check_required_secrets(&settings)?;

        let kv = build_kv(&settings).await?;
        let jobs = Arc::new(JobStore::new(kv.clone(), settings.workflow.enable_clarifications, settings.retention.cleanup_retention_days));
        let queue = Arc::new(QueueManager::new(kv.clone(), settings.queue.bounded_capacity));
        queue.restore().await.context("restoring queue state from the kv backend")?;

        let operator = build_operator(&settings)?;
        let artifacts = Arc::new(ArtifactStore::new(
            operator,
            ArtifactStoreSettings {
                max_file_size_bytes: settings.storage.max_file_size_bytes,
                accepted_content_types: settings.storage.accepted_content_types.clone(),
                thumbnail_generation_enabled: settings.storage.thumbnail_generation_enabled,
                signed_url_ttl: settings.storage.signed_url_ttl,
            },
        ));

        let models = Arc::new(ModelRegistry::new(default_catalog(), settings.workflow.default_model_id.clone()));
        let providers = Arc::new(build_providers(&settings));

        let workflow = Arc::new(OrchestrationWorkflow::new(jobs, queue.clone(), artifacts, models, providers, settings.workflow.clone()));

        let worker = WorkerRuntime::register(
            queue,
            workflow.clone(),
            WorkerRuntimeSetting {
                name: "in-process-worker-0".to_string(),
                capabilities: vec![],
                max_concurrency: settings.queue.max_concurrent_jobs,
                poll_interval: settings.queue.poll_interval,
            },
        )
        .await
        .context("registering the in-process worker runtime")?;

        let (shutdown_tx, shutdown_rx) = mea::shutdown::new_pair();

        Ok(Self {
            settings,
            workflow,
            worker,
            shutdown: Arc::new(Mutex::new(Some((shutdown_tx, shutdown_rx)))),
            handles: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn get_shutdown_recv(&self) -> ShutdownRecv {
        let guard = self.shutdown.lock().await;
        guard.as_ref().expect("shutdown pair not yet taken").1.clone()
    }

    /// Spawns the worker runtime, the HTTP server, and the daily cleanup
    /// task; returns once everything is spawned (not once they finish).
    pub async fn start(&self) -> Result<()> {
        log::info!("starting reelflow-server");
        let mut handles = self.handles.lock().await;

        let (heartbeat, processing) = self.worker.clone().spawn(self.get_shutdown_recv().await);
        handles.push(heartbeat);
        handles.push(processing);

        let state = AppState::new(self.workflow.clone(), self.settings.clone());
        let router = http::router(state);
        let addr = self.settings.http.addr.clone();
        let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding http listener on {addr}"))?;
        log::info!("http listening on {addr}");
        let shutdown_rx = self.get_shutdown_recv().await;
        let http_handle = tokio::spawn(async move {
            let result = axum::serve(listener, router).with_graceful_shutdown(async move { shutdown_rx.is_shutdown().await }).await;
            if let Err(e) = result {
                log::error!("http server exited with error: {e}");
            }
        });
        handles.push(http_handle);

        handles.push(self.spawn_cleanup_task());

        log::info!("reelflow-server started");
        Ok(())
    }

    /// §4.8 "a daily hook invokes Job Store cleanup, Artifact Store cleanup,
    /// and Worker cleanup with the configured retention".
    fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let workflow = self.workflow.clone();
        let retention = self.settings.retention.clone();
        let shutdown_rx_fut = self.shutdown.clone();
        tokio::spawn(async move {
            let shutdown_rx = {
                let guard = shutdown_rx_fut.lock().await;
                guard.as_ref().expect("shutdown pair not yet taken").1.clone()
            };
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match workflow.jobs().cleanup(Some(retention.cleanup_retention_days)).await {
                            Ok(n) => log::info!("daily cleanup removed {n} stale jobs"),
                            Err(e) => log::warn!("daily job cleanup failed: {e}"),
                        }
                        match workflow.artifacts().cleanup(retention.cleanup_retention_days).await {
                            Ok(n) => log::info!("daily cleanup removed {n} stale videos"),
                            Err(e) => log::warn!("daily artifact cleanup failed: {e}"),
                        }
                        match workflow.queue().cleanup_inactive_workers(retention.worker_heartbeat_threshold_min).await {
                            Ok(n) => log::info!("daily cleanup removed {n} inactive workers"),
                            Err(e) => log::warn!("daily worker cleanup failed: {e}"),
                        }
                    }
                    _ = shutdown_rx.is_shutdown() => {
                        log::info!("daily cleanup task shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub async fn shutdown(self) -> Result<()> {
        log::info!("shutting down reelflow-server");
        let shutdown_tx = match self.shutdown.lock().await.take() {
            Some((tx, _)) => tx,
            None => bail!("application is not running"),
        };
        shutdown_tx.shutdown();
        shutdown_tx.await_shutdown().await;

        let mut handles_guard = self.handles.lock().await;
        let handles = std::mem::take(&mut *handles_guard);
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("a service task panicked during shutdown: {e}");
            }
        }
        log::info!("reelflow-server shutdown complete");
        Ok(())
    }
}
