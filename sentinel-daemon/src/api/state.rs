//! Shared handler state.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{RwLock, broadcast};

use sentinel_core::SentinelConfig;
use sentinel_core::pipeline::{HealthStatus, Pipeline};
use sentinel_log_pipeline::{
    IngestPipeline, LiveRelay, LogPipelineError, RelayConfig, SessionConfig, SessionReplayer,
    WriterHandle,
};
use sentinel_store::{EventStore, ReplayStore, StoreError};

use crate::api::error::ApiError;
use crate::health::{
    ComponentHealth, DaemonHealth, INGEST_PIPELINE, LIVE_RELAY, SESSION_REPLAY,
};

/// Ingest pipeline shared between the orchestrator (start/stop) and `/health`.
pub type SharedPipeline = Arc<RwLock<IngestPipeline>>;

/// Request limits taken from `[api]` and `[storage]`.
#[derive(Debug, Clone, Copy)]
pub struct ApiLimits {
    pub max_page_size: usize,
    pub max_intake_batch: usize,
}

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub(crate) writer: WriterHandle,
    pub(crate) relay: Option<LiveRelay>,
    pub(crate) sessions: SessionConfig,
    pub(crate) replayer: SessionReplayer,
    pub(crate) limits: ApiLimits,
    pipeline: SharedPipeline,
    events_db: PathBuf,
    replay_db: PathBuf,
    started_at: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Wire handler state around an already built pipeline.
    ///
    /// Store reads use the pipeline's database paths so the API always
    /// reads what the writer commits.
    pub fn new(config: &SentinelConfig, pipeline: IngestPipeline) -> Result<Self, LogPipelineError> {
        let relay = if config.relay.enabled {
            Some(LiveRelay::new(RelayConfig::from_core(config))?)
        } else {
            None
        };
        let sessions = SessionConfig::from_core(config);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            writer: pipeline.writer(),
            relay,
            replayer: SessionReplayer::new(sessions.clone()),
            sessions,
            limits: ApiLimits {
                max_page_size: config.storage.max_page_size,
                max_intake_batch: config.api.max_intake_batch,
            },
            events_db: pipeline.config().events_db_path.clone(),
            replay_db: pipeline.config().replay_db_path.clone(),
            pipeline: Arc::new(RwLock::new(pipeline)),
            started_at: Instant::now(),
            shutdown_tx,
        })
    }

    pub fn pipeline(&self) -> SharedPipeline {
        Arc::clone(&self.pipeline)
    }

    /// Ends open streaming responses (live feed, session transcripts).
    pub fn close_streams(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Resolves once [`close_streams`](Self::close_streams) is called.
    pub(crate) fn streams_closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Run a read on a fresh read-only events connection.
    pub(crate) async fn read_events<T, F>(&self, read: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&EventStore) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.events_db.clone();
        tokio::task::spawn_blocking(move || {
            let store = EventStore::open_read_only(&path)?;
            read(&store)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("store read task failed: {e}")))?
        .map_err(ApiError::from)
    }

    /// Run a read on a fresh read-only replay-line connection.
    pub(crate) async fn read_replay<T, F>(&self, read: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&ReplayStore) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.replay_db.clone();
        tokio::task::spawn_blocking(move || {
            let store = ReplayStore::open_read_only(&path)?;
            read(&store)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("store read task failed: {e}")))?
        .map_err(ApiError::from)
    }

    /// Current component health.
    pub async fn health(&self) -> DaemonHealth {
        let ingest = self.pipeline.read().await.health_check().await;

        let replay_tool = if tokio::fs::try_exists(&self.sessions.playlog_bin)
            .await
            .unwrap_or(false)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(format!(
                "replay tool not found: {}",
                self.sessions.playlog_bin.display()
            ))
        };

        DaemonHealth::from_components(
            vec![
                ComponentHealth::new(INGEST_PIPELINE, true, ingest),
                ComponentHealth::new(LIVE_RELAY, self.relay.is_some(), HealthStatus::Healthy),
                ComponentHealth::new(SESSION_REPLAY, true, replay_tool),
            ],
            self.started_at.elapsed().as_secs(),
        )
    }
}
