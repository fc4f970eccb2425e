//! Component assembly and lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, builds the ingest pipeline and
//! HTTP state, then runs everything until a shutdown signal arrives.
//!
//! # Startup Order
//!
//! 1. Ingest pipeline (writer task, then the poll driver)
//! 2. HTTP API (intake, queries, live relay, session replay)
//!
//! # Shutdown Order
//!
//! 1. HTTP API stops accepting; open streams are closed
//! 2. Ingest pipeline: poll driver stops, writer drains its queue and flushes

use std::future::Future;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use sentinel_core::SentinelConfig;
use sentinel_core::pipeline::Pipeline;
use sentinel_log_pipeline::{IngestPipelineBuilder, PipelineConfig};

use crate::api::{self, AppState};
use crate::health::DaemonHealth;
use crate::metrics_server;

/// How often the uptime gauge is refreshed.
const UPTIME_REFRESH_SECS: u64 = 10;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: SentinelConfig,
    /// Handler state; owns the shared ingest pipeline.
    state: AppState,
}

impl Orchestrator {
    /// Load `sentinel.toml` (with environment overrides) and build.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated,
    /// or if the stores cannot be opened.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = SentinelConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: SentinelConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let pipeline = IngestPipelineBuilder::new()
            .config(PipelineConfig::from_core(&config))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build ingest pipeline: {}", e))?;
        tracing::info!(
            ingest_enabled = config.ingest.enabled,
            relay_enabled = config.relay.enabled,
            "ingest pipeline initialized"
        );

        let state = AppState::new(&config, pipeline)
            .map_err(|e| anyhow::anyhow!("failed to initialize API state: {}", e))?;

        Ok(Self { config, state })
    }

    /// Bind the configured API address and run until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.api.listen_addr, self.config.api.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind API listener on {}: {}", addr, e))?;

        self.serve(listener, async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
        })
        .await
    }

    /// Start the pipeline, serve the API on `listener` until `shutdown`
    /// resolves, then stop everything in order.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let start_time = Instant::now();
        let pipeline = self.state.pipeline();

        pipeline
            .write()
            .await
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start ingest pipeline: {}", e))?;

        record_daemon_metrics();
        let (shutdown_tx, _) = broadcast::channel(1);
        let uptime_task = spawn_uptime_updater(start_time, shutdown_tx.subscribe());

        let local_addr = listener.local_addr()?;
        tracing::info!(listen_addr = %local_addr, "sentinel-daemon running");

        let state = self.state.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                state.close_streams();
            })
            .await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "API server failed");
        }

        tracing::info!("stopping ingest pipeline");
        if let Err(e) = pipeline.write().await.stop().await {
            tracing::error!(error = %e, "failed to stop ingest pipeline");
        }

        let _ = shutdown_tx.send(());
        let _ = uptime_task.await;

        tracing::info!(
            uptime_secs = start_time.elapsed().as_secs(),
            "sentinel-daemon shut down"
        );
        served.map_err(|e| anyhow::anyhow!("API server failed: {}", e))
    }

    /// Router over this orchestrator's state.
    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Current component health.
    pub async fn health(&self) -> DaemonHealth {
        self.state.health().await
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

fn record_daemon_metrics() {
    use sentinel_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Periodically refresh the uptime gauge so scrapes stay current.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use sentinel_core::metrics as m;

    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(UPTIME_REFRESH_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
