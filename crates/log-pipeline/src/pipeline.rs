//! 수집 파이프라인 오케스트레이션 -- tail, 정규화, writer의 전체 흐름을 관리합니다.
//!
//! [`IngestPipeline`]은 core의 [`Pipeline`](sentinel_core::pipeline::Pipeline) trait을 구현하여
//! `sentinel-daemon`에서 다른 컴포넌트와 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileTailer(s) -> Normalizer -> WriterHandle -> mpsc -> BatchWriter -> EventStore / ReplayStore
//!      ^                                                       |
//!      +------------------ checkpoint (after commit) ----------+
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use sentinel_core::error::{PipelineError, SentinelError};
use sentinel_core::event::{EventSource, ReplayLine};
use sentinel_core::metrics::{INGEST_LINES_TOTAL, LABEL_SOURCE};
use sentinel_core::pipeline::{HealthStatus, Pipeline};
use sentinel_store::{EventStore, ReplayStore};

use crate::collector::{FileTailer, TailRead, TailSink, TailTarget};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::parser::{self, LineOutcome};
use crate::writer::{BatchWriter, WriterHandle, batch_writer};

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 한 번의 폴링 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// 읽은 라인 수
    pub lines: usize,
    /// writer에 제출된 이벤트 수
    pub events: usize,
    /// writer에 제출된 재생 라인 수
    pub replay_lines: usize,
    /// 큐가 가득 차 버려진 항목 수
    pub dropped: usize,
    /// 읽기에 실패한 대상 수
    pub failed_targets: usize,
}

/// 폴링 구동기 -- tailer 목록을 순회하며 새 라인을 writer로 보냅니다.
pub struct PollDriver {
    tailers: Vec<FileTailer>,
    writer: WriterHandle,
}

impl PollDriver {
    pub fn new(tailers: Vec<FileTailer>, writer: WriterHandle) -> Self {
        Self { tailers, writer }
    }

    pub fn tailers(&self) -> &[FileTailer] {
        &self.tailers
    }

    /// 모든 대상을 한 번씩 폴링합니다.
    ///
    /// 대상 하나의 실패는 기록만 하고 다음 대상으로 넘어갑니다.
    pub async fn poll_once(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();
        for tailer in &mut self.tailers {
            let read = match tailer.poll().await {
                Ok(read) => read,
                Err(e) => {
                    tracing::warn!(error = %e, "tail poll failed, retrying next cycle");
                    summary.failed_targets += 1;
                    continue;
                }
            };
            if read.offset == tailer.offset() && read.lines.is_empty() {
                continue;
            }

            let source = tailer.target().source;
            metrics::counter!(INGEST_LINES_TOTAL, LABEL_SOURCE => source.as_str())
                .increment(read.lines.len() as u64);
            summary.lines += read.lines.len();

            let commit = match tailer.sink() {
                TailSink::Events => submit_events(&self.writer, source, &read, &mut summary),
                TailSink::ReplayLines => submit_replay_lines(&self.writer, &read, &mut summary),
            };
            if !commit {
                tracing::debug!(
                    path = %tailer.path().display(),
                    "writer queue full, offset not advanced"
                );
                continue;
            }

            let key = tailer.target().checkpoint_key();
            match self.writer.checkpoint(tailer.sink(), key, read.offset).await {
                Ok(()) => tailer.commit(read.offset),
                Err(e) => {
                    tracing::warn!(error = %e, "writer unavailable, offset not advanced");
                }
            }
        }
        summary
    }

    /// 종료 신호를 받을 때까지 `interval`마다 폴링합니다.
    pub async fn run(mut self, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            targets = self.tailers.len(),
            interval_secs = interval.as_secs(),
            "tail poll driver started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.poll_once().await;
                    if summary.lines > 0 {
                        tracing::debug!(
                            lines = summary.lines,
                            events = summary.events,
                            replay_lines = summary.replay_lines,
                            dropped = summary.dropped,
                            "poll cycle complete"
                        );
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        tracing::info!("tail poll driver stopped");
    }
}

/// 저장소 체크포인트에서 오프셋을 복원해 tailer를 생성합니다.
pub fn restore_tailers(
    targets: Vec<TailTarget>,
    events: &EventStore,
    replay: &ReplayStore,
    max_lines: usize,
) -> Result<Vec<FileTailer>, LogPipelineError> {
    let mut tailers = Vec::with_capacity(targets.len());
    for target in targets {
        let key = target.checkpoint_key();
        let offset = match target.sink {
            TailSink::Events => events.get_checkpoint(&key)?,
            TailSink::ReplayLines => replay.get_checkpoint(&key)?,
        };
        tracing::debug!(path = %key, offset, sink = ?target.sink, "restored tail offset");
        tailers.push(FileTailer::new(target, offset, max_lines));
    }
    Ok(tailers)
}

/// 라인을 정규화해 제출합니다. 하나라도 버려졌으면 `false` (오프셋 유지).
fn submit_events(
    writer: &WriterHandle,
    source: EventSource,
    read: &TailRead,
    summary: &mut PollSummary,
) -> bool {
    let normalizer = parser::normalizer_for(source);
    let mut all_queued = true;
    for line in &read.lines {
        if let LineOutcome::Event(event) = parser::normalize_line(normalizer.as_ref(), line) {
            if writer.submit_event(event) {
                summary.events += 1;
            } else {
                summary.dropped += 1;
                all_queued = false;
            }
        }
    }
    all_queued
}

/// 원문 라인을 재생 저장소로 제출합니다. 버려진 라인은 다시 읽지 않습니다.
fn submit_replay_lines(writer: &WriterHandle, read: &TailRead, summary: &mut PollSummary) -> bool {
    for line in &read.lines {
        if writer.submit_line(replay_line(line)) {
            summary.replay_lines += 1;
        } else {
            summary.dropped += 1;
        }
    }
    true
}

/// 라인의 JSON `timestamp`/`time`을 우선 사용하고, 없으면 현재 시각을 씁니다.
pub fn replay_line(line: &str) -> ReplayLine {
    let ts = parser::parse_record(line)
        .ok()
        .and_then(|record| parser::first_timestamp(&record, &["timestamp", "time"]))
        .unwrap_or_else(Utc::now);
    ReplayLine {
        ts,
        line: line.to_owned(),
    }
}

/// 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use sentinel_log_pipeline::IngestPipelineBuilder;
///
/// let mut pipeline = IngestPipelineBuilder::new().config(config).build()?;
/// let writer = pipeline.writer();   // 수집 API, 라이브 릴레이에 전달
/// pipeline.start().await?;
/// ```
pub struct IngestPipeline {
    config: PipelineConfig,
    state: PipelineState,
    writer: WriterHandle,
    /// start 전까지 보관되는 writer와 폴링 구동기
    ///
    /// writer가 SQLite 연결을 소유하므로 `Mutex`로 감싸야 파이프라인을
    /// 여러 태스크에서 공유(`Sync`)할 수 있습니다.
    pending: Mutex<Option<(BatchWriter, Option<PollDriver>)>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    writer_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl IngestPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// writer 제출 핸들 (복제본)
    pub fn writer(&self) -> WriterHandle {
        self.writer.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// writer 큐 사용률
    pub fn queue_utilization(&self) -> f64 {
        self.writer.utilization()
    }
}

impl Pipeline for IngestPipeline {
    async fn start(&mut self) -> Result<(), SentinelError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((writer, driver)) = pending else {
            return Err(PipelineError::InitFailed(
                "pipeline cannot be restarted after stop".to_owned(),
            )
            .into());
        };

        tracing::info!(
            ingest_enabled = self.config.ingest_enabled,
            events_db = %self.config.events_db_path.display(),
            replay_db = %self.config.replay_db_path.display(),
            "starting ingest pipeline"
        );

        self.writer_task = Some(tokio::spawn(writer.run()));

        if let Some(driver) = driver {
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            self.poll_task = Some(tokio::spawn(
                driver.run(self.config.poll_interval, shutdown_rx),
            ));
            self.shutdown_tx = Some(shutdown_tx);
        }

        self.state = PipelineState::Running;
        tracing::info!("ingest pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SentinelError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        tracing::info!("stopping ingest pipeline");

        // 1. 폴링 중단 (진행 중인 폴링은 끝까지 수행)
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.poll_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "poll driver task failed");
            }
        }

        // 2. writer 드레인 후 종료
        if let Err(e) = self.writer.shutdown().await {
            tracing::warn!(error = %e, "writer already stopped");
        }
        if let Some(task) = self.writer_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "writer task failed");
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!("ingest pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self.writer_task.as_ref().is_some_and(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("writer task exited".to_owned());
                }
                let utilization = self.writer.utilization();
                if utilization > 0.9 {
                    HealthStatus::Degraded(format!(
                        "writer queue utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 수집 파이프라인 빌더
///
/// 저장소를 열고 writer 채널을 생성합니다. writer 핸들은 start 전에도
/// [`IngestPipeline::writer`]로 얻을 수 있습니다.
pub struct IngestPipelineBuilder {
    config: PipelineConfig,
    stores: Option<(EventStore, ReplayStore)>,
}

impl IngestPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            stores: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 이미 열린 저장소를 사용합니다 (설정의 DB 경로는 무시).
    pub fn stores(mut self, events: EventStore, replay: ReplayStore) -> Self {
        self.stores = Some((events, replay));
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<IngestPipeline, LogPipelineError> {
        self.config.validate()?;

        let (events, replay) = match self.stores {
            Some(stores) => stores,
            None => (
                EventStore::open(&self.config.events_db_path)?,
                ReplayStore::open(&self.config.replay_db_path)?,
            ),
        };

        // 체크포인트는 writer에 저장소를 넘기기 전에 읽어야 합니다.
        let tailers = if self.config.ingest_enabled {
            Some(restore_tailers(
                tail_targets(&self.config),
                &events,
                &replay,
                self.config.max_lines_per_poll,
            )?)
        } else {
            None
        };

        let (writer_handle, writer) = batch_writer(self.config.writer.clone(), events, replay);
        let driver = tailers.map(|tailers| PollDriver::new(tailers, writer_handle.clone()));

        Ok(IngestPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            writer: writer_handle,
            pending: Mutex::new(Some((writer, driver))),
            shutdown_tx: None,
            writer_task: None,
            poll_task: None,
        })
    }
}

impl Default for IngestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 설정에서 tail 대상을 만듭니다.
pub fn tail_targets(config: &PipelineConfig) -> Vec<TailTarget> {
    let mut targets = vec![
        TailTarget::events(config.web_log_path.clone(), EventSource::Web),
        TailTarget::events(config.shell_log_path.clone(), EventSource::Shell),
    ];
    if config.record_shell_lines {
        targets.push(TailTarget::replay_lines(
            config.shell_log_path.clone(),
            EventSource::Shell,
        ));
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    use crate::writer;

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn temp_config(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.web_log_path = dir.join("web.jsonl");
        config.shell_log_path = dir.join("cowrie.json");
        config.events_db_path = dir.join("telemetry.db");
        config.replay_db_path = dir.join("playback.db");
        config.writer = writer::test_config();
        config
    }

    #[test]
    fn builder_creates_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestPipelineBuilder::new()
            .config(temp_config(dir.path()))
            .build()
            .unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert_eq!(pipeline.queue_utilization(), 0.0);
    }

    #[tokio::test]
    async fn pipeline_can_be_shared_across_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestPipelineBuilder::new()
            .config(temp_config(dir.path()))
            .build()
            .unwrap();
        let shared = std::sync::Arc::new(tokio::sync::RwLock::new(pipeline));

        shared.write().await.start().await.unwrap();
        let reader = std::sync::Arc::clone(&shared);
        let status = tokio::spawn(async move { reader.read().await.health_check().await })
            .await
            .unwrap();
        assert_eq!(status, HealthStatus::Healthy);
        shared.write().await.stop().await.unwrap();
    }

    #[test]
    fn builder_with_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(dir.path());
        config.writer.batch_size = 0;
        assert!(IngestPipelineBuilder::new().config(config).build().is_err());
    }

    #[test]
    fn targets_include_replay_lines_when_enabled() {
        let mut config = PipelineConfig::default();
        assert_eq!(tail_targets(&config).len(), 3);
        config.record_shell_lines = false;
        let targets = tail_targets(&config);
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.sink == TailSink::Events));
    }

    #[test]
    fn replay_line_prefers_embedded_timestamp() {
        let line = replay_line(r#"{"eventid":"cowrie.session.connect","timestamp":"2025-03-01T10:00:00Z"}"#);
        assert_eq!(
            Some(line.ts),
            sentinel_core::event::parse_timestamp("2025-03-01T10:00:00Z")
        );

        let before = Utc::now();
        let line = replay_line("plain text");
        assert!(line.ts >= before);
        assert_eq!(line.line, "plain text");
    }

    #[tokio::test]
    async fn poll_once_submits_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        append(
            &config.web_log_path,
            "{\"remote_addr\":\"1.1.1.1\",\"path\":\"/a\"}\nnot json\n",
        );
        append(
            &config.shell_log_path,
            "{\"eventid\":\"cowrie.login.failed\",\"src_ip\":\"2.2.2.2\"}\n{\"eventid\":\"cowrie.session.closed\"}\n",
        );

        let events = EventStore::open(&config.events_db_path).unwrap();
        let replay = ReplayStore::open(&config.replay_db_path).unwrap();
        let tailers = restore_tailers(tail_targets(&config), &events, &replay, 0).unwrap();
        let (handle, writer) = batch_writer(config.writer.clone(), events, replay);
        let task = tokio::spawn(writer.run());

        let mut driver = PollDriver::new(tailers, handle.clone());
        let summary = driver.poll_once().await;
        assert_eq!(summary.lines, 6);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.replay_lines, 2);
        assert_eq!(summary.dropped, 0);
        assert!(driver.tailers().iter().all(|t| t.offset() > 0));

        // 새 데이터가 없으면 아무것도 제출하지 않습니다.
        assert_eq!(driver.poll_once().await, PollSummary::default());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let events = EventStore::open(&config.events_db_path).unwrap();
        assert_eq!(events.count().unwrap(), 2);
        let web_key = config.web_log_path.display().to_string();
        assert_eq!(
            events.get_checkpoint(&web_key).unwrap(),
            std::fs::metadata(&config.web_log_path).unwrap().len()
        );
    }

    #[tokio::test]
    async fn lifecycle_start_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = IngestPipelineBuilder::new()
            .config(temp_config(dir.path()))
            .build()
            .unwrap();

        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());

        pipeline.start().await.unwrap();
        assert!(pipeline.start().await.is_err());
        assert!(pipeline.health_check().await.is_healthy());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.start().await.is_err());
    }
}
