//! 배치 writer -- 제출 큐를 소비해 저장소에 배치 단위로 기록합니다.
//!
//! 저장소에 쓰는 주체는 [`BatchWriter`] 하나뿐입니다. 생산자(tailer 폴링, 수집 API,
//! 라이브 릴레이)는 [`WriterHandle`]로 이벤트/라인을 제출합니다.
//!
//! # 플러시 조건
//! - 대기 중인 항목이 `batch_size`에 도달
//! - 마지막 플러시 후 `flush_interval` 경과
//! - 체크포인트/플러시/종료 요청
//!
//! # 백프레셔
//! 큐가 가득 차면 새 제출은 버려지고 drop 카운터만 증가합니다.
//! 생산자는 절대 블록되지 않습니다.
//!
//! # 체크포인트 순서
//! 체크포인트 메시지는 같은 큐를 통해 이벤트 뒤에 도착하므로, writer는 대기 중인
//! 배치를 먼저 커밋한 뒤에 오프셋을 기록합니다. 배치 커밋이 실패하면 오프셋은
//! 기록하지 않으며, 재시작 후 다시 읽은 라인은 지문 중복 제거로 흡수됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use sentinel_core::event::{NormalizedEvent, ReplayLine};
use sentinel_core::metrics as m;
use sentinel_store::{EventStore, ReplayStore, RetentionPolicy};

use crate::collector::TailSink;
use crate::config::WriterConfig;
use crate::error::LogPipelineError;

/// writer 큐 메시지
#[derive(Debug)]
pub enum WriterMessage {
    /// 정규화 이벤트
    Event(Box<NormalizedEvent>),
    /// 재생 라인
    Line(ReplayLine),
    /// 파일 체크포인트 (대기 중인 배치 커밋 후 기록)
    Checkpoint {
        sink: TailSink,
        path: String,
        offset: u64,
    },
    /// 대기 중인 배치를 커밋하고 응답
    Flush(oneshot::Sender<()>),
    /// 큐를 비우고 종료
    Shutdown,
}

/// writer 누적 통계
#[derive(Debug, Default)]
pub struct WriterStats {
    submitted: AtomicU64,
    dropped_events: AtomicU64,
    dropped_lines: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    lines_written: AtomicU64,
    failed_batches: AtomicU64,
    compacted: AtomicU64,
}

/// [`WriterStats`]의 특정 시점 값
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStatsSnapshot {
    pub submitted: u64,
    pub dropped_events: u64,
    pub dropped_lines: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub lines_written: u64,
    pub failed_batches: u64,
    pub compacted: u64,
}

impl WriterStats {
    fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            dropped_lines: self.dropped_lines.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            lines_written: self.lines_written.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            compacted: self.compacted.load(Ordering::Relaxed),
        }
    }
}

/// writer 제출 핸들
///
/// 복제해서 여러 생산자가 공유할 수 있습니다.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterMessage>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    /// 이벤트를 제출합니다. 큐가 가득 찼거나 writer가 종료되었으면 버리고 `false`를 반환합니다.
    pub fn submit_event(&self, event: NormalizedEvent) -> bool {
        match self.tx.try_send(WriterMessage::Event(Box::new(event))) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::WRITER_SUBMITTED_TOTAL).increment(1);
                true
            }
            Err(_) => {
                let dropped = self.stats.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!(m::WRITER_DROPPED_EVENTS_TOTAL).increment(1);
                // 큐가 계속 가득 찬 동안 로그가 넘치지 않도록 샘플링합니다.
                if dropped.is_power_of_two() {
                    tracing::warn!(dropped_total = dropped, "writer queue full, dropping event");
                }
                false
            }
        }
    }

    /// 재생 라인을 제출합니다. 실패 시 버리고 `false`를 반환합니다.
    pub fn submit_line(&self, line: ReplayLine) -> bool {
        match self.tx.try_send(WriterMessage::Line(line)) {
            Ok(()) => true,
            Err(_) => {
                let dropped = self.stats.dropped_lines.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!(m::WRITER_DROPPED_LINES_TOTAL).increment(1);
                if dropped.is_power_of_two() {
                    tracing::warn!(dropped_total = dropped, "writer queue full, dropping line");
                }
                false
            }
        }
    }

    /// 파일 체크포인트를 요청합니다.
    ///
    /// 이 호출 전에 제출한 항목이 커밋된 후에 기록됩니다.
    pub async fn checkpoint(
        &self,
        sink: TailSink,
        path: String,
        offset: u64,
    ) -> Result<(), LogPipelineError> {
        self.send(WriterMessage::Checkpoint { sink, path, offset })
            .await
    }

    /// 대기 중인 배치를 커밋하고 완료될 때까지 기다립니다.
    pub async fn flush(&self) -> Result<(), LogPipelineError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(WriterMessage::Flush(ack_tx)).await?;
        ack_rx
            .await
            .map_err(|_| LogPipelineError::Channel("writer dropped flush request".to_owned()))
    }

    /// writer에 종료를 요청합니다.
    pub async fn shutdown(&self) -> Result<(), LogPipelineError> {
        self.send(WriterMessage::Shutdown).await
    }

    async fn send(&self, message: WriterMessage) -> Result<(), LogPipelineError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| LogPipelineError::Channel("writer is not running".to_owned()))
    }

    /// 큐에 쌓인 메시지 수
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// 큐 사용률 (0.0~1.0)
    pub fn utilization(&self) -> f64 {
        let capacity = self.tx.max_capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.queue_depth() as f64 / capacity as f64
    }

    /// writer가 종료되었는지 여부
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }
}

/// 저장소에 쓰는 단일 writer
///
/// SQLite 호출은 블로킹이므로 저장소는 [`WriterStores`]로 묶어
/// `spawn_blocking`에 넘겼다가 작업이 끝나면 돌려받습니다.
pub struct BatchWriter {
    config: WriterConfig,
    stores: Option<WriterStores>,
    rx: mpsc::Receiver<WriterMessage>,
    stats: Arc<WriterStats>,
    retention: RetentionPolicy,
    pending_events: Vec<NormalizedEvent>,
    pending_lines: Vec<ReplayLine>,
    last_flush: Instant,
    last_compaction: Option<Instant>,
}

/// writer가 소유한 두 저장소
struct WriterStores {
    events: EventStore,
    replay: ReplayStore,
}

/// writer와 제출 핸들을 생성합니다.
///
/// writer는 [`BatchWriter::run`]으로 실행해야 메시지를 소비하기 시작합니다.
pub fn batch_writer(
    config: WriterConfig,
    events: EventStore,
    replay: ReplayStore,
) -> (WriterHandle, BatchWriter) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let stats = Arc::new(WriterStats::default());
    let handle = WriterHandle {
        tx,
        stats: Arc::clone(&stats),
    };
    let writer = BatchWriter {
        retention: RetentionPolicy::new(config.retention_days),
        pending_events: Vec::with_capacity(config.batch_size),
        pending_lines: Vec::new(),
        config,
        stores: Some(WriterStores { events, replay }),
        rx,
        stats,
        last_flush: Instant::now(),
        last_compaction: None,
    };
    (handle, writer)
}

impl BatchWriter {
    /// 종료 요청을 받거나 모든 핸들이 drop될 때까지 큐를 소비합니다.
    pub async fn run(mut self) {
        tracing::info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            retention_days = self.config.retention_days,
            "batch writer started"
        );

        while self.stores.is_some() {
            self.maybe_compact().await;

            let wait = self
                .config
                .flush_interval
                .saturating_sub(self.last_flush.elapsed());
            match tokio::time::timeout(wait, self.rx.recv()).await {
                Ok(Some(WriterMessage::Shutdown)) => {
                    self.drain_remaining().await;
                    break;
                }
                Ok(Some(message)) => self.handle(message).await,
                Ok(None) => break,
                Err(_elapsed) => {}
            }

            if self.pending_len() >= self.config.batch_size
                || self.last_flush.elapsed() >= self.config.flush_interval
            {
                self.flush().await;
            }
            metrics::gauge!(m::WRITER_QUEUE_DEPTH).set(self.rx.len() as f64);
        }

        if self.stores.is_none() {
            tracing::error!("writer stores lost after a failed blocking task, stopping writer");
        }
        self.flush().await;
        metrics::gauge!(m::WRITER_QUEUE_DEPTH).set(0.0);
        let stats = self.stats.snapshot();
        tracing::info!(
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            lines_written = stats.lines_written,
            dropped_events = stats.dropped_events,
            "batch writer stopped"
        );
    }

    async fn handle(&mut self, message: WriterMessage) {
        match message {
            WriterMessage::Event(event) => self.pending_events.push(*event),
            WriterMessage::Line(line) => self.pending_lines.push(line),
            WriterMessage::Checkpoint { sink, path, offset } => {
                if self.flush().await {
                    self.with_stores(move |stores| stores.write_checkpoint(sink, &path, offset))
                        .await;
                } else {
                    tracing::warn!(path = %path, offset, "skipping checkpoint after failed flush");
                }
            }
            WriterMessage::Flush(ack) => {
                self.flush().await;
                let _ = ack.send(());
            }
            WriterMessage::Shutdown => {}
        }
    }

    /// 종료 직전 큐에 남은 메시지를 모두 처리합니다.
    async fn drain_remaining(&mut self) {
        let mut drained = 0usize;
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::info!(messages = drained, "drained writer queue on shutdown");
        }
    }

    fn pending_len(&self) -> usize {
        self.pending_events.len() + self.pending_lines.len()
    }

    /// 저장소를 blocking 스레드로 옮겨 `work`를 실행합니다.
    ///
    /// 작업이 panic하면 저장소를 잃고 `None`을 반환하며, writer 루프는 종료됩니다.
    async fn with_stores<T, F>(&mut self, work: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriterStores) -> T + Send + 'static,
    {
        let mut stores = self.stores.take()?;
        let joined = tokio::task::spawn_blocking(move || {
            let out = work(&mut stores);
            (stores, out)
        })
        .await;
        match joined {
            Ok((stores, out)) => {
                self.stores = Some(stores);
                Some(out)
            }
            Err(e) => {
                tracing::error!(error = %e, "writer store task failed");
                None
            }
        }
    }

    /// 대기 중인 배치를 커밋합니다. 하나라도 실패하면 `false`.
    ///
    /// 실패한 배치는 버려지며 writer 루프는 계속 동작합니다.
    async fn flush(&mut self) -> bool {
        self.last_flush = Instant::now();
        if self.pending_len() == 0 {
            return true;
        }

        let events = std::mem::take(&mut self.pending_events);
        let lines = std::mem::take(&mut self.pending_lines);
        let stats = Arc::clone(&self.stats);
        self.with_stores(move |stores| stores.commit(&events, &lines, &stats))
            .await
            .unwrap_or(false)
    }

    async fn maybe_compact(&mut self) {
        if !self.retention.is_enabled() {
            return;
        }
        let due = self
            .last_compaction
            .is_none_or(|at| at.elapsed() >= self.config.compaction_interval);
        if !due {
            return;
        }
        self.last_compaction = Some(Instant::now());

        let retention = self.retention;
        let Some(result) = self
            .with_stores(move |stores| retention.compact(&stores.events, &stores.replay, Utc::now()))
            .await
        else {
            return;
        };
        match result {
            Ok(report) => {
                let total = (report.events_deleted + report.lines_deleted) as u64;
                self.stats.compacted.fetch_add(total, Ordering::Relaxed);
                metrics::counter!(m::STORE_COMPACTED_TOTAL, m::LABEL_STORE => "events")
                    .increment(report.events_deleted as u64);
                metrics::counter!(m::STORE_COMPACTED_TOTAL, m::LABEL_STORE => "replay")
                    .increment(report.lines_deleted as u64);
                if total > 0 {
                    tracing::info!(
                        events_deleted = report.events_deleted,
                        lines_deleted = report.lines_deleted,
                        retention_days = self.config.retention_days,
                        "retention compaction removed expired rows"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "retention compaction failed"),
        }
    }
}

impl WriterStores {
    fn commit(&mut self, events: &[NormalizedEvent], lines: &[ReplayLine], stats: &WriterStats) -> bool {
        let started = std::time::Instant::now();
        let mut ok = true;

        if !events.is_empty() {
            match self.events.insert_batch(events) {
                Ok(outcome) => {
                    stats
                        .inserted
                        .fetch_add(outcome.inserted as u64, Ordering::Relaxed);
                    stats
                        .duplicates
                        .fetch_add(outcome.duplicates as u64, Ordering::Relaxed);
                    metrics::counter!(m::STORE_INSERTED_TOTAL, m::LABEL_STORE => "events")
                        .increment(outcome.inserted as u64);
                    metrics::counter!(m::STORE_DUPLICATES_TOTAL)
                        .increment(outcome.duplicates as u64);
                    tracing::debug!(
                        inserted = outcome.inserted,
                        duplicates = outcome.duplicates,
                        "flushed event batch"
                    );
                }
                Err(e) => {
                    ok = false;
                    stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, events = events.len(), "event batch insert failed");
                }
            }
        }

        if !lines.is_empty() {
            match self.replay.insert_lines(lines) {
                Ok(written) => {
                    stats
                        .lines_written
                        .fetch_add(written as u64, Ordering::Relaxed);
                    metrics::counter!(m::STORE_INSERTED_TOTAL, m::LABEL_STORE => "replay")
                        .increment(written as u64);
                }
                Err(e) => {
                    ok = false;
                    stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, lines = lines.len(), "replay line insert failed");
                }
            }
        }

        metrics::histogram!(m::WRITER_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        ok
    }

    fn write_checkpoint(&self, sink: TailSink, path: &str, offset: u64) {
        let result = match sink {
            TailSink::Events => self.events.set_checkpoint(path, offset),
            TailSink::ReplayLines => self.replay.set_checkpoint(path, offset),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, path = %path, offset, "failed to persist checkpoint");
        }
    }
}

/// 테스트에서 writer 주기를 짧게 잡을 때 사용하는 기본값
#[cfg(test)]
pub(crate) fn test_config() -> WriterConfig {
    WriterConfig {
        queue_capacity: 16,
        batch_size: 4,
        flush_interval: std::time::Duration::from_millis(50),
        ..WriterConfig::default()
    }
}
