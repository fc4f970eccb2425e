//! 수집 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`SentinelConfig`]에서 수집/저장 관련 섹션을
//! 모아 파이프라인 내부에서 쓰기 좋은 형태(`Duration`, `PathBuf`)로 바꿉니다.
//!
//! # 사용 예시
//! ```ignore
//! use sentinel_core::config::SentinelConfig;
//! use sentinel_log_pipeline::config::PipelineConfig;
//!
//! let core_config = SentinelConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use sentinel_core::config::{MAX_RETENTION_DAYS, SentinelConfig};

use crate::error::LogPipelineError;

/// 배치 writer 설정
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// 제출 큐 용량
    pub queue_capacity: usize,
    /// 이 개수만큼 모이면 플러시
    pub batch_size: usize,
    /// 마지막 플러시 후 이 시간이 지나면 플러시
    pub flush_interval: Duration,
    /// 보존 기간 (일, 0 = 무제한)
    pub retention_days: u32,
    /// 보존 정리 주기
    pub compaction_interval: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5000,
            batch_size: 50,
            flush_interval: Duration::from_secs(1),
            retention_days: 0,
            compaction_interval: Duration::from_secs(3600),
        }
    }
}

impl WriterConfig {
    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.queue_capacity == 0 {
            return Err(config_error("queue_capacity", "must be greater than 0"));
        }
        if self.batch_size == 0 || self.batch_size > self.queue_capacity {
            return Err(config_error(
                "batch_size",
                &format!("must be 1-{}", self.queue_capacity),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(config_error("flush_interval", "must be greater than 0"));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(config_error(
                "retention_days",
                &format!("must be 0-{MAX_RETENTION_DAYS}"),
            ));
        }
        if self.retention_days > 0 && self.compaction_interval.is_zero() {
            return Err(config_error(
                "compaction_interval",
                "must be greater than 0 when retention is enabled",
            ));
        }
        Ok(())
    }
}

/// 수집 파이프라인 설정
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 파일 tail 활성화 여부
    pub ingest_enabled: bool,
    /// WEB 센서 로그 경로
    pub web_log_path: PathBuf,
    /// SHELL 센서 로그 경로
    pub shell_log_path: PathBuf,
    /// 폴링 간격
    pub poll_interval: Duration,
    /// 폴링당 최대 라인 수 (0 = 무제한)
    pub max_lines_per_poll: usize,
    /// SHELL 로그를 재생 라인으로도 기록할지 여부
    pub record_shell_lines: bool,
    /// 정규화 이벤트 DB 경로
    pub events_db_path: PathBuf,
    /// 재생 라인 DB 경로
    pub replay_db_path: PathBuf,
    /// writer 설정
    pub writer: WriterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&SentinelConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &SentinelConfig) -> Self {
        Self {
            ingest_enabled: core.ingest.enabled,
            web_log_path: PathBuf::from(&core.ingest.web_log_path),
            shell_log_path: PathBuf::from(&core.ingest.shell_log_path),
            poll_interval: Duration::from_secs(core.ingest.poll_interval_secs),
            max_lines_per_poll: core.ingest.max_lines_per_poll,
            record_shell_lines: core.ingest.record_shell_lines,
            events_db_path: PathBuf::from(&core.storage.events_db_path),
            replay_db_path: PathBuf::from(&core.storage.replay_db_path),
            writer: WriterConfig {
                queue_capacity: core.storage.queue_capacity,
                batch_size: core.storage.batch_size,
                flush_interval: Duration::from_millis(core.storage.flush_interval_ms),
                retention_days: core.storage.retention_days,
                compaction_interval: Duration::from_secs(core.storage.compaction_interval_secs),
            },
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.ingest_enabled && self.poll_interval.is_zero() {
            return Err(config_error("poll_interval", "must be greater than 0"));
        }
        if self.events_db_path == self.replay_db_path {
            return Err(config_error(
                "replay_db_path",
                "must differ from events_db_path",
            ));
        }
        self.writer.validate()
    }
}

fn config_error(field: &str, reason: &str) -> LogPipelineError {
    LogPipelineError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}
