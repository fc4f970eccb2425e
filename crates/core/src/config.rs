//! 설정 관리: sentinel.toml 파싱 및 런타임 설정
//!
//! [`SentinelConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SENTINEL_STORAGE_BATCH_SIZE=100` 형식)
//! 3. 설정 파일 (`sentinel.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), sentinel_core::error::SentinelError> {
//! use sentinel_core::config::SentinelConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SentinelConfig::load("sentinel.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SentinelConfig::parse("[storage]\nretention_days = 30")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SentinelError};

/// Sentinel 통합 설정
///
/// `sentinel.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 컴포넌트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 수집 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 라이브 스트림 릴레이 설정
    #[serde(default)]
    pub relay: RelayConfig,
    /// 세션 재생 설정
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// HTTP API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SentinelConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SentinelError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SentinelError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SentinelError::Io(e)
            }
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SentinelError> {
        toml::from_str(toml_str).map_err(|e| {
            SentinelError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SENTINEL_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SENTINEL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SENTINEL_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "SENTINEL_GENERAL_DATA_DIR");

        // Ingest
        override_bool(&mut self.ingest.enabled, "SENTINEL_INGEST_ENABLED");
        override_string(&mut self.ingest.web_log_path, "SENTINEL_INGEST_WEB_LOG_PATH");
        override_string(
            &mut self.ingest.shell_log_path,
            "SENTINEL_INGEST_SHELL_LOG_PATH",
        );
        override_u64(
            &mut self.ingest.poll_interval_secs,
            "SENTINEL_INGEST_POLL_INTERVAL_SECS",
        );
        override_usize(
            &mut self.ingest.max_lines_per_poll,
            "SENTINEL_INGEST_MAX_LINES_PER_POLL",
        );
        override_bool(
            &mut self.ingest.record_shell_lines,
            "SENTINEL_INGEST_RECORD_SHELL_LINES",
        );

        // Storage
        override_string(
            &mut self.storage.events_db_path,
            "SENTINEL_STORAGE_EVENTS_DB_PATH",
        );
        override_string(
            &mut self.storage.replay_db_path,
            "SENTINEL_STORAGE_REPLAY_DB_PATH",
        );
        override_usize(
            &mut self.storage.queue_capacity,
            "SENTINEL_STORAGE_QUEUE_CAPACITY",
        );
        override_usize(&mut self.storage.batch_size, "SENTINEL_STORAGE_BATCH_SIZE");
        override_u64(
            &mut self.storage.flush_interval_ms,
            "SENTINEL_STORAGE_FLUSH_INTERVAL_MS",
        );
        override_u32(
            &mut self.storage.retention_days,
            "SENTINEL_STORAGE_RETENTION_DAYS",
        );
        override_u64(
            &mut self.storage.compaction_interval_secs,
            "SENTINEL_STORAGE_COMPACTION_INTERVAL_SECS",
        );
        override_usize(
            &mut self.storage.max_page_size,
            "SENTINEL_STORAGE_MAX_PAGE_SIZE",
        );

        // Relay
        override_bool(&mut self.relay.enabled, "SENTINEL_RELAY_ENABLED");
        override_string(&mut self.relay.upstream_url, "SENTINEL_RELAY_UPSTREAM_URL");
        override_u64(
            &mut self.relay.keepalive_secs,
            "SENTINEL_RELAY_KEEPALIVE_SECS",
        );
        override_u64(
            &mut self.relay.connect_timeout_secs,
            "SENTINEL_RELAY_CONNECT_TIMEOUT_SECS",
        );

        // Sessions
        override_string(&mut self.sessions.tty_dir, "SENTINEL_SESSIONS_TTY_DIR");
        override_string(
            &mut self.sessions.playlog_bin,
            "SENTINEL_SESSIONS_PLAYLOG_BIN",
        );
        override_u64(
            &mut self.sessions.terminate_grace_secs,
            "SENTINEL_SESSIONS_TERMINATE_GRACE_SECS",
        );

        // API
        override_string(&mut self.api.listen_addr, "SENTINEL_API_LISTEN_ADDR");
        override_u16(&mut self.api.port, "SENTINEL_API_PORT");
        override_usize(
            &mut self.api.max_intake_batch,
            "SENTINEL_API_MAX_INTAKE_BATCH",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "SENTINEL_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "SENTINEL_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "SENTINEL_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "SENTINEL_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SentinelError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.ingest.enabled && self.ingest.poll_interval_secs == 0 {
            return Err(invalid(
                "ingest.poll_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        // 큐/배치 검증
        if self.storage.queue_capacity == 0 {
            return Err(invalid(
                "storage.queue_capacity",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.storage.batch_size == 0 {
            return Err(invalid(
                "storage.batch_size",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.storage.batch_size > self.storage.queue_capacity {
            return Err(invalid(
                "storage.batch_size",
                format!(
                    "must not exceed queue_capacity ({})",
                    self.storage.queue_capacity
                ),
            ));
        }
        if self.storage.flush_interval_ms == 0 {
            return Err(invalid(
                "storage.flush_interval_ms",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.storage.retention_days > MAX_RETENTION_DAYS {
            return Err(invalid(
                "storage.retention_days",
                format!("must be 0 (keep forever) or 1-{MAX_RETENTION_DAYS}"),
            ));
        }
        if self.storage.retention_days > 0 && self.storage.compaction_interval_secs == 0 {
            return Err(invalid(
                "storage.compaction_interval_secs",
                "must be greater than 0 when retention is enabled".to_owned(),
            ));
        }
        if self.storage.max_page_size == 0 {
            return Err(invalid(
                "storage.max_page_size",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.relay.enabled {
            if self.relay.upstream_url.trim().is_empty() {
                return Err(invalid(
                    "relay.upstream_url",
                    "must not be empty when relay is enabled".to_owned(),
                ));
            }
            if self.relay.keepalive_secs == 0 {
                return Err(invalid(
                    "relay.keepalive_secs",
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        if self.sessions.tty_dir.trim().is_empty() {
            return Err(invalid("sessions.tty_dir", "must not be empty".to_owned()));
        }
        if self.sessions.playlog_bin.trim().is_empty() {
            return Err(invalid(
                "sessions.playlog_bin",
                "must not be empty".to_owned(),
            ));
        }

        if self.api.max_intake_batch == 0 {
            return Err(invalid(
                "api.max_intake_batch",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}

/// 보존 기간 상한 (일)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

fn invalid(field: &str, reason: String) -> SentinelError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "data".to_owned(),
        }
    }
}

/// 로그 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// WEB 센서 로그 경로 (JSON Lines)
    pub web_log_path: String,
    /// SHELL 센서 로그 경로 (JSON Lines)
    pub shell_log_path: String,
    /// 폴링 간격 (초)
    pub poll_interval_secs: u64,
    /// 한 번의 폴링에서 처리할 최대 라인 수 (0 = 무제한)
    pub max_lines_per_poll: usize,
    /// SHELL 로그를 재생 라인 저장소에도 기록할지 여부
    pub record_shell_lines: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            web_log_path: "logs/web.jsonl".to_owned(),
            shell_log_path: "logs/cowrie.json".to_owned(),
            poll_interval_secs: 5,
            max_lines_per_poll: 0,
            record_shell_lines: true,
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 정규화 이벤트 DB 경로
    pub events_db_path: String,
    /// 재생 라인 DB 경로
    pub replay_db_path: String,
    /// 제출 큐 용량
    pub queue_capacity: usize,
    /// 배치 플러시 크기
    pub batch_size: usize,
    /// 배치 플러시 간격 (밀리초)
    pub flush_interval_ms: u64,
    /// 보존 기간 (일, 0 = 무제한)
    pub retention_days: u32,
    /// 보존 정리 주기 (초)
    pub compaction_interval_secs: u64,
    /// 조회 한 번에 반환할 최대 행 수
    pub max_page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            events_db_path: "data/telemetry.db".to_owned(),
            replay_db_path: "data/playback.db".to_owned(),
            queue_capacity: 5000,
            batch_size: 50,
            flush_interval_ms: 1000,
            retention_days: 0,
            compaction_interval_secs: 3600,
            max_page_size: 5000,
        }
    }
}

/// 라이브 스트림 릴레이 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 업스트림 SSE 피드 URL
    pub upstream_url: String,
    /// 유휴 keepalive 간격 (초)
    pub keepalive_secs: u64,
    /// 업스트림 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upstream_url: "http://127.0.0.1:8080/stream".to_owned(),
            keepalive_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

/// 세션 재생 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// 세션 TTY 기록 디렉토리
    pub tty_dir: String,
    /// 외부 재생 도구 경로
    pub playlog_bin: String,
    /// 재생 프로세스 종료 유예 시간 (초)
    pub terminate_grace_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            tty_dir: "var/lib/cowrie/tty".to_owned(),
            playlog_bin: "bin/playlog".to_owned(),
            terminate_grace_secs: 2,
        }
    }
}

/// HTTP API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen_addr: String,
    pub port: u16,
    /// 수집 요청 한 번에 허용하는 최대 이벤트 수
    pub max_intake_batch: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_owned(),
            port: 5000,
            max_intake_batch: 5000,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    /// 노출 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = SentinelConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.storage.queue_capacity, 5000);
        assert_eq!(config.storage.batch_size, 50);
        assert_eq!(config.storage.flush_interval_ms, 1000);
        assert_eq!(config.storage.retention_days, 0);
        assert_eq!(config.relay.keepalive_secs, 15);
        assert_eq!(config.sessions.terminate_grace_secs, 2);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        SentinelConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = SentinelConfig::parse("").unwrap();
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.storage.max_page_size, 5000);
    }

    #[test]
    fn parse_partial_section_keeps_other_defaults() {
        let config = SentinelConfig::parse("[storage]\nretention_days = 30\n").unwrap();
        assert_eq!(config.storage.retention_days, 30);
        assert_eq!(config.storage.batch_size, 50);
    }

    #[test]
    fn parse_invalid_toml_fails() {
        let err = SentinelConfig::parse("[storage\nbatch_size = ").unwrap_err();
        assert!(matches!(
            err,
            SentinelError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_bounds_retention_days() {
        let config = SentinelConfig::parse("[storage]\nretention_days = 4000000000\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retention_days"));

        let mut config = SentinelConfig::default();
        config.storage.retention_days = MAX_RETENTION_DAYS;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = SentinelConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = SentinelConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = SentinelConfig::default();
        config.storage.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn validate_rejects_batch_larger_than_queue() {
        let mut config = SentinelConfig::default();
        config.storage.queue_capacity = 10;
        config.storage.batch_size = 11;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn validate_rejects_zero_flush_interval() {
        let mut config = SentinelConfig::default();
        config.storage.flush_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_upstream_when_relay_enabled() {
        let mut config = SentinelConfig::default();
        config.relay.upstream_url = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("upstream_url"));
    }

    #[test]
    fn validate_accepts_empty_upstream_when_relay_disabled() {
        let mut config = SentinelConfig::default();
        config.relay.enabled = false;
        config.relay.upstream_url = String::new();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = SentinelConfig::default();
        config.ingest.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_playlog_bin() {
        let mut config = SentinelConfig::default();
        config.sessions.playlog_bin = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("playlog_bin"));
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트로 환경변수 동시 조작을 막습니다.
        unsafe { std::env::set_var("TEST_SENTINEL_STR", "overridden") };
        override_string(&mut val, "TEST_SENTINEL_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_SENTINEL_STR") };
    }

    #[test]
    #[serial]
    fn env_override_u64_invalid_keeps_original() {
        let mut val = 5u64;
        // SAFETY: serial 테스트로 환경변수 동시 조작을 막습니다.
        unsafe { std::env::set_var("TEST_SENTINEL_U64_BAD", "five") };
        override_u64(&mut val, "TEST_SENTINEL_U64_BAD");
        assert_eq!(val, 5);
        unsafe { std::env::remove_var("TEST_SENTINEL_U64_BAD") };
    }

    #[test]
    #[serial]
    fn apply_env_overrides_sets_storage_fields() {
        let mut config = SentinelConfig::default();
        // SAFETY: serial 테스트로 환경변수 동시 조작을 막습니다.
        unsafe {
            std::env::set_var("SENTINEL_STORAGE_BATCH_SIZE", "100");
            std::env::set_var("SENTINEL_STORAGE_RETENTION_DAYS", "14");
            std::env::set_var("SENTINEL_RELAY_ENABLED", "false");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("SENTINEL_STORAGE_BATCH_SIZE");
            std::env::remove_var("SENTINEL_STORAGE_RETENTION_DAYS");
            std::env::remove_var("SENTINEL_RELAY_ENABLED");
        }
        assert_eq!(config.storage.batch_size, 100);
        assert_eq!(config.storage.retention_days, 14);
        assert!(!config.relay.enabled);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_SENTINEL_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = SentinelConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = SentinelConfig::parse(&toml_str).unwrap();
        assert_eq!(config.storage.events_db_path, parsed.storage.events_db_path);
        assert_eq!(config.relay.upstream_url, parsed.relay.upstream_url);
    }

    #[tokio::test]
    async fn load_missing_file_reports_not_found() {
        let err = SentinelConfig::load("/nonexistent/path/sentinel.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SentinelError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
