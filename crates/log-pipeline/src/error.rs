//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 수집, writer, 릴레이, 세션 재생에서 발생하는 에러를 표현합니다.
//! `From<LogPipelineError> for SentinelError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 레코드 단위의 실패(잘못된 JSON 라인, 중복 지문 등)는 에러로 올라오지 않고
//! 해당 루프 안에서 로그와 카운터로만 처리됩니다.

use sentinel_core::error::{PipelineError, SentinelError};
use sentinel_store::StoreError;

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 수집기 에러 (파일 I/O 등)
    #[error("collector error: {path}: {reason}")]
    Collector {
        /// 대상 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러 (writer 종료 등)
    #[error("channel error: {0}")]
    Channel(String),

    /// 업스트림 라이브 피드 에러
    #[error("upstream error: {0}")]
    Upstream(String),

    /// 세션 ID 검증 실패
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// 세션 기록 파일 없음
    #[error("session file missing on disk: {0}")]
    SessionArtifactMissing(String),

    /// 외부 재생 도구 없음
    #[error("replay tool not found: {0}")]
    ReplayToolMissing(String),

    /// 이미 실행 중
    #[error("already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("not running")]
    NotRunning,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogPipelineError {
    /// 호출자 입력 검증 실패인지 여부 (API에서 4xx로 매핑)
    pub fn is_boundary_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidSessionId(_) | Self::SessionArtifactMissing(_) | Self::ReplayToolMissing(_)
        )
    }
}

impl From<LogPipelineError> for SentinelError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Store(e) => e.into(),
            LogPipelineError::AlreadyRunning => PipelineError::AlreadyRunning.into(),
            LogPipelineError::NotRunning => PipelineError::NotRunning.into(),
            LogPipelineError::Channel(reason) => PipelineError::ChannelSend(reason).into(),
            other => PipelineError::InitFailed(other.to_string()).into(),
        }
    }
}
