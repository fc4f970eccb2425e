//! 로그 수집 모듈 -- 센서 로그 파일에서 새로 추가된 라인을 읽습니다.
//!
//! # 수집 대상
//! - WEB 센서 로그 → 정규화 이벤트 저장소
//! - SHELL 센서 로그 → 정규화 이벤트 저장소
//! - SHELL 센서 로그 (원문) → 재생 라인 저장소
//!
//! 같은 파일이라도 저장 대상이 다르면 체크포인트를 따로 관리합니다.

pub mod file;

pub use file::{FileTailer, TailRead, read_new_lines};

use std::path::PathBuf;

use sentinel_core::event::EventSource;

/// 읽은 라인을 보낼 곳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailSink {
    /// 정규화 후 이벤트 저장소 (`file_offsets` 체크포인트)
    Events,
    /// 원문 그대로 재생 라인 저장소 (`log_offsets` 체크포인트)
    ReplayLines,
}

/// tail 대상 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailTarget {
    pub path: PathBuf,
    pub source: EventSource,
    pub sink: TailSink,
}

impl TailTarget {
    /// 정규화 이벤트용 대상
    pub fn events(path: impl Into<PathBuf>, source: EventSource) -> Self {
        Self {
            path: path.into(),
            source,
            sink: TailSink::Events,
        }
    }

    /// 재생 라인용 대상
    pub fn replay_lines(path: impl Into<PathBuf>, source: EventSource) -> Self {
        Self {
            path: path.into(),
            source,
            sink: TailSink::ReplayLines,
        }
    }

    /// 체크포인트 키 (파일 경로 문자열)
    pub fn checkpoint_key(&self) -> String {
        self.path.display().to_string()
    }
}

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 마지막 폴링이 실패함 (다음 폴링에서 재시도)
    Error(String),
}
