//! 이벤트 모델: 정규화된 텔레메트리 이벤트와 재생 라인
//!
//! 모든 센서 로그는 [`NormalizedEvent`] 한 가지 형태로 변환된 뒤 저장됩니다.
//! 소스별 필드는 [`EventDetail`]의 variant로 구분되며, 저장 후에는
//! [`StoredEvent`]가 저장소가 부여한 `id`와 `fingerprint`를 함께 담습니다.
//!
//! 세션 스트림의 원문 라인은 [`ReplayLine`]으로 별도 저장됩니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

// --- 이벤트 종류 상수 ---

/// 주소를 알 수 없을 때 사용하는 값
pub const UNKNOWN_ADDRESS: &str = "unknown";
/// WEB 소스의 기본 요청 이벤트 종류
pub const KIND_HTTP_REQUEST: &str = "http_request";
/// SHELL 소스에서 텔레메트리로 취급하는 이벤트 종류 접두사
pub const SHELL_LOGIN_PREFIX: &str = "cowrie.login.";
/// SHELL 로그인 성공
pub const KIND_LOGIN_SUCCESS: &str = "cowrie.login.success";
/// SHELL 로그인 실패
pub const KIND_LOGIN_FAILED: &str = "cowrie.login.failed";
/// SHELL 세션 연결 (세션 인덱스에 사용)
pub const KIND_SESSION_CONNECT: &str = "cowrie.session.connect";

/// 이벤트 소스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    /// 웹 요청 로그
    Web,
    /// SSH 허니팟 로그
    Shell,
}

impl EventSource {
    /// 저장소와 API에서 사용하는 문자열 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Shell => "SHELL",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = ParseError;

    /// 대소문자를 구분하지 않으며 `HTTP`/`SSH` 별칭을 허용합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEB" | "HTTP" => Ok(Self::Web),
            "SHELL" | "SSH" => Ok(Self::Shell),
            _ => Err(ParseError::UnknownSource(s.to_owned())),
        }
    }
}

/// WEB 소스 전용 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDetail {
    pub method: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub user_agent: Option<String>,
}

/// SHELL 소스 전용 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellDetail {
    pub message: Option<String>,
}

/// 소스별 필드: `source` 태그로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "UPPERCASE")]
pub enum EventDetail {
    Web(WebDetail),
    Shell(ShellDetail),
}

impl EventDetail {
    /// 이 상세 정보가 속한 소스
    pub fn source(&self) -> EventSource {
        match self {
            Self::Web(_) => EventSource::Web,
            Self::Shell(_) => EventSource::Shell,
        }
    }
}

/// 정규화된 이벤트
///
/// `source`(= `detail`의 variant)와 `event_kind`는 항상 존재하며,
/// 나머지 필드는 원본에 없으면 `None`입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// 이벤트 발생 시각 (파싱 불가 시 `None`)
    pub timestamp: Option<DateTime<Utc>>,
    /// 요청 주소 (없으면 `"unknown"`)
    pub origin_address: String,
    /// 이벤트 종류 (예: `"http_request"`, `"cowrie.login.failed"`)
    pub event_kind: String,
    pub username: Option<String>,
    pub secret: Option<String>,
    /// 소스별 필드
    #[serde(flatten)]
    pub detail: EventDetail,
    /// 원본 레코드
    pub raw: serde_json::Value,
}

impl NormalizedEvent {
    /// 이벤트 소스
    pub fn source(&self) -> EventSource {
        self.detail.source()
    }

    /// WEB 이벤트의 요청 경로
    pub fn path(&self) -> Option<&str> {
        match &self.detail {
            EventDetail::Web(web) => web.path.as_deref(),
            EventDetail::Shell(_) => None,
        }
    }

    /// 저장용 타임스탬프 문자열
    pub fn timestamp_string(&self) -> Option<String> {
        self.timestamp.as_ref().map(format_timestamp)
    }
}

/// 저장된 이벤트: 저장소가 부여한 `id`와 지문을 포함합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// 단조 증가 ID (재생 커서)
    pub id: i64,
    /// 내용 지문
    pub fingerprint: String,
    #[serde(flatten)]
    pub event: NormalizedEvent,
}

/// 세션 스트림 원문 라인
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayLine {
    /// 라인 시각
    pub ts: DateTime<Utc>,
    /// 원문
    pub line: String,
}

impl ReplayLine {
    /// 현재 시각으로 라인을 생성합니다.
    pub fn now(line: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            line: line.into(),
        }
    }
}

/// 소스 파일 체크포인트: 이미 소비한 바이트 오프셋
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCheckpoint {
    pub path: String,
    pub offset: u64,
}

// --- 타임스탬프 ---

/// 저장용 타임스탬프 포맷 (마이크로초 고정 폭, `Z` 접미사)
///
/// 고정 폭이므로 문자열 비교 순서가 시간 순서와 같습니다.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 센서 로그의 타임스탬프를 UTC로 파싱합니다.
///
/// RFC 3339(오프셋 포함)와 오프셋 없는 ISO 형식을 허용하며,
/// 오프셋이 없으면 UTC로 간주합니다.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .map(|naive| naive.and_utc())
    })
}
