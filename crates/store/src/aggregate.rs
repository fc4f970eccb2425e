//! 지표 집계
//!
//! 모든 값은 호출 시점에 저장소에서 직접 계산합니다. 별도의 누적 카운터를
//! 두지 않으므로 캐시와 실제 상태가 어긋나는 일이 없습니다.

use rusqlite::params;
use serde::{Serialize, Serializer};

use sentinel_core::event::{
    EventSource, KIND_HTTP_REQUEST, KIND_LOGIN_FAILED, KIND_LOGIN_SUCCESS,
};

use crate::error::StoreError;
use crate::events::EventStore;

/// 값을 계산할 수 없을 때 표시하는 문자열
pub const NOT_AVAILABLE: &str = "n/a";

/// 집계 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// 전체 이벤트 수
    pub total: u64,
    /// WEB 요청 이벤트 수
    pub web_attempts: u64,
    /// SHELL 로그인 시도 수 (성공 + 실패)
    pub shell_attempts: u64,
    /// WEB 고유 주소 수
    pub unique_ips_web: u64,
    /// SHELL 고유 주소 수
    pub unique_ips_shell: u64,
    /// 전체 고유 주소 수
    pub unique_ips: u64,
    /// 가장 최근 이벤트 시각
    pub last_update: Option<String>,
}

impl MetricsSnapshot {
    /// 저장소에서 지표를 계산합니다.
    ///
    /// 고유 주소 수는 `NULL`이 아닌 주소만 셉니다. 주소가 없던 이벤트의
    /// `"unknown"`도 하나의 주소로 집계됩니다.
    pub fn compute(store: &EventStore) -> Result<Self, StoreError> {
        let conn = store.conn();

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let web_attempts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE source = ?1 AND event_type = ?2",
            params![EventSource::Web.as_str(), KIND_HTTP_REQUEST],
            |row| row.get(0),
        )?;
        let shell_attempts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE source = ?1 AND event_type IN (?2, ?3)",
            params![
                EventSource::Shell.as_str(),
                KIND_LOGIN_SUCCESS,
                KIND_LOGIN_FAILED
            ],
            |row| row.get(0),
        )?;

        let unique_for = |source: Option<EventSource>| -> Result<i64, StoreError> {
            let count = conn.query_row(
                "SELECT COUNT(DISTINCT src_ip) FROM events \
                 WHERE src_ip IS NOT NULL AND (?1 IS NULL OR source = ?1)",
                params![source.map(|s| s.as_str())],
                |row| row.get(0),
            )?;
            Ok(count)
        };

        let last_update: Option<String> =
            conn.query_row("SELECT MAX(ts) FROM events", [], |row| row.get(0))?;

        Ok(Self {
            total: to_count(total),
            web_attempts: to_count(web_attempts),
            shell_attempts: to_count(shell_attempts),
            unique_ips_web: to_count(unique_for(Some(EventSource::Web))?),
            unique_ips_shell: to_count(unique_for(Some(EventSource::Shell))?),
            unique_ips: to_count(unique_for(None)?),
            last_update,
        })
    }

    /// API 응답용 평탄 객체로 변환합니다.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total: Some(self.total),
            web_attempts: Some(self.web_attempts),
            shell_attempts: Some(self.shell_attempts),
            unique_ips_web: Some(self.unique_ips_web),
            unique_ips_shell: Some(self.unique_ips_shell),
            unique_ips: Some(self.unique_ips),
            last_update: self.last_update.clone(),
        }
    }
}

/// 지표 응답: 값이 없으면 `null` 대신 `"n/a"`로 직렬화합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    #[serde(serialize_with = "or_not_available")]
    pub total: Option<u64>,
    #[serde(serialize_with = "or_not_available")]
    pub web_attempts: Option<u64>,
    #[serde(serialize_with = "or_not_available")]
    pub shell_attempts: Option<u64>,
    #[serde(serialize_with = "or_not_available")]
    pub unique_ips_web: Option<u64>,
    #[serde(serialize_with = "or_not_available")]
    pub unique_ips_shell: Option<u64>,
    #[serde(serialize_with = "or_not_available")]
    pub unique_ips: Option<u64>,
    #[serde(serialize_with = "or_not_available")]
    pub last_update: Option<String>,
}

impl MetricsReport {
    /// 저장소를 읽을 수 없을 때의 응답 (모든 값 `"n/a"`)
    pub fn unavailable() -> Self {
        Self::default()
    }
}

fn or_not_available<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(value) => value.serialize(serializer),
        None => serializer.serialize_str(NOT_AVAILABLE),
    }
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}
