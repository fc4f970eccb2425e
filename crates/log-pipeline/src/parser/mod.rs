//! 정규화 모듈 -- 센서별 JSON 레코드를 [`NormalizedEvent`]로 변환합니다.
//!
//! 각 정규화기는 core의 [`Normalizer`] trait을 구현합니다.
//!
//! # 지원 소스
//! - WEB 요청 로그 ([`WebNormalizer`])
//! - SHELL 허니팟 로그 ([`ShellNormalizer`]) -- `cowrie.login.*` 이벤트만 통과
//! - 수집 API 입력 ([`intake`]) -- 이미 정규화에 가까운 객체의 필드 별칭 흡수
//!
//! # 사용 예시
//! ```ignore
//! use sentinel_log_pipeline::parser::{normalize_line, LineOutcome, WebNormalizer};
//!
//! let normalizer = WebNormalizer;
//! match normalize_line(&normalizer, r#"{"remote_addr":"1.2.3.4","path":"/"}"#) {
//!     LineOutcome::Event(event) => { /* 제출 */ }
//!     LineOutcome::Filtered | LineOutcome::Malformed(_) => {}
//! }
//! ```

pub mod intake;
pub mod shell;
pub mod web;

pub use intake::{IntakeRejection, coerce_intake};
pub use shell::ShellNormalizer;
pub use web::WebNormalizer;

use chrono::{DateTime, Utc};
use serde_json::Value;

use sentinel_core::event::{EventSource, NormalizedEvent, parse_timestamp};
use sentinel_core::metrics::{INGEST_FILTERED_TOTAL, INGEST_PARSE_FAILURES_TOTAL, LABEL_SOURCE};
use sentinel_core::pipeline::Normalizer;

/// 라인 하나의 정규화 결과
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// 정규화된 이벤트
    Event(NormalizedEvent),
    /// 텔레메트리 대상이 아니라 걸러짐
    Filtered,
    /// JSON 객체로 파싱할 수 없음
    Malformed(String),
}

/// 로그 라인 하나를 파싱하고 정규화합니다.
///
/// 파싱 실패와 필터링은 카운터로만 기록되며 에러로 전파되지 않습니다.
pub fn normalize_line(normalizer: &dyn Normalizer, line: &str) -> LineOutcome {
    let source = normalizer.source();
    let record = match parse_record(line) {
        Ok(record) => record,
        Err(reason) => {
            tracing::debug!(source = %source, reason = %reason, "dropping malformed log line");
            metrics::counter!(INGEST_PARSE_FAILURES_TOTAL, LABEL_SOURCE => source.as_str())
                .increment(1);
            return LineOutcome::Malformed(reason);
        }
    };

    match normalizer.normalize(&record) {
        Some(event) => LineOutcome::Event(event),
        None => {
            metrics::counter!(INGEST_FILTERED_TOTAL, LABEL_SOURCE => source.as_str())
                .increment(1);
            LineOutcome::Filtered
        }
    }
}

/// 라인을 JSON 객체로 파싱합니다.
pub fn parse_record(line: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(line.trim()).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("expected a JSON object".to_owned());
    }
    Ok(value)
}

/// 소스에 맞는 정규화기
pub fn normalizer_for(source: EventSource) -> Box<dyn Normalizer> {
    match source {
        EventSource::Web => Box::new(WebNormalizer),
        EventSource::Shell => Box::new(ShellNormalizer),
    }
}

// --- 필드 추출 헬퍼 ---

/// 문자열 필드를 추출합니다.
///
/// dot notation을 지원하며 (예: `"headers.User-Agent"`), 숫자/불리언은 문자열로 바꿉니다.
/// 빈 문자열은 없는 값으로 취급합니다.
pub(crate) fn extract_string(value: &Value, field: &str) -> Option<String> {
    let mut current = value;
    for part in field.split('.') {
        current = current.get(part)?;
    }
    match current {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 후보 필드 중 처음으로 값이 있는 것을 반환합니다.
pub(crate) fn first_string(value: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| extract_string(value, field))
}

/// 후보 필드 중 처음으로 해석 가능한 타임스탬프를 반환합니다.
///
/// 문자열(RFC 3339/ISO)과 Unix 초/밀리초 숫자를 허용합니다.
pub(crate) fn first_timestamp(value: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    fields
        .iter()
        .filter_map(|field| value.get(*field))
        .find_map(timestamp_value)
}

fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            // 10^11 이상이면 밀리초로 간주합니다.
            let millis = if secs.abs() >= 1e11 { secs } else { secs * 1000.0 };
            if !millis.is_finite() {
                return None;
            }
            DateTime::from_timestamp_millis(millis as i64)
        }
        _ => None,
    }
}
