//! WEB 요청 로그 정규화기
//!
//! 웹 센서는 요청 하나당 JSON 한 줄을 남깁니다. 주소 필드 이름이 배포마다 달라
//! [`ADDRESS_FIELDS`] 순서대로 처음 발견된 값을 사용합니다.

use serde_json::Value;

use sentinel_core::event::{
    EventDetail, EventSource, KIND_HTTP_REQUEST, NormalizedEvent, UNKNOWN_ADDRESS, WebDetail,
};
use sentinel_core::pipeline::Normalizer;

use super::{first_string, first_timestamp};

/// 주소 필드 우선순위
pub const ADDRESS_FIELDS: [&str; 4] = ["remote_addr", "src_ip", "client_ip", "ip"];

const TIME_FIELDS: [&str; 2] = ["time", "timestamp"];
const USER_AGENT_FIELDS: [&str; 2] = ["headers.User-Agent", "user_agent"];

/// WEB 소스 정규화기
#[derive(Debug, Clone, Copy, Default)]
pub struct WebNormalizer;

impl Normalizer for WebNormalizer {
    fn source(&self) -> EventSource {
        EventSource::Web
    }

    fn normalize(&self, record: &Value) -> Option<NormalizedEvent> {
        Some(NormalizedEvent {
            timestamp: first_timestamp(record, &TIME_FIELDS),
            origin_address: first_string(record, &ADDRESS_FIELDS)
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_owned()),
            event_kind: first_string(record, &["event"])
                .unwrap_or_else(|| KIND_HTTP_REQUEST.to_owned()),
            username: first_string(record, &["username"]),
            secret: first_string(record, &["password"]),
            detail: EventDetail::Web(WebDetail {
                method: first_string(record, &["method"]),
                path: first_string(record, &["path"]),
                query: first_string(record, &["query_string", "query"]),
                user_agent: first_string(record, &USER_AGENT_FIELDS),
            }),
            raw: record.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_record() {
        let record = json!({
            "time": "2025-03-01T10:00:00Z",
            "remote_addr": "203.0.113.5",
            "method": "POST",
            "path": "/wp-login.php",
            "query_string": "redirect=1",
            "username": "admin",
            "password": "hunter2",
            "headers": {"User-Agent": "sqlmap/1.7"}
        });
        let event = WebNormalizer.normalize(&record).unwrap();
        assert_eq!(event.source(), EventSource::Web);
        assert_eq!(event.origin_address, "203.0.113.5");
        assert_eq!(event.event_kind, KIND_HTTP_REQUEST);
        assert_eq!(event.username.as_deref(), Some("admin"));
        assert_eq!(event.secret.as_deref(), Some("hunter2"));
        assert_eq!(event.path(), Some("/wp-login.php"));
        let EventDetail::Web(detail) = &event.detail else {
            panic!("expected web detail");
        };
        assert_eq!(detail.method.as_deref(), Some("POST"));
        assert_eq!(detail.query.as_deref(), Some("redirect=1"));
        assert_eq!(detail.user_agent.as_deref(), Some("sqlmap/1.7"));
        assert!(event.timestamp.is_some());
        assert_eq!(event.raw, record);
    }

    #[test]
    fn address_precedence_and_default() {
        let event = WebNormalizer
            .normalize(&json!({"ip": "4.4.4.4", "client_ip": "3.3.3.3"}))
            .unwrap();
        assert_eq!(event.origin_address, "3.3.3.3");

        let event = WebNormalizer.normalize(&json!({"path": "/"})).unwrap();
        assert_eq!(event.origin_address, UNKNOWN_ADDRESS);
    }

    #[test]
    fn bad_fields_degrade_to_none() {
        let event = WebNormalizer
            .normalize(&json!({"time": "not a time", "path": ["array"], "event": "scan"}))
            .unwrap();
        assert!(event.timestamp.is_none());
        assert!(event.path().is_none());
        assert_eq!(event.event_kind, "scan");
    }
}
