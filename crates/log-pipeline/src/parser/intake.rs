//! 수집 API 입력 변환
//!
//! 외부에서 밀어 넣는 이벤트 객체는 이미 정규화에 가깝지만 필드 이름이 제각각입니다.
//! [`coerce_intake`]는 알려진 별칭을 흡수해 [`NormalizedEvent`]로 바꾸고,
//! 변환할 수 없는 객체는 항목 단위로 거부합니다.
//!
//! 파일 수집과 달리 SHELL 로그인 필터는 적용하지 않습니다.

use serde_json::Value;

use sentinel_core::event::{
    EventDetail, EventSource, KIND_HTTP_REQUEST, NormalizedEvent, ShellDetail, UNKNOWN_ADDRESS,
    WebDetail,
};

use super::{first_string, first_timestamp};

const KIND_FIELDS: [&str; 4] = ["event_kind", "event_type", "event", "eventid"];
const ADDRESS_FIELDS: [&str; 5] = ["origin_address", "ip", "src_ip", "remote_addr", "client_ip"];
const TIME_FIELDS: [&str; 3] = ["timestamp", "time", "ts"];
const SECRET_FIELDS: [&str; 2] = ["secret", "password"];

/// 입력 객체 거부 사유
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeRejection {
    /// JSON 객체가 아님
    #[error("intake item is not a JSON object")]
    NotAnObject,

    /// `source` 필드 없음
    #[error("intake item has no source")]
    MissingSource,

    /// 알 수 없는 source 값
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// SHELL 이벤트에 종류가 없음
    #[error("shell intake item has no event kind")]
    MissingKind,
}

/// 입력 객체 하나를 정규화 이벤트로 변환합니다.
pub fn coerce_intake(item: &Value) -> Result<NormalizedEvent, IntakeRejection> {
    if !item.is_object() {
        return Err(IntakeRejection::NotAnObject);
    }

    let source_text = first_string(item, &["source"]).ok_or(IntakeRejection::MissingSource)?;
    let source: EventSource = source_text
        .parse()
        .map_err(|_| IntakeRejection::UnknownSource(source_text))?;

    let event_kind = match (first_string(item, &KIND_FIELDS), source) {
        (Some(kind), _) => kind,
        (None, EventSource::Web) => KIND_HTTP_REQUEST.to_owned(),
        (None, EventSource::Shell) => return Err(IntakeRejection::MissingKind),
    };

    let detail = match source {
        EventSource::Web => EventDetail::Web(WebDetail {
            method: first_string(item, &["method"]),
            path: first_string(item, &["path"]),
            query: first_string(item, &["query", "query_string"]),
            user_agent: first_string(item, &["user_agent", "userAgent"]),
        }),
        EventSource::Shell => EventDetail::Shell(ShellDetail {
            message: first_string(item, &["message"]),
        }),
    };

    Ok(NormalizedEvent {
        timestamp: first_timestamp(item, &TIME_FIELDS),
        origin_address: first_string(item, &ADDRESS_FIELDS)
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_owned()),
        event_kind,
        username: first_string(item, &["username"]),
        secret: first_string(item, &SECRET_FIELDS),
        detail,
        raw: item.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn web_item_with_aliases() {
        let event = coerce_intake(&json!({
            "source": "http",
            "ip": "1.2.3.4",
            "event_type": "http_request",
            "path": "/x",
            "ts": "2025-03-01T10:00:00Z",
            "userAgent": "curl/8"
        }))
        .unwrap();
        assert_eq!(event.source(), EventSource::Web);
        assert_eq!(event.origin_address, "1.2.3.4");
        assert_eq!(event.path(), Some("/x"));
        assert!(event.timestamp.is_some());
        let EventDetail::Web(detail) = &event.detail else {
            panic!("expected web detail");
        };
        assert_eq!(detail.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn web_kind_defaults_to_request() {
        let event = coerce_intake(&json!({"source": "WEB"})).unwrap();
        assert_eq!(event.event_kind, KIND_HTTP_REQUEST);
        assert_eq!(event.origin_address, UNKNOWN_ADDRESS);
    }

    #[test]
    fn shell_item_keeps_any_kind() {
        let event = coerce_intake(&json!({
            "source": "SSH",
            "eventid": "cowrie.session.connect",
            "src_ip": "5.6.7.8",
            "password": "toor"
        }))
        .unwrap();
        assert_eq!(event.source(), EventSource::Shell);
        assert_eq!(event.event_kind, "cowrie.session.connect");
        assert_eq!(event.secret.as_deref(), Some("toor"));
    }

    #[test]
    fn rejections() {
        assert_eq!(coerce_intake(&json!("text")), Err(IntakeRejection::NotAnObject));
        assert_eq!(
            coerce_intake(&json!({"ip": "1.1.1.1"})),
            Err(IntakeRejection::MissingSource)
        );
        assert_eq!(
            coerce_intake(&json!({"source": "ftp"})),
            Err(IntakeRejection::UnknownSource("ftp".to_owned()))
        );
        assert_eq!(
            coerce_intake(&json!({"source": "SHELL"})),
            Err(IntakeRejection::MissingKind)
        );
    }
}
