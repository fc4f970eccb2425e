//! 이벤트 내용 지문
//!
//! `(source, timestamp, origin_address, event_kind, username, path)`를
//! `|`로 이어 붙인 문자열의 SHA-256 hex 값입니다. 없는 값은 `null`로 씁니다.
//! 같은 내용이면 도착 순서나 프로세스 재시작과 무관하게 같은 지문이 나옵니다.

use sha2::{Digest, Sha256};

use sentinel_core::event::NormalizedEvent;

const NULL: &str = "null";

/// 이벤트 지문을 계산합니다.
pub fn fingerprint(event: &NormalizedEvent) -> String {
    let ts = event.timestamp_string();
    let parts = [
        event.source().as_str(),
        ts.as_deref().unwrap_or(NULL),
        event.origin_address.as_str(),
        event.event_kind.as_str(),
        event.username.as_deref().unwrap_or(NULL),
        event.path().unwrap_or(NULL),
    ];
    let digest = Sha256::digest(parts.join("|").as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::event::{
        EventDetail, KIND_HTTP_REQUEST, ShellDetail, WebDetail, parse_timestamp,
    };

    fn event(path: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            timestamp: parse_timestamp("2025-03-01T10:00:00Z"),
            origin_address: "1.2.3.4".to_owned(),
            event_kind: KIND_HTTP_REQUEST.to_owned(),
            username: None,
            secret: Some("hunter2".to_owned()),
            detail: EventDetail::Web(WebDetail {
                path: path.map(str::to_owned),
                ..WebDetail::default()
            }),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = fingerprint(&event(Some("/x")));
        let b = fingerprint(&event(Some("/x")));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_ignores_non_identity_fields() {
        let base = event(Some("/x"));
        let mut other = base.clone();
        other.secret = Some("different".to_owned());
        other.raw = serde_json::json!({"extra": true});
        assert_eq!(fingerprint(&base), fingerprint(&other));
    }

    #[test]
    fn fingerprint_differs_on_identity_fields() {
        let base = event(Some("/x"));
        assert_ne!(fingerprint(&base), fingerprint(&event(Some("/y"))));
        assert_ne!(fingerprint(&base), fingerprint(&event(None)));

        let mut no_ts = base.clone();
        no_ts.timestamp = None;
        assert_ne!(fingerprint(&base), fingerprint(&no_ts));

        let mut shell = base.clone();
        shell.detail = EventDetail::Shell(ShellDetail::default());
        assert_ne!(fingerprint(&base), fingerprint(&shell));
    }

    #[test]
    fn equivalent_timestamps_share_fingerprint() {
        let base = event(Some("/x"));
        let mut offset = base.clone();
        offset.timestamp = parse_timestamp("2025-03-01T19:00:00+09:00");
        assert_eq!(fingerprint(&base), fingerprint(&offset));
    }
}
