//! SHELL 허니팟 로그 정규화기
//!
//! cowrie JSON 로그에서 인증 시도(`cowrie.login.*`)만 텔레메트리로 남기고
//! 나머지 프로토콜 이벤트는 정규화 단계에서 버립니다.

use serde_json::Value;

use sentinel_core::event::{
    EventDetail, EventSource, NormalizedEvent, SHELL_LOGIN_PREFIX, ShellDetail, UNKNOWN_ADDRESS,
};
use sentinel_core::pipeline::Normalizer;

use super::{first_string, first_timestamp};

/// SHELL 소스 정규화기
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellNormalizer;

impl Normalizer for ShellNormalizer {
    fn source(&self) -> EventSource {
        EventSource::Shell
    }

    fn normalize(&self, record: &Value) -> Option<NormalizedEvent> {
        let event_kind = first_string(record, &["eventid"])?;
        if !event_kind.starts_with(SHELL_LOGIN_PREFIX) {
            return None;
        }

        Some(NormalizedEvent {
            timestamp: first_timestamp(record, &["timestamp"]),
            origin_address: first_string(record, &["src_ip"])
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_owned()),
            event_kind,
            username: first_string(record, &["username"]),
            secret: first_string(record, &["password"]),
            detail: EventDetail::Shell(ShellDetail {
                message: first_string(record, &["message"]),
            }),
            raw: record.clone(),
        })
    }
}
