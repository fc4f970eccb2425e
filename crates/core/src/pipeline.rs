//! 파이프라인 trait: 컴포넌트 확장 포인트 정의

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::error::SentinelError;
use crate::event::{EventSource, NormalizedEvent};

/// 컴포넌트 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 장기 실행 컴포넌트의 생명주기 trait
///
/// 수집 파이프라인처럼 백그라운드 태스크를 소유하는 컴포넌트가 구현합니다.
/// `start()`는 태스크를 띄운 뒤 바로 반환하고, `stop()`은 태스크가
/// 정리될 때까지 기다립니다.
pub trait Pipeline: Send {
    /// 컴포넌트를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), SentinelError>> + Send;

    /// 컴포넌트를 정지합니다. 보류 중인 데이터는 플러시됩니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), SentinelError>> + Send;

    /// 현재 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 센서 레코드 정규화 trait
///
/// 새로운 센서 형식을 지원하려면 이 trait을 구현합니다.
/// 텔레메트리 대상이 아닌 레코드는 `None`으로 걸러냅니다.
pub trait Normalizer: Send + Sync {
    /// 이 정규화기가 처리하는 소스
    fn source(&self) -> EventSource;

    /// JSON 레코드 하나를 정규화합니다.
    fn normalize(&self, record: &serde_json::Value) -> Option<NormalizedEvent>;
}
