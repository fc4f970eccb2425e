//! 보존 정리
//!
//! 보존 기간(일)이 지난 이벤트와 재생 라인을 삭제합니다.
//! 보존 기간이 0이면 아무것도 삭제하지 않습니다.
//! writer 루프 안에서 실행되므로 별도의 쓰기 연결을 만들지 않습니다.

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::events::EventStore;
use crate::replay::ReplayStore;

/// 보존 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    retention_days: u32,
}

/// 정리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub events_deleted: usize,
    pub lines_deleted: usize,
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// 보존이 활성화되어 있는지 여부
    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }

    /// `now` 기준 삭제 경계 시각.
    ///
    /// 비활성화 상태이거나 경계가 표현 가능한 시각 범위를 벗어나면 `None`이며,
    /// 이때는 아무것도 삭제하지 않습니다.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        Duration::try_days(i64::from(self.retention_days))
            .and_then(|horizon| now.checked_sub_signed(horizon))
    }

    /// 두 저장소에서 경계 이전 행을 삭제합니다.
    pub fn compact(
        &self,
        events: &EventStore,
        replay: &ReplayStore,
        now: DateTime<Utc>,
    ) -> Result<CompactionReport, StoreError> {
        let Some(cutoff) = self.cutoff(now) else {
            return Ok(CompactionReport::default());
        };
        Ok(CompactionReport {
            events_deleted: events.delete_before(&cutoff)?,
            lines_deleted: replay.delete_before(&cutoff)?,
        })
    }
}
