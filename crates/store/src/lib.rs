#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod replay;
pub mod retention;
pub mod schema;

pub use aggregate::{MetricsReport, MetricsSnapshot};
pub use error::StoreError;
pub use events::{EventStore, InsertOutcome};
pub use fingerprint::fingerprint;
pub use replay::{RangeSummary, ReplayStore};
pub use retention::{CompactionReport, RetentionPolicy};

/// 조회 한 번에 반환하는 최대 행 수
pub const MAX_PAGE_SIZE: usize = 5000;

/// 조회 `limit`을 `1..=max` 범위로 제한합니다.
pub fn clamp_limit(limit: usize, max: usize) -> usize {
    limit.clamp(1, max.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(0, MAX_PAGE_SIZE), 1);
        assert_eq!(clamp_limit(20, MAX_PAGE_SIZE), 20);
        assert_eq!(clamp_limit(1_000_000, MAX_PAGE_SIZE), MAX_PAGE_SIZE);
        assert_eq!(clamp_limit(10, 0), 1);
    }
}
