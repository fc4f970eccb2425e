//! 재생 라인 저장소
//!
//! 세션 스트림의 원문 라인을 시각과 함께 저장합니다.
//! 정규화 이벤트 DB와는 별도 파일이며 자체 체크포인트 테이블(`log_offsets`)을 가집니다.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use sentinel_core::event::{ReplayLine, format_timestamp, parse_timestamp};

use crate::error::StoreError;
use crate::events::{get_offset, set_offset};
use crate::schema::{self, SchemaKind};
use crate::{MAX_PAGE_SIZE, clamp_limit};

/// 기간 조회 기본 `limit`
pub const DEFAULT_RANGE_LIMIT: usize = 1000;

/// 저장된 라인의 시간 범위
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeSummary {
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
    pub count: u64,
}

/// 재생 라인 저장소
pub struct ReplayStore {
    conn: Connection,
}

impl ReplayStore {
    /// 쓰기용으로 DB를 열거나 생성합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = schema::open_writer(path.as_ref(), SchemaKind::Replay)?;
        Ok(Self { conn })
    }

    /// 조회 전용 연결을 엽니다.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = schema::open_reader(path.as_ref())?;
        Ok(Self { conn })
    }

    /// 메모리 DB를 엽니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = schema::open_memory(SchemaKind::Replay)?;
        Ok(Self { conn })
    }

    /// 라인 배치를 하나의 트랜잭션으로 삽입합니다.
    pub fn insert_lines(&mut self, lines: &[ReplayLine]) -> Result<usize, StoreError> {
        if lines.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO replay_lines (ts, line) VALUES (?1, ?2)")?;
            for line in lines {
                inserted += stmt.execute(params![format_timestamp(&line.ts), line.line])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// 로그 체크포인트를 조회합니다. 기록이 없으면 0입니다.
    pub fn get_checkpoint(&self, path: &str) -> Result<u64, StoreError> {
        get_offset(&self.conn, "log_offsets", path)
    }

    /// 로그 체크포인트를 기록합니다.
    pub fn set_checkpoint(&self, path: &str, offset: u64) -> Result<(), StoreError> {
        set_offset(&self.conn, "log_offsets", path, offset)
    }

    /// 저장된 라인의 최소/최대 시각과 개수
    pub fn range_summary(&self) -> Result<RangeSummary, StoreError> {
        let summary = self.conn.query_row(
            "SELECT MIN(ts), MAX(ts), COUNT(*) FROM replay_lines",
            [],
            |row| {
                Ok(RangeSummary {
                    min_ts: row.get(0)?,
                    max_ts: row.get(1)?,
                    count: row.get::<_, i64>(2)?.max(0) as u64,
                })
            },
        )?;
        Ok(summary)
    }

    /// 기간 조회: 시각 오름차순
    ///
    /// `start`/`end`는 포함 범위이며, 생략하면 해당 방향으로 무제한입니다.
    /// `limit`은 `1..=5000`으로 제한됩니다.
    pub fn query_range(
        &self,
        start: Option<&DateTime<Utc>>,
        end: Option<&DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ReplayLine>, StoreError> {
        let limit = clamp_limit(limit, MAX_PAGE_SIZE) as i64;
        let start = start.map(format_timestamp);
        let end = end.map(format_timestamp);

        let mut stmt = self.conn.prepare_cached(
            "SELECT ts, line FROM replay_lines \
             WHERE (?1 IS NULL OR ts >= ?1) AND (?2 IS NULL OR ts <= ?2) \
             ORDER BY ts ASC, id ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![start, end, limit], |row| {
            let ts: String = row.get(0)?;
            let line: String = row.get(1)?;
            Ok((ts, line))
        })?;

        let mut lines = Vec::new();
        for row in rows {
            let (ts, line) = row?;
            match parse_timestamp(&ts) {
                Some(ts) => lines.push(ReplayLine { ts, line }),
                None => tracing::warn!(ts = %ts, "skipping replay line with unreadable timestamp"),
            }
        }
        Ok(lines)
    }

    /// `cutoff`보다 오래된 라인을 삭제합니다.
    pub fn delete_before(&self, cutoff: &DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM replay_lines WHERE ts < ?1",
            params![format_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ts: &str, text: &str) -> ReplayLine {
        ReplayLine {
            ts: parse_timestamp(ts).unwrap(),
            line: text.to_owned(),
        }
    }

    fn seeded() -> ReplayStore {
        let mut store = ReplayStore::open_in_memory().unwrap();
        store
            .insert_lines(&[
                line("2025-03-01T10:00:02Z", "c"),
                line("2025-03-01T10:00:00Z", "a"),
                line("2025-03-01T10:00:01Z", "b"),
            ])
            .unwrap();
        store
    }

    #[test]
    fn range_summary_on_empty_store() {
        let store = ReplayStore::open_in_memory().unwrap();
        assert_eq!(store.range_summary().unwrap(), RangeSummary::default());
    }

    #[test]
    fn range_summary_reports_bounds() {
        let summary = seeded().range_summary().unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min_ts.as_deref(), Some("2025-03-01T10:00:00.000000Z"));
        assert_eq!(summary.max_ts.as_deref(), Some("2025-03-01T10:00:02.000000Z"));
    }

    #[test]
    fn query_range_is_ascending_and_inclusive() {
        let store = seeded();
        let start = parse_timestamp("2025-03-01T10:00:01Z").unwrap();
        let end = parse_timestamp("2025-03-01T10:00:02Z").unwrap();
        let lines = store
            .query_range(Some(&start), Some(&end), DEFAULT_RANGE_LIMIT)
            .unwrap();
        let texts: Vec<_> = lines.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(texts, ["b", "c"]);
    }

    #[test]
    fn query_range_without_bounds_applies_limit() {
        let store = seeded();
        let lines = store.query_range(None, None, 2).unwrap();
        let texts: Vec<_> = lines.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(texts, ["a", "b"]);
        assert_eq!(store.query_range(None, None, 0).unwrap().len(), 1);
    }

    #[test]
    fn checkpoints_are_independent_of_event_store() {
        let store = ReplayStore::open_in_memory().unwrap();
        store.set_checkpoint("/logs/cowrie.json", 77).unwrap();
        assert_eq!(store.get_checkpoint("/logs/cowrie.json").unwrap(), 77);
        assert_eq!(store.get_checkpoint("/logs/other.json").unwrap(), 0);
    }

    #[test]
    fn delete_before_drops_old_lines() {
        let store = seeded();
        let cutoff = parse_timestamp("2025-03-01T10:00:01Z").unwrap();
        assert_eq!(store.delete_before(&cutoff).unwrap(), 1);
        assert_eq!(store.range_summary().unwrap().count, 2);
    }
}
