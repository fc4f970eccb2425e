//! 정규화 이벤트 저장소
//!
//! `events` 테이블은 추가 전용이며 `fingerprint` UNIQUE 제약으로 중복을 막습니다.
//! 중복 삽입은 에러가 아니라 무시됩니다 (`INSERT OR IGNORE`).
//! `file_offsets` 테이블은 소스 로그 파일별로 이미 소비한 바이트 오프셋을 기록합니다.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use sentinel_core::event::{
    EventDetail, EventSource, NormalizedEvent, ShellDetail, StoredEvent, WebDetail,
    format_timestamp, parse_timestamp,
};

use crate::error::StoreError;
use crate::fingerprint::fingerprint;
use crate::schema::{self, SchemaKind};
use crate::{MAX_PAGE_SIZE, clamp_limit};

const SELECT_COLUMNS: &str = "SELECT id, source, ts, src_ip, event_type, username, password, \
     detail_json, raw_json, fingerprint FROM events";

/// 배치 삽입 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// 실제로 삽입된 행 수
    pub inserted: usize,
    /// 지문 중복으로 무시된 행 수
    pub duplicates: usize,
}

/// 정규화 이벤트 저장소
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// 쓰기용으로 DB를 열거나 생성합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = schema::open_writer(path.as_ref(), SchemaKind::Events)?;
        Ok(Self { conn })
    }

    /// 조회 전용 연결을 엽니다.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = schema::open_reader(path.as_ref())?;
        Ok(Self { conn })
    }

    /// 메모리 DB를 엽니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = schema::open_memory(SchemaKind::Events)?;
        Ok(Self { conn })
    }

    /// 이벤트 배치를 하나의 트랜잭션으로 삽입합니다.
    ///
    /// 지문이 이미 있는 이벤트는 무시됩니다. 도중에 실패하면 배치 전체가
    /// 롤백되며, 이전에 커밋된 행에는 영향이 없습니다.
    pub fn insert_batch(&mut self, events: &[NormalizedEvent]) -> Result<InsertOutcome, StoreError> {
        if events.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let ingested_at = format_timestamp(&Utc::now());
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO events \
                 (source, ts, src_ip, event_type, username, password, path, \
                  detail_json, raw_json, fingerprint, ingested_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for event in events {
                let detail_json = serde_json::to_string(&event.detail)?;
                let raw_json = serde_json::to_string(&event.raw)?;
                inserted += stmt.execute(params![
                    event.source().as_str(),
                    event.timestamp_string(),
                    event.origin_address,
                    event.event_kind,
                    event.username,
                    event.secret,
                    event.path(),
                    detail_json,
                    raw_json,
                    fingerprint(event),
                    ingested_at,
                ])?;
            }
        }
        // 에러로 빠져나가면 tx drop 시 롤백됩니다.
        tx.commit()?;

        Ok(InsertOutcome {
            inserted,
            duplicates: events.len() - inserted,
        })
    }

    /// 파일 체크포인트를 조회합니다. 기록이 없으면 0입니다.
    pub fn get_checkpoint(&self, path: &str) -> Result<u64, StoreError> {
        get_offset(&self.conn, "file_offsets", path)
    }

    /// 파일 체크포인트를 기록합니다.
    pub fn set_checkpoint(&self, path: &str, offset: u64) -> Result<(), StoreError> {
        set_offset(&self.conn, "file_offsets", path, offset)
    }

    /// 커서 페이지 조회: id 내림차순
    ///
    /// `before_id`가 주어지면 그 값 이상의 id는 제외합니다.
    /// `limit`은 `1..=5000`으로 제한됩니다.
    pub fn query_page(
        &self,
        limit: usize,
        before_id: Option<i64>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let limit = clamp_limit(limit, MAX_PAGE_SIZE) as i64;
        match before_id {
            Some(before) => {
                let sql = format!("{SELECT_COLUMNS} WHERE id < ?1 ORDER BY id DESC LIMIT ?2");
                let mut stmt = self.conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![before, limit], row_to_event)?;
                collect_rows(rows)
            }
            None => {
                let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1");
                let mut stmt = self.conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![limit], row_to_event)?;
                collect_rows(rows)
            }
        }
    }

    /// 소스별 최근 이벤트: id 내림차순
    pub fn query_by_source(
        &self,
        source: EventSource,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let limit = clamp_limit(limit, MAX_PAGE_SIZE) as i64;
        let sql = format!("{SELECT_COLUMNS} WHERE source = ?1 ORDER BY id DESC LIMIT ?2");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![source.as_str(), limit], row_to_event)?;
        collect_rows(rows)
    }

    /// 저장된 이벤트 수
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// `cutoff`보다 오래된 이벤트를 삭제합니다.
    ///
    /// 타임스탬프가 없는 이벤트는 수집 시각을 기준으로 판단합니다.
    pub fn delete_before(&self, cutoff: &DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM events WHERE COALESCE(ts, ingested_at) < ?1",
            params![format_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    /// 집계 쿼리용 연결
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn get_offset(conn: &Connection, table: &str, path: &str) -> Result<u64, StoreError> {
    let sql = format!("SELECT byte_offset FROM {table} WHERE path = ?1");
    let offset: Option<i64> = conn
        .query_row(&sql, params![path], |row| row.get(0))
        .optional()?;
    Ok(offset.unwrap_or(0).max(0) as u64)
}

pub(crate) fn set_offset(
    conn: &Connection,
    table: &str,
    path: &str,
    offset: u64,
) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO {table} (path, byte_offset) VALUES (?1, ?2) \
         ON CONFLICT(path) DO UPDATE SET byte_offset = excluded.byte_offset"
    );
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    conn.execute(&sql, params![path, offset])?;
    Ok(())
}

fn collect_rows<I>(rows: I) -> Result<Vec<StoredEvent>, StoreError>
where
    I: Iterator<Item = rusqlite::Result<StoredEvent>>,
{
    rows.map(|row| row.map_err(StoreError::from)).collect()
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let source: String = row.get(1)?;
    let ts: Option<String> = row.get(2)?;
    let detail_json: String = row.get(7)?;
    let raw_json: String = row.get(8)?;

    let source = source.parse::<EventSource>().unwrap_or(EventSource::Web);
    let detail = serde_json::from_str::<EventDetail>(&detail_json)
        .ok()
        .filter(|detail| detail.source() == source)
        .unwrap_or_else(|| match source {
            EventSource::Web => EventDetail::Web(WebDetail::default()),
            EventSource::Shell => EventDetail::Shell(ShellDetail::default()),
        });

    Ok(StoredEvent {
        id: row.get(0)?,
        fingerprint: row.get(9)?,
        event: NormalizedEvent {
            timestamp: ts.as_deref().and_then(parse_timestamp),
            origin_address: row.get(3)?,
            event_kind: row.get(4)?,
            username: row.get(5)?,
            secret: row.get(6)?,
            detail,
            raw: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Null),
        },
    })
}
