//! SQLite 스키마 및 연결 초기화
//!
//! 두 DB 파일은 독립적으로 버전을 관리합니다.
//! 재생 전용 소비자는 정규화 스키마에 의존하지 않습니다.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::error::StoreError;

/// 현재 스키마 버전
pub const SCHEMA_VERSION: i32 = 1;

/// 잠금 대기 시간
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EVENTS_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        ts TEXT,
        src_ip TEXT NOT NULL,
        event_type TEXT NOT NULL,
        username TEXT,
        password TEXT,
        path TEXT,
        detail_json TEXT NOT NULL,
        raw_json TEXT NOT NULL,
        fingerprint TEXT NOT NULL UNIQUE,
        ingested_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_source ON events(source, id);
    CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);

    CREATE TABLE IF NOT EXISTS file_offsets (
        path TEXT PRIMARY KEY,
        byte_offset INTEGER NOT NULL
    );
"#;

const REPLAY_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS replay_lines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts TEXT NOT NULL,
        line TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_replay_lines_ts ON replay_lines(ts);

    CREATE TABLE IF NOT EXISTS log_offsets (
        path TEXT PRIMARY KEY,
        byte_offset INTEGER NOT NULL
    );
"#;

/// 스키마 종류
#[derive(Debug, Clone, Copy)]
pub(crate) enum SchemaKind {
    Events,
    Replay,
}

impl SchemaKind {
    fn ddl(self) -> &'static str {
        match self {
            Self::Events => EVENTS_SCHEMA,
            Self::Replay => REPLAY_SCHEMA,
        }
    }
}

/// 쓰기 연결을 열고 스키마를 준비합니다.
///
/// 상위 디렉토리가 없으면 생성합니다.
pub(crate) fn open_writer(path: &Path, kind: SchemaKind) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened sqlite writer");
    init_schema(&conn, kind)?;
    Ok(conn)
}

/// 읽기 전용 연결을 엽니다.
///
/// 스키마는 writer가 이미 만들어 두었다고 가정합니다.
pub(crate) fn open_reader(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// 메모리 DB (테스트용)
pub(crate) fn open_memory(kind: SchemaKind) -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn, kind)?;
    Ok(conn)
}

/// 테이블을 만들고 버전을 기록합니다.
pub(crate) fn init_schema(conn: &Connection, kind: SchemaKind) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let current: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match current {
        None => {
            conn.execute_batch(kind.ddl())?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(version) if version > SCHEMA_VERSION => {
            return Err(StoreError::SchemaVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        Some(_) => {
            conn.execute_batch(kind.ddl())?;
        }
    }
    Ok(())
}
