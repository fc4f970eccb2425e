//! 저장소 에러 타입

use sentinel_core::error::{SentinelError, StorageError};

/// 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite 에러
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 파일 시스템 에러 (DB 디렉토리 생성 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 행 직렬화/역직렬화 실패
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 스키마 버전 불일치
    #[error("unsupported schema version {found} (expected at most {supported})")]
    SchemaVersion { found: i32, supported: i32 },
}

impl From<StoreError> for SentinelError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => SentinelError::Io(e),
            StoreError::SchemaVersion { .. } => {
                SentinelError::Storage(StorageError::Connection(err.to_string()))
            }
            other => SentinelError::Storage(StorageError::Query(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_maps_to_connection_error() {
        let err: SentinelError = StoreError::SchemaVersion {
            found: 9,
            supported: 1,
        }
        .into();
        assert!(matches!(
            err,
            SentinelError::Storage(StorageError::Connection(_))
        ));
    }

    #[test]
    fn sqlite_error_maps_to_query_error() {
        let err: SentinelError =
            StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, SentinelError::Storage(StorageError::Query(_))));
    }
}
