//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 컴포넌트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `sentinel_`
//! - 컴포넌트명: `ingest_`, `writer_`, `store_`, `relay_`, `daemon_`, `api_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(sentinel_core::metrics::INGEST_LINES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 이벤트 소스 레이블 키 (WEB, SHELL)
pub const LABEL_SOURCE: &str = "source";

/// 저장소 레이블 키 (events, replay)
pub const LABEL_STORE: &str = "store";

// ─── 수집 (Tailer / Normalizer) ────────────────────────────────────

/// 수집: 읽은 원시 라인 수 (counter, label: source)
pub const INGEST_LINES_TOTAL: &str = "sentinel_ingest_lines_total";

/// 수집: JSON 파싱 실패 수 (counter, label: source)
pub const INGEST_PARSE_FAILURES_TOTAL: &str = "sentinel_ingest_parse_failures_total";

/// 수집: 정규화 단계에서 걸러진 레코드 수 (counter, label: source)
pub const INGEST_FILTERED_TOTAL: &str = "sentinel_ingest_filtered_total";

/// 수집: 파일 회전/절단 감지 횟수 (counter)
pub const INGEST_ROTATIONS_TOTAL: &str = "sentinel_ingest_rotations_total";

// ─── Writer ───────────────────────────────────────────────────────

/// Writer: 큐에 제출된 이벤트 수 (counter)
pub const WRITER_SUBMITTED_TOTAL: &str = "sentinel_writer_submitted_total";

/// Writer: 큐가 가득 차 버려진 이벤트 수 (counter)
pub const WRITER_DROPPED_EVENTS_TOTAL: &str = "sentinel_writer_dropped_events_total";

/// Writer: 큐가 가득 차 버려진 재생 라인 수 (counter)
pub const WRITER_DROPPED_LINES_TOTAL: &str = "sentinel_writer_dropped_lines_total";

/// Writer: 배치 플러시 소요 시간 (histogram, 초)
pub const WRITER_FLUSH_DURATION_SECONDS: &str = "sentinel_writer_flush_duration_seconds";

/// Writer: 현재 큐 깊이 (gauge)
pub const WRITER_QUEUE_DEPTH: &str = "sentinel_writer_queue_depth";

// ─── Store ────────────────────────────────────────────────────────

/// Store: 실제로 삽입된 행 수 (counter, label: store)
pub const STORE_INSERTED_TOTAL: &str = "sentinel_store_inserted_total";

/// Store: 지문 중복으로 무시된 이벤트 수 (counter)
pub const STORE_DUPLICATES_TOTAL: &str = "sentinel_store_duplicates_total";

/// Store: 보존 정리로 삭제된 행 수 (counter, label: store)
pub const STORE_COMPACTED_TOTAL: &str = "sentinel_store_compacted_total";

// ─── Relay ────────────────────────────────────────────────────────

/// Relay: 다운스트림으로 전달한 라인 수 (counter)
pub const RELAY_LINES_FORWARDED_TOTAL: &str = "sentinel_relay_lines_forwarded_total";

/// Relay: 전송한 keepalive 프레임 수 (counter)
pub const RELAY_KEEPALIVES_TOTAL: &str = "sentinel_relay_keepalives_total";

/// Relay: 현재 활성 릴레이 수 (gauge)
pub const RELAY_ACTIVE: &str = "sentinel_relay_active";

// ─── 데몬 / API ──────────────────────────────────────────────────

/// 빌드 정보 gauge (항상 1, `version` 레이블)
pub const DAEMON_BUILD_INFO: &str = "sentinel_daemon_build_info";

/// 데몬 가동 시간 (초)
pub const DAEMON_UPTIME_SECONDS: &str = "sentinel_daemon_uptime_seconds";

/// 수집 API가 거부한 항목 수
pub const API_INTAKE_REJECTED_TOTAL: &str = "sentinel_api_intake_rejected_total";

// ─── 히스토그램 버킷 ──────────────────────────────────────────────

/// 플러시 소요 시간 히스토그램 버킷 (초)
///
/// 100µs ~ 10s 범위
pub const FLUSH_DURATION_BUCKETS: [f64; 10] =
    [0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Ingest
    describe_counter!(
        INGEST_LINES_TOTAL,
        "Total number of raw log lines read by the tailer"
    );
    describe_counter!(
        INGEST_PARSE_FAILURES_TOTAL,
        "Log lines dropped because they were not valid JSON objects"
    );
    describe_counter!(
        INGEST_FILTERED_TOTAL,
        "Records discarded by the normalizer (not telemetry-worthy)"
    );
    describe_counter!(
        INGEST_ROTATIONS_TOTAL,
        "Detected log file truncations or rotations"
    );

    // Writer
    describe_counter!(
        WRITER_SUBMITTED_TOTAL,
        "Events accepted into the writer queue"
    );
    describe_counter!(
        WRITER_DROPPED_EVENTS_TOTAL,
        "Events dropped because the writer queue was full"
    );
    describe_counter!(
        WRITER_DROPPED_LINES_TOTAL,
        "Replay lines dropped because the writer queue was full"
    );
    describe_histogram!(
        WRITER_FLUSH_DURATION_SECONDS,
        "Batch flush latency in seconds"
    );
    describe_gauge!(WRITER_QUEUE_DEPTH, "Current writer queue depth");

    // Store
    describe_counter!(STORE_INSERTED_TOTAL, "Rows committed to the stores");
    describe_counter!(
        STORE_DUPLICATES_TOTAL,
        "Events ignored because their fingerprint was already stored"
    );
    describe_counter!(
        STORE_COMPACTED_TOTAL,
        "Rows deleted by retention compaction"
    );

    // Relay
    describe_counter!(
        RELAY_LINES_FORWARDED_TOTAL,
        "Upstream lines forwarded to live subscribers"
    );
    describe_counter!(
        RELAY_KEEPALIVES_TOTAL,
        "Keepalive frames sent to idle live subscribers"
    );
    describe_gauge!(RELAY_ACTIVE, "Number of active live relays");

    // Daemon
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_counter!(
        API_INTAKE_REJECTED_TOTAL,
        "Intake items rejected because their shape was not recognised"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        INGEST_LINES_TOTAL,
        INGEST_PARSE_FAILURES_TOTAL,
        INGEST_FILTERED_TOTAL,
        INGEST_ROTATIONS_TOTAL,
        WRITER_SUBMITTED_TOTAL,
        WRITER_DROPPED_EVENTS_TOTAL,
        WRITER_DROPPED_LINES_TOTAL,
        WRITER_FLUSH_DURATION_SECONDS,
        WRITER_QUEUE_DEPTH,
        STORE_INSERTED_TOTAL,
        STORE_DUPLICATES_TOTAL,
        STORE_COMPACTED_TOTAL,
        RELAY_LINES_FORWARDED_TOTAL,
        RELAY_KEEPALIVES_TOTAL,
        RELAY_ACTIVE,
        DAEMON_BUILD_INFO,
        DAEMON_UPTIME_SECONDS,
        API_INTAKE_REJECTED_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_sentinel_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("sentinel_"),
                "Metric '{}' does not start with 'sentinel_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // recorder 없이 호출해도 패닉하지 않아야 합니다.
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_SOURCE, LABEL_STORE] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn flush_duration_buckets_are_sorted() {
        for pair in FLUSH_DURATION_BUCKETS.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
