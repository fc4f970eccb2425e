//! 파일 기반 로그 수집기
//!
//! 마지막으로 기록한 바이트 오프셋 이후에 추가된 완전한 라인만 읽습니다.
//! 새 데이터를 기다리며 블록하지 않으며, 폴링 사이의 대기는 호출자가 담당합니다.
//!
//! # 로테이션 감지
//! 파일 크기가 기록된 오프셋보다 작으면 (truncation, logrotate copytruncate)
//! 오프셋을 0으로 되돌리고 처음부터 다시 읽습니다.
//!
//! # 부분 라인
//! 개행으로 끝나지 않은 마지막 라인은 소비하지 않고 다음 폴링에서 다시 읽습니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{CollectorStatus, TailSink, TailTarget};
use crate::error::LogPipelineError;

/// 한 번의 읽기 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailRead {
    /// 새로 읽은 완전한 라인 (개행 제거, 공백 라인 제외)
    pub lines: Vec<String>,
    /// 다음 읽기를 시작할 오프셋
    pub offset: u64,
    /// 로테이션/절단 감지 여부
    pub rotated: bool,
}

impl TailRead {
    fn unchanged(offset: u64) -> Self {
        Self {
            lines: Vec::new(),
            offset,
            rotated: false,
        }
    }
}

/// `offset` 이후에 추가된 완전한 라인을 읽습니다.
///
/// - 파일이 없으면 빈 결과와 같은 오프셋을 반환합니다.
/// - 파일 크기 < `offset`이면 0부터 다시 읽고 `rotated = true`로 표시합니다.
/// - 잘못된 UTF-8 바이트는 대체 문자로 바꿉니다.
/// - `max_lines > 0`이면 그 수만큼만 읽고 오프셋도 거기까지만 전진합니다.
pub async fn read_new_lines(
    path: &Path,
    offset: u64,
    max_lines: usize,
) -> Result<TailRead, LogPipelineError> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(TailRead::unchanged(offset));
        }
        Err(e) => return Err(collector_error(path, e)),
    };

    let size = file
        .metadata()
        .await
        .map_err(|e| collector_error(path, e))?
        .len();
    let (start, rotated) = if size < offset {
        (0, true)
    } else {
        (offset, false)
    };
    if size == start {
        return Ok(TailRead {
            lines: Vec::new(),
            offset: start,
            rotated,
        });
    }

    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|e| collector_error(path, e))?;
    let mut buf = Vec::new();
    file.take(size - start)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| collector_error(path, e))?;

    let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
        return Ok(TailRead {
            lines: Vec::new(),
            offset: start,
            rotated,
        });
    };

    let mut lines = Vec::new();
    let mut consumed = 0usize;
    for raw in buf[..=last_newline].split_inclusive(|b| *b == b'\n') {
        if max_lines > 0 && lines.len() == max_lines {
            break;
        }
        consumed += raw.len();
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(['\n', '\r']);
        if !text.trim().is_empty() {
            lines.push(text.to_owned());
        }
    }

    Ok(TailRead {
        lines,
        offset: start + consumed as u64,
        rotated,
    })
}

fn collector_error(path: &Path, err: std::io::Error) -> LogPipelineError {
    LogPipelineError::Collector {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// 파일 하나를 추적하는 tailer
///
/// 메모리상의 오프셋을 유지하며, 시작 시점에는 저장소의 체크포인트로 초기화됩니다.
#[derive(Debug)]
pub struct FileTailer {
    target: TailTarget,
    offset: u64,
    max_lines: usize,
    status: CollectorStatus,
}

impl FileTailer {
    /// 새 tailer를 생성합니다.
    pub fn new(target: TailTarget, offset: u64, max_lines: usize) -> Self {
        Self {
            target,
            offset,
            max_lines,
            status: CollectorStatus::Idle,
        }
    }

    /// 새로 추가된 라인을 읽습니다.
    ///
    /// 읽은 위치는 [`commit`](Self::commit)을 호출해야 반영됩니다.
    /// 실패해도 오프셋은 그대로이므로 다음 폴링에서 다시 시도됩니다.
    pub async fn poll(&mut self) -> Result<TailRead, LogPipelineError> {
        match read_new_lines(&self.target.path, self.offset, self.max_lines).await {
            Ok(read) => {
                self.status = CollectorStatus::Running;
                if read.rotated {
                    tracing::info!(
                        path = %self.target.path.display(),
                        previous_offset = self.offset,
                        "log file truncated or rotated, re-reading from start"
                    );
                    metrics::counter!(sentinel_core::metrics::INGEST_ROTATIONS_TOTAL)
                        .increment(1);
                }
                Ok(read)
            }
            Err(e) => {
                self.status = CollectorStatus::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// 처리가 끝난 오프셋을 반영합니다.
    pub fn commit(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &PathBuf {
        &self.target.path
    }

    pub fn target(&self) -> &TailTarget {
        &self.target
    }

    pub fn sink(&self) -> TailSink {
        self.target.sink
    }

    pub fn status(&self) -> &CollectorStatus {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use sentinel_core::event::EventSource;

    fn append(path: &Path, content: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content).unwrap();
    }

    #[tokio::test]
    async fn missing_file_keeps_offset() {
        let dir = tempfile::tempdir().unwrap();
        let read = read_new_lines(&dir.path().join("nope.log"), 42, 0)
            .await
            .unwrap();
        assert_eq!(read, TailRead::unchanged(42));
    }

    #[tokio::test]
    async fn reads_only_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        append(&path, b"one\ntwo\n");

        let first = read_new_lines(&path, 0, 0).await.unwrap();
        assert_eq!(first.lines, ["one", "two"]);
        assert_eq!(first.offset, 8);

        append(&path, b"three\n");
        let second = read_new_lines(&path, first.offset, 0).await.unwrap();
        assert_eq!(second.lines, ["three"]);
        assert!(!second.rotated);
    }

    #[tokio::test]
    async fn partial_trailing_line_is_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        append(&path, b"done\npart");

        let first = read_new_lines(&path, 0, 0).await.unwrap();
        assert_eq!(first.lines, ["done"]);
        assert_eq!(first.offset, 5);

        append(&path, b"ial\n");
        let second = read_new_lines(&path, first.offset, 0).await.unwrap();
        assert_eq!(second.lines, ["partial"]);
    }

    #[tokio::test]
    async fn truncation_resets_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        append(&path, b"aaaaaaaaaa\nbbbbbbbbbb\n");
        let first = read_new_lines(&path, 0, 0).await.unwrap();

        std::fs::write(&path, b"new\n").unwrap();
        let second = read_new_lines(&path, first.offset, 0).await.unwrap();
        assert!(second.rotated);
        assert_eq!(second.lines, ["new"]);
        assert_eq!(second.offset, 4);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        append(&path, b"ok \xff\xfe end\n");
        let read = read_new_lines(&path, 0, 0).await.unwrap();
        assert_eq!(read.lines.len(), 1);
        assert!(read.lines[0].starts_with("ok "));
        assert!(read.lines[0].contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn max_lines_limits_offset_advance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        append(&path, b"a\nb\nc\n");

        let first = read_new_lines(&path, 0, 2).await.unwrap();
        assert_eq!(first.lines, ["a", "b"]);
        assert_eq!(first.offset, 4);

        let second = read_new_lines(&path, first.offset, 2).await.unwrap();
        assert_eq!(second.lines, ["c"]);
    }

    #[tokio::test]
    async fn blank_and_crlf_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        append(&path, b"a\r\n\n  \nb\n");
        let read = read_new_lines(&path, 0, 0).await.unwrap();
        assert_eq!(read.lines, ["a", "b"]);
        assert_eq!(read.offset, 9);
    }

    #[tokio::test]
    async fn tailer_offset_moves_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cowrie.json");
        append(&path, b"x\n");

        let target = TailTarget::events(path.clone(), EventSource::Shell);
        let mut tailer = FileTailer::new(target, 0, 0);
        assert_eq!(*tailer.status(), CollectorStatus::Idle);

        let read = tailer.poll().await.unwrap();
        assert_eq!(tailer.offset(), 0);
        tailer.commit(read.offset);
        assert_eq!(tailer.offset(), 2);
        assert_eq!(*tailer.status(), CollectorStatus::Running);
        assert!(tailer.poll().await.unwrap().lines.is_empty());
    }
}
