//! SHELL 세션 인덱스와 세션 재생
//!
//! 세션 목록은 SHELL 로그의 `cowrie.session.connect` 이벤트에서 만들며,
//! tty 기록 파일이 디스크에 있는 세션만 포함합니다.
//!
//! 세션 재생은 외부 재생 도구(`playlog`)를 하위 프로세스로 실행하고
//! stdout을 라인 단위로 스트리밍합니다. 스트림이 drop되면 프로세스에 SIGTERM을 보내고,
//! 유예 시간 안에 끝나지 않으면 강제 종료합니다.
//!
//! 세션 ID는 파일 경로를 만들기 전에 반드시 [`validate_session_id`]로 검증합니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use sentinel_core::config::SentinelConfig;
use sentinel_core::event::{KIND_SESSION_CONNECT, format_timestamp};

use crate::error::LogPipelineError;
use crate::parser::{extract_string, first_timestamp, parse_record};

/// 재생 스트림 (라인 단위 청크)
pub type TranscriptStream = BoxStream<'static, Bytes>;

/// 세션 설정
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// SHELL 로그 경로 (세션 인덱스 소스)
    pub shell_log_path: PathBuf,
    /// tty 기록 디렉터리
    pub tty_dir: PathBuf,
    /// 재생 도구 경로
    pub playlog_bin: PathBuf,
    /// SIGTERM 후 강제 종료까지의 유예 시간
    pub terminate_grace: Duration,
}

impl SessionConfig {
    pub fn from_core(core: &SentinelConfig) -> Self {
        Self {
            shell_log_path: PathBuf::from(&core.ingest.shell_log_path),
            tty_dir: PathBuf::from(&core.sessions.tty_dir),
            playlog_bin: PathBuf::from(&core.sessions.playlog_bin),
            terminate_grace: Duration::from_secs(core.sessions.terminate_grace_secs),
        }
    }
}

/// 세션 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session: String,
    pub ip: String,
    pub timestamp: String,
}

/// 세션 ID를 검증합니다.
///
/// 빈 값, `/`, `\`, `..`을 포함한 값은 거부합니다.
pub fn validate_session_id(id: &str) -> Result<&str, LogPipelineError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(LogPipelineError::InvalidSessionId(id.to_owned()));
    }
    Ok(id)
}

/// 기록 파일이 남아 있는 세션 목록을 최근 순으로 반환합니다.
///
/// SHELL 로그가 없으면 빈 목록입니다. 파싱할 수 없는 라인과 필수 필드
/// (`session`, `src_ip`, `timestamp`)가 없는 연결 이벤트는 건너뜁니다.
/// 같은 세션의 연결 이벤트가 여러 번 기록되면 가장 이른 것만 남깁니다.
pub async fn list_sessions(config: &SessionConfig) -> Result<Vec<SessionSummary>, LogPipelineError> {
    let file = match tokio::fs::File::open(&config.shell_log_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found: HashMap<String, (DateTime<Utc>, String)> = HashMap::new();
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let Ok(record) = parse_record(&line) else {
            continue;
        };
        if extract_string(&record, "eventid").as_deref() != Some(KIND_SESSION_CONNECT) {
            continue;
        }
        let (Some(session), Some(ip), Some(ts)) = (
            extract_string(&record, "session"),
            extract_string(&record, "src_ip"),
            first_timestamp(&record, &["timestamp"]),
        ) else {
            continue;
        };
        if validate_session_id(&session).is_err() {
            continue;
        }
        if let Some((seen, _)) = found.get(&session) {
            if *seen <= ts {
                continue;
            }
        } else if !exists(&config.tty_dir.join(&session)).await {
            continue;
        }
        found.insert(session, (ts, ip));
    }

    let mut sessions: Vec<_> = found.into_iter().collect();
    sessions.sort_by(|a, b| b.1.0.cmp(&a.1.0).then_with(|| a.0.cmp(&b.0)));
    Ok(sessions
        .into_iter()
        .map(|(session, (ts, ip))| SessionSummary {
            session,
            ip,
            timestamp: format_timestamp(&ts),
        })
        .collect())
}

/// 세션 재생기
#[derive(Debug, Clone)]
pub struct SessionReplayer {
    config: SessionConfig,
}

impl SessionReplayer {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// 세션 기록 파일 경로를 검증 후 반환합니다.
    pub async fn artifact_path(&self, id: &str) -> Result<PathBuf, LogPipelineError> {
        let id = validate_session_id(id)?;
        let path = self.config.tty_dir.join(id);
        if !exists(&path).await {
            return Err(LogPipelineError::SessionArtifactMissing(id.to_owned()));
        }
        Ok(path)
    }

    /// 재생 도구를 실행하고 stdout 스트림을 반환합니다.
    pub async fn open(&self, id: &str) -> Result<TranscriptStream, LogPipelineError> {
        let artifact = self.artifact_path(id).await?;
        if !exists(&self.config.playlog_bin).await {
            return Err(LogPipelineError::ReplayToolMissing(
                self.config.playlog_bin.display().to_string(),
            ));
        }

        let mut child = Command::new(&self.config.playlog_bin)
            .arg(&artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LogPipelineError::Channel("replay tool stdout unavailable".to_owned()))?;

        tracing::info!(session = %id, pid = ?child.id(), "started session replay");
        Ok(transcript(
            stdout,
            ChildGuard {
                child: Some(child),
                grace: self.config.terminate_grace,
            },
        ))
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// stdout을 라인 단위 청크로 내보냅니다. 스트림과 함께 `guard`가 drop됩니다.
fn transcript<R>(stdout: R, guard: ChildGuard) -> TranscriptStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let reader = BufReader::new(stdout);
    stream::unfold((reader, guard), |(mut reader, guard)| async move {
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Bytes::from(buf), (reader, guard))),
            Err(e) => {
                tracing::warn!(error = %e, "session replay read failed");
                None
            }
        }
    })
    .boxed()
}

/// 재생 프로세스 정리 -- drop 시 SIGTERM 후 유예 시간이 지나면 kill
struct ChildGuard {
    child: Option<Child>,
    grace: Duration,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        terminate(&child);
        let grace = self.grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if tokio::time::timeout(grace, child.wait()).await.is_err() {
                        tracing::warn!(pid = ?child.id(), "replay tool ignored SIGTERM, killing");
                        if let Err(e) = child.kill().await {
                            tracing::warn!(error = %e, "failed to kill replay tool");
                        }
                    }
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid는 아직 회수되지 않은 자식 프로세스의 것이며, SIGTERM 전송은 메모리 안전성에 영향이 없습니다.
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if result != 0 {
            tracing::debug!(
                pid,
                error = %std::io::Error::last_os_error(),
                "SIGTERM delivery failed"
            );
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_ids() {
        for id in ["", "../etc/passwd", "a/b", "a\\b", "..", "x..y"] {
            assert!(
                matches!(
                    validate_session_id(id),
                    Err(LogPipelineError::InvalidSessionId(_))
                ),
                "{id:?} should be rejected"
            );
        }
        assert_eq!(validate_session_id("a1b2c3d4").unwrap(), "a1b2c3d4");
    }

    fn config(dir: &Path) -> SessionConfig {
        SessionConfig {
            shell_log_path: dir.join("cowrie.json"),
            tty_dir: dir.join("tty"),
            playlog_bin: dir.join("playlog"),
            terminate_grace: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn missing_log_yields_no_sessions() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_sessions(&config(dir.path())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_sessions_with_artifacts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(&config.tty_dir).unwrap();
        std::fs::write(config.tty_dir.join("old"), b"tty").unwrap();
        std::fs::write(config.tty_dir.join("new"), b"tty").unwrap();

        let log = [
            r#"{"eventid":"cowrie.session.connect","session":"old","src_ip":"1.1.1.1","timestamp":"2025-03-01T10:00:00Z"}"#,
            r#"{"eventid":"cowrie.login.failed","session":"old","src_ip":"1.1.1.1","timestamp":"2025-03-01T10:00:01Z"}"#,
            r#"{"eventid":"cowrie.session.connect","session":"gone","src_ip":"2.2.2.2","timestamp":"2025-03-01T11:00:00Z"}"#,
            r#"{"eventid":"cowrie.session.connect","session":"new","src_ip":"3.3.3.3","timestamp":"2025-03-01T12:00:00Z"}"#,
            r#"{"eventid":"cowrie.session.connect","session":"new","timestamp":"2025-03-01T12:00:00Z"}"#,
            "garbage",
        ]
        .join("\n");
        std::fs::write(&config.shell_log_path, log).unwrap();

        let sessions = list_sessions(&config).await.unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.session.as_str()).collect();
        assert_eq!(ids, ["new", "old"]);
        assert_eq!(sessions[0].ip, "3.3.3.3");
        assert_eq!(sessions[0].timestamp, "2025-03-01T12:00:00.000000Z");
    }

    #[tokio::test]
    async fn repeated_connects_keep_earliest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(&config.tty_dir).unwrap();
        std::fs::write(config.tty_dir.join("dup"), b"tty").unwrap();

        let log = [
            r#"{"eventid":"cowrie.session.connect","session":"dup","src_ip":"4.4.4.4","timestamp":"2025-03-01T10:05:00Z"}"#,
            r#"{"eventid":"cowrie.session.connect","session":"dup","src_ip":"5.5.5.5","timestamp":"2025-03-01T10:00:00Z"}"#,
            r#"{"eventid":"cowrie.session.connect","session":"dup","src_ip":"6.6.6.6","timestamp":"2025-03-01T10:09:00Z"}"#,
        ]
        .join("\n");
        std::fs::write(&config.shell_log_path, log).unwrap();

        let sessions = list_sessions(&config).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].ip, "5.5.5.5");
        assert_eq!(sessions[0].timestamp, "2025-03-01T10:00:00.000000Z");
    }

    #[tokio::test]
    async fn open_checks_boundaries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(&config.tty_dir).unwrap();
        let replayer = SessionReplayer::new(config.clone());

        assert!(matches!(
            replayer.open("../x").await,
            Err(LogPipelineError::InvalidSessionId(_))
        ));
        assert!(matches!(
            replayer.open("absent").await,
            Err(LogPipelineError::SessionArtifactMissing(_))
        ));

        std::fs::write(config.tty_dir.join("present"), b"tty").unwrap();
        assert!(matches!(
            replayer.open("present").await,
            Err(LogPipelineError::ReplayToolMissing(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_replay_tool_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        std::fs::create_dir_all(&config.tty_dir).unwrap();
        std::fs::write(config.tty_dir.join("s1"), b"line one\nline two\n").unwrap();

        // 기록 파일을 그대로 출력하는 재생 도구
        config.playlog_bin = dir.path().join("playlog.sh");
        std::fs::write(&config.playlog_bin, "#!/bin/sh\ncat \"$1\"\n").unwrap();
        std::fs::set_permissions(&config.playlog_bin, std::fs::Permissions::from_mode(0o755))
            .unwrap();

        let chunks: Vec<Bytes> = SessionReplayer::new(config)
            .open("s1")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks, [Bytes::from("line one\n"), Bytes::from("line two\n")]);
    }

    #[cfg(unix)]
    fn process_alive(pid: libc::pid_t) -> bool {
        // SAFETY: 시그널 0은 존재 여부만 확인합니다.
        unsafe { libc::kill(pid, 0) == 0 }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_transcript_terminates_stubborn_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        std::fs::create_dir_all(&config.tty_dir).unwrap();
        std::fs::write(config.tty_dir.join("s1"), b"tty").unwrap();

        // SIGTERM을 무시하고 오래 실행되는 재생 도구
        config.playlog_bin = dir.path().join("stubborn.sh");
        std::fs::write(
            &config.playlog_bin,
            "#!/bin/sh\ntrap '' TERM\necho \"$$\"\nexec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&config.playlog_bin, std::fs::Permissions::from_mode(0o755))
            .unwrap();

        let mut transcript = SessionReplayer::new(config.clone()).open("s1").await.unwrap();
        let first = transcript.next().await.unwrap();
        let pid: libc::pid_t = std::str::from_utf8(&first).unwrap().trim().parse().unwrap();
        assert!(process_alive(pid));

        drop(transcript);

        // 유예 시간 안에는 SIGTERM을 무시하고 살아 있습니다.
        tokio::time::sleep(config.terminate_grace / 2).await;
        assert!(process_alive(pid));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while process_alive(pid) {
            assert!(
                std::time::Instant::now() < deadline,
                "replay tool {pid} still running after grace period"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
