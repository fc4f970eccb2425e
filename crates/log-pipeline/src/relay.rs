//! 라이브 스트림 릴레이
//!
//! 업스트림 SSE 피드를 구독해 다운스트림 구독자 하나에게 같은 프레이밍으로 다시 내보내고,
//! 각 라인을 writer로 제출해 재생 저장소에 기록합니다.
//!
//! # 구조
//! ```text
//! upstream HTTP --(reader task)--> mpsc --> relay stream --> downstream
//!                                                 |
//!                                                 +--> WriterHandle::submit_line
//! ```
//!
//! `keepalive` 동안 라인이 없으면 `: keepalive` 주석 프레임을 보냅니다.
//! 다운스트림이 연결을 끊어 스트림이 drop되면 reader 태스크도 중단되고
//! 업스트림 연결이 닫힙니다.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

use sentinel_core::config::SentinelConfig;
use sentinel_core::metrics::{RELAY_ACTIVE, RELAY_KEEPALIVES_TOTAL, RELAY_LINES_FORWARDED_TOTAL};

use crate::error::LogPipelineError;
use crate::pipeline::replay_line;
use crate::writer::WriterHandle;

/// 다운스트림 keepalive 프레임
pub const KEEPALIVE_FRAME: &[u8] = b": keepalive\n\n";

/// reader 태스크와 릴레이 루프 사이의 큐 용량
const LINE_QUEUE_CAPACITY: usize = 256;

/// 업스트림 한 라인의 최대 길이 (바이트, 줄바꿈 제외)
pub const MAX_UPSTREAM_LINE_BYTES: usize = 1024 * 1024;

/// 다운스트림 프레임 스트림
pub type RelayStream = BoxStream<'static, Bytes>;

/// 릴레이 설정
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream_url: String,
    pub keepalive: Duration,
    pub connect_timeout: Duration,
}

impl RelayConfig {
    pub fn from_core(core: &SentinelConfig) -> Self {
        Self {
            upstream_url: core.relay.upstream_url.clone(),
            keepalive: Duration::from_secs(core.relay.keepalive_secs),
            connect_timeout: Duration::from_secs(core.relay.connect_timeout_secs),
        }
    }
}

/// 업스트림 피드 릴레이
#[derive(Debug, Clone)]
pub struct LiveRelay {
    client: reqwest::Client,
    config: RelayConfig,
}

impl LiveRelay {
    /// HTTP 클라이언트를 구성합니다.
    pub fn new(config: RelayConfig) -> Result<Self, LogPipelineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| LogPipelineError::Upstream(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// 업스트림을 구독하고 다운스트림 프레임 스트림을 반환합니다.
    ///
    /// 업스트림 연결 또는 응답 상태가 실패하면 에러를 반환합니다.
    pub async fn subscribe(&self, writer: WriterHandle) -> Result<RelayStream, LogPipelineError> {
        let response = self
            .client
            .get(&self.config.upstream_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| LogPipelineError::Upstream(e.to_string()))?;

        let relay_id = uuid::Uuid::new_v4();
        tracing::info!(
            relay_id = %relay_id,
            upstream = %self.config.upstream_url,
            "subscribed to upstream live feed"
        );

        let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        let reader = tokio::spawn(read_upstream(response, tx));
        Ok(relay_frames(
            ReceiverStream::new(rx),
            writer,
            self.config.keepalive,
            relay_id,
            Some(AbortOnDrop(reader)),
        ))
    }

    /// 이미 준비된 라인 스트림을 릴레이합니다.
    pub fn from_lines<S>(lines: S, writer: WriterHandle, keepalive: Duration) -> RelayStream
    where
        S: Stream<Item = String> + Send + Unpin + 'static,
    {
        relay_frames(lines, writer, keepalive, uuid::Uuid::new_v4(), None)
    }
}

/// drop 시 태스크를 중단합니다.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 활성 릴레이 gauge
struct ActiveGuard;

impl ActiveGuard {
    fn new() -> Self {
        metrics::gauge!(RELAY_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        metrics::gauge!(RELAY_ACTIVE).decrement(1.0);
    }
}

struct RelayState<S> {
    id: uuid::Uuid,
    lines: S,
    writer: WriterHandle,
    keepalive: Duration,
    _reader: Option<AbortOnDrop>,
    _active: ActiveGuard,
}

fn relay_frames<S>(
    lines: S,
    writer: WriterHandle,
    keepalive: Duration,
    id: uuid::Uuid,
    reader: Option<AbortOnDrop>,
) -> RelayStream
where
    S: Stream<Item = String> + Send + Unpin + 'static,
{
    let state = RelayState {
        id,
        lines,
        writer,
        keepalive,
        _reader: reader,
        _active: ActiveGuard::new(),
    };

    stream::unfold(state, |mut state| async move {
        match tokio::time::timeout(state.keepalive, state.lines.next()).await {
            Ok(Some(line)) => {
                state.writer.submit_line(replay_line(&line));
                metrics::counter!(RELAY_LINES_FORWARDED_TOTAL).increment(1);
                Some((data_frame(&line), state))
            }
            Ok(None) => {
                tracing::info!(relay_id = %state.id, "upstream live feed ended");
                None
            }
            Err(_idle) => {
                metrics::counter!(RELAY_KEEPALIVES_TOTAL).increment(1);
                Some((Bytes::from_static(KEEPALIVE_FRAME), state))
            }
        }
    })
    .boxed()
}

/// `data:` 프레임
pub fn data_frame(line: &str) -> Bytes {
    Bytes::from(format!("data: {line}\n\n"))
}

/// 업스트림 SSE 라인에서 전달할 데이터를 꺼냅니다.
///
/// 빈 줄과 주석(`:`)은 버리고, `data:` 필드는 값만 남깁니다.
/// `event:`/`id:`/`retry:` 필드는 버리며, 그 외의 라인은 그대로 전달합니다.
pub fn sse_data(raw: &str) -> Option<&str> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        return (!data.is_empty()).then_some(data);
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return None;
    }
    Some(line)
}

async fn read_upstream(response: reqwest::Response, tx: mpsc::Sender<String>) {
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let reader = Box::pin(StreamReader::new(body));

    match forward_lines(reader, tx, MAX_UPSTREAM_LINE_BYTES).await {
        Ok(()) => tracing::debug!("upstream reader exited"),
        Err(e) => tracing::warn!(error = %e, "upstream live feed aborted"),
    }
}

/// 업스트림 라인을 읽어 데이터만 `tx`로 보냅니다.
///
/// `max_line`을 넘는 라인을 만나면 에러로 끝납니다. 다운스트림이 사라지면 조용히 끝납니다.
async fn forward_lines<R>(
    mut reader: R,
    tx: mpsc::Sender<String>,
    max_line: usize,
) -> Result<(), LogPipelineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        // 줄바꿈 1바이트를 포함해 최대 max_line + 1 바이트까지만 읽습니다.
        let read = (&mut reader)
            .take(max_line as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| LogPipelineError::Upstream(format!("read failed: {e}")))?;
        if read == 0 {
            return Ok(());
        }
        if !buf.ends_with(b"\n") && buf.len() > max_line {
            return Err(LogPipelineError::Upstream(format!(
                "upstream line exceeds {max_line} bytes"
            )));
        }

        let raw = String::from_utf8_lossy(&buf);
        if let Some(data) = sse_data(&raw) {
            if tx.send(data.to_owned()).await.is_err() {
                // 다운스트림이 사라짐
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_extracts_payload() {
        assert_eq!(sse_data("data: {\"a\":1}\n"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:tight"), Some("tight"));
        assert_eq!(sse_data(": keepalive"), None);
        assert_eq!(sse_data("\r\n"), None);
        assert_eq!(sse_data("event: message"), None);
        assert_eq!(sse_data("data: "), None);
        assert_eq!(sse_data("plain line"), Some("plain line"));
    }

    #[tokio::test]
    async fn forward_lines_stops_at_oversized_line() {
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"data: ok\n\ndata: 0123456789abcdef\ndata: never\n";
        let err = forward_lines(input, tx, 12).await.unwrap_err();
        assert!(matches!(err, LogPipelineError::Upstream(_)));

        assert_eq!(rx.recv().await.as_deref(), Some("ok"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn forward_lines_accepts_line_at_limit() {
        let (tx, mut rx) = mpsc::channel(8);
        // "data: 123456" 은 정확히 12바이트
        let input: &[u8] = b"data: 123456\n";
        forward_lines(input, tx, 12).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("123456"));
    }

    #[test]
    fn data_frame_format() {
        assert_eq!(data_frame("x").as_ref(), b"data: x\n\n");
    }
}
