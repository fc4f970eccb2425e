#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`collector`]: 센서 로그 파일 tail (오프셋 추적, 로테이션 감지)
//! - [`parser`]: WEB/SHELL 레코드 정규화와 수집 API 입력 변환
//! - [`writer`]: 제출 큐를 소비하는 단일 배치 writer (보존 정리 포함)
//! - [`pipeline`]: 폴링 구동기와 수집 파이프라인 (Pipeline trait 구현)
//! - [`relay`]: 업스트림 라이브 피드 릴레이 (keepalive, 재생 라인 기록)
//! - [`sessions`]: SHELL 세션 인덱스와 외부 도구 기반 세션 재생
//! - [`config`]: 파이프라인 설정 (core 설정 변환)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! FileTailer -> Normalizer -> WriterHandle --+
//! Intake API -> coerce_intake -> WriterHandle --+--> mpsc --> BatchWriter --> EventStore
//! LiveRelay ----------------> WriterHandle --+                      |       \-> ReplayStore
//!                                                          RetentionPolicy
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod relay;
pub mod sessions;
pub mod writer;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{IngestPipeline, IngestPipelineBuilder, PollDriver, PollSummary};

// 설정
pub use config::{PipelineConfig, WriterConfig};

// 에러
pub use error::LogPipelineError;

// 정규화
pub use parser::{IntakeRejection, LineOutcome, ShellNormalizer, WebNormalizer, coerce_intake};

// 수집기
pub use collector::{FileTailer, TailRead, TailSink, TailTarget};

// writer
pub use writer::{WriterHandle, WriterStatsSnapshot};

// 릴레이
pub use relay::{LiveRelay, RelayConfig, RelayStream};

// 세션
pub use sessions::{SessionConfig, SessionReplayer, SessionSummary, TranscriptStream};
