//! 정규화 + 지문 벤치마크
//!
//! 라인 파싱, 소스별 정규화, 지문 계산의 처리량을 측정합니다.

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sentinel_log_pipeline::parser::{LineOutcome, ShellNormalizer, WebNormalizer, normalize_line};
use sentinel_store::fingerprint;

/// WEB 요청 로그 한 줄
const WEB_LINE: &str = r#"{"time":"2025-03-01T10:00:00.123456Z","remote_addr":"203.0.113.5","method":"POST","path":"/wp-login.php","query_string":"redirect_to=%2Fwp-admin","username":"admin","password":"admin123","headers":{"User-Agent":"Mozilla/5.0 (X11; Linux x86_64)","Accept":"*/*"}}"#;

/// SHELL 로그인 실패 한 줄
const SHELL_LOGIN: &str = r#"{"eventid":"cowrie.login.failed","username":"root","password":"123456","message":"login attempt [root/123456] failed","sensor":"hp-01","timestamp":"2025-03-01T10:00:01.000000Z","src_ip":"198.51.100.7","session":"a1b2c3d4e5f6"}"#;

/// SHELL 비로그인 이벤트 (필터링 경로)
const SHELL_COMMAND: &str = r#"{"eventid":"cowrie.command.input","input":"uname -a","message":"CMD: uname -a","sensor":"hp-01","timestamp":"2025-03-01T10:00:02.000000Z","src_ip":"198.51.100.7","session":"a1b2c3d4e5f6"}"#;

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("web", |b| {
        b.iter(|| normalize_line(&WebNormalizer, black_box(WEB_LINE)))
    });
    group.bench_function("shell_login", |b| {
        b.iter(|| normalize_line(&ShellNormalizer, black_box(SHELL_LOGIN)))
    });
    group.bench_function("shell_filtered", |b| {
        b.iter(|| normalize_line(&ShellNormalizer, black_box(SHELL_COMMAND)))
    });

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let LineOutcome::Event(event) = normalize_line(&WebNormalizer, WEB_LINE) else {
        panic!("web line should normalize");
    };

    let mut group = c.benchmark_group("fingerprint");
    group.throughput(Throughput::Elements(1));
    group.bench_function("web_event", |b| b.iter(|| fingerprint(black_box(&event))));
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_fingerprint);
criterion_main!(benches);
