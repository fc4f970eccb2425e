//! tailer 오프셋 속성 테스트
//!
//! 임의로 나눈 청크를 순서대로 append하면서 매번 다시 읽으면,
//! 읽은 라인을 모두 이어 붙인 결과는 append한 완전한 라인과 정확히 같아야 합니다.

use std::io::Write;

use proptest::prelude::*;

use sentinel_log_pipeline::collector::read_new_lines;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunked_appends_yield_each_line_once(
        lines in prop::collection::vec("[a-z0-9{}:]{1,20}", 1..20),
        cuts in prop::collection::vec(0usize..400, 0..6),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.jsonl");
        let content: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let bytes = content.as_bytes();

        let mut boundaries: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
        boundaries.push(bytes.len());
        boundaries.sort_unstable();

        let rt = runtime();
        let mut offset = 0u64;
        let mut seen = Vec::new();
        let mut written = 0usize;
        for end in boundaries {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .unwrap();
            file.write_all(&bytes[written..end]).unwrap();
            written = end;

            let read = rt.block_on(read_new_lines(&path, offset, 0)).unwrap();
            prop_assert!(!read.rotated);
            prop_assert!(read.offset >= offset);
            offset = read.offset;
            seen.extend(read.lines);
        }

        prop_assert_eq!(seen, lines);
        prop_assert_eq!(offset, bytes.len() as u64);
    }

    #[test]
    fn truncation_restarts_from_zero(
        before in prop::collection::vec("[a-z]{5,20}", 2..10),
        after in prop::collection::vec("[a-z]{1,4}", 1..3),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cowrie.json");
        let rt = runtime();

        let first: String = before.iter().map(|l| format!("{l}\n")).collect();
        std::fs::write(&path, &first).unwrap();
        let read = rt.block_on(read_new_lines(&path, 0, 0)).unwrap();

        let second: String = after.iter().map(|l| format!("{l}\n")).collect();
        std::fs::write(&path, &second).unwrap();
        let reread = rt.block_on(read_new_lines(&path, read.offset, 0)).unwrap();

        prop_assert!(reread.rotated);
        prop_assert_eq!(reread.lines, after);
        prop_assert_eq!(reread.offset, second.len() as u64);
    }
}
