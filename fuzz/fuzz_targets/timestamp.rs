#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::event::{format_timestamp, parse_timestamp};

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        if let Some(ts) = parse_timestamp(raw) {
            // 저장 포맷은 다시 읽어도 같은 문자열이 되어야 합니다.
            let formatted = format_timestamp(&ts);
            let reparsed = parse_timestamp(&formatted).expect("stored format must parse");
            assert_eq!(format_timestamp(&reparsed), formatted);
        }
    }
});
