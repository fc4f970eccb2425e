#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_log_pipeline::relay::{data_frame, sse_data};

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        if let Some(line) = sse_data(raw) {
            let frame = data_frame(line);
            assert!(frame.ends_with(b"\n\n"));
        }
    }
});
