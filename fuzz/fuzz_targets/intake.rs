#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_log_pipeline::coerce_intake;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = coerce_intake(&value);
    }
});
