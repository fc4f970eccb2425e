#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_log_pipeline::parser::{LineOutcome, ShellNormalizer, WebNormalizer, normalize_line};
use sentinel_store::fingerprint;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    for outcome in [
        normalize_line(&WebNormalizer, &line),
        normalize_line(&ShellNormalizer, &line),
    ] {
        if let LineOutcome::Event(event) = outcome {
            let _ = fingerprint(&event);
        }
    }
});
