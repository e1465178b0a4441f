#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Span parsing should not panic on any input
    let _ = data.parse::<mmcorpus::Span>();
});
