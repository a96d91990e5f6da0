//! Fuzz target for VOC annotation XML parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use annoset::formats::voc::parse_voc_slice;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = parse_voc_slice(data);
});
