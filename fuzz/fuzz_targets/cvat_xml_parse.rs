//! Fuzz target for CVAT XML parsing, including track reassembly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use annoset::formats::cvat::parse_cvat_slice;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = parse_cvat_slice(data);
});
