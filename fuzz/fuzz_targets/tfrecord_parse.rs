//! Fuzz target for TFRecord framing and tf.Example decoding.

#![no_main]

use libfuzzer_sys::fuzz_target;
use annoset::formats::tfrecord::parse_records_slice;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = parse_records_slice(data);
});
