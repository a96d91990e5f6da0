//! Fuzz target for YOLO label rows.
//!
//! Only valid UTF-8 reaches the parser; label files are read as text.

#![no_main]

use libfuzzer_sys::fuzz_target;
use annoset::formats::yolo::parse_yolo_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }

    if let Ok(line) = std::str::from_utf8(data) {
        let _ = parse_yolo_line(line);
    }
});
