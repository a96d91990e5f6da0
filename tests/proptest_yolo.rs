use std::path::Path;

use annoset::converter::ConvertOptions;
use annoset::formats::yolo::{parse_label_line, YoloRow};
use annoset::registry::Environment;
use proptest::prelude::*;

mod common;
mod proptest_helpers;

fn arb_row() -> impl Strategy<Value = YoloRow> {
    (0usize..1000, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0).prop_map(
        |(class_id, cx, cy, w, h)| YoloRow {
            class_id,
            cx,
            cy,
            w,
            h,
        },
    )
}

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn label_line_roundtrips_to_six_decimals(row in arb_row()) {
        let parsed = parse_label_line(&row.to_line(), Path::new("labels.txt"), 1)
            .expect("parse")
            .expect("non-empty row");
        prop_assert_eq!(parsed.class_id, row.class_id);
        let pairs = [
            (parsed.cx, row.cx),
            (parsed.cy, row.cy),
            (parsed.w, row.w),
            (parsed.h, row.h),
        ];
        for (a, b) in pairs {
            prop_assert!((a - b).abs() <= 5e-7, "{a} vs {b}");
        }
    }

    #[test]
    fn extra_tokens_are_rejected(row in arb_row(), extra in "[0-9.]{1,8}") {
        let line = format!("{} {extra}", row.to_line());
        prop_assert!(parse_label_line(&line, Path::new("labels.txt"), 7).is_err());
    }

    #[test]
    fn dataset_roundtrip_keeps_pixel_boxes(
        items in prop::collection::vec(proptest_helpers::arb_item(3, 4), 1..4)
    ) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let source = proptest_helpers::build_dataset(
            &temp.path().join("source"),
            &["a", "b", "c"],
            items,
        );
        let out = temp.path().join("yolo");
        Environment::builtin()
            .expect("builtin environment")
            .converter("yolo")
            .expect("converter")
            .convert(&source, &out, &ConvertOptions::with_images())
            .expect("export");

        let restored = common::import(&out, Some("yolo"));
        prop_assert_eq!(common::labeled_boxes(&restored), common::labeled_boxes(&source));
    }
}
