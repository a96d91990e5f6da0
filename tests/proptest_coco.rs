use annoset::converter::ConvertOptions;
use annoset::registry::Environment;
use proptest::prelude::*;

mod common;
mod proptest_helpers;

fn roundtrip(
    format: &str,
    items: Vec<((u32, u32), Vec<(usize, [f64; 4])>)>,
) -> Result<(), TestCaseError> {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = proptest_helpers::build_dataset(&temp.path().join("source"), &["x", "y"], items);
    let out = temp.path().join(format);
    Environment::builtin()
        .expect("builtin environment")
        .converter(format)
        .expect("converter")
        .convert(&source, &out, &ConvertOptions::with_images())
        .expect("export");

    let restored = common::import(&out, Some(format));
    prop_assert_eq!(common::labeled_boxes(&restored), common::labeled_boxes(&source));
    Ok(())
}

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn coco_roundtrip_keeps_boxes(
        items in prop::collection::vec(proptest_helpers::arb_item(2, 5), 1..4)
    ) {
        roundtrip("coco", items)?;
    }

    #[test]
    fn native_roundtrip_keeps_boxes(
        items in prop::collection::vec(proptest_helpers::arb_item(2, 5), 1..4)
    ) {
        roundtrip("native", items)?;
    }

    #[test]
    fn tfrecord_roundtrip_keeps_boxes(
        items in prop::collection::vec(proptest_helpers::arb_item(2, 5), 1..4)
    ) {
        roundtrip("tf_detection_api", items)?;
    }
}
