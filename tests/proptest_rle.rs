use annoset::ir::RleMask;
use proptest::prelude::*;

mod common;
mod proptest_helpers;

fn arb_bitmap() -> impl Strategy<Value = (u32, u32, Vec<bool>)> {
    (1u32..24, 1u32..24).prop_flat_map(|(width, height)| {
        (
            Just(width),
            Just(height),
            prop::collection::vec(any::<bool>(), (width * height) as usize),
        )
    })
}

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn bitmap_roundtrips_through_runs((width, height, bitmap) in arb_bitmap()) {
        let mask = RleMask::from_bitmap(width, height, &bitmap).expect("encode");
        prop_assert!(mask.validate().is_ok());
        prop_assert_eq!(mask.to_bitmap(), bitmap.clone());
        prop_assert_eq!(mask.area(), bitmap.iter().filter(|v| **v).count() as u64);
    }

    #[test]
    fn compressed_string_roundtrips((width, height, bitmap) in arb_bitmap()) {
        let mask = RleMask::from_bitmap(width, height, &bitmap).expect("encode");
        let text = mask.to_coco_string();
        let decoded = RleMask::from_coco_string(&text, height, width).expect("decode");
        prop_assert_eq!(decoded, mask);
    }

    #[test]
    fn bbox_covers_every_set_pixel((width, height, bitmap) in arb_bitmap()) {
        let mask = RleMask::from_bitmap(width, height, &bitmap).expect("encode");
        match mask.bbox() {
            None => prop_assert!(bitmap.iter().all(|v| !v)),
            Some(bbox) => {
                for (i, set) in bitmap.iter().enumerate() {
                    if *set {
                        let (x, y) = ((i as u32 % width) as f64, (i as u32 / width) as f64);
                        prop_assert!(bbox.xmin() <= x && x + 1.0 <= bbox.xmax() + 1e-9);
                        prop_assert!(bbox.ymin() <= y && y + 1.0 <= bbox.ymax() + 1e-9);
                    }
                }
            }
        }
    }
}
