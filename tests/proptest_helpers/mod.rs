#![allow(dead_code)]

use std::path::Path;

use annoset::extractor::ItemList;
use annoset::ir::{Annotation, Categories, DatasetItem, Image, LabelCategories};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(32);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Whole-pixel box `(label, [xmin, ymin, xmax, ymax])` inside `width x height`.
pub fn arb_box(
    labels: usize,
    width: u32,
    height: u32,
) -> impl Strategy<Value = (usize, [f64; 4])> {
    (0..labels, 0..width, 0..height).prop_flat_map(move |(label, x0, y0)| {
        (x0 + 1..=width, y0 + 1..=height).prop_map(move |(x1, y1)| {
            (
                label,
                [f64::from(x0), f64::from(y0), f64::from(x1), f64::from(y1)],
            )
        })
    })
}

/// One item description: image size and boxes.
pub fn arb_item(
    labels: usize,
    max_boxes: usize,
) -> impl Strategy<Value = ((u32, u32), Vec<(usize, [f64; 4])>)> {
    (8u32..200, 8u32..200).prop_flat_map(move |(width, height)| {
        (
            Just((width, height)),
            prop::collection::vec(arb_box(labels, width, height), 0..=max_boxes),
        )
    })
}

/// Materializes item descriptions as a dataset with BMP images under `dir`.
pub fn build_dataset(
    dir: &Path,
    names: &[&str],
    items: Vec<((u32, u32), Vec<(usize, [f64; 4])>)>,
) -> ItemList {
    let labels = LabelCategories::from_names(names.iter().copied()).expect("labels");
    let items = items
        .into_iter()
        .enumerate()
        .map(|(n, ((width, height), boxes))| {
            let id = format!("item_{n:03}");
            let path = dir.join(format!("{id}.bmp"));
            crate::common::write_bmp(&path, width, height);
            DatasetItem::new(id)
                .with_subset(if n % 2 == 0 { "train" } else { "val" })
                .with_image(Image::from_path(path).with_size(width, height))
                .with_annotations(
                    boxes
                        .into_iter()
                        .map(|(label, [x0, y0, x1, y1])| {
                            Annotation::bbox(x0, y0, x1, y1).with_label(label)
                        })
                        .collect(),
                )
        })
        .collect();
    ItemList::new(Categories::from_labels(labels), items)
}
