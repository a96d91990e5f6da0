#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use annoset::extractor::{Extractor, ItemList};
use annoset::ir::{Annotation, Categories, DatasetItem, Image, LabelCategories};
use annoset::project::{Dataset, Project};
use annoset::registry::Environment;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// Two labels, two subsets, three items with boxes on real BMP images
/// written under `image_dir`.
pub fn sample_dataset(image_dir: &Path) -> ItemList {
    let labels = LabelCategories::from_names(["cat", "dog"]).expect("labels");

    let specs: [(&str, &str, u32, u32, Vec<(usize, [f64; 4])>); 3] = [
        (
            "train",
            "img_a",
            100,
            50,
            vec![(0, [1.0, 2.0, 30.0, 40.0]), (1, [50.0, 10.0, 90.0, 45.0])],
        ),
        ("train", "img_b", 120, 80, vec![(1, [10.0, 12.0, 60.0, 70.0])]),
        ("val", "img_c", 64, 64, vec![(0, [0.0, 0.0, 64.0, 32.0])]),
    ];

    let items = specs
        .into_iter()
        .map(|(subset, id, width, height, boxes)| {
            let path = image_dir.join(format!("{id}.bmp"));
            write_bmp(&path, width, height);
            let annotations = boxes
                .into_iter()
                .map(|(label, [x0, y0, x1, y1])| Annotation::bbox(x0, y0, x1, y1).with_label(label))
                .collect();
            DatasetItem::new(id)
                .with_subset(subset)
                .with_image(Image::from_path(path).with_size(width, height))
                .with_annotations(annotations)
        })
        .collect();

    ItemList::new(Categories::from_labels(labels), items)
}

/// Imports `root` as `format` (or auto-detected) into a fresh project.
pub fn import(root: &Path, format: Option<&str>) -> Dataset {
    let env = Environment::builtin().expect("builtin environment");
    let mut project = Project::new("test");
    match format {
        Some(format) => {
            project.import(root, format, &env).expect("import");
        }
        None => {
            project.import_auto(root, &env).expect("detect format");
        }
    }
    project.make_dataset(&env).expect("make dataset")
}

/// Boxes per `(subset, id)` as `(label name, rounded coords)`, sorted.
pub fn labeled_boxes(
    extractor: &dyn Extractor,
) -> BTreeMap<(String, String), Vec<(String, [i64; 4])>> {
    let labels = &extractor.categories().labels;
    let mut out = BTreeMap::new();
    for item in extractor.iter() {
        let item = item.expect("item");
        let mut boxes: Vec<_> = item
            .annotations
            .iter()
            .filter_map(|ann| {
                let name = labels.name(ann.label?)?.to_string();
                let bbox = ann.bounding_box()?;
                Some((name, bbox.coords().map(|v| v.round() as i64)))
            })
            .collect();
        boxes.sort();
        out.insert((item.subset, item.id), boxes);
    }
    out
}
