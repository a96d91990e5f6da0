use assert_cmd::Command;
use predicates::prelude::*;

use annoset::converter::ConvertOptions;
use annoset::extractor::ItemList;
use annoset::ir::{Annotation, Categories, DatasetItem, LabelCategories};
use annoset::registry::Environment;

mod common;

fn annoset() -> Command {
    Command::cargo_bin("annoset").unwrap()
}

fn export(source: &ItemList, format: &str, out: &std::path::Path) {
    Environment::builtin()
        .unwrap()
        .converter(format)
        .unwrap()
        .convert(source, out, &ConvertOptions::with_images())
        .unwrap();
}

#[test]
fn runs() {
    annoset().assert().success();
}

#[test]
fn outputs_tool_name() {
    annoset()
        .arg("-V")
        .assert()
        .success()
        .stdout(format!("annoset {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn convert_detects_input_format() {
    let temp = tempfile::tempdir().unwrap();
    let source = common::sample_dataset(&temp.path().join("source"));
    export(&source, "voc", &temp.path().join("voc"));

    annoset()
        .args(["convert", "--output-format", "coco", "--save-images"])
        .arg(temp.path().join("voc"))
        .arg(temp.path().join("coco"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted 3 item(s) to coco"));

    assert!(temp.path().join("coco/annotations/instances_train.json").is_file());
    assert!(temp.path().join("coco/images/val/img_c.bmp").is_file());
}

#[test]
fn convert_with_subset_filter() {
    let temp = tempfile::tempdir().unwrap();
    let source = common::sample_dataset(&temp.path().join("source"));
    export(&source, "native", &temp.path().join("native"));

    annoset()
        .args(["convert", "-i", "native", "-o", "cvat", "--subset", "val"])
        .arg(temp.path().join("native"))
        .arg(temp.path().join("cvat"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted 1 item(s)"));

    assert!(temp.path().join("cvat/val.xml").is_file());
    assert!(!temp.path().join("cvat/train.xml").exists());
}

#[test]
fn convert_unknown_output_format_fails() {
    let temp = tempfile::tempdir().unwrap();
    annoset()
        .args(["convert", "-o", "labelme"])
        .arg(temp.path())
        .arg(temp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("'labelme' is not registered"));
}

#[test]
fn detect_lists_matching_formats() {
    let temp = tempfile::tempdir().unwrap();
    let source = common::sample_dataset(&temp.path().join("source"));
    export(&source, "yolo", &temp.path().join("yolo"));

    annoset()
        .arg("detect")
        .arg(temp.path().join("yolo"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("yolo\n"))
        .stdout(predicate::str::contains("image_dir"));
}

#[test]
fn detect_empty_directory_fails() {
    let temp = tempfile::tempdir().unwrap();
    annoset()
        .arg("detect")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No supported dataset detected"));
}

#[test]
fn validate_valid_dataset_succeeds() {
    let temp = tempfile::tempdir().unwrap();
    let source = common::sample_dataset(&temp.path().join("source"));
    export(&source, "native", &temp.path().join("native"));

    annoset()
        .args(["validate", "--format", "native"])
        .arg(temp.path().join("native"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation passed"));
}

#[test]
fn validate_strict_fails_on_warnings() {
    let temp = tempfile::tempdir().unwrap();
    let labels = LabelCategories::from_names(["cat"]).unwrap();
    let item = DatasetItem::new("flipped")
        .with_annotation(Annotation::bbox(10.0, 10.0, 5.0, 20.0).with_label(0));
    let source = ItemList::new(Categories::from_labels(labels), vec![item]);
    export(&source, "native", &temp.path().join("native"));

    annoset()
        .args(["validate"])
        .arg(temp.path().join("native"))
        .assert()
        .success()
        .stdout(predicate::str::contains("InvalidBBoxOrdering"));

    annoset()
        .args(["validate", "--strict", "--output", "json"])
        .arg(temp.path().join("native"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"warning_count\": 1"));
}

#[test]
fn split_reassigns_subsets() {
    let temp = tempfile::tempdir().unwrap();
    let source = common::sample_dataset(&temp.path().join("source"));
    export(&source, "native", &temp.path().join("native"));

    annoset()
        .args(["split", "-o", "native", "--ratio", "a=1.0", "--seed", "7"])
        .arg(temp.path().join("native"))
        .arg(temp.path().join("split"))
        .assert()
        .success();
    assert!(temp.path().join("split/annotations/a.json").is_file());

    annoset()
        .args(["split", "-o", "native", "--ratio", "a=0.5", "--ratio", "b=0.2"])
        .arg(temp.path().join("native"))
        .arg(temp.path().join("bad"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid transform parameters"));
}
