//! Composing datasets from several sources.

mod common;

use std::path::Path;

use annoset::converter::ConvertOptions;
use annoset::error::AnnosetError;
use annoset::extractor::{Extractor, ItemList};
use annoset::ir::{Categories, LabelCategories};
use annoset::project::{MergeMode, Project};
use annoset::registry::Environment;

fn export_subset(source: &ItemList, subset: &str, format: &str, out: &Path) {
    let items = source
        .items()
        .iter()
        .filter(|item| item.subset == subset)
        .cloned()
        .collect();
    let part = ItemList::new(source.categories().clone(), items);
    Environment::builtin()
        .expect("builtin environment")
        .converter(format)
        .expect("converter")
        .convert(&part, out, &ConvertOptions::with_images())
        .expect("export");
}

#[test]
fn sources_in_different_formats_merge() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = common::sample_dataset(&temp.path().join("source"));
    export_subset(&source, "train", "coco", &temp.path().join("a"));
    export_subset(&source, "val", "yolo", &temp.path().join("b"));

    let env = Environment::builtin().expect("builtin environment");
    let mut project = Project::new("merged");
    let (format_a, _) = project
        .import_auto(&temp.path().join("a"), &env)
        .expect("import coco");
    let (format_b, _) = project
        .import_auto(&temp.path().join("b"), &env)
        .expect("import yolo");
    assert_eq!((format_a.as_str(), format_b.as_str()), ("coco", "yolo"));

    let dataset = project.make_dataset(&env).expect("make dataset");
    assert_eq!(dataset.len(), 3);
    assert_eq!(
        common::labeled_boxes(&dataset),
        common::labeled_boxes(&source)
    );
}

#[test]
fn same_item_from_two_sources_is_ambiguous() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = common::sample_dataset(&temp.path().join("source"));
    export_subset(&source, "val", "native", &temp.path().join("a"));
    export_subset(&source, "val", "cvat", &temp.path().join("b"));

    let env = Environment::builtin().expect("builtin environment");
    let mut project = Project::new("clash");
    project
        .import(&temp.path().join("a"), "native", &env)
        .expect("import native");
    let names = project
        .import(&temp.path().join("b"), "cvat", &env)
        .expect("import cvat");
    // both sources are called "val"; the second one is renamed
    assert_eq!(names, vec!["val_1"]);

    match project.make_dataset(&env) {
        Err(AnnosetError::AmbiguousItem { subset, id }) => {
            assert_eq!((subset.as_str(), id.as_str()), ("val", "img_c"));
        }
        other => panic!("expected AmbiguousItem, got {other:?}"),
    }

    project.set_merge_mode(MergeMode::Override);
    let dataset = project.make_dataset(&env).expect("override merge");
    assert_eq!(dataset.len(), 1);
}

#[test]
fn subset_allow_list_filters_items() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = common::sample_dataset(&temp.path().join("source"));
    let out = temp.path().join("voc");
    Environment::builtin()
        .expect("builtin environment")
        .converter("voc")
        .expect("converter")
        .convert(&source, &out, &ConvertOptions::with_images())
        .expect("export");

    let env = Environment::builtin().expect("builtin environment");
    let mut project = Project::new("filtered");
    project.import(&out, "voc", &env).expect("import");
    project.set_subsets(Some(["val".to_string()].into()));

    let dataset = project.make_dataset(&env).expect("make dataset");
    let ids: Vec<_> = dataset.items().iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["img_c"]);
}

#[test]
fn conflicting_label_order_is_rejected() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = common::sample_dataset(&temp.path().join("source"));
    export_subset(&source, "train", "native", &temp.path().join("a"));

    let swapped = ItemList::new(
        Categories::from_labels(LabelCategories::from_names(["dog", "cat"]).expect("labels")),
        Vec::new(),
    );
    let labels_only = temp.path().join("b");
    Environment::builtin()
        .expect("builtin environment")
        .converter("yolo")
        .expect("converter")
        .convert(&swapped, &labels_only, &ConvertOptions::default())
        .expect("export");
    // an empty YOLO export has no subset list; declare one by hand
    std::fs::write(labels_only.join("val.txt"), "").expect("write list");
    std::fs::write(
        labels_only.join("obj.data"),
        "classes = 2\nnames = obj.names\nval = val.txt\n",
    )
    .expect("write manifest");

    let env = Environment::builtin().expect("builtin environment");
    let mut project = Project::new("conflict");
    project
        .import(&temp.path().join("a"), "native", &env)
        .expect("import native");
    project.import(&labels_only, "yolo", &env).expect("import yolo");

    match project.make_dataset(&env) {
        Err(AnnosetError::IncompatibleCategories { index, left, right }) => {
            assert_eq!(index, 0);
            assert_eq!((left.as_str(), right.as_str()), ("cat", "dog"));
        }
        other => panic!("expected IncompatibleCategories, got {other:?}"),
    }
}

#[test]
fn saved_project_rebuilds_the_same_dataset() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = common::sample_dataset(&temp.path().join("source"));
    let out = temp.path().join("cvat");
    Environment::builtin()
        .expect("builtin environment")
        .converter("cvat")
        .expect("converter")
        .convert(&source, &out, &ConvertOptions::with_images())
        .expect("export");

    let env = Environment::builtin().expect("builtin environment");
    let mut project = Project::new("saved");
    project.import_auto(&out, &env).expect("import");
    project
        .save(&temp.path().join("project"))
        .expect("save project");

    let loaded = Project::load(&temp.path().join("project")).expect("load project");
    assert_eq!(loaded, project);
    assert_eq!(
        common::labeled_boxes(&loaded.make_dataset(&env).expect("dataset")),
        common::labeled_boxes(&source)
    );
}

#[test]
fn extractors_restart_from_the_first_item() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = common::sample_dataset(&temp.path().join("source"));
    let env = Environment::builtin().expect("builtin environment");

    for format in ["voc", "yolo", "tf_detection_api", "cvat", "coco", "native"] {
        let out = temp.path().join(format);
        env.converter(format)
            .expect("converter")
            .convert(&source, &out, &ConvertOptions::with_images())
            .expect("export");

        let (_, sources) = env.detect_format(&out).expect("detect");
        for source in &sources {
            let extractor = env.make_extractor(source).expect("extractor");
            let first: Vec<_> = extractor
                .collect_items()
                .expect("first pass")
                .into_iter()
                .map(|item| item.id)
                .collect();
            let partial = extractor.iter().take(1).count();
            assert_eq!(partial, first.len().min(1));
            let second: Vec<_> = extractor
                .collect_items()
                .expect("second pass")
                .into_iter()
                .map(|item| item.id)
                .collect();
            assert_eq!(first, second, "{format} source '{}' is not restartable", source.name);
        }
    }
}
