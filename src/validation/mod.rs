//! Dataset validation.
//!
//! Checks that a dataset respects the annotation model before it is
//! converted:
//! - every item has a non-empty id and a unique `(subset, id)` key
//! - every label index falls inside the label categories
//! - shapes have finite, ordered coordinates and non-degenerate polygons

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::HashSet;

use crate::error::Result;
use crate::extractor::Extractor;
use crate::ir::{Annotation, AnnotationKind, Categories, DatasetItem, ItemKey};

/// Shapes may overhang the image by this many pixels before they are
/// reported as out of bounds.
const BOUNDS_TOLERANCE: f64 = 0.5;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
}

/// Validates every item of `extractor` and returns a report of all issues.
///
/// Only iteration failures are returned as errors; problems in the data end
/// up in the report.
pub fn validate_dataset(
    extractor: &dyn Extractor,
    _opts: &ValidateOptions,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();
    let categories = extractor.categories();

    validate_categories(categories, &mut report);

    let mut seen: HashSet<ItemKey> = HashSet::new();
    for item in extractor.iter() {
        let item = item?;
        validate_item(&item, categories, &mut seen, &mut report);
    }

    log::debug!(
        "validation found {} error(s) and {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
    Ok(report)
}

fn validate_categories(categories: &Categories, report: &mut ValidationReport) {
    for (index, category) in categories.labels.iter().enumerate() {
        if category.name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyCategoryName,
                "Empty category name",
                IssueContext::Category { index },
            ));
        }
    }
}

fn validate_item(
    item: &DatasetItem,
    categories: &Categories,
    seen: &mut HashSet<ItemKey>,
    report: &mut ValidationReport,
) {
    let item_context = || IssueContext::Item {
        subset: item.subset.clone(),
        id: item.id.clone(),
    };

    if item.id.is_empty() {
        report.add(ValidationIssue::error(
            IssueCode::EmptyItemId,
            "Empty item id",
            item_context(),
        ));
    }
    if !seen.insert(item.key()) {
        report.add(ValidationIssue::error(
            IssueCode::DuplicateItem,
            "Item appears more than once",
            item_context(),
        ));
    }

    let size = item.image.as_ref().and_then(|image| image.size());
    let bound = categories.labels.len();
    for (index, ann) in item.annotations.iter().enumerate() {
        let context = IssueContext::Annotation {
            subset: item.subset.clone(),
            id: item.id.clone(),
            index,
        };
        if let Some(label) = ann.label.filter(|label| *label >= bound) {
            report.add(ValidationIssue::error(
                IssueCode::LabelOutOfRange,
                format!("Label {label} is outside the {bound} declared categories"),
                context.clone(),
            ));
        }
        validate_geometry(ann, size, context, report);
    }
}

fn validate_geometry(
    ann: &Annotation,
    size: Option<(u32, u32)>,
    context: IssueContext,
    report: &mut ValidationReport,
) {
    match &ann.kind {
        AnnotationKind::Bbox { bbox } => {
            if !bbox.is_finite() {
                report.add(ValidationIssue::error(
                    IssueCode::NotFinite,
                    format!("Non-finite box coordinates {:?}", bbox.coords()),
                    context,
                ));
                return;
            }
            if !bbox.is_ordered() {
                report.add(ValidationIssue::warning(
                    IssueCode::InvalidBBoxOrdering,
                    format!(
                        "Invalid ordering: min ({}, {}) should be <= max ({}, {})",
                        bbox.xmin(),
                        bbox.ymin(),
                        bbox.xmax(),
                        bbox.ymax()
                    ),
                    context.clone(),
                ));
            }
        }
        AnnotationKind::Polygon { points } => {
            if points.iter().any(|v| !v.is_finite()) {
                report.add(ValidationIssue::error(
                    IssueCode::NotFinite,
                    "Non-finite polygon coordinates",
                    context,
                ));
                return;
            }
            let area = polygon_area(points);
            if area <= f64::EPSILON {
                report.add(ValidationIssue::warning(
                    IssueCode::DegeneratePolygon,
                    format!("Polygon with {} point(s) has zero area", points.len() / 2),
                    context.clone(),
                ));
            }
        }
        AnnotationKind::Polyline { points } | AnnotationKind::Points { points, .. } => {
            if points.iter().any(|v| !v.is_finite()) {
                report.add(ValidationIssue::error(
                    IssueCode::NotFinite,
                    "Non-finite point coordinates",
                    context,
                ));
                return;
            }
        }
        AnnotationKind::Mask { .. } | AnnotationKind::Label | AnnotationKind::Caption { .. } => {
            return;
        }
    }

    // Bounds are only checked when the size is already known; validation
    // never opens image files.
    let (Some((width, height)), Some(bbox)) = (size, ann.bounding_box()) else {
        return;
    };
    let (w, h) = (f64::from(width), f64::from(height));
    if bbox.xmin() < -BOUNDS_TOLERANCE
        || bbox.ymin() < -BOUNDS_TOLERANCE
        || bbox.xmax() > w + BOUNDS_TOLERANCE
        || bbox.ymax() > h + BOUNDS_TOLERANCE
    {
        report.add(ValidationIssue::warning(
            IssueCode::OutOfBounds,
            format!(
                "Shape ({:.1}, {:.1}, {:.1}, {:.1}) extends outside image bounds (0, 0, {}, {})",
                bbox.xmin(),
                bbox.ymin(),
                bbox.xmax(),
                bbox.ymax(),
                width,
                height
            ),
            context,
        ));
    }
}

/// Shoelace area of a flat `x1, y1, x2, y2, ...` ring.
fn polygon_area(points: &[f64]) -> f64 {
    let n = points.len() / 2;
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            points[2 * i] * points[2 * j + 1] - points[2 * j] * points[2 * i + 1]
        })
        .sum();
    twice.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ItemList;
    use crate::ir::{Image, LabelCategories};

    fn dataset(items: Vec<DatasetItem>) -> ItemList {
        let labels = LabelCategories::from_names(["person"]).expect("labels");
        ItemList::new(Categories::from_labels(labels), items)
    }

    fn valid_item() -> DatasetItem {
        DatasetItem::new("0001")
            .with_image(Image::from_path("0001.jpg").with_size(640, 480))
            .with_annotation(Annotation::bbox(10.0, 20.0, 100.0, 200.0).with_label(0))
    }

    fn validate(items: Vec<DatasetItem>) -> ValidationReport {
        validate_dataset(&dataset(items), &ValidateOptions::default()).expect("validate")
    }

    #[test]
    fn valid_dataset_is_clean() {
        let report = validate(vec![valid_item()]);
        assert!(report.is_clean(), "expected no issues, got: {:?}", report.issues);
    }

    #[test]
    fn label_out_of_range_is_an_error() {
        let item = valid_item().with_annotation(Annotation::tag(3));
        let report = validate(vec![item]);
        assert_eq!(report.error_count(), 1);
        assert!(report.has_code(IssueCode::LabelOutOfRange));
    }

    #[test]
    fn empty_and_duplicate_ids_are_errors() {
        let report = validate(vec![valid_item(), valid_item(), DatasetItem::new("")]);
        assert!(report.has_code(IssueCode::DuplicateItem));
        assert!(report.has_code(IssueCode::EmptyItemId));
        assert_eq!(report.error_count(), 2);
    }

    #[test]
    fn unordered_bbox_is_a_warning() {
        let item = DatasetItem::new("0001")
            .with_annotation(Annotation::bbox(100.0, 20.0, 10.0, 200.0).with_label(0));
        let report = validate(vec![item]);
        assert!(report.is_ok());
        assert_eq!(report.warning_count(), 1);
        assert!(report.has_code(IssueCode::InvalidBBoxOrdering));
    }

    #[test]
    fn collinear_polygon_is_degenerate() {
        let flat = Annotation::polygon(vec![0.0, 0.0, 5.0, 5.0, 10.0, 10.0]).expect("polygon");
        let square =
            Annotation::polygon(vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0, 0.0, 4.0]).expect("polygon");
        let report = validate(vec![DatasetItem::new("a")
            .with_annotation(flat)
            .with_annotation(square)]);
        assert_eq!(report.warning_count(), 1);
        assert!(report.has_code(IssueCode::DegeneratePolygon));
        assert_eq!(polygon_area(&[0.0, 0.0, 4.0, 0.0, 4.0, 4.0, 0.0, 4.0]), 16.0);
    }

    #[test]
    fn out_of_bounds_needs_known_size() {
        let far = Annotation::bbox(600.0, 400.0, 800.0, 600.0).with_label(0);
        let sized = validate(vec![valid_item().with_annotation(far.clone())]);
        assert!(sized.has_code(IssueCode::OutOfBounds));

        let without_size = validate(vec![DatasetItem::new("x").with_annotation(far)]);
        assert!(without_size.is_clean());
    }

    #[test]
    fn non_finite_box_is_an_error() {
        let item = DatasetItem::new("x").with_annotation(Annotation::bbox(f64::NAN, 0.0, 1.0, 1.0));
        let report = validate(vec![item]);
        assert!(report.has_code(IssueCode::NotFinite));
    }

    #[test]
    fn strict_mode_fails_on_warnings() {
        let item = DatasetItem::new("0001")
            .with_annotation(Annotation::bbox(100.0, 20.0, 10.0, 200.0).with_label(0));
        let report = validate(vec![item]);
        assert!(report.clone().into_result(false).is_ok());
        match report.into_result(true) {
            Err(crate::error::AnnosetError::ValidationFailed { warning_count, .. }) => {
                assert_eq!(warning_count, 1)
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }
}
