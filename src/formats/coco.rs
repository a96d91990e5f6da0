//! COCO JSON format.
//!
//! # Layout
//!
//! ```text
//! <root>/annotations/<task>_<subset>.json
//! <root>/images/<subset>/<file_name>
//! ```
//!
//! `task` is one of `instances`, `captions`, `labels` or `image_info`. The
//! importer produces one source per subset; the extractor reads every task
//! file of that subset and merges their annotations per image.
//!
//! COCO boxes are `[x, y, width, height]` in pixels. Category ids are
//! remapped to label indices in ascending id order; the writer emits
//! 1-based ids. Instance segmentation may be polygons, uncompressed RLE or
//! compressed RLE strings.
//!
//! A multi-part polygon is read as one polygon per part sharing a group.
//! Non-zero groups are written to a `group` attribute and restored from it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::common::{read_json, require_file, subset_option, write_json, SUBSET_OPTION};
use crate::converter::{save_item_image, skip_unsupported, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{file_stem, find_files, require_sources, Importer};
use crate::ir::{
    Annotation, AnnotationKind, AttrValue, Attributes, BBoxXYXY, Categories, DatasetItem, Image,
    LabelCategory, LabelCategories, Pixel, RleMask,
};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "coco";

const ANNOTATIONS_DIR: &str = "annotations";
const IMAGES_DIR: &str = "images";
/// Annotation attribute holding a non-zero `group` through a round trip.
const GROUP_ATTR: &str = "group";

/// COCO annotation file kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CocoTask {
    Instances,
    Captions,
    Labels,
    ImageInfo,
}

impl CocoTask {
    pub const ALL: [CocoTask; 4] = [
        CocoTask::Instances,
        CocoTask::Captions,
        CocoTask::Labels,
        CocoTask::ImageInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CocoTask::Instances => "instances",
            CocoTask::Captions => "captions",
            CocoTask::Labels => "labels",
            CocoTask::ImageInfo => "image_info",
        }
    }
}

/// Splits `<task>_<subset>` into its parts.
pub fn split_task_stem(stem: &str) -> Option<(CocoTask, &str)> {
    CocoTask::ALL.into_iter().find_map(|task| {
        stem.strip_prefix(task.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|subset| !subset.is_empty())
            .map(|subset| (task, subset))
    })
}

// ============================================================================
// COCO Schema Types (internal to this module)
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct CocoFile {
    #[serde(default)]
    images: Vec<CocoImage>,

    #[serde(default)]
    annotations: Vec<CocoAnnotation>,

    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supercategory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoAnnotation {
    #[serde(default)]
    id: u64,
    image_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    category_id: Option<u64>,

    /// `[x, y, width, height]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bbox: Option<[f64; 4]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    area: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    iscrowd: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    segmentation: Option<Segmentation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: Attributes,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Segmentation {
    Polygons(Vec<Vec<f64>>),
    Rle(CocoRle),
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoRle {
    counts: RleCounts,
    /// `[height, width]`
    size: [u32; 2],
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RleCounts {
    Uncompressed(Vec<u32>),
    Compressed(String),
}

impl CocoAnnotation {
    fn new(id: u64, image_id: u64) -> Self {
        Self {
            id,
            image_id,
            category_id: None,
            bbox: None,
            area: None,
            iscrowd: None,
            segmentation: None,
            caption: None,
            score: None,
            attributes: Attributes::new(),
        }
    }
}

// ============================================================================
// Extractor
// ============================================================================

pub struct CocoExtractor {
    categories: Categories,
    items: Vec<DatasetItem>,
    subset: String,
}

impl CocoExtractor {
    /// Opens a COCO source.
    ///
    /// `url` is either one task file or an `annotations/` directory, in
    /// which case every task file of the `subset` option is read.
    pub fn open(url: &Path, options: &SourceOptions) -> Result<Self> {
        let (subset, mut files) = if url.is_dir() {
            let subset = subset_option(options);
            let files = task_files(url)?
                .into_iter()
                .filter(|(_, s, _)| *s == subset)
                .map(|(task, _, path)| (task, path))
                .collect::<Vec<_>>();
            if files.is_empty() {
                return Err(AnnosetError::unreadable(
                    url,
                    format!("no COCO task files for subset '{subset}'"),
                ));
            }
            (subset, files)
        } else {
            require_file(url)?;
            let stem = file_stem(url).unwrap_or_default();
            let (task, subset) = split_task_stem(stem).ok_or_else(|| {
                AnnosetError::unreadable(url, "file name is not <task>_<subset>.json")
            })?;
            (subset.to_string(), vec![(task, url.to_path_buf())])
        };

        files.sort();
        let images_dir = dataset_root(&files[0].1).join(IMAGES_DIR).join(&subset);
        let mut reader = CocoReader::new(subset.clone(), images_dir);
        for (task, path) in &files {
            let file: CocoFile = read_json(path)?;
            reader.add(*task, file, path)?;
        }
        let (categories, items) = reader.finish();
        Ok(Self {
            categories,
            items,
            subset,
        })
    }
}

/// `<root>` for `<root>/annotations/<file>`.
fn dataset_root(annotation_file: &Path) -> PathBuf {
    annotation_file
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Task files directly inside `dir` as `(task, subset, path)`.
fn task_files(dir: &Path) -> Result<Vec<(CocoTask, String, PathBuf)>> {
    Ok(find_files(dir, &["json"], 1)?
        .into_iter()
        .filter_map(|path| {
            let (task, subset) = split_task_stem(file_stem(&path)?)?;
            let subset = subset.to_string();
            Some((task, subset, path))
        })
        .collect())
}

/// Accumulates task files of one subset into items.
struct CocoReader {
    subset: String,
    images_dir: PathBuf,
    categories: Categories,
    /// COCO category id to label index.
    label_ids: HashMap<u64, usize>,
    items: Vec<DatasetItem>,
    /// COCO image id to position in `items`.
    image_ids: HashMap<u64, usize>,
}

impl CocoReader {
    fn new(subset: String, images_dir: PathBuf) -> Self {
        Self {
            subset,
            images_dir,
            categories: Categories::default(),
            label_ids: HashMap::new(),
            items: Vec::new(),
            image_ids: HashMap::new(),
        }
    }

    fn add(&mut self, task: CocoTask, file: CocoFile, path: &Path) -> Result<()> {
        if self.categories.labels.is_empty() && !file.categories.is_empty() {
            let mut sorted = file.categories;
            sorted.sort_by_key(|cat| cat.id);
            let mut labels = LabelCategories::new();
            for cat in sorted {
                let mut category = LabelCategory::new(cat.name);
                category.parent = cat.supercategory.filter(|s| !s.is_empty());
                let index = labels.add_category(category)?;
                self.label_ids.insert(cat.id, index);
            }
            self.categories.labels = labels;
        }

        for img in file.images {
            if self.image_ids.contains_key(&img.id) {
                continue;
            }
            let id = Path::new(&img.file_name)
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");
            let mut image = Image::from_path(self.images_dir.join(&img.file_name));
            if img.width > 0 && img.height > 0 {
                image = image.with_size(img.width, img.height);
            }
            let image_id = i64::try_from(img.id).map_err(|_| {
                AnnosetError::unreadable(path, format!("image id {} is out of range", img.id))
            })?;
            let item = DatasetItem::new(id)
                .with_subset(self.subset.clone())
                .with_image(image)
                .with_attribute("id", image_id);
            self.image_ids.insert(img.id, self.items.len());
            self.items.push(item);
        }

        for ann in file.annotations {
            let pos = *self.image_ids.get(&ann.image_id).ok_or_else(|| {
                AnnosetError::unreadable(
                    path,
                    format!("annotation {} refers to unknown image {}", ann.id, ann.image_id),
                )
            })?;
            let parsed = self.parse_annotation(task, ann, path)?;
            self.items[pos].annotations.extend(parsed);
        }
        Ok(())
    }

    fn label_of(&self, ann: &CocoAnnotation, path: &Path) -> Result<Option<usize>> {
        ann.category_id
            .map(|cat_id| {
                self.label_ids.get(&cat_id).copied().ok_or_else(|| {
                    AnnosetError::unreadable(
                        path,
                        format!("annotation {} has unknown category {cat_id}", ann.id),
                    )
                })
            })
            .transpose()
    }

    fn parse_annotation(
        &self,
        task: CocoTask,
        ann: CocoAnnotation,
        path: &Path,
    ) -> Result<Vec<Annotation>> {
        let label = self.label_of(&ann, path)?;
        let mut attributes = ann.attributes.clone();
        if let Some(score) = ann.score {
            attributes.insert("score".to_string(), AttrValue::Float(score));
        }
        let stored_group = match attributes.get(GROUP_ATTR) {
            Some(AttrValue::Int(group)) => u64::try_from(*group).ok(),
            _ => None,
        };
        if stored_group.is_some() {
            attributes.remove(GROUP_ATTR);
        }
        let finish = |kind: AnnotationKind, group: u64| {
            let group = stored_group.unwrap_or(group);
            let mut out = Annotation::new(kind).with_id(ann.id).with_group(group);
            out.label = label;
            out.attributes = attributes.clone();
            out
        };

        match task {
            CocoTask::Instances => {
                match ann.segmentation {
                    Some(Segmentation::Polygons(polygons))
                        if polygons.iter().any(|p| !p.is_empty()) =>
                    {
                        let group = if polygons.len() > 1 { ann.id } else { 0 };
                        polygons
                            .into_iter()
                            .filter(|p| !p.is_empty())
                            .map(|points| -> Result<Annotation> {
                                let kind = AnnotationKind::Polygon { points };
                                kind.validate()?;
                                Ok(finish(kind, group))
                            })
                            .collect()
                    }
                    Some(Segmentation::Rle(rle)) => {
                        let [height, width] = rle.size;
                        let mask = match rle.counts {
                            RleCounts::Uncompressed(counts) => RleMask::new(height, width, counts)?,
                            RleCounts::Compressed(counts) => {
                                RleMask::from_coco_string(&counts, height, width)?
                            }
                        };
                        Ok(vec![finish(AnnotationKind::Mask { rle: mask }, 0)])
                    }
                    _ => {
                        let [x, y, w, h] = ann.bbox.ok_or_else(|| {
                            AnnosetError::MalformedAnnotation(format!(
                                "COCO annotation {} has neither bbox nor segmentation",
                                ann.id
                            ))
                        })?;
                        let bbox = BBoxXYXY::<Pixel>::from_xywh(x, y, w, h);
                        Ok(vec![finish(AnnotationKind::Bbox { bbox }, 0)])
                    }
                }
            }
            CocoTask::Captions => {
                let text = ann.caption.clone().ok_or_else(|| {
                    AnnosetError::MalformedAnnotation(format!(
                        "COCO caption annotation {} has no caption",
                        ann.id
                    ))
                })?;
                Ok(vec![finish(AnnotationKind::Caption { text }, 0)])
            }
            CocoTask::Labels => Ok(vec![finish(AnnotationKind::Label, 0)]),
            CocoTask::ImageInfo => Ok(Vec::new()),
        }
    }

    fn finish(self) -> (Categories, Vec<DatasetItem>) {
        (self.categories, self.items)
    }
}

impl Extractor for CocoExtractor {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(self.items.iter().cloned().map(Ok))
    }

    fn subsets(&self) -> Option<std::collections::BTreeSet<String>> {
        Some([self.subset.clone()].into())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

// ============================================================================
// Importer
// ============================================================================

pub struct CocoImporter;

impl Importer for CocoImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    /// Probes `annotations/` directories up to two levels below `root`.
    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let mut dirs = Vec::new();
        for entry in walkdir::WalkDir::new(root)
            .follow_links(true)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| {
                AnnosetError::unreadable(
                    root,
                    format!("failed while traversing directory: {source}"),
                )
            })?;
            if entry.file_type().is_dir() && entry.file_name() == ANNOTATIONS_DIR {
                dirs.push(entry.into_path());
            }
        }

        let mut by_task: BTreeMap<(CocoTask, String), Vec<PathBuf>> = BTreeMap::new();
        for dir in &dirs {
            for (task, subset, path) in task_files(dir)? {
                by_task.entry((task, subset)).or_default().push(path);
            }
        }

        let mut by_subset: BTreeMap<String, PathBuf> = BTreeMap::new();
        for ((_, subset), mut paths) in by_task {
            if paths.len() > 1 {
                paths.sort();
                return Err(AnnosetError::AmbiguousDataset {
                    subset,
                    candidates: paths,
                });
            }
            let Some(path) = paths.pop() else { continue };
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            match by_subset.get(&subset) {
                Some(existing) if *existing != dir => {
                    let mut candidates = vec![existing.clone(), dir];
                    candidates.sort();
                    return Err(AnnosetError::AmbiguousDataset { subset, candidates });
                }
                _ => {
                    by_subset.insert(subset, dir);
                }
            }
        }

        let sources = by_subset
            .into_iter()
            .map(|(subset, dir)| {
                Source::new(subset.clone(), FORMAT, dir).with_option(SUBSET_OPTION, subset)
            })
            .collect();
        require_sources(FORMAT, root, sources)
    }
}

// ============================================================================
// Converter
// ============================================================================

pub struct CocoConverter;

#[derive(Default)]
struct SubsetFiles {
    images: Vec<CocoImage>,
    instances: Vec<CocoAnnotation>,
    captions: Vec<CocoAnnotation>,
    labels: Vec<CocoAnnotation>,
}

impl Converter for CocoConverter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()> {
        let items = extractor.collect_items()?;
        let categories = coco_categories(&extractor.categories().labels);

        let mut next_image_id = items
            .iter()
            .filter_map(|item| item.attributes.get("id").and_then(AttrValue::as_i64))
            .filter(|id| *id > 0)
            .max()
            .unwrap_or(0) as u64;
        let mut next_ann_id = items
            .iter()
            .flat_map(|item| item.annotations.iter().filter_map(|ann| ann.id))
            .max()
            .unwrap_or(0);

        let mut subsets: BTreeMap<String, SubsetFiles> = BTreeMap::new();
        for item in &items {
            let files = subsets.entry(item.subset.clone()).or_default();

            let image_id = match item.attributes.get("id").and_then(AttrValue::as_i64) {
                Some(id) if id > 0 => id as u64,
                _ => {
                    next_image_id += 1;
                    next_image_id
                }
            };
            let images_dir = save_dir.join(IMAGES_DIR).join(&item.subset);
            let file_name = save_item_image(item, &images_dir, options, "jpg")?;
            let (width, height) = match &item.image {
                Some(image) => image.read_size()?.unwrap_or((0, 0)),
                None => (0, 0),
            };
            files.images.push(CocoImage {
                id: image_id,
                width,
                height,
                file_name,
            });

            write_annotations(item, image_id, &mut next_ann_id, files);
        }

        let ann_dir = save_dir.join(ANNOTATIONS_DIR);
        for (subset, files) in subsets {
            let SubsetFiles {
                images,
                instances,
                captions,
                labels,
            } = files;

            let outputs = [
                (CocoTask::Instances, instances, true),
                (CocoTask::Captions, captions, false),
                (CocoTask::Labels, labels, false),
            ];
            for (task, annotations, always) in outputs {
                if annotations.is_empty() && !always {
                    continue;
                }
                let path = ann_dir.join(format!("{}_{subset}.json", task.as_str()));
                let file = CocoFile {
                    images: images.clone(),
                    annotations,
                    categories: categories.clone(),
                };
                write_json(&path, &file)?;
                log::info!("wrote {}", path.display());
            }
        }
        Ok(())
    }
}

fn coco_categories(labels: &LabelCategories) -> Vec<CocoCategory> {
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| CocoCategory {
            id: index as u64 + 1,
            name: label.name.clone(),
            supercategory: label.parent.clone(),
        })
        .collect()
}

fn write_annotations(
    item: &DatasetItem,
    image_id: u64,
    next_id: &mut u64,
    files: &mut SubsetFiles,
) {
    let mut take_id = |ann: &Annotation| {
        ann.id.unwrap_or_else(|| {
            *next_id += 1;
            *next_id
        })
    };
    // Polygons sharing a non-zero group become one multi-part annotation.
    let mut grouped_polygons: BTreeMap<u64, usize> = BTreeMap::new();

    for ann in &item.annotations {
        let mut attributes = ann.attributes.clone();
        let score = match attributes.remove("score") {
            Some(AttrValue::Float(score)) => Some(score),
            Some(AttrValue::Int(score)) => Some(score as f64),
            Some(other) => {
                attributes.insert("score".to_string(), other);
                None
            }
            None => None,
        };
        if ann.group != 0 {
            match i64::try_from(ann.group) {
                Ok(group) => {
                    attributes.insert(GROUP_ATTR.to_string(), AttrValue::Int(group));
                }
                Err(_) => log::debug!("coco: group {} of item {} not kept", ann.group, item.id),
            }
        }
        let category_id = ann.label.map(|label| label as u64 + 1);

        match &ann.kind {
            AnnotationKind::Bbox { bbox } => {
                let mut out = CocoAnnotation::new(take_id(ann), image_id);
                let (x, y, w, h) = bbox.to_xywh();
                out.category_id = category_id;
                out.bbox = Some([x, y, w, h]);
                out.area = Some(w * h);
                out.iscrowd = Some(0);
                out.segmentation = Some(Segmentation::Polygons(Vec::new()));
                out.score = score;
                out.attributes = attributes;
                files.instances.push(out);
            }
            AnnotationKind::Polygon { points } => {
                if ann.group != 0 {
                    if let Some(&pos) = grouped_polygons.get(&ann.group) {
                        let existing = &mut files.instances[pos];
                        if let Some(Segmentation::Polygons(parts)) = &mut existing.segmentation {
                            parts.push(points.clone());
                            let all: Vec<f64> = parts.iter().flatten().copied().collect();
                            existing.bbox = BBoxXYXY::<Pixel>::from_points(&all).map(|b| {
                                let (x, y, w, h) = b.to_xywh();
                                [x, y, w, h]
                            });
                            existing.area = Some(parts.iter().map(|p| polygon_area(p)).sum());
                        }
                        continue;
                    }
                }
                let mut out = CocoAnnotation::new(take_id(ann), image_id);
                out.category_id = category_id;
                out.bbox = BBoxXYXY::<Pixel>::from_points(points).map(|b| {
                    let (x, y, w, h) = b.to_xywh();
                    [x, y, w, h]
                });
                out.area = Some(polygon_area(points));
                out.iscrowd = Some(0);
                out.segmentation = Some(Segmentation::Polygons(vec![points.clone()]));
                out.score = score;
                out.attributes = attributes;
                if ann.group != 0 {
                    grouped_polygons.insert(ann.group, files.instances.len());
                }
                files.instances.push(out);
            }
            AnnotationKind::Mask { rle } => {
                let mut out = CocoAnnotation::new(take_id(ann), image_id);
                out.category_id = category_id;
                out.bbox = rle.bbox().map(|b| {
                    let (x, y, w, h) = b.to_xywh();
                    [x, y, w, h]
                });
                out.area = Some(rle.area() as f64);
                out.iscrowd = Some(1);
                out.segmentation = Some(Segmentation::Rle(CocoRle {
                    counts: RleCounts::Uncompressed(rle.counts.clone()),
                    size: [rle.height, rle.width],
                }));
                out.score = score;
                out.attributes = attributes;
                files.instances.push(out);
            }
            AnnotationKind::Caption { text } => {
                let mut out = CocoAnnotation::new(take_id(ann), image_id);
                out.caption = Some(text.clone());
                out.score = score;
                out.attributes = attributes;
                files.captions.push(out);
            }
            AnnotationKind::Label if category_id.is_some() => {
                let mut out = CocoAnnotation::new(take_id(ann), image_id);
                out.category_id = category_id;
                out.score = score;
                out.attributes = attributes;
                files.labels.push(out);
            }
            _ => skip_unsupported(FORMAT, item, ann),
        }
    }
}

/// Shoelace area of a flat `x1, y1, x2, y2, ...` polygon.
fn polygon_area(points: &[f64]) -> f64 {
    let n = points.len() / 2;
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[2 * i] * points[2 * j + 1] - points[2 * j] * points[2 * i + 1];
    }
    twice.abs() / 2.0
}

/// Parses a COCO instances document; used by fuzzing and benches.
#[doc(hidden)]
pub fn parse_instances_slice(bytes: &[u8]) -> Result<usize> {
    let file: CocoFile = serde_json::from_slice(bytes).map_err(|source| AnnosetError::Json {
        path: PathBuf::from("<memory>"),
        source,
    })?;
    let mut reader = CocoReader::new("default".to_string(), PathBuf::new());
    reader.add(CocoTask::Instances, file, Path::new("<memory>"))?;
    let (_, items) = reader.finish();
    Ok(items.iter().map(|item| item.annotations.len()).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_stems() {
        assert_eq!(
            split_task_stem("instances_train"),
            Some((CocoTask::Instances, "train"))
        );
        assert_eq!(
            split_task_stem("image_info_test-dev"),
            Some((CocoTask::ImageInfo, "test-dev"))
        );
        assert_eq!(split_task_stem("instances_"), None);
        assert_eq!(split_task_stem("train"), None);
    }

    #[test]
    fn categories_are_remapped_in_ascending_id_order() {
        let json = r#"{
            "images": [{"id": 7, "width": 10, "height": 10, "file_name": "a.jpg"}],
            "categories": [{"id": 9, "name": "dog"}, {"id": 3, "name": "cat"}],
            "annotations": [
                {"id": 1, "image_id": 7, "category_id": 9, "bbox": [1, 2, 3, 4]},
                {"id": 2, "image_id": 7, "category_id": 3,
                 "segmentation": [[0, 0, 4, 0, 4, 4]], "bbox": [0, 0, 4, 4]}
            ]
        }"#;
        let file: CocoFile = serde_json::from_str(json).expect("parse");
        let mut reader = CocoReader::new("train".into(), PathBuf::from("images/train"));
        reader
            .add(CocoTask::Instances, file, Path::new("x.json"))
            .expect("add");
        let (categories, items) = reader.finish();

        assert_eq!(categories.labels.index_of("cat"), Some(0));
        assert_eq!(categories.labels.index_of("dog"), Some(1));
        let anns = &items[0].annotations;
        assert_eq!(anns[0].label, Some(1));
        assert_eq!(
            anns[0].bounding_box().map(|b| b.coords()),
            Some([1.0, 2.0, 4.0, 6.0])
        );
        assert_eq!(anns[1].label, Some(0));
        assert_eq!(anns[1].annotation_type(), crate::ir::AnnotationType::Polygon);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].attributes.get("id"), Some(&AttrValue::Int(7)));
    }

    #[test]
    fn compressed_rle_segmentation() {
        let rle = RleMask::new(3, 4, vec![3, 2, 1, 2, 4]).expect("rle");
        let json = format!(
            r#"{{"images": [{{"id": 1, "width": 4, "height": 3, "file_name": "m.png"}}],
                "categories": [{{"id": 1, "name": "blob"}}],
                "annotations": [{{"id": 5, "image_id": 1, "category_id": 1, "iscrowd": 1,
                    "segmentation": {{"counts": "{}", "size": [3, 4]}}}}]}}"#,
            rle.to_coco_string()
        );
        let file: CocoFile = serde_json::from_str(&json).expect("parse");
        let mut reader = CocoReader::new("default".into(), PathBuf::new());
        reader
            .add(CocoTask::Instances, file, Path::new("x.json"))
            .expect("add");
        let (_, items) = reader.finish();
        assert_eq!(items[0].annotations[0].kind, AnnotationKind::Mask { rle });
    }

    #[test]
    fn unknown_category_is_unreadable() {
        let json = r#"{"images": [{"id": 1, "file_name": "a.jpg"}],
            "annotations": [{"id": 1, "image_id": 1, "category_id": 4, "bbox": [0, 0, 1, 1]}]}"#;
        let file: CocoFile = serde_json::from_str(json).expect("parse");
        let mut reader = CocoReader::new("default".into(), PathBuf::new());
        assert!(matches!(
            reader.add(CocoTask::Instances, file, Path::new("x.json")),
            Err(AnnosetError::UnreadableSource { .. })
        ));
    }

    #[test]
    fn groups_survive_a_roundtrip() {
        use crate::extractor::ItemList;

        let labels = LabelCategories::from_names(["a"]).unwrap();
        let square = |x: f64| vec![x, 0.0, x + 2.0, 0.0, x + 2.0, 2.0, x, 2.0];
        let item = DatasetItem::new("img")
            .with_annotation(
                Annotation::bbox(1.0, 1.0, 5.0, 5.0)
                    .with_label(0)
                    .with_group(4),
            )
            .with_annotation(Annotation::polygon(square(0.0)).unwrap().with_label(0))
            .with_annotation(
                Annotation::polygon(square(10.0))
                    .unwrap()
                    .with_label(0)
                    .with_group(9),
            )
            .with_annotation(
                Annotation::polygon(square(20.0))
                    .unwrap()
                    .with_label(0)
                    .with_group(9),
            );
        let source = ItemList::new(Categories::from_labels(labels), vec![item]);

        let temp = tempfile::tempdir().expect("create temp dir");
        CocoConverter
            .convert(&source, temp.path(), &ConvertOptions::default())
            .expect("convert");
        let sources = CocoImporter.detect(temp.path()).expect("detect");
        let back = CocoExtractor::open(&sources[0].url, &sources[0].options).expect("reopen");
        let items = back.collect_items().expect("items");

        let groups: Vec<u64> = items[0].annotations.iter().map(|ann| ann.group).collect();
        assert_eq!(groups, vec![4, 0, 9, 9]);
        assert!(items[0]
            .annotations
            .iter()
            .all(|ann| !ann.attributes.contains_key(GROUP_ATTR)));
    }

    #[test]
    fn polygon_area_of_square() {
        assert_eq!(polygon_area(&[0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0]), 4.0);
    }
}
