//! YOLO (Darknet) format.
//!
//! # Layout
//!
//! ```text
//! <root>/obj.data                 classes, names, and one list per subset
//! <root>/obj.names                one class name per line
//! <root>/train.txt                image paths, relative to <root>
//! <root>/obj_train_data/<id>.jpg
//! <root>/obj_train_data/<id>.txt  one `class cx cy w h` row per box
//! ```
//!
//! Rows are normalized to the image size, so reading a box needs the
//! dimensions of its image (taken from the file header).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::common::{id_from_path, subset_option, SUBSET_OPTION};
use crate::converter::{save_item_image, skip_unsupported, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{find_files, require_sources, unique_per_subset, Importer};
use crate::ir::{
    Annotation, AnnotationKind, BBoxXYXY, Categories, DatasetItem, Image, LabelCategories,
    Normalized, Pixel,
};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "yolo";

const MANIFEST_FILE: &str = "obj.data";
const NAMES_FILE: &str = "obj.names";
const LABEL_EXTENSION: &str = "txt";

/// Manifest keys that do not name a subset.
const RESERVED_KEYS: [&str; 3] = ["classes", "names", "backup"];

/// Darknet paths are often written relative to the darknet checkout,
/// which keeps datasets under `data/`.
const DARKNET_PREFIX: &str = "data/";

fn subset_dir_name(subset: &str) -> String {
    format!("obj_{subset}_data")
}

// ============================================================================
// Manifest
// ============================================================================

/// A parsed `*.data` manifest.
#[derive(Debug, Default, PartialEq)]
pub struct Manifest {
    pub classes: Option<usize>,
    pub names: Option<String>,
    /// subset name -> image list path
    pub subsets: BTreeMap<String, String>,
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|err| AnnosetError::unreadable(path, err.to_string()))?;
        Self::parse(&data, path)
    }

    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        let mut manifest = Manifest::default();
        for (idx, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                AnnosetError::unreadable(
                    path,
                    format!("line {}: expected 'key = value'", idx + 1),
                )
            })?;
            let (key, value) = (key.trim(), value.trim().to_string());
            match key {
                "classes" => {
                    let classes = value.parse::<usize>().map_err(|_| {
                        AnnosetError::unreadable(
                            path,
                            format!("line {}: invalid classes '{value}'", idx + 1),
                        )
                    })?;
                    manifest.classes = Some(classes);
                }
                "names" => manifest.names = Some(value),
                _ if RESERVED_KEYS.contains(&key) => {}
                _ => {
                    manifest.subsets.insert(key.to_string(), value);
                }
            }
        }
        Ok(manifest)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(classes) = self.classes {
            writeln!(out, "classes = {classes}").expect("write to string");
        }
        if let Some(names) = &self.names {
            writeln!(out, "names = {names}").expect("write to string");
        }
        for (subset, list) in &self.subsets {
            writeln!(out, "{subset} = {list}").expect("write to string");
        }
        writeln!(out, "backup = backup/").expect("write to string");
        out
    }
}

/// Resolves a manifest path against the dataset root, accepting the
/// `data/` prefix darknet configs usually carry.
fn resolve(root: &Path, raw: &str) -> PathBuf {
    let direct = root.join(raw);
    if direct.exists() {
        return direct;
    }
    match raw.strip_prefix(DARKNET_PREFIX) {
        Some(stripped) if root.join(stripped).exists() => root.join(stripped),
        _ => direct,
    }
}

fn read_names(path: &Path) -> Result<LabelCategories> {
    let data =
        fs::read_to_string(path).map_err(|err| AnnosetError::unreadable(path, err.to_string()))?;
    LabelCategories::from_names(
        data.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty()),
    )
}

// ============================================================================
// Label rows
// ============================================================================

/// One `class cx cy w h` row, normalized to the image size.
#[derive(Clone, Debug, PartialEq)]
pub struct YoloRow {
    pub class_id: usize,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl YoloRow {
    pub fn from_bbox(class_id: usize, bbox: &BBoxXYXY<Normalized>) -> Self {
        let (cx, cy, w, h) = bbox.to_cxcywh();
        Self {
            class_id,
            cx,
            cy,
            w,
            h,
        }
    }

    pub fn to_bbox(&self) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_cxcywh(self.cx, self.cy, self.w, self.h)
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.cx, self.cy, self.w, self.h
        )
    }
}

/// Parses one label row; blank lines yield `None`.
pub fn parse_label_line(line: &str, path: &Path, line_num: usize) -> Result<Option<YoloRow>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Take at most 6 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();
    if tokens.len() != 5 {
        return Err(AnnosetError::unreadable(
            path,
            format!("line {line_num}: expected 5 tokens, found {}", tokens.len()),
        ));
    }

    let class_id = tokens[0].parse::<usize>().map_err(|_| {
        AnnosetError::unreadable(
            path,
            format!(
                "line {line_num}: invalid class_id '{}'; expected non-negative integer",
                tokens[0]
            ),
        )
    })?;

    Ok(Some(YoloRow {
        class_id,
        cx: parse_f64_token(tokens[1], "x_center", path, line_num)?,
        cy: parse_f64_token(tokens[2], "y_center", path, line_num)?,
        w: parse_f64_token(tokens[3], "width", path, line_num)?,
        h: parse_f64_token(tokens[4], "height", path, line_num)?,
    }))
}

fn parse_f64_token(raw: &str, field_name: &str, path: &Path, line_num: usize) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| {
        AnnosetError::unreadable(
            path,
            format!("line {line_num}: invalid {field_name} '{raw}'; expected floating-point number"),
        )
    })
}

/// Parses a single label row; used by fuzzing and benches.
#[doc(hidden)]
pub fn parse_yolo_line(input: &str) -> Result<bool> {
    Ok(parse_label_line(input, Path::new("<memory>"), 1)?.is_some())
}

// ============================================================================
// Extractor
// ============================================================================

pub struct YoloExtractor {
    root: PathBuf,
    subset: String,
    images: Vec<PathBuf>,
    classes: usize,
    categories: Categories,
}

impl YoloExtractor {
    /// Opens one subset of a manifest; the subset comes from the `subset`
    /// option.
    pub fn open(manifest_path: &Path, options: &SourceOptions) -> Result<Self> {
        let manifest = Manifest::read(manifest_path)?;
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let subset = subset_option(options);

        let names_path = resolve(&root, manifest.names.as_deref().unwrap_or(NAMES_FILE));
        let labels = read_names(&names_path)?;
        let classes = manifest.classes.unwrap_or(labels.len());
        if labels.len() < classes {
            return Err(AnnosetError::unreadable(
                &names_path,
                format!("declares {} names for {classes} classes", labels.len()),
            ));
        }

        let list = manifest.subsets.get(&subset).ok_or_else(|| {
            AnnosetError::unreadable(
                manifest_path,
                format!("manifest has no list for subset '{subset}'"),
            )
        })?;
        let list_path = resolve(&root, list);
        let images = fs::read_to_string(&list_path)
            .map_err(|err| AnnosetError::unreadable(&list_path, err.to_string()))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| resolve(&root, line))
            .collect();

        Ok(Self {
            root,
            subset,
            images,
            classes,
            categories: Categories::from_labels(labels),
        })
    }

    fn load_item(&self, image_path: &Path) -> Result<DatasetItem> {
        let subset_dir = self.root.join(subset_dir_name(&self.subset));
        let id = if image_path.starts_with(&subset_dir) {
            id_from_path(&subset_dir, image_path)
        } else {
            id_from_path(
                image_path.parent().unwrap_or(Path::new("")),
                image_path,
            )
        };

        let image = Image::from_path(image_path);
        let mut item = DatasetItem::new(id).with_subset(self.subset.clone());

        let label_path = image_path.with_extension(LABEL_EXTENSION);
        if label_path.is_file() {
            let data = fs::read_to_string(&label_path)?;
            let mut size = None;
            for (idx, line) in data.lines().enumerate() {
                let Some(row) = parse_label_line(line, &label_path, idx + 1)? else {
                    continue;
                };
                if row.class_id >= self.classes {
                    return Err(AnnosetError::unreadable(
                        &label_path,
                        format!(
                            "line {}: class {} is out of range for {} classes",
                            idx + 1,
                            row.class_id,
                            self.classes
                        ),
                    ));
                }
                let (width, height) = match size {
                    Some(size) => size,
                    None => {
                        let read = image.read_size()?.ok_or_else(|| {
                            AnnosetError::unreadable(
                                image_path,
                                "image is needed to denormalize its boxes",
                            )
                        })?;
                        *size.insert(read)
                    }
                };
                let bbox = row.to_bbox().to_pixel(f64::from(width), f64::from(height));
                item.annotations
                    .push(Annotation::new(AnnotationKind::Bbox { bbox }).with_label(row.class_id));
            }
            if let Some((width, height)) = size {
                item.image = Some(image.with_size(width, height));
                return Ok(item);
            }
        }
        item.image = Some(image);
        Ok(item)
    }
}

impl Extractor for YoloExtractor {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(self.images.iter().map(move |path| self.load_item(path)))
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        Some([self.subset.clone()].into())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

// ============================================================================
// Importer
// ============================================================================

pub struct YoloImporter;

impl Importer for YoloImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let mut candidates = Vec::new();
        for manifest_path in find_files(root, &["data"], 1)? {
            let manifest = match Manifest::read(&manifest_path) {
                Ok(manifest) => manifest,
                Err(err) => {
                    log::debug!("yolo: ignoring {}: {err}", manifest_path.display());
                    continue;
                }
            };
            for subset in manifest.subsets.into_keys() {
                candidates.push((subset, manifest_path.clone()));
            }
        }

        let sources = unique_per_subset(candidates)?
            .into_iter()
            .map(|(subset, manifest_path)| {
                Source::new(subset.clone(), FORMAT, manifest_path)
                    .with_option(SUBSET_OPTION, subset)
            })
            .collect();
        require_sources(FORMAT, root, sources)
    }
}

// ============================================================================
// Converter
// ============================================================================

pub struct YoloConverter;

impl Converter for YoloConverter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()> {
        fs::create_dir_all(save_dir)?;
        let labels = &extractor.categories().labels;

        let mut lists: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in extractor.iter() {
            let item = item?;
            let dir_name = subset_dir_name(&item.subset);
            let subset_dir = save_dir.join(&dir_name);
            let image_name = save_item_image(&item, &subset_dir, options, "jpg")?;

            let rows = item_rows(&item)?;
            let label_path = subset_dir.join(format!("{}.{LABEL_EXTENSION}", item.id));
            if let Some(parent) = label_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut body = String::new();
            for row in rows {
                writeln!(body, "{}", row.to_line()).expect("write to string");
            }
            fs::write(&label_path, body)?;

            lists
                .entry(item.subset)
                .or_default()
                .push(format!("{dir_name}/{image_name}"));
        }

        let mut names = String::new();
        for label in labels.iter() {
            writeln!(names, "{}", label.name).expect("write to string");
        }
        fs::write(save_dir.join(NAMES_FILE), names)?;

        let mut manifest = Manifest {
            classes: Some(labels.len()),
            names: Some(NAMES_FILE.to_string()),
            subsets: BTreeMap::new(),
        };
        for (subset, images) in &lists {
            let list_name = format!("{subset}.txt");
            let mut body = images.join("\n");
            body.push('\n');
            fs::write(save_dir.join(&list_name), body)?;
            manifest.subsets.insert(subset.clone(), list_name);
        }
        fs::write(save_dir.join(MANIFEST_FILE), manifest.render())?;
        log::info!(
            "wrote {} YOLO subset(s) to {}",
            lists.len(),
            save_dir.display()
        );
        Ok(())
    }
}

/// Normalized rows for the labeled boxes of an item.
fn item_rows(item: &DatasetItem) -> Result<Vec<YoloRow>> {
    let boxes: Vec<(usize, &BBoxXYXY<Pixel>)> = item
        .annotations
        .iter()
        .filter_map(|ann| match (&ann.kind, ann.label) {
            (AnnotationKind::Bbox { bbox }, Some(label)) => Some((label, bbox)),
            _ => {
                skip_unsupported(FORMAT, item, ann);
                None
            }
        })
        .collect();
    if boxes.is_empty() {
        return Ok(Vec::new());
    }

    let image = item.image.as_ref().ok_or_else(|| AnnosetError::MissingImage {
        subset: item.subset.clone(),
        id: item.id.clone(),
    })?;
    let (width, height) = image.read_size()?.ok_or_else(|| AnnosetError::MissingImage {
        subset: item.subset.clone(),
        id: item.id.clone(),
    })?;
    Ok(boxes
        .into_iter()
        .map(|(label, bbox)| {
            YoloRow::from_bbox(label, &bbox.to_normalized(f64::from(width), f64::from(height)))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_label_line_accepts_valid_rows() {
        let row = parse_label_line("3 0.5 0.25 0.1 0.2", Path::new("a.txt"), 1)
            .expect("parse")
            .expect("row");
        assert_eq!(
            row,
            YoloRow {
                class_id: 3,
                cx: 0.5,
                cy: 0.25,
                w: 0.1,
                h: 0.2
            }
        );
    }

    #[test]
    fn parse_label_line_skips_empty_rows() {
        assert!(parse_label_line("   ", Path::new("a.txt"), 1)
            .expect("parse")
            .is_none());
    }

    #[test]
    fn parse_label_line_requires_exactly_five_tokens() {
        for line in ["0 0.5 0.5 0.1", "0 0.5 0.5 0.1 0.1 0.9"] {
            let err = parse_label_line(line, Path::new("a.txt"), 7).unwrap_err();
            match err {
                AnnosetError::UnreadableSource { message, .. } => {
                    assert!(message.starts_with("line 7"), "{message}")
                }
                other => panic!("expected UnreadableSource, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_label_line_rejects_negative_class() {
        assert!(parse_label_line("-1 0.5 0.5 0.1 0.1", Path::new("a.txt"), 1).is_err());
    }

    #[test]
    fn manifest_collects_subset_lists() {
        let manifest = Manifest::parse(
            "classes = 2\nnames = data/obj.names\ntrain = data/train.txt\nvalid = data/valid.txt\nbackup = backup/\n",
            Path::new("obj.data"),
        )
        .expect("parse");
        assert_eq!(manifest.classes, Some(2));
        assert_eq!(manifest.names.as_deref(), Some("data/obj.names"));
        let subsets: Vec<_> = manifest.subsets.keys().map(String::as_str).collect();
        assert_eq!(subsets, vec!["train", "valid"]);
    }

    #[test]
    fn resolve_strips_darknet_prefix() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("obj.names"), "cat\n").expect("write");
        assert_eq!(
            resolve(temp.path(), "data/obj.names"),
            temp.path().join("obj.names")
        );
    }

    #[test]
    fn two_manifests_claiming_one_subset_are_ambiguous() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("a.data"), "classes = 1\ntrain = train.txt\n").expect("write");
        fs::write(temp.path().join("b.data"), "classes = 1\ntrain = other.txt\n").expect("write");

        match YoloImporter.detect(temp.path()).unwrap_err() {
            AnnosetError::AmbiguousDataset { subset, candidates } => {
                assert_eq!(subset, "train");
                assert_eq!(
                    candidates,
                    vec![temp.path().join("a.data"), temp.path().join("b.data")]
                );
            }
            other => panic!("expected AmbiguousDataset, got {other:?}"),
        }
    }
}
