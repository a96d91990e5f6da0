//! Native JSON format: the annotation model serialized as is.
//!
//! # Layout
//!
//! ```text
//! <root>/annotations/<subset>.json
//! <root>/images/<subset>/<id>.<ext>
//! ```
//!
//! Each annotation file holds the dataset categories and the items of one
//! subset. Every annotation variant round-trips without loss.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::common::{self, read_json, require_file, write_json};
use crate::converter::{save_item_image, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{file_stem, find_files, require_sources, Importer};
use crate::ir::{Annotation, Attributes, Categories, DatasetItem, Image};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "native";

const ANNOTATIONS_DIR: &str = "annotations";
const IMAGES_DIR: &str = "images";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct NativeFile {
    #[serde(default)]
    categories: Categories,

    #[serde(default)]
    items: Vec<NativeItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NativeItem {
    id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<NativeImage>,

    #[serde(default)]
    annotations: Vec<Annotation>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: Attributes,
}

#[derive(Debug, Serialize, Deserialize)]
struct NativeImage {
    /// Relative to `images/<subset>/`.
    path: String,

    /// `[width, height]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<[u32; 2]>,
}

// ============================================================================
// Extractor
// ============================================================================

pub struct NativeExtractor {
    categories: Categories,
    subset: String,
    items: Vec<DatasetItem>,
}

impl NativeExtractor {
    /// Reads `annotations/<subset>.json`; the subset is the file stem.
    pub fn open(path: &Path, _options: &SourceOptions) -> Result<Self> {
        require_file(path)?;
        let subset = file_stem(path)
            .ok_or_else(|| AnnosetError::unreadable(path, "annotation file has no name"))?
            .to_string();
        let file: NativeFile = read_json(path)?;

        let root = dataset_root(path);
        let images_dir = root.join(IMAGES_DIR).join(&subset);
        let items = file
            .items
            .into_iter()
            .map(|raw| native_to_item(raw, &subset, &images_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            categories: file.categories,
            subset,
            items,
        })
    }
}

fn native_to_item(raw: NativeItem, subset: &str, images_dir: &Path) -> Result<DatasetItem> {
    for ann in &raw.annotations {
        ann.kind.validate()?;
    }
    let mut item = DatasetItem::new(raw.id)
        .with_subset(subset)
        .with_annotations(raw.annotations);
    item.attributes = raw.attributes;
    if let Some(image) = raw.image {
        let mut lazy = Image::from_path(images_dir.join(&image.path));
        if let Some([width, height]) = image.size {
            lazy = lazy.with_size(width, height);
        }
        item.image = Some(lazy);
    }
    Ok(item)
}

/// `<root>` for `<root>/annotations/<subset>.json`.
fn dataset_root(annotation_file: &Path) -> PathBuf {
    annotation_file
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

impl Extractor for NativeExtractor {
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

pub struct NativeImporter;

impl Importer for NativeImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let dir = root.join(ANNOTATIONS_DIR);
        let files = if dir.is_dir() {
            find_files(&dir, &["json"], 1)?
        } else {
            Vec::new()
        };

        let sources = files
            .into_iter()
            .filter_map(|path| {
                let subset = file_stem(&path)?.to_string();
                if super::coco::split_task_stem(&subset).is_some() {
                    return None;
                }
                Some(
                    Source::new(subset.clone(), FORMAT, path)
                        .with_option(common::SUBSET_OPTION, subset),
                )
            })
            .collect();
        require_sources(FORMAT, root, sources)
    }
}

// ============================================================================
// Converter
// ============================================================================

pub struct NativeConverter;

impl Converter for NativeConverter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()> {
        let mut subsets: BTreeMap<String, Vec<NativeItem>> = BTreeMap::new();
        for item in extractor.iter() {
            let item = item?;
            let images_dir = save_dir.join(IMAGES_DIR).join(&item.subset);
            let image = match &item.image {
                Some(image) => Some(NativeImage {
                    path: save_item_image(&item, &images_dir, options, "jpg")?,
                    size: image.size().map(|(w, h)| [w, h]),
                }),
                None => None,
            };
            subsets.entry(item.subset).or_default().push(NativeItem {
                id: item.id,
                image,
                annotations: item.annotations,
                attributes: item.attributes,
            });
        }

        let categories = extractor.categories().clone();
        for (subset, items) in subsets {
            let path = save_dir
                .join(ANNOTATIONS_DIR)
                .join(format!("{subset}.json"));
            let file = NativeFile {
                categories: categories.clone(),
                items,
            };
            write_json(&path, &file)?;
            log::info!("wrote {}", path.display());
        }
        Ok(())
    }
}
