//! A plain directory of images, without annotations.
//!
//! Every image file below the root becomes an item whose id is its relative
//! path without the extension.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::common::{id_from_path, subset_option, IMAGE_EXTENSIONS, SUBSET_OPTION};
use crate::converter::{save_image, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{find_files, require_sources, Importer};
use crate::ir::{Categories, DatasetItem, Image, DEFAULT_SUBSET};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "image_dir";

pub struct ImageDirExtractor {
    root: PathBuf,
    subset: String,
    files: Vec<PathBuf>,
    categories: Categories,
}

impl ImageDirExtractor {
    pub fn open(root: &Path, options: &SourceOptions) -> Result<Self> {
        if !root.is_dir() {
            return Err(AnnosetError::unreadable(root, "directory does not exist"));
        }
        Ok(Self {
            root: root.to_path_buf(),
            subset: subset_option(options),
            files: find_files(root, IMAGE_EXTENSIONS, usize::MAX)?,
            categories: Categories::default(),
        })
    }
}

impl Extractor for ImageDirExtractor {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(self.files.iter().map(move |path| {
            Ok(DatasetItem::new(id_from_path(&self.root, path))
                .with_subset(self.subset.clone())
                .with_image(Image::from_path(path)))
        }))
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        Some([self.subset.clone()].into())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

pub struct ImageDirImporter;

impl Importer for ImageDirImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let mut sources = Vec::new();
        if root.is_dir() && !find_files(root, IMAGE_EXTENSIONS, usize::MAX)?.is_empty() {
            sources.push(
                Source::new(DEFAULT_SUBSET, FORMAT, root)
                    .with_option(SUBSET_OPTION, DEFAULT_SUBSET),
            );
        }
        require_sources(FORMAT, root, sources)
    }
}

/// Writes `<save_dir>/<id>.<ext>` for every item with an image.
///
/// Images are always written; there is nothing else to export.
pub struct ImageDirConverter;

impl Converter for ImageDirConverter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()> {
        let mut written = 0usize;
        for item in extractor.iter() {
            let item = item?;
            let Some(image) = &item.image else {
                log::debug!("image_dir: item '{}' has no image", item.id);
                continue;
            };
            let ext = options.image_ext_for(Some(image), "jpg");
            if save_image(image, &save_dir.join(format!("{}.{ext}", item.id)))? {
                written += 1;
            }
        }
        log::info!("wrote {written} image(s) to {}", save_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn ids_are_relative_paths_without_extension() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("a")).expect("mkdir");
        fs::write(temp.path().join("a/x.jpg"), b"jpg").expect("write");
        fs::write(temp.path().join("b.png"), b"png").expect("write");
        fs::write(temp.path().join("notes.txt"), b"txt").expect("write");

        let sources = ImageDirImporter.detect(temp.path()).expect("detect");
        let extractor =
            ImageDirExtractor::open(&sources[0].url, &sources[0].options).expect("open");
        let ids: Vec<_> = extractor
            .collect_items()
            .expect("items")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["a/x", "b"]);
    }

    #[test]
    fn empty_directory_is_not_detected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        assert!(ImageDirImporter
            .detect(temp.path())
            .unwrap_err()
            .is_format_not_detected());
    }
}
