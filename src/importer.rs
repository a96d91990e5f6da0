//! Layout probes that describe a directory as a list of sources.
//!
//! Importers never build datasets themselves; they return plain
//! [`Source`] values and leave composition to the project layer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{AnnosetError, Result};
use crate::source::Source;

pub trait Importer: Send + Sync {
    /// Format tag of the sources this importer produces.
    fn format_name(&self) -> &str;

    /// Probes `root` for this importer's layout.
    ///
    /// Returns at least one source on success. Fails with
    /// [`AnnosetError::FormatNotDetected`] when nothing matches, and with
    /// [`AnnosetError::AmbiguousDataset`] when several files claim the same
    /// subset.
    fn detect(&self, root: &Path) -> Result<Vec<Source>>;
}

/// Lists regular files under `root` with one of `extensions`, in path order.
///
/// `max_depth` of 1 only looks at direct children.
pub fn find_files(root: &Path, extensions: &[&str], max_depth: usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| {
            AnnosetError::unreadable(root, format!("failed while traversing directory: {source}"))
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// File stem as UTF-8, if it has one.
pub fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// Groups `(subset, candidate)` pairs, failing if any subset has more than
/// one candidate.
pub fn unique_per_subset(
    candidates: impl IntoIterator<Item = (String, PathBuf)>,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for (subset, path) in candidates {
        grouped.entry(subset).or_default().push(path);
    }

    let mut unique = BTreeMap::new();
    for (subset, mut paths) in grouped {
        if paths.len() > 1 {
            paths.sort();
            return Err(AnnosetError::AmbiguousDataset {
                subset,
                candidates: paths,
            });
        }
        if let Some(path) = paths.pop() {
            unique.insert(subset, path);
        }
    }
    Ok(unique)
}

/// Fails with `FormatNotDetected` if the probe produced nothing.
pub fn require_sources(format: &str, root: &Path, sources: Vec<Source>) -> Result<Vec<Source>> {
    if sources.is_empty() {
        return Err(AnnosetError::not_detected(format, root));
    }
    log::info!(
        "detected {} {format} source(s) at {}",
        sources.len(),
        root.display()
    );
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_per_subset_lists_all_candidates() {
        let err = unique_per_subset([
            ("train".to_string(), PathBuf::from("b.data")),
            ("valid".to_string(), PathBuf::from("b.data")),
            ("train".to_string(), PathBuf::from("a.data")),
        ])
        .unwrap_err();

        match err {
            AnnosetError::AmbiguousDataset { subset, candidates } => {
                assert_eq!(subset, "train");
                assert_eq!(
                    candidates,
                    vec![PathBuf::from("a.data"), PathBuf::from("b.data")]
                );
            }
            other => panic!("expected AmbiguousDataset, got {other:?}"),
        }
    }

    #[test]
    fn find_files_filters_by_extension_and_depth() {
        let temp = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(temp.path().join("nested")).expect("create dir");
        std::fs::write(temp.path().join("a.XML"), "").expect("write");
        std::fs::write(temp.path().join("b.txt"), "").expect("write");
        std::fs::write(temp.path().join("nested/c.xml"), "").expect("write");

        let shallow = find_files(temp.path(), &["xml"], 1).expect("walk");
        assert_eq!(shallow, vec![temp.path().join("a.XML")]);

        let deep = find_files(temp.path(), &["xml"], usize::MAX).expect("walk");
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn empty_probe_is_not_detected() {
        let err = require_sources("voc", Path::new("/data"), Vec::new()).unwrap_err();
        assert!(err.is_format_not_detected());
    }
}
