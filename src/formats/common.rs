//! Helpers shared by the built-in formats.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use roxmltree::Node;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AnnosetError, Result};
use crate::ir::DEFAULT_SUBSET;
use crate::source::SourceOptions;

/// Image extensions probed when looking for an item's image, in
/// preference order.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "jpeg", "bmp", "webp"];

/// Source option naming the subset a single-file source belongs to.
pub const SUBSET_OPTION: &str = "subset";

/// The `subset` option, or the default subset.
pub fn subset_option(options: &SourceOptions) -> String {
    options
        .get(SUBSET_OPTION)
        .cloned()
        .unwrap_or_else(|| DEFAULT_SUBSET.to_string())
}

/// Fails with `UnreadableSource` unless `path` is an existing file.
pub fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(AnnosetError::unreadable(path, "file does not exist"));
    }
    Ok(())
}

/// Fails with `UnreadableSource` unless `path` is an existing directory.
pub fn require_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(AnnosetError::unreadable(path, "directory does not exist"));
    }
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|err| AnnosetError::unreadable(path, err.to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| AnnosetError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(|source| {
        AnnosetError::JsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Finds `<dir>/<stem>.<ext>` for the first image extension that exists.
pub fn find_image(dir: &Path, stem: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}

/// `path` relative to `root` with forward slashes.
pub fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Item id for an image path: the relative path without its extension.
pub fn id_from_path(root: &Path, path: &Path) -> String {
    rel_string(root, &path.with_extension(""))
}

pub fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ============================================================================
// XML helpers
// ============================================================================

pub fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

pub fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == tag)
}

pub fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

pub fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>> {
    child_element(node, tag)
        .ok_or_else(|| AnnosetError::unreadable(path, format!("missing <{tag}> in {context}")))
}

pub fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String> {
    optional_child_text(node, tag)
        .ok_or_else(|| AnnosetError::unreadable(path, format!("missing <{tag}> in {context}")))
}

pub fn parse_required_f64(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<f64> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<f64>().map_err(|_| {
        AnnosetError::unreadable(
            path,
            format!("invalid <{tag}> value '{raw}' in {context}; expected floating-point number"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_path_keeps_subdirectories() {
        let root = Path::new("/data/images");
        assert_eq!(
            id_from_path(root, Path::new("/data/images/a/b.c.jpg")),
            "a/b.c"
        );
    }

    #[test]
    fn find_image_prefers_extension_order() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("s.png"), b"dummy").expect("write png");
        fs::write(temp.path().join("s.jpg"), b"dummy").expect("write jpg");
        let found = find_image(temp.path(), "s").expect("should find image");
        assert!(found.ends_with("s.jpg"));
        assert!(find_image(temp.path(), "t").is_none());
    }
}
