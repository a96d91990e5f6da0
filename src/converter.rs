//! Writers that serialize a dataset into a format's on-disk layout.

use std::fs;
use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::{AnnosetError, Result};
use crate::extractor::Extractor;
use crate::ir::{Annotation, DatasetItem, Image};

/// Options shared by every converter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Write item images next to the annotations.
    pub save_images: bool,
    /// Extension of written images; defaults to the source image's
    /// extension, then to the format's own default.
    pub image_ext: Option<String>,
}

impl ConvertOptions {
    pub fn with_images() -> Self {
        Self {
            save_images: true,
            image_ext: None,
        }
    }

    pub fn with_image_ext(mut self, ext: impl Into<String>) -> Self {
        self.image_ext = Some(ext.into().trim_start_matches('.').to_ascii_lowercase());
        self
    }

    /// Extension for `image`, falling back to `default_ext`.
    pub fn image_ext_for(&self, image: Option<&Image>, default_ext: &str) -> String {
        self.image_ext
            .clone()
            .or_else(|| image.and_then(Image::ext))
            .unwrap_or_else(|| default_ext.to_string())
    }
}

pub trait Converter: Send + Sync {
    fn format_name(&self) -> &str;

    /// Writes every item of `extractor` under `save_dir`.
    ///
    /// Annotation variants the format cannot express are skipped and logged
    /// at debug level; they never fail the export.
    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()>;
}

/// Logs an annotation a format cannot express.
pub fn skip_unsupported(format: &str, item: &DatasetItem, ann: &Annotation) {
    log::debug!(
        "{format}: skipping {} annotation on item '{}' ({})",
        ann.annotation_type(),
        item.id,
        item.subset
    );
}

/// Writes `image` to `dest`.
///
/// The source bytes are copied verbatim when their extension matches
/// `dest`; otherwise the image is decoded and re-encoded. Returns `false`
/// without writing when the image has no data.
pub fn save_image(image: &Image, dest: &Path) -> Result<bool> {
    if !image.has_data() {
        log::warn!(
            "image {} is not available; not writing {}",
            image
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            dest.display()
        );
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let dest_ext = extension_of(dest);
    let same_ext = dest_ext.is_some() && image.ext() == dest_ext;
    if same_ext {
        if let Some(src) = image.file_on_disk() {
            if src != dest {
                fs::copy(src, dest)?;
            }
            return Ok(true);
        }
        if let Some(bytes) = image.encoded_bytes() {
            fs::write(dest, bytes)?;
            return Ok(true);
        }
    }

    let format = ImageFormat::from_path(dest).map_err(|source| AnnosetError::ImageEncode {
        path: dest.to_path_buf(),
        source,
    })?;
    let data = image.data()?;
    let encoded = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(data.to_rgb8()).save_with_format(dest, format)
    } else {
        data.save_with_format(dest, format)
    };
    encoded.map_err(|source| AnnosetError::ImageEncode {
        path: dest.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Saves the item image as `<dir>/<id>.<ext>` if images are requested.
///
/// Returns the file name relative to `dir` that the format should record,
/// whether or not the image was written.
pub fn save_item_image(
    item: &DatasetItem,
    dir: &Path,
    options: &ConvertOptions,
    default_ext: &str,
) -> Result<String> {
    let ext = options.image_ext_for(item.image.as_ref(), default_ext);
    let name = format!("{}.{ext}", item.id);
    if options.save_images {
        if let Some(image) = &item.image {
            save_image(image, &dir.join(&name))?;
        }
    }
    Ok(name)
}

/// Encodes `image` as `ext` in memory, for formats that embed image bytes.
///
/// Follows the same copy-or-re-encode rule as [`save_image`]. Returns
/// `None` when the image has no data.
pub fn encode_image(image: &Image, ext: &str) -> Result<Option<Vec<u8>>> {
    if !image.has_data() {
        return Ok(None);
    }
    if image.ext().as_deref() == Some(ext) {
        if let Some(src) = image.file_on_disk() {
            return Ok(Some(fs::read(src)?));
        }
        if let Some(bytes) = image.encoded_bytes() {
            return Ok(Some(bytes.to_vec()));
        }
    }

    let target = Path::new("image").with_extension(ext);
    let format = ImageFormat::from_path(&target).map_err(|source| AnnosetError::ImageEncode {
        path: target.clone(),
        source,
    })?;
    let data = image.data()?;
    let mut out = std::io::Cursor::new(Vec::new());
    let encoded = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(data.to_rgb8()).write_to(&mut out, format)
    } else {
        data.write_to(&mut out, format)
    };
    encoded.map_err(|source| AnnosetError::ImageEncode {
        path: target,
        source,
    })?;
    Ok(Some(out.into_inner()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}
