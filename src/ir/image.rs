//! Lazy image references.
//!
//! An [`Image`] describes where pixels come from without decoding them.
//! [`Image::data`] decodes on first access and memoizes the result through
//! the process-wide [`ImageCache`](crate::image_cache::ImageCache); clones
//! share one cache key, so a viewer, a converter and a launcher touching the
//! same item decode it once.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::DynamicImage;

use crate::error::{AnnosetError, Result};
use crate::image_cache::ImageCache;

/// Decoded pixels, shared between the cache and its readers.
pub type ImageData = Arc<DynamicImage>;

/// A deferred decoder for images that come from somewhere other than a file.
pub type ImageLoader = Arc<dyn Fn() -> Result<DynamicImage> + Send + Sync>;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one lazy image instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey(u64);

impl ImageKey {
    fn next() -> Self {
        ImageKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone)]
enum ImageSource {
    /// Decoded from `Image::path` on demand.
    File,
    /// Encoded bytes held in memory (TFRecord payloads).
    Bytes(Arc<[u8]>),
    Decoded(ImageData),
    Loader(ImageLoader),
}

#[derive(Clone)]
pub struct Image {
    key: ImageKey,
    path: Option<PathBuf>,
    size: Option<(u32, u32)>,
    source: ImageSource,
}

impl Image {
    /// References an image file; nothing is read until needed.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            key: ImageKey::next(),
            path: Some(path.into()),
            size: None,
            source: ImageSource::File,
        }
    }

    /// Wraps encoded bytes. `name` keeps the original file name, which
    /// converters use for the output extension.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, name: Option<PathBuf>) -> Self {
        Self {
            key: ImageKey::next(),
            path: name,
            size: None,
            source: ImageSource::Bytes(bytes.into()),
        }
    }

    pub fn from_decoded(image: DynamicImage) -> Self {
        let size = (image.width(), image.height());
        Self {
            key: ImageKey::next(),
            path: None,
            size: Some(size),
            source: ImageSource::Decoded(Arc::new(image)),
        }
    }

    pub fn from_loader(loader: ImageLoader) -> Self {
        Self {
            key: ImageKey::next(),
            path: None,
            size: None,
            source: ImageSource::Loader(loader),
        }
    }

    /// Records known dimensions as `(width, height)`.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn key(&self) -> ImageKey {
        self.key
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lowercased file extension of the original image, if known.
    pub fn ext(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Dimensions recorded at construction, without touching the source.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// The on-disk file, if the pixels live verbatim in one.
    pub fn file_on_disk(&self) -> Option<&Path> {
        match self.source {
            ImageSource::File => self.path.as_deref().filter(|path| path.is_file()),
            _ => None,
        }
    }

    /// The encoded bytes this image was built from, if any.
    pub fn encoded_bytes(&self) -> Option<&[u8]> {
        match &self.source {
            ImageSource::Bytes(bytes) => Some(&bytes[..]),
            _ => None,
        }
    }

    /// Returns true if pixels can be produced for this image.
    pub fn has_data(&self) -> bool {
        match self.source {
            ImageSource::File => self.file_on_disk().is_some(),
            _ => true,
        }
    }

    /// Dimensions as `(width, height)`, reading only the header if needed.
    pub fn read_size(&self) -> Result<Option<(u32, u32)>> {
        if let Some(size) = self.size {
            return Ok(Some(size));
        }
        let header = match &self.source {
            ImageSource::File => match self.file_on_disk() {
                Some(path) => Some(
                    imagesize::size(path)
                        .map_err(|err| AnnosetError::unreadable(path, err.to_string()))?,
                ),
                None => None,
            },
            ImageSource::Bytes(bytes) => Some(imagesize::blob_size(bytes).map_err(|err| {
                AnnosetError::unreadable(self.display_path(), err.to_string())
            })?),
            ImageSource::Decoded(image) => return Ok(Some((image.width(), image.height()))),
            ImageSource::Loader(_) => {
                let image = self.data()?;
                return Ok(Some((image.width(), image.height())));
            }
        };
        header
            .map(|size| {
                let width = u32::try_from(size.width).map_err(|_| {
                    AnnosetError::unreadable(
                        self.display_path(),
                        "image width does not fit in u32",
                    )
                })?;
                let height = u32::try_from(size.height).map_err(|_| {
                    AnnosetError::unreadable(
                        self.display_path(),
                        "image height does not fit in u32",
                    )
                })?;
                Ok((width, height))
            })
            .transpose()
    }

    /// Decodes the image, going through the global cache.
    pub fn data(&self) -> Result<ImageData> {
        if let ImageSource::Decoded(image) = &self.source {
            return Ok(Arc::clone(image));
        }
        if let Some(hit) = ImageCache::with_global(|cache| cache.get(self.key)) {
            return Ok(hit);
        }
        let decoded = Arc::new(self.decode()?);
        ImageCache::with_global(|cache| cache.push(self.key, Arc::clone(&decoded)));
        Ok(decoded)
    }

    fn decode(&self) -> Result<DynamicImage> {
        match &self.source {
            ImageSource::File => {
                let path = self.path.as_deref().ok_or_else(|| {
                    AnnosetError::unreadable(PathBuf::new(), "image has neither a path nor data")
                })?;
                image::open(path).map_err(|source| AnnosetError::ImageDecode {
                    path: path.to_path_buf(),
                    source,
                })
            }
            ImageSource::Bytes(bytes) => {
                image::load_from_memory(bytes).map_err(|source| AnnosetError::ImageDecode {
                    path: self.display_path(),
                    source,
                })
            }
            ImageSource::Decoded(image) => Ok(DynamicImage::clone(image)),
            ImageSource::Loader(loader) => (loader.as_ref())(),
        }
    }

    fn display_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("<memory>"))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            ImageSource::File => "file",
            ImageSource::Bytes(_) => "bytes",
            ImageSource::Decoded(_) => "decoded",
            ImageSource::Loader(_) => "loader",
        };
        f.debug_struct("Image")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("source", &source)
            .finish()
    }
}

/// Two images are equal if they point at the same file with the same size.
/// Pixel data is not compared.
impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.size == other.size
    }
}
