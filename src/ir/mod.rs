//! The shared annotation model.
//!
//! Every format reads into and writes out of these types. Shapes are stored
//! in pixel space as `xtl, ytl, xbr, ybr` boxes or flat `x1, y1, x2, y2, ...`
//! coordinate lists; labels are indices into the dataset's
//! [`LabelCategories`].
//!
//! # Example
//!
//! ```
//! use annoset::ir::{Annotation, Categories, DatasetItem, LabelCategories};
//!
//! let labels = LabelCategories::from_names(["cat", "dog"]).unwrap();
//! let categories = Categories::from_labels(labels);
//!
//! let item = DatasetItem::new("0001")
//!     .with_subset("train")
//!     .with_annotation(Annotation::bbox(10.0, 20.0, 100.0, 200.0).with_label(1));
//!
//! assert!(item.check_labels(categories.labels.len()).is_ok());
//! ```

mod annotation;
mod categories;
mod geometry;
mod image;
mod item;
mod mask;
mod track;

pub use annotation::{Annotation, AnnotationKind, AnnotationType, AttrValue, Attributes};
pub use categories::{Categories, LabelCategories, LabelCategory, MaskCategories};
pub use geometry::{BBoxXYXY, Coord, Normalized, Pixel};
pub use self::image::{Image, ImageData, ImageKey, ImageLoader};
pub use item::{DatasetItem, ItemKey, DEFAULT_SUBSET};
pub use mask::RleMask;
pub use track::{Track, TrackShape};
