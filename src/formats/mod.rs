//! Built-in dataset formats.
//!
//! Each submodule provides an extractor, an importer and a converter for one
//! on-disk layout. [`register_builtins`] wires them into an
//! [`Environment`](crate::registry::Environment) under their format tags.

pub mod coco;
pub mod common;
pub mod cvat;
pub mod image_dir;
pub mod native;
pub mod tfrecord;
pub mod voc;
pub mod yolo;

use std::sync::Arc;

use crate::error::Result;
use crate::extractor::extractor_factory;
use crate::registry::Environment;

/// Format tags in detection order.
///
/// `image_dir` matches any directory holding an image, so it comes last.
pub const BUILTIN_FORMATS: [&str; 7] = [
    native::FORMAT,
    coco::FORMAT,
    voc::FORMAT,
    yolo::FORMAT,
    tfrecord::FORMAT,
    cvat::FORMAT,
    image_dir::FORMAT,
];

/// Registers every built-in extractor, importer and converter.
pub fn register_builtins(env: &mut Environment) -> Result<()> {
    env.register_extractor(native::FORMAT, extractor_factory(native::NativeExtractor::open))?;
    env.register_importer(native::FORMAT, Arc::new(native::NativeImporter))?;
    env.register_converter(native::FORMAT, Arc::new(native::NativeConverter))?;

    env.register_extractor(coco::FORMAT, extractor_factory(coco::CocoExtractor::open))?;
    env.register_importer(coco::FORMAT, Arc::new(coco::CocoImporter))?;
    env.register_converter(coco::FORMAT, Arc::new(coco::CocoConverter))?;

    env.register_extractor(voc::FORMAT, extractor_factory(voc::VocExtractor::open))?;
    env.register_importer(voc::FORMAT, Arc::new(voc::VocImporter))?;
    env.register_converter(voc::FORMAT, Arc::new(voc::VocConverter))?;

    env.register_extractor(yolo::FORMAT, extractor_factory(yolo::YoloExtractor::open))?;
    env.register_importer(yolo::FORMAT, Arc::new(yolo::YoloImporter))?;
    env.register_converter(yolo::FORMAT, Arc::new(yolo::YoloConverter))?;

    env.register_extractor(
        tfrecord::FORMAT,
        extractor_factory(tfrecord::TfRecordExtractor::open),
    )?;
    env.register_importer(tfrecord::FORMAT, Arc::new(tfrecord::TfRecordImporter))?;
    env.register_converter(tfrecord::FORMAT, Arc::new(tfrecord::TfRecordConverter))?;

    env.register_extractor(cvat::FORMAT, extractor_factory(cvat::CvatExtractor::open))?;
    env.register_importer(cvat::FORMAT, Arc::new(cvat::CvatImporter))?;
    env.register_converter(cvat::FORMAT, Arc::new(cvat::CvatConverter))?;

    env.register_extractor(
        image_dir::FORMAT,
        extractor_factory(image_dir::ImageDirExtractor::open),
    )?;
    env.register_importer(image_dir::FORMAT, Arc::new(image_dir::ImageDirImporter))?;
    env.register_converter(image_dir::FORMAT, Arc::new(image_dir::ImageDirConverter))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_in_detection_order() {
        let env = Environment::builtin().expect("builtin environment");
        assert_eq!(env.importers.tags().collect::<Vec<_>>(), BUILTIN_FORMATS);
        assert_eq!(env.converters.len(), BUILTIN_FORMATS.len());
        assert_eq!(env.extractors.len(), BUILTIN_FORMATS.len());
        assert!(env.launchers.is_empty());
    }

    #[test]
    fn registering_builtins_twice_fails() {
        let mut env = Environment::builtin().expect("builtin environment");
        assert!(matches!(
            register_builtins(&mut env),
            Err(crate::error::AnnosetError::DuplicateFormat { .. })
        ));
    }
}
