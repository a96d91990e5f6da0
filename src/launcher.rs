//! Black-box inference models and the transform that batches items through
//! them.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::ir::{Annotation, Categories, DatasetItem, ImageData};
use crate::source::SourceOptions;

/// Default number of items per launcher call.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// A model boundary: one annotation list per input image, in input order.
pub trait Launcher: Send + Sync {
    fn launch(&self, batch: &[ImageData]) -> Result<Vec<Vec<Annotation>>>;

    /// The model's own label set, if it has one.
    fn categories(&self) -> Option<&Categories> {
        None
    }
}

/// Builds a launcher from its options.
pub type LauncherFactory = Arc<dyn Fn(&SourceOptions) -> Result<Box<dyn Launcher>> + Send + Sync>;

/// Runs a launcher over an extractor's items.
///
/// The transform is itself an [`Extractor`]: iteration is lazy, and every new
/// iteration runs inference again. Labels produced by the launcher are
/// checked against the effective categories and the first out-of-range label
/// stops the whole stream.
pub struct ModelTransform<'a> {
    extractor: &'a dyn Extractor,
    launcher: &'a dyn Launcher,
    batch_size: usize,
}

impl<'a> ModelTransform<'a> {
    pub fn new(extractor: &'a dyn Extractor, launcher: &'a dyn Launcher) -> Self {
        Self {
            extractor,
            launcher,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(AnnosetError::InvalidTransform(
                "batch size must be at least 1".to_string(),
            ));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The launcher's categories if it declares any labels, else the
    /// wrapped extractor's.
    pub fn effective_categories(&self) -> &Categories {
        match self.launcher.categories() {
            Some(categories) if !categories.labels.is_empty() => categories,
            _ => self.extractor.categories(),
        }
    }

    /// Fails with `LabelOutOfRange` on the first label `>= bound`.
    pub fn check_labels(annotations: &[Annotation], bound: usize) -> Result<()> {
        annotations.iter().try_for_each(|ann| ann.check_label(bound))
    }

    fn run_batch(&self, items: Vec<DatasetItem>) -> Result<Vec<DatasetItem>> {
        let images = items
            .iter()
            .map(|item| match &item.image {
                Some(image) => image.data(),
                None => Err(AnnosetError::MissingImage {
                    subset: item.subset.clone(),
                    id: item.id.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = self.launcher.launch(&images)?;
        if outputs.len() != items.len() {
            return Err(AnnosetError::LauncherOutput {
                expected: items.len(),
                actual: outputs.len(),
            });
        }

        let bound = self.effective_categories().labels.len();
        for annotations in &outputs {
            Self::check_labels(annotations, bound)?;
        }

        Ok(items
            .into_iter()
            .zip(outputs)
            .map(|(item, annotations)| item.with_annotations(annotations))
            .collect())
    }
}

impl Extractor for ModelTransform<'_> {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(BatchedInference {
            transform: self,
            input: self.extractor.iter(),
            ready: VecDeque::new(),
            finished: false,
        })
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        self.extractor.subsets()
    }

    fn categories(&self) -> &Categories {
        self.effective_categories()
    }
}

struct BatchedInference<'t, 'a> {
    transform: &'t ModelTransform<'a>,
    input: ItemIter<'t>,
    ready: VecDeque<DatasetItem>,
    finished: bool,
}

impl Iterator for BatchedInference<'_, '_> {
    type Item = Result<DatasetItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.ready.pop_front() {
            return Some(Ok(item));
        }
        if self.finished {
            return None;
        }

        let mut batch = Vec::with_capacity(self.transform.batch_size);
        while batch.len() < self.transform.batch_size {
            match self.input.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            return None;
        }

        match self.transform.run_batch(batch) {
            Ok(items) => {
                self.ready.extend(items);
                self.ready.pop_front().map(Ok)
            }
            Err(err) => {
                self.finished = true;
                self.ready.clear();
                Some(Err(err))
            }
        }
    }
}
