//! Readers that turn a dataset location into a stream of items.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::ir::{Categories, DatasetItem};
use crate::source::SourceOptions;

/// Lazy item stream produced by [`Extractor::iter`].
pub type ItemIter<'a> = Box<dyn Iterator<Item = Result<DatasetItem>> + 'a>;

/// A format-specific reader.
///
/// [`iter`](Extractor::iter) is restartable: every call starts again from
/// the first item and yields the same ids in the same order.
pub trait Extractor: Send + Sync {
    fn iter(&self) -> ItemIter<'_>;

    /// Subset names, when they are known without iterating.
    fn subsets(&self) -> Option<BTreeSet<String>> {
        None
    }

    fn categories(&self) -> &Categories;

    /// Drains a fresh iteration into a vector, stopping at the first error.
    fn collect_items(&self) -> Result<Vec<DatasetItem>> {
        self.iter().collect()
    }
}

/// Builds an extractor for a source url and its options.
pub type ExtractorFactory =
    Arc<dyn Fn(&Path, &SourceOptions) -> Result<Box<dyn Extractor>> + Send + Sync>;

/// Wraps a constructor function as an [`ExtractorFactory`].
pub fn extractor_factory<E, F>(build: F) -> ExtractorFactory
where
    E: Extractor + 'static,
    F: Fn(&Path, &SourceOptions) -> Result<E> + Send + Sync + 'static,
{
    Arc::new(move |url, options| Ok(Box::new(build(url, options)?) as Box<dyn Extractor>))
}

/// Extractor over items already held in memory.
#[derive(Clone, Debug, Default)]
pub struct ItemList {
    categories: Categories,
    items: Vec<DatasetItem>,
}

impl ItemList {
    pub fn new(categories: Categories, items: Vec<DatasetItem>) -> Self {
        Self { categories, items }
    }

    pub fn items(&self) -> &[DatasetItem] {
        &self.items
    }
}

impl Extractor for ItemList {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(self.items.iter().cloned().map(Ok))
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        Some(self.items.iter().map(|item| item.subset.clone()).collect())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}
