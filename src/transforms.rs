//! Dataset-level transforms: subset reassignment and label remapping.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::ir::{Categories, DatasetItem, LabelCategories, LabelCategory, MaskCategories};
use crate::project::Dataset;

const RATIO_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Random split
// ============================================================================

/// Reassigns items to new subsets with seeded, reproducible randomness.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomSplit {
    splits: Vec<(String, f64)>,
    seed: u64,
}

impl RandomSplit {
    /// `splits` pairs subset names with ratios that must sum to 1.
    pub fn new(splits: Vec<(String, f64)>, seed: u64) -> Result<Self> {
        if splits.is_empty() {
            return Err(AnnosetError::InvalidTransform(
                "random split needs at least one subset".to_string(),
            ));
        }
        if let Some((name, ratio)) = splits
            .iter()
            .find(|(_, ratio)| !ratio.is_finite() || *ratio < 0.0)
        {
            return Err(AnnosetError::InvalidTransform(format!(
                "ratio {ratio} for subset '{name}' must be a non-negative number"
            )));
        }
        let total: f64 = splits.iter().map(|(_, ratio)| ratio).sum();
        if (total - 1.0).abs() > RATIO_TOLERANCE {
            return Err(AnnosetError::InvalidTransform(format!(
                "split ratios sum to {total}, expected 1"
            )));
        }
        Ok(Self { splits, seed })
    }

    /// Subset name for each of `count` items, in item order.
    pub fn assignments(&self, count: usize) -> Vec<&str> {
        let mut order: Vec<usize> = (0..count).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let mut assigned = vec![""; count];
        let mut start = 0;
        let last = self.splits.len() - 1;
        for (n, (name, ratio)) in self.splits.iter().enumerate() {
            let take = if n == last {
                count - start
            } else {
                ((ratio * count as f64).round() as usize).min(count - start)
            };
            for &index in &order[start..start + take] {
                assigned[index] = name.as_str();
            }
            start += take;
        }
        assigned
    }

    /// Collects `extractor` into a dataset with reassigned subsets.
    ///
    /// Items with the same id from different source subsets that land in
    /// the same new subset are rejected as `AmbiguousItem`.
    pub fn apply(&self, extractor: &dyn Extractor) -> Result<Dataset> {
        let items = extractor.collect_items()?;
        let assignments = self.assignments(items.len());
        let mut dataset = Dataset::new(extractor.categories().clone());
        for (item, subset) in items.into_iter().zip(assignments) {
            dataset.put(item.with_subset(subset))?;
        }
        log::info!(
            "split {} item(s) into {} subset(s)",
            dataset.len(),
            self.splits.len()
        );
        Ok(dataset)
    }
}

// ============================================================================
// Label remapping
// ============================================================================

/// What happens to labels the mapping does not mention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DefaultAction {
    #[default]
    Keep,
    Delete,
}

/// Renames, merges or drops labels.
///
/// Several source labels may map to one target name; they merge into a
/// single output label. Annotations whose label is dropped are removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapLabels {
    mapping: BTreeMap<String, String>,
    default: DefaultAction,
}

impl RemapLabels {
    pub fn new(mapping: BTreeMap<String, String>, default: DefaultAction) -> Self {
        Self { mapping, default }
    }

    /// New categories plus a source index -> output index table.
    pub fn remap_categories(
        &self,
        source: &Categories,
    ) -> Result<(Categories, Vec<Option<usize>>)> {
        let mut labels = LabelCategories::new();
        let mut colors = BTreeMap::new();
        let mut table = Vec::with_capacity(source.labels.len());

        for (index, category) in source.labels.iter().enumerate() {
            let target = match (self.mapping.get(&category.name), self.default) {
                (Some(target), _) => Some(target.as_str()),
                (None, DefaultAction::Keep) => Some(category.name.as_str()),
                (None, DefaultAction::Delete) => None,
            };
            let Some(target) = target.filter(|name| !name.is_empty()) else {
                table.push(None);
                continue;
            };

            let out = match labels.index_of(target) {
                Some(out) => out,
                None => {
                    let mut renamed = LabelCategory::new(target);
                    renamed.parent = category.parent.clone();
                    labels.add_category(renamed)?;
                    labels.len() - 1
                }
            };
            for attr in &category.attributes {
                labels.add_attribute(out, attr.clone())?;
            }
            if let Some(color) = source.masks.as_ref().and_then(|m| m.color_of(index)) {
                colors.entry(out).or_insert(color);
            }
            table.push(Some(out));
        }

        let mut categories = Categories::from_labels(labels);
        if source.masks.is_some() {
            categories = categories.with_masks(MaskCategories { colormap: colors });
        }
        Ok((categories, table))
    }

    /// Wraps `source` in a lazy extractor yielding remapped items.
    pub fn apply<'a>(&self, source: &'a dyn Extractor) -> Result<Remapped<'a>> {
        let (categories, table) = self.remap_categories(source.categories())?;
        Ok(Remapped {
            source,
            categories,
            table,
        })
    }
}

/// The output of [`RemapLabels::apply`].
pub struct Remapped<'a> {
    source: &'a dyn Extractor,
    categories: Categories,
    table: Vec<Option<usize>>,
}

impl Remapped<'_> {
    fn remap_item(&self, mut item: DatasetItem) -> Result<DatasetItem> {
        let bound = self.table.len();
        let mut kept = Vec::with_capacity(item.annotations.len());
        for mut ann in item.annotations {
            match ann.label {
                None => kept.push(ann),
                Some(label) => {
                    let mapped = self
                        .table
                        .get(label)
                        .ok_or(AnnosetError::LabelOutOfRange { label, bound })?;
                    if let Some(out) = mapped {
                        ann.label = Some(*out);
                        kept.push(ann);
                    }
                }
            }
        }
        item.annotations = kept;
        Ok(item)
    }
}

impl Extractor for Remapped<'_> {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(
            self.source
                .iter()
                .map(move |item| item.and_then(|item| self.remap_item(item))),
        )
    }

    fn subsets(&self) -> Option<std::collections::BTreeSet<String>> {
        self.source.subsets()
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ItemList;
    use crate::ir::Annotation;

    fn items(n: usize) -> ItemList {
        let categories =
            Categories::from_labels(LabelCategories::from_names(["cat", "dog", "car"]).unwrap());
        let items = (0..n)
            .map(|i| {
                DatasetItem::new(format!("{i:03}"))
                    .with_annotation(Annotation::tag(i % 3))
                    .with_annotation(Annotation::caption("free text"))
            })
            .collect();
        ItemList::new(categories, items)
    }

    #[test]
    fn ratios_must_sum_to_one() {
        for splits in [
            vec![("train".to_string(), 0.5), ("val".to_string(), 0.4)],
            vec![("train".to_string(), 1.5), ("val".to_string(), -0.5)],
            vec![],
        ] {
            assert!(matches!(
                RandomSplit::new(splits, 0),
                Err(AnnosetError::InvalidTransform(_))
            ));
        }
        assert!(RandomSplit::new(vec![("a".into(), 0.7), ("b".into(), 0.3000001)], 0).is_ok());
    }

    #[test]
    fn split_is_deterministic_and_sized() {
        let split =
            RandomSplit::new(vec![("train".into(), 0.8), ("val".into(), 0.2)], 42).unwrap();
        let first = split.assignments(10);
        assert_eq!(first, split.assignments(10));
        assert_eq!(first.iter().filter(|s| **s == "train").count(), 8);
        assert_eq!(first.iter().filter(|s| **s == "val").count(), 2);

        let dataset = split.apply(&items(10)).expect("apply");
        assert_eq!(dataset.len(), 10);
        let train = dataset
            .items()
            .iter()
            .filter(|item| item.subset == "train")
            .count();
        assert_eq!(train, 8);
    }

    #[test]
    fn remap_merges_and_deletes() {
        let remap = RemapLabels::new(
            [
                ("cat".to_string(), "animal".to_string()),
                ("dog".to_string(), "animal".to_string()),
            ]
            .into(),
            DefaultAction::Delete,
        );
        let source = items(3);
        let remapped = remap.apply(&source).expect("apply");
        assert_eq!(remapped.categories().labels.len(), 1);
        assert_eq!(remapped.categories().labels.name(0), Some("animal"));

        let out = remapped.collect_items().expect("items");
        assert_eq!(out[0].annotations[0].label, Some(0));
        assert_eq!(out[1].annotations[0].label, Some(0));
        // the "car" tag is dropped, the caption is kept
        assert_eq!(out[2].annotations.len(), 1);
        assert_eq!(out[2].annotations[0].label, None);
    }

    #[test]
    fn remap_keeps_unmapped_labels_by_default() {
        let remap = RemapLabels::new(
            [("car".to_string(), "vehicle".to_string())].into(),
            DefaultAction::Keep,
        );
        let (categories, table) = remap.remap_categories(items(0).categories()).unwrap();
        let names: Vec<_> = categories.labels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "dog", "vehicle"]);
        assert_eq!(table, vec![Some(0), Some(1), Some(2)]);
    }
}
