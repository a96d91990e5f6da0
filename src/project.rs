//! Projects: named sources composed into one dataset.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::ir::{Categories, DatasetItem, ItemKey};
use crate::registry::Environment;
use crate::source::{Source, SourceSpec};

/// File name of a saved project inside its directory.
pub const PROJECT_FILE: &str = "project.yaml";

/// What happens when two sources produce the same `(subset, id)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// A repeated key fails with `AmbiguousItem`.
    #[default]
    Strict,
    /// The later source's item replaces the earlier one entirely.
    Override,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    sources: Vec<Source>,

    /// Subset allow-list; `None` keeps every subset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subsets: Option<BTreeSet<String>>,

    #[serde(default)]
    merge_mode: MergeMode,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Registers a source under a unique name.
    pub fn add_source(&mut self, name: impl Into<String>, spec: SourceSpec) -> Result<()> {
        let name = name.into();
        if self.source(&name).is_some() {
            return Err(AnnosetError::DuplicateSource(name));
        }
        self.sources.push(Source {
            name,
            format: spec.format,
            url: spec.url,
            options: spec.options,
        });
        Ok(())
    }

    pub fn remove_source(&mut self, name: &str) -> Result<Source> {
        let pos = self
            .sources
            .iter()
            .position(|source| source.name == name)
            .ok_or_else(|| AnnosetError::UnknownSource(name.to_string()))?;
        Ok(self.sources.remove(pos))
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|source| source.name == name)
    }

    /// Sources in registration order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn set_subsets(&mut self, subsets: Option<BTreeSet<String>>) {
        self.subsets = subsets;
    }

    pub fn subsets(&self) -> Option<&BTreeSet<String>> {
        self.subsets.as_ref()
    }

    pub fn set_merge_mode(&mut self, mode: MergeMode) {
        self.merge_mode = mode;
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge_mode
    }

    /// Runs the `format` importer on `root` and adds what it finds.
    ///
    /// Returns the names of the added sources.
    pub fn import(&mut self, root: &Path, format: &str, env: &Environment) -> Result<Vec<String>> {
        let sources = env.importer(format)?.detect(root)?;
        self.add_detected(sources)
    }

    /// Detects the format of `root` and adds its sources.
    pub fn import_auto(&mut self, root: &Path, env: &Environment) -> Result<(String, Vec<String>)> {
        let (format, sources) = env.detect_format(root)?;
        let names = self.add_detected(sources)?;
        Ok((format, names))
    }

    fn add_detected(&mut self, sources: Vec<Source>) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(sources.len());
        for source in sources {
            let (base, spec) = source.into_spec();
            let name = self.free_name(&base);
            self.add_source(name.clone(), spec)?;
            names.push(name);
        }
        Ok(names)
    }

    fn free_name(&self, base: &str) -> String {
        if self.source(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.source(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Resolves every source and merges their items.
    ///
    /// Sources are consumed in registration order. The subset allow-list is
    /// applied before merging. Categories come from the first source that
    /// declares labels; a source that names a different label at the same
    /// index fails with `IncompatibleCategories`. After merging, every label
    /// is checked against the composed categories.
    pub fn make_dataset(&self, env: &Environment) -> Result<Dataset> {
        let mut dataset = Dataset::new(Categories::default());

        for source in &self.sources {
            let extractor = env.make_extractor(source)?;
            merge_categories(&mut dataset.categories, extractor.categories())?;

            let mut count = 0usize;
            for item in extractor.iter() {
                let item = item?;
                if let Some(allowed) = &self.subsets {
                    if !allowed.contains(&item.subset) {
                        continue;
                    }
                }
                dataset.insert(item, self.merge_mode)?;
                count += 1;
            }
            log::info!("source '{}': {count} item(s)", source.name);
        }

        dataset.check_labels()?;
        Ok(dataset)
    }

    /// Writes the project to `<dir>/project.yaml`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(PROJECT_FILE);
        let yaml = serde_yaml::to_string(self).map_err(|source| AnnosetError::Yaml {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, yaml)?;
        Ok(path)
    }

    /// Reads `<dir>/project.yaml`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PROJECT_FILE);
        let yaml = fs::read_to_string(&path)
            .map_err(|err| AnnosetError::unreadable(&path, err.to_string()))?;
        let project: Project =
            serde_yaml::from_str(&yaml).map_err(|source| AnnosetError::Yaml { path, source })?;

        let mut names = BTreeSet::new();
        for source in &project.sources {
            if !names.insert(source.name.as_str()) {
                return Err(AnnosetError::DuplicateSource(source.name.clone()));
            }
        }
        Ok(project)
    }
}

/// Folds `incoming` into `merged`.
fn merge_categories(merged: &mut Categories, incoming: &Categories) -> Result<()> {
    if merged.labels.is_empty() {
        if !incoming.labels.is_empty() {
            merged.labels = incoming.labels.clone();
        }
    } else {
        for (index, (left, right)) in merged.labels.iter().zip(incoming.labels.iter()).enumerate() {
            if left.name != right.name {
                return Err(AnnosetError::IncompatibleCategories {
                    index,
                    left: left.name.clone(),
                    right: right.name.clone(),
                });
            }
        }
    }
    if merged.masks.is_none() {
        merged.masks = incoming.masks.clone();
    }
    Ok(())
}

/// A materialized set of items addressed by `(subset, id)`.
///
/// Items keep their insertion order.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    categories: Categories,
    items: Vec<DatasetItem>,
    index: HashMap<ItemKey, usize>,
}

impl Dataset {
    pub fn new(categories: Categories) -> Self {
        Self {
            categories,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Drains an extractor, rejecting repeated keys.
    pub fn from_extractor(extractor: &dyn Extractor) -> Result<Self> {
        let mut dataset = Self::new(extractor.categories().clone());
        for item in extractor.iter() {
            dataset.put(item?)?;
        }
        Ok(dataset)
    }

    /// Adds an item; fails with `AmbiguousItem` if its key is taken.
    pub fn put(&mut self, item: DatasetItem) -> Result<()> {
        self.insert(item, MergeMode::Strict)
    }

    /// Adds an item, resolving a taken key according to `mode`.
    pub fn insert(&mut self, item: DatasetItem, mode: MergeMode) -> Result<()> {
        let key = item.key();
        match (self.index.get(&key), mode) {
            (None, _) => {
                self.index.insert(key, self.items.len());
                self.items.push(item);
            }
            (Some(_), MergeMode::Strict) => {
                return Err(AnnosetError::AmbiguousItem {
                    subset: key.subset,
                    id: key.id,
                });
            }
            (Some(&pos), MergeMode::Override) => {
                log::debug!("item '{}' ({}) overridden by a later source", key.id, key.subset);
                self.items[pos] = item;
            }
        }
        Ok(())
    }

    pub fn get(&self, subset: &str, id: &str) -> Option<&DatasetItem> {
        let key = ItemKey {
            subset: subset.to_string(),
            id: id.to_string(),
        };
        self.index.get(&key).map(|&pos| &self.items[pos])
    }

    pub fn items(&self) -> &[DatasetItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn set_categories(&mut self, categories: Categories) {
        self.categories = categories;
    }

    /// Checks every annotation label against the dataset's categories.
    pub fn check_labels(&self) -> Result<()> {
        let bound = self.categories.labels.len();
        self.items
            .iter()
            .try_for_each(|item| item.check_labels(bound))
    }
}

impl Extractor for Dataset {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Annotation, LabelCategories};

    #[test]
    fn duplicate_source_name_is_rejected() {
        let mut project = Project::new("p");
        project
            .add_source("a", SourceSpec::new("coco", "/data/a"))
            .expect("first");
        project
            .add_source("b", SourceSpec::new("coco", "/data/a"))
            .expect("same url, different name");
        assert!(matches!(
            project.add_source("a", SourceSpec::new("voc", "/data/b")),
            Err(AnnosetError::DuplicateSource(ref name)) if name == "a"
        ));
        assert_eq!(project.sources().len(), 2);
    }

    #[test]
    fn remove_unknown_source_fails() {
        let mut project = Project::new("p");
        project
            .add_source("a", SourceSpec::new("coco", "/x"))
            .expect("add");
        assert_eq!(project.remove_source("a").expect("remove").name, "a");
        assert!(matches!(
            project.remove_source("a"),
            Err(AnnosetError::UnknownSource(_))
        ));
    }

    #[test]
    fn strict_insert_rejects_repeated_key() {
        let mut dataset = Dataset::default();
        dataset
            .put(DatasetItem::new("0001").with_subset("train"))
            .expect("first");
        dataset
            .put(DatasetItem::new("0001").with_subset("val"))
            .expect("other subset");
        match dataset.put(DatasetItem::new("0001").with_subset("train")) {
            Err(AnnosetError::AmbiguousItem { subset, id }) => {
                assert_eq!((subset.as_str(), id.as_str()), ("train", "0001"));
            }
            other => panic!("expected AmbiguousItem, got {other:?}"),
        }
    }

    #[test]
    fn override_replaces_wholesale_in_place() {
        let mut dataset = Dataset::default();
        dataset
            .put(DatasetItem::new("a").with_annotation(Annotation::caption("first")))
            .expect("a");
        dataset.put(DatasetItem::new("b")).expect("b");
        dataset
            .insert(
                DatasetItem::new("a").with_annotation(Annotation::caption("second")),
                MergeMode::Override,
            )
            .expect("override");

        assert_eq!(dataset.items()[0].id, "a");
        assert_eq!(
            dataset.get("default", "a").expect("a").annotations,
            vec![Annotation::caption("second")]
        );
    }

    #[test]
    fn category_conflict_at_same_index() {
        let mut merged =
            Categories::from_labels(LabelCategories::from_names(["cat", "dog"]).unwrap());
        let prefix = Categories::from_labels(LabelCategories::from_names(["cat"]).unwrap());
        merge_categories(&mut merged, &prefix).expect("prefix is compatible");
        merge_categories(&mut merged, &Categories::default()).expect("empty is compatible");

        let other = Categories::from_labels(LabelCategories::from_names(["cat", "bird"]).unwrap());
        match merge_categories(&mut merged, &other).unwrap_err() {
            AnnosetError::IncompatibleCategories { index, left, right } => {
                assert_eq!(index, 1);
                assert_eq!(left, "dog");
                assert_eq!(right, "bird");
            }
            other => panic!("expected IncompatibleCategories, got {other:?}"),
        }
    }

    #[test]
    fn yaml_roundtrip() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let mut project = Project::new("demo");
        project
            .add_source(
                "train",
                SourceSpec::new("yolo", "/data/obj.data").with_option("subset", "train"),
            )
            .expect("add");
        project.set_subsets(Some(BTreeSet::from(["train".to_string()])));
        project.set_merge_mode(MergeMode::Override);

        project.save(temp.path()).expect("save");
        let loaded = Project::load(temp.path()).expect("load");
        assert_eq!(loaded, project);
    }
}
