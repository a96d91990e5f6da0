use serde::{Deserialize, Serialize};

use super::annotation::{Annotation, Attributes, AttrValue};
use super::image::Image;
use crate::error::Result;

/// Subset name used when a format has no notion of subsets.
pub const DEFAULT_SUBSET: &str = "default";

/// One media unit and its annotations, addressed by `(subset, id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetItem {
    pub id: String,
    pub subset: String,
    pub image: Option<Image>,
    pub annotations: Vec<Annotation>,
    pub attributes: Attributes,
}

impl DatasetItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subset: DEFAULT_SUBSET.to_string(),
            image: None,
            annotations: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_subset(mut self, subset: impl Into<String>) -> Self {
        self.subset = subset.into();
        self
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// `(subset, id)` pair that identifies the item inside a dataset.
    pub fn key(&self) -> ItemKey {
        ItemKey {
            subset: self.subset.clone(),
            id: self.id.clone(),
        }
    }

    /// Checks every annotation label against the size of the label schema.
    pub fn check_labels(&self, bound: usize) -> Result<()> {
        self.annotations
            .iter()
            .try_for_each(|ann| ann.check_label(bound))
    }
}

/// Dataset address of an item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub subset: String,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnosetError;

    #[test]
    fn defaults_to_default_subset() {
        let item = DatasetItem::new("0001");
        assert_eq!(item.subset, DEFAULT_SUBSET);
        assert_eq!(
            item.with_subset("train").key(),
            ItemKey {
                subset: "train".into(),
                id: "0001".into()
            }
        );
    }

    #[test]
    fn check_labels_reports_first_violation() {
        let item = DatasetItem::new("a")
            .with_annotation(Annotation::tag(0))
            .with_annotation(Annotation::tag(4))
            .with_annotation(Annotation::tag(9));
        match item.check_labels(2).unwrap_err() {
            AnnosetError::LabelOutOfRange { label, bound } => assert_eq!((label, bound), (4, 2)),
            other => panic!("expected LabelOutOfRange, got {other:?}"),
        }
    }
}
