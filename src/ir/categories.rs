//! Label schema of a dataset.
//!
//! `Annotation::label` is an index into [`LabelCategories`]; that index is
//! the only valid way to refer to a label.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{AnnosetError, Result};

/// One label definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCategory {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Attribute names this label declares (CVAT `<attributes>`).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub attributes: BTreeSet<String>,
}

impl LabelCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            attributes: BTreeSet::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Ordered list of unique label names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LabelCategory>", into = "Vec<LabelCategory>")]
pub struct LabelCategories {
    items: Vec<LabelCategory>,
    index: HashMap<String, usize>,
}

impl LabelCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds categories from plain names, rejecting duplicates.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories = Self::new();
        for name in names {
            categories.add(name, None::<String>)?;
        }
        Ok(categories)
    }

    /// Appends a label and returns its index.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        parent: Option<impl Into<String>>,
    ) -> Result<usize> {
        let mut category = LabelCategory::new(name);
        category.parent = parent.map(Into::into);
        self.add_category(category)
    }

    pub fn add_category(&mut self, category: LabelCategory) -> Result<usize> {
        if self.index.contains_key(&category.name) {
            return Err(AnnosetError::DuplicateLabel(category.name));
        }
        let idx = self.items.len();
        self.index.insert(category.name.clone(), idx);
        self.items.push(category);
        Ok(idx)
    }

    /// Returns the index of `name`, adding it if missing.
    pub fn find_or_add(&mut self, name: &str) -> usize {
        if let Some(idx) = self.index_of(name) {
            return idx;
        }
        let idx = self.items.len();
        self.index.insert(name.to_string(), idx);
        self.items.push(LabelCategory::new(name));
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, index: usize) -> Option<&LabelCategory> {
        self.items.get(index)
    }

    /// Declares an attribute name on an existing label.
    pub fn add_attribute(&mut self, index: usize, attribute: impl Into<String>) -> Result<()> {
        let bound = self.items.len();
        let category = self
            .items
            .get_mut(index)
            .ok_or(AnnosetError::LabelOutOfRange { label: index, bound })?;
        category.attributes.insert(attribute.into());
        Ok(())
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelCategory> {
        self.items.iter()
    }
}

impl TryFrom<Vec<LabelCategory>> for LabelCategories {
    type Error = AnnosetError;

    fn try_from(items: Vec<LabelCategory>) -> Result<Self> {
        let mut categories = Self::new();
        for item in items {
            categories.add_category(item)?;
        }
        Ok(categories)
    }
}

impl From<LabelCategories> for Vec<LabelCategory> {
    fn from(categories: LabelCategories) -> Self {
        categories.items
    }
}

/// Label index to RGB color, for formats that store masks as color images.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskCategories {
    pub colormap: BTreeMap<usize, [u8; 3]>,
}

impl MaskCategories {
    /// The standard PASCAL VOC colormap for `size` labels.
    pub fn voc_colormap(size: usize) -> Self {
        let colormap = (0..size)
            .map(|label| {
                let mut id = label;
                let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
                for shift in (0..8).rev() {
                    r |= ((id & 1) as u8) << shift;
                    g |= (((id >> 1) & 1) as u8) << shift;
                    b |= (((id >> 2) & 1) as u8) << shift;
                    id >>= 3;
                }
                (label, [r, g, b])
            })
            .collect();
        Self { colormap }
    }

    pub fn color_of(&self, label: usize) -> Option<[u8; 3]> {
        self.colormap.get(&label).copied()
    }

    /// Reverse lookup of a color; first label wins on duplicates.
    pub fn label_of(&self, color: [u8; 3]) -> Option<usize> {
        self.colormap
            .iter()
            .find(|(_, c)| **c == color)
            .map(|(label, _)| *label)
    }
}

/// All category schemas of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    #[serde(default)]
    pub labels: LabelCategories,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masks: Option<MaskCategories>,
}

impl Categories {
    pub fn from_labels(labels: LabelCategories) -> Self {
        Self {
            labels,
            masks: None,
        }
    }

    pub fn with_masks(mut self, masks: MaskCategories) -> Self {
        self.masks = Some(masks);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.masks.is_none()
    }

    /// Fails with `LabelOutOfRange` if `label` is not a declared index.
    pub fn check_label(&self, label: usize) -> Result<()> {
        if label >= self.labels.len() {
            return Err(AnnosetError::LabelOutOfRange {
                label,
                bound: self.labels.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_label_is_rejected() {
        let mut labels = LabelCategories::from_names(["cat", "dog"]).expect("unique");
        assert_eq!(labels.index_of("dog"), Some(1));
        assert_eq!(labels.index_of("bird"), None);

        let err = labels.add("cat", None::<String>).unwrap_err();
        assert!(matches!(err, AnnosetError::DuplicateLabel(name) if name == "cat"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn deserialization_enforces_uniqueness() {
        let ok: LabelCategories =
            serde_json::from_str(r#"[{"name":"a"},{"name":"b","parent":"a"}]"#).expect("parse");
        assert_eq!(ok.get(1).and_then(|c| c.parent.as_deref()), Some("a"));
        assert_eq!(ok.index_of("b"), Some(1));

        let dup = serde_json::from_str::<LabelCategories>(r#"[{"name":"a"},{"name":"a"}]"#);
        assert!(dup.is_err());
    }

    #[test]
    fn voc_colormap_matches_reference_colors() {
        let masks = MaskCategories::voc_colormap(4);
        assert_eq!(masks.color_of(0), Some([0, 0, 0]));
        assert_eq!(masks.color_of(1), Some([128, 0, 0]));
        assert_eq!(masks.color_of(2), Some([0, 128, 0]));
        assert_eq!(masks.color_of(3), Some([128, 128, 0]));
        assert_eq!(masks.label_of([0, 128, 0]), Some(2));
    }

    #[test]
    fn check_label_bound() {
        let categories =
            Categories::from_labels(LabelCategories::from_names(["cat", "dog"]).unwrap());
        assert!(categories.check_label(1).is_ok());
        assert!(matches!(
            categories.check_label(2),
            Err(AnnosetError::LabelOutOfRange { label: 2, bound: 2 })
        ));
    }
}
