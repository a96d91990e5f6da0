//! Annotations: one labeled shape, tag or caption attached to an item.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::{BBoxXYXY, Pixel};
use super::mask::RleMask;
use crate::error::{AnnosetError, Result};

/// Open-ended annotation/item attributes.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    /// Interprets a raw textual value the way annotation tools write them.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" | "True" => return AttrValue::Bool(true),
            "false" | "False" => return AttrValue::Bool(false),
            _ => {}
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return AttrValue::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return AttrValue::Float(value);
            }
        }
        AttrValue::Text(raw.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(value) => Some(*value),
            AttrValue::Int(0) => Some(false),
            AttrValue::Int(1) => Some(true),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Float(value) => write!(f, "{value}"),
            AttrValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

/// Discriminant of [`AnnotationKind`], handy for capability tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationType {
    Label,
    Bbox,
    Polygon,
    Polyline,
    Points,
    Mask,
    Caption,
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnnotationType::Label => "label",
            AnnotationType::Bbox => "bbox",
            AnnotationType::Polygon => "polygon",
            AnnotationType::Polyline => "polyline",
            AnnotationType::Points => "points",
            AnnotationType::Mask => "mask",
            AnnotationType::Caption => "caption",
        };
        f.write_str(name)
    }
}

/// Variant-specific payload of an annotation.
///
/// Coordinate lists are flat `x1, y1, x2, y2, ...` in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationKind {
    Label,
    Bbox {
        bbox: BBoxXYXY<Pixel>,
    },
    Polygon {
        points: Vec<f64>,
    },
    Polyline {
        points: Vec<f64>,
    },
    Points {
        points: Vec<f64>,
        /// Per-point visibility; empty means every point is visible.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        visibility: Vec<bool>,
    },
    Mask {
        rle: RleMask,
    },
    Caption {
        text: String,
    },
}

impl AnnotationKind {
    pub fn annotation_type(&self) -> AnnotationType {
        match self {
            AnnotationKind::Label => AnnotationType::Label,
            AnnotationKind::Bbox { .. } => AnnotationType::Bbox,
            AnnotationKind::Polygon { .. } => AnnotationType::Polygon,
            AnnotationKind::Polyline { .. } => AnnotationType::Polyline,
            AnnotationKind::Points { .. } => AnnotationType::Points,
            AnnotationKind::Mask { .. } => AnnotationType::Mask,
            AnnotationKind::Caption { .. } => AnnotationType::Caption,
        }
    }

    /// Builds a geometric variant from a flat coordinate list, checking arity.
    pub fn from_coords(ty: AnnotationType, coords: Vec<f64>) -> Result<Self> {
        let kind = match ty {
            AnnotationType::Bbox => {
                let [xtl, ytl, xbr, ybr] = <[f64; 4]>::try_from(coords.as_slice())
                    .map_err(|_| {
                        AnnosetError::MalformedAnnotation(format!(
                            "bbox needs exactly 4 coordinates, got {}",
                            coords.len()
                        ))
                    })?;
                AnnotationKind::Bbox {
                    bbox: BBoxXYXY::from_xyxy(xtl, ytl, xbr, ybr),
                }
            }
            AnnotationType::Polygon => AnnotationKind::Polygon { points: coords },
            AnnotationType::Polyline => AnnotationKind::Polyline { points: coords },
            AnnotationType::Points => AnnotationKind::Points {
                points: coords,
                visibility: Vec::new(),
            },
            other => {
                return Err(AnnosetError::MalformedAnnotation(format!(
                    "{other} annotations are not built from coordinates"
                )))
            }
        };
        kind.validate()?;
        Ok(kind)
    }

    /// Checks the arity rules of the variant.
    pub fn validate(&self) -> Result<()> {
        match self {
            AnnotationKind::Polygon { points } => check_points("polygon", points, 3),
            AnnotationKind::Polyline { points } => check_points("polyline", points, 2),
            AnnotationKind::Points { points, visibility } => {
                check_points("points", points, 1)?;
                if !visibility.is_empty() && visibility.len() * 2 != points.len() {
                    return Err(AnnosetError::MalformedAnnotation(format!(
                        "points has {} visibility flag(s) for {} point(s)",
                        visibility.len(),
                        points.len() / 2
                    )));
                }
                Ok(())
            }
            AnnotationKind::Mask { rle } => rle.validate(),
            AnnotationKind::Label
            | AnnotationKind::Bbox { .. }
            | AnnotationKind::Caption { .. } => Ok(()),
        }
    }
}

fn check_points(name: &str, points: &[f64], min_points: usize) -> Result<()> {
    if points.len() % 2 != 0 {
        return Err(AnnosetError::MalformedAnnotation(format!(
            "{name} has an odd number of coordinates ({})",
            points.len()
        )));
    }
    if points.len() < min_points * 2 {
        return Err(AnnosetError::MalformedAnnotation(format!(
            "{name} needs at least {min_points} point(s), got {}",
            points.len() / 2
        )));
    }
    Ok(())
}

/// One annotation of a dataset item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// External identifier, if the source format has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Index into the dataset's label categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<usize>,

    /// Group id; annotations sharing a non-zero group form one object.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub group: u64,

    /// Paint order for overlapping shapes.
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub z_order: i32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,

    #[serde(flatten)]
    pub kind: AnnotationKind,
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

impl Annotation {
    /// Wraps an already validated kind with default common fields.
    pub fn new(kind: AnnotationKind) -> Self {
        Self {
            id: None,
            label: None,
            group: 0,
            z_order: 0,
            attributes: Attributes::new(),
            kind,
        }
    }

    /// An image-level label (tag).
    pub fn tag(label: usize) -> Self {
        Self::new(AnnotationKind::Label).with_label(label)
    }

    pub fn bbox(xtl: f64, ytl: f64, xbr: f64, ybr: f64) -> Self {
        Self::new(AnnotationKind::Bbox {
            bbox: BBoxXYXY::from_xyxy(xtl, ytl, xbr, ybr),
        })
    }

    /// Builds a geometric annotation from a flat coordinate list.
    pub fn from_coords(ty: AnnotationType, coords: Vec<f64>) -> Result<Self> {
        Ok(Self::new(AnnotationKind::from_coords(ty, coords)?))
    }

    pub fn polygon(points: Vec<f64>) -> Result<Self> {
        Self::from_coords(AnnotationType::Polygon, points)
    }

    pub fn polyline(points: Vec<f64>) -> Result<Self> {
        Self::from_coords(AnnotationType::Polyline, points)
    }

    pub fn points(points: Vec<f64>) -> Result<Self> {
        Self::from_coords(AnnotationType::Points, points)
    }

    pub fn mask(rle: RleMask) -> Self {
        Self::new(AnnotationKind::Mask { rle })
    }

    pub fn caption(text: impl Into<String>) -> Self {
        Self::new(AnnotationKind::Caption { text: text.into() })
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_label(mut self, label: usize) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_group(mut self, group: u64) -> Self {
        self.group = group;
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn annotation_type(&self) -> AnnotationType {
        self.kind.annotation_type()
    }

    /// Bounding box of the shape; `None` for labels and captions.
    pub fn bounding_box(&self) -> Option<BBoxXYXY<Pixel>> {
        match &self.kind {
            AnnotationKind::Bbox { bbox } => Some(*bbox),
            AnnotationKind::Polygon { points }
            | AnnotationKind::Polyline { points }
            | AnnotationKind::Points { points, .. } => BBoxXYXY::from_points(points),
            AnnotationKind::Mask { rle } => rle.bbox(),
            AnnotationKind::Label | AnnotationKind::Caption { .. } => None,
        }
    }

    /// Checks the label index against the size of the label schema.
    pub fn check_label(&self, bound: usize) -> Result<()> {
        match self.label {
            Some(label) if label >= bound => Err(AnnosetError::LabelOutOfRange { label, bound }),
            _ => Ok(()),
        }
    }

    /// Reads a boolean attribute, treating absence as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_requires_four_coordinates() {
        let err = Annotation::from_coords(AnnotationType::Bbox, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, AnnosetError::MalformedAnnotation(_)));

        let ann = Annotation::from_coords(AnnotationType::Bbox, vec![1.0, 2.0, 3.0, 4.0])
            .expect("valid bbox");
        assert_eq!(
            ann.bounding_box().map(|b| b.coords()),
            Some([1.0, 2.0, 3.0, 4.0])
        );
    }

    #[test]
    fn polygon_rejects_odd_length() {
        let err = Annotation::polygon(vec![0.0, 0.0, 1.0, 0.0, 1.0]).unwrap_err();
        assert!(matches!(err, AnnosetError::MalformedAnnotation(_)));
    }

    #[test]
    fn polygon_needs_three_points() {
        assert!(Annotation::polygon(vec![0.0, 0.0, 1.0, 1.0]).is_err());
        assert!(Annotation::polygon(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0]).is_ok());
    }

    #[test]
    fn check_label_is_strict_upper_bound() {
        let ann = Annotation::tag(2);
        assert!(ann.check_label(3).is_ok());
        match ann.check_label(2).unwrap_err() {
            AnnosetError::LabelOutOfRange { label, bound } => {
                assert_eq!((label, bound), (2, 2));
            }
            other => panic!("expected LabelOutOfRange, got {other:?}"),
        }
        assert!(Annotation::caption("unlabeled").check_label(0).is_ok());
    }

    #[test]
    fn attr_value_parsing() {
        assert_eq!(AttrValue::parse("true"), AttrValue::Bool(true));
        assert_eq!(AttrValue::parse("12"), AttrValue::Int(12));
        assert_eq!(AttrValue::parse("0.5"), AttrValue::Float(0.5));
        assert_eq!(AttrValue::parse("side"), AttrValue::Text("side".into()));
    }

    #[test]
    fn json_shape_is_flat_and_tagged() {
        let ann = Annotation::bbox(1.0, 2.0, 3.0, 4.0)
            .with_label(0)
            .with_group(7)
            .with_attribute("occluded", true);
        let json = serde_json::to_value(&ann).expect("serialize");
        assert_eq!(json["type"], "bbox");
        assert_eq!(json["bbox"][2], 3.0);
        assert_eq!(json["group"], 7);
        assert!(json.get("z_order").is_none());

        let restored: Annotation = serde_json::from_value(json).expect("deserialize");
        assert_eq!(restored, ann);
    }
}
