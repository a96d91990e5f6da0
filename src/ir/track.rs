//! Tracks: one object followed across video frames.

use super::annotation::{Annotation, AnnotationKind, Attributes};
use crate::error::{AnnosetError, Result};

/// The state of a track on one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackShape {
    pub frame: u32,
    /// The object left the frame at this point.
    pub outside: bool,
    /// The shape was placed by hand rather than interpolated.
    pub keyframe: bool,
    pub occluded: bool,
    pub z_order: i32,
    pub kind: AnnotationKind,
    pub attributes: Attributes,
}

/// An ordered sequence of per-frame shapes sharing one label and group.
///
/// Frame numbers are strictly increasing.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: u64,
    pub label: Option<usize>,
    pub group: u64,
    shapes: Vec<TrackShape>,
}

impl Track {
    pub fn new(id: u64, label: Option<usize>, group: u64) -> Self {
        Self {
            id,
            label,
            group,
            shapes: Vec::new(),
        }
    }

    /// Appends a shape; its frame must come after the last one.
    pub fn push(&mut self, shape: TrackShape) -> Result<()> {
        if let Some(last) = self.shapes.last() {
            if shape.frame <= last.frame {
                return Err(AnnosetError::MalformedAnnotation(format!(
                    "track {} has frame {} after frame {}; frames must strictly increase",
                    self.id, shape.frame, last.frame
                )));
            }
        }
        shape.kind.validate()?;
        self.shapes.push(shape);
        Ok(())
    }

    pub fn shapes(&self) -> &[TrackShape] {
        &self.shapes
    }

    /// Expands the track into one annotation per frame.
    ///
    /// Each annotation carries `track_id`, `outside`, `keyframe` and
    /// `occluded` attributes so the track can be reassembled later.
    /// Fails when the track id does not fit an integer attribute.
    pub fn frame_annotations(&self) -> Result<Vec<(u32, Annotation)>> {
        let track_id = i64::try_from(self.id).map_err(|_| {
            AnnosetError::MalformedAnnotation(format!("track id {} is out of range", self.id))
        })?;
        Ok(self
            .shapes
            .iter()
            .map(|shape| {
                let mut ann = Annotation::new(shape.kind.clone())
                    .with_group(self.group)
                    .with_z_order(shape.z_order);
                ann.label = self.label;
                ann.attributes = shape.attributes.clone();
                ann.attributes
                    .insert("track_id".to_string(), track_id.into());
                ann.attributes
                    .insert("outside".to_string(), shape.outside.into());
                ann.attributes
                    .insert("keyframe".to_string(), shape.keyframe.into());
                ann.attributes
                    .insert("occluded".to_string(), shape.occluded.into());
                (shape.frame, ann)
            })
            .collect())
    }
}
