//! CVAT XML format.
//!
//! # Layout
//!
//! ```text
//! <root>/<subset>.xml
//! <root>/images/<name>
//! ```
//!
//! Each file has an `<annotations>` root holding an optional
//! `<meta><task><labels>` schema, one `<image>` per frame and any number of
//! `<track>` elements. Image shapes are `<box>`, `<polygon>`, `<polyline>`,
//! `<points>` and `<tag>`; point lists are written `x1,y1;x2,y2;...`.
//!
//! Track shapes are attached to the item of their frame as ordinary
//! annotations carrying `track_id`, `outside`, `keyframe` and `occluded`
//! attributes, so a track survives a round trip through any format that
//! keeps attributes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};

use super::common::{child_element, child_elements, required_child_text, xml_escape};
use crate::converter::{save_item_image, skip_unsupported, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{file_stem, find_files, require_sources, Importer};
use crate::ir::{
    Annotation, AnnotationKind, AttrValue, Attributes, BBoxXYXY, Categories, DatasetItem, Image,
    LabelCategories, Track, TrackShape,
};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "cvat";

const IMAGES_DIR: &str = "images";

/// Item attribute holding the CVAT frame number.
pub const FRAME_ATTR: &str = "frame";

/// Annotation attributes with a dedicated XML attribute.
const TRACK_ID: &str = "track_id";
const OUTSIDE: &str = "outside";
const KEYFRAME: &str = "keyframe";
const OCCLUDED: &str = "occluded";
const RESERVED_ATTRS: [&str; 4] = [TRACK_ID, OUTSIDE, KEYFRAME, OCCLUDED];

const SHAPE_TAGS: [&str; 5] = ["box", "polygon", "polyline", "points", "tag"];

// ============================================================================
// Extractor
// ============================================================================

pub struct CvatExtractor {
    subset: String,
    categories: Categories,
    items: Vec<DatasetItem>,
}

impl CvatExtractor {
    /// Reads `<subset>.xml`; the subset is the file stem.
    pub fn open(path: &Path, _options: &SourceOptions) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .map_err(|err| AnnosetError::unreadable(path, err.to_string()))?;
        let subset = file_stem(path)
            .ok_or_else(|| AnnosetError::unreadable(path, "annotation file has no name"))?
            .to_string();
        let images_dir = path
            .parent()
            .map(|dir| dir.join(IMAGES_DIR))
            .unwrap_or_else(|| PathBuf::from(IMAGES_DIR));

        let parsed = parse_cvat_xml(&xml, path)?;
        let items = parsed
            .items
            .into_iter()
            .map(|frame| frame.into_item(&subset, &images_dir))
            .collect();
        Ok(Self {
            subset,
            categories: Categories::from_labels(parsed.labels),
            items,
        })
    }
}

impl Extractor for CvatExtractor {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(self.items.iter().cloned().map(Ok))
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        Some([self.subset.clone()].into())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

/// A parsed CVAT document.
#[derive(Debug)]
pub struct ParsedCvat {
    pub labels: LabelCategories,
    pub items: Vec<ParsedFrame>,
}

/// One frame: an `<image>` element or a frame only tracks refer to.
#[derive(Debug)]
pub struct ParsedFrame {
    pub frame: u32,
    pub name: Option<String>,
    pub size: Option<(u32, u32)>,
    pub annotations: Vec<Annotation>,
}

impl ParsedFrame {
    fn into_item(self, subset: &str, images_dir: &Path) -> DatasetItem {
        let id = match &self.name {
            Some(name) => Path::new(name)
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/"),
            None => format!("frame_{:06}", self.frame),
        };
        let mut item = DatasetItem::new(id)
            .with_subset(subset)
            .with_attribute(FRAME_ATTR, i64::from(self.frame))
            .with_annotations(self.annotations);
        if let Some(name) = self.name {
            let mut image = Image::from_path(images_dir.join(name));
            if let Some((width, height)) = self.size {
                image = image.with_size(width, height);
            }
            item.image = Some(image);
        }
        item
    }
}

/// Parses a CVAT annotation document.
pub fn parse_cvat_xml(xml: &str, path: &Path) -> Result<ParsedCvat> {
    let document =
        Document::parse(xml).map_err(|source| AnnosetError::unreadable(path, source.to_string()))?;
    let root = document.root_element();
    if root.tag_name().name() != "annotations" {
        return Err(AnnosetError::unreadable(
            path,
            "missing <annotations> root element",
        ));
    }

    let mut labels = LabelCategories::new();
    let declared = parse_meta_labels(root, path, &mut labels)?;
    let mut resolver = LabelResolver {
        labels: &mut labels,
        declared,
        path,
    };

    let mut frames: BTreeMap<u32, usize> = BTreeMap::new();
    let mut items = Vec::new();
    for (position, image) in child_elements(root, "image").enumerate() {
        let frame = match image.attribute("id") {
            Some(_) => parse_attr::<u32>(image, "id", path, "<image>")?,
            None => u32::try_from(position)
                .map_err(|_| AnnosetError::unreadable(path, "too many <image> elements"))?,
        };
        let name = required_attr(image, "name", path, "<image>")?.to_string();
        let size = match (image.attribute("width"), image.attribute("height")) {
            (Some(_), Some(_)) => Some((
                parse_attr::<u32>(image, "width", path, "<image>")?,
                parse_attr::<u32>(image, "height", path, "<image>")?,
            )),
            _ => None,
        };

        let mut annotations = Vec::new();
        for shape in image.children().filter(Node::is_element) {
            let tag = shape.tag_name().name();
            if !SHAPE_TAGS.contains(&tag) {
                log::debug!("cvat: ignoring <{tag}> in image '{name}'");
                continue;
            }
            annotations.push(parse_image_shape(shape, path, &mut resolver)?);
        }

        if frames.insert(frame, items.len()).is_some() {
            return Err(AnnosetError::unreadable(
                path,
                format!("frame {frame} appears in multiple <image> elements"),
            ));
        }
        items.push(ParsedFrame {
            frame,
            name: Some(name),
            size,
            annotations,
        });
    }

    for track_node in child_elements(root, "track") {
        let track = parse_track(track_node, path, &mut resolver)?;
        for (frame, ann) in track.frame_annotations()? {
            let index = *frames.entry(frame).or_insert_with(|| {
                items.push(ParsedFrame {
                    frame,
                    name: None,
                    size: None,
                    annotations: Vec::new(),
                });
                items.len() - 1
            });
            items[index].annotations.push(ann);
        }
    }

    Ok(ParsedCvat { labels, items })
}

/// Maps label names to indices, enforcing the `<meta>` schema when present.
struct LabelResolver<'a> {
    labels: &'a mut LabelCategories,
    declared: bool,
    path: &'a Path,
}

impl LabelResolver<'_> {
    fn resolve(&mut self, name: &str, context: &str) -> Result<usize> {
        if self.declared {
            return self.labels.index_of(name).ok_or_else(|| {
                AnnosetError::unreadable(
                    self.path,
                    format!("{context} references label '{name}' not declared in <meta>"),
                )
            });
        }
        Ok(self.labels.find_or_add(name))
    }
}

/// Fills `labels` from `<meta><task|project><labels>`; returns whether a
/// schema was found.
fn parse_meta_labels(
    root: Node<'_, '_>,
    path: &Path,
    labels: &mut LabelCategories,
) -> Result<bool> {
    let Some(meta) = child_element(root, "meta") else {
        return Ok(false);
    };
    let Some(labels_node) = child_element(meta, "task")
        .or_else(|| child_element(meta, "project"))
        .and_then(|owner| child_element(owner, "labels"))
    else {
        return Ok(false);
    };

    for label_node in child_elements(labels_node, "label") {
        let name = required_child_text(label_node, "name", path, "<label>")?;
        let index = labels.add(name, None::<String>)?;
        if let Some(attributes) = child_element(label_node, "attributes") {
            for attr in child_elements(attributes, "attribute") {
                let attr_name = required_child_text(attr, "name", path, "<attribute>")?;
                labels.add_attribute(index, attr_name)?;
            }
        }
    }
    Ok(true)
}

fn parse_image_shape(
    node: Node<'_, '_>,
    path: &Path,
    resolver: &mut LabelResolver<'_>,
) -> Result<Annotation> {
    let tag = node.tag_name().name();
    let context = format!("<{tag}>");
    let label_name = required_attr(node, "label", path, &context)?;
    let label = resolver.resolve(label_name, &context)?;

    let mut ann = Annotation::new(parse_geometry(node, path)?).with_label(label);
    ann.group = optional_attr::<u64>(node, "group_id", path, &context)?.unwrap_or(0);
    ann.z_order = optional_attr::<i32>(node, "z_order", path, &context)?.unwrap_or(0);
    ann.attributes = parse_shape_attributes(node, path)?;
    if parse_flag(node, OCCLUDED, path, &context)?.unwrap_or(false) {
        ann.attributes.insert(OCCLUDED.to_string(), AttrValue::Bool(true));
    }
    Ok(ann)
}

fn parse_track(node: Node<'_, '_>, path: &Path, resolver: &mut LabelResolver<'_>) -> Result<Track> {
    let id = parse_attr::<u64>(node, "id", path, "<track>")?;
    let label_name = required_attr(node, "label", path, "<track>")?;
    let label = resolver.resolve(label_name, "<track>")?;
    let group = optional_attr::<u64>(node, "group_id", path, "<track>")?.unwrap_or(0);

    let mut track = Track::new(id, Some(label), group);
    for shape in node.children().filter(Node::is_element) {
        let tag = shape.tag_name().name();
        if !SHAPE_TAGS.contains(&tag) || tag == "tag" {
            log::debug!("cvat: ignoring <{tag}> in track {id}");
            continue;
        }
        let context = format!("<{tag}> in track {id}");
        track.push(TrackShape {
            frame: parse_attr::<u32>(shape, "frame", path, &context)?,
            outside: parse_flag(shape, OUTSIDE, path, &context)?.unwrap_or(false),
            keyframe: parse_flag(shape, KEYFRAME, path, &context)?.unwrap_or(false),
            occluded: parse_flag(shape, OCCLUDED, path, &context)?.unwrap_or(false),
            z_order: optional_attr::<i32>(shape, "z_order", path, &context)?.unwrap_or(0),
            kind: parse_geometry(shape, path)?,
            attributes: parse_shape_attributes(shape, path)?,
        })?;
    }
    Ok(track)
}

fn parse_geometry(node: Node<'_, '_>, path: &Path) -> Result<AnnotationKind> {
    let tag = node.tag_name().name();
    let context = format!("<{tag}>");
    let kind = match tag {
        "box" => AnnotationKind::Bbox {
            bbox: BBoxXYXY::from_xyxy(
                parse_attr(node, "xtl", path, &context)?,
                parse_attr(node, "ytl", path, &context)?,
                parse_attr(node, "xbr", path, &context)?,
                parse_attr(node, "ybr", path, &context)?,
            ),
        },
        "polygon" | "polyline" | "points" => {
            let raw = required_attr(node, "points", path, &context)?;
            let points = parse_points(raw).ok_or_else(|| {
                AnnosetError::unreadable(
                    path,
                    format!("invalid points '{raw}' in {context}; expected 'x,y;x,y;...'"),
                )
            })?;
            match tag {
                "polygon" => AnnotationKind::Polygon { points },
                "polyline" => AnnotationKind::Polyline { points },
                _ => AnnotationKind::Points {
                    points,
                    visibility: Vec::new(),
                },
            }
        }
        _ => AnnotationKind::Label,
    };
    kind.validate()?;
    Ok(kind)
}

/// Parses `x1,y1;x2,y2;...` into a flat coordinate list.
pub fn parse_points(raw: &str) -> Option<Vec<f64>> {
    let mut points = Vec::new();
    for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (x, y) = pair.split_once(',')?;
        points.push(x.trim().parse().ok()?);
        points.push(y.trim().parse().ok()?);
    }
    Some(points)
}

fn format_points(points: &[f64]) -> String {
    points
        .chunks_exact(2)
        .map(|pair| format!("{},{}", pair[0], pair[1]))
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_shape_attributes(node: Node<'_, '_>, path: &Path) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for attr in child_elements(node, "attribute") {
        let name = required_attr(attr, "name", path, "<attribute>")?.trim();
        if name.is_empty() {
            return Err(AnnosetError::unreadable(path, "<attribute> has empty name"));
        }
        let value = attr.text().map(str::trim).unwrap_or("");
        attributes.insert(name.to_string(), AttrValue::parse(value));
    }
    Ok(attributes)
}

fn required_attr<'a>(
    node: Node<'a, '_>,
    attr: &str,
    path: &Path,
    context: &str,
) -> Result<&'a str> {
    node.attribute(attr).ok_or_else(|| {
        AnnosetError::unreadable(path, format!("missing '{attr}' attribute in {context}"))
    })
}

fn parse_attr<T: FromStr>(node: Node<'_, '_>, attr: &str, path: &Path, context: &str) -> Result<T> {
    let raw = required_attr(node, attr, path, context)?;
    raw.trim().parse::<T>().map_err(|_| {
        AnnosetError::unreadable(path, format!("invalid {attr}='{raw}' in {context}"))
    })
}

fn optional_attr<T: FromStr>(
    node: Node<'_, '_>,
    attr: &str,
    path: &Path,
    context: &str,
) -> Result<Option<T>> {
    match node.attribute(attr).map(str::trim).filter(|v| !v.is_empty()) {
        Some(_) => parse_attr(node, attr, path, context).map(Some),
        None => Ok(None),
    }
}

/// Reads a `"0"`/`"1"` flag; anything else is an error naming the attribute.
fn parse_flag(node: Node<'_, '_>, attr: &str, path: &Path, context: &str) -> Result<Option<bool>> {
    match node.attribute(attr) {
        None => Ok(None),
        Some("0") => Ok(Some(false)),
        Some("1") => Ok(Some(true)),
        Some(raw) => Err(AnnosetError::unreadable(
            path,
            format!("invalid {attr}='{raw}' in {context}; expected '0' or '1'"),
        )),
    }
}

/// Parses a CVAT document held in memory; used by fuzzing and benches.
#[doc(hidden)]
pub fn parse_cvat_slice(bytes: &[u8]) -> Result<usize> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|err| AnnosetError::unreadable("<memory>", err.to_string()))?;
    Ok(parse_cvat_xml(xml, Path::new("<memory>"))?.items.len())
}

// ============================================================================
// Importer
// ============================================================================

pub struct CvatImporter;

impl Importer for CvatImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let mut sources = Vec::new();
        for path in find_files(root, &["xml"], 1)? {
            if !has_annotations_root(&path) {
                continue;
            }
            if let Some(subset) = file_stem(&path) {
                sources.push(Source::new(subset, FORMAT, path.clone()));
            }
        }
        require_sources(FORMAT, root, sources)
    }
}

fn has_annotations_root(path: &Path) -> bool {
    let Ok(xml) = fs::read_to_string(path) else {
        return false;
    };
    Document::parse(&xml)
        .map(|doc| doc.root_element().tag_name().name() == "annotations")
        .unwrap_or(false)
}

// ============================================================================
// Converter
// ============================================================================

pub struct CvatConverter;

impl Converter for CvatConverter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()> {
        fs::create_dir_all(save_dir)?;
        let labels = &extractor.categories().labels;
        let images_dir = save_dir.join(IMAGES_DIR);

        let mut subsets: BTreeMap<String, Vec<DatasetItem>> = BTreeMap::new();
        for item in extractor.iter() {
            let item = item?;
            subsets.entry(item.subset.clone()).or_default().push(item);
        }

        for (subset, items) in &subsets {
            let xml = build_cvat_xml(items, labels, &images_dir, options)?;
            let path = save_dir.join(format!("{subset}.xml"));
            fs::write(&path, xml)?;
            log::info!("wrote {}", path.display());
        }
        Ok(())
    }
}

struct TrackOut<'a> {
    label: usize,
    group: u64,
    shapes: Vec<(u32, &'a Annotation)>,
}

fn build_cvat_xml(
    items: &[DatasetItem],
    labels: &LabelCategories,
    images_dir: &Path,
    options: &ConvertOptions,
) -> Result<String> {
    let mut xml = String::new();
    writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").expect("write to string");
    writeln!(xml, "<annotations>").expect("write to string");
    writeln!(xml, "  <version>1.1</version>").expect("write to string");
    writeln!(xml, "  <meta>").expect("write to string");
    writeln!(xml, "    <task>").expect("write to string");
    writeln!(xml, "      <size>{}</size>", items.len()).expect("write to string");
    writeln!(xml, "      <mode>annotation</mode>").expect("write to string");
    writeln!(xml, "      <labels>").expect("write to string");
    for label in labels.iter() {
        writeln!(xml, "        <label>").expect("write to string");
        writeln!(xml, "          <name>{}</name>", xml_escape(&label.name))
            .expect("write to string");
        if !label.attributes.is_empty() {
            writeln!(xml, "          <attributes>").expect("write to string");
            for attr in &label.attributes {
                writeln!(
                    xml,
                    "            <attribute><name>{}</name></attribute>",
                    xml_escape(attr)
                )
                .expect("write to string");
            }
            writeln!(xml, "          </attributes>").expect("write to string");
        }
        writeln!(xml, "        </label>").expect("write to string");
    }
    writeln!(xml, "      </labels>").expect("write to string");
    writeln!(xml, "    </task>").expect("write to string");
    writeln!(xml, "  </meta>").expect("write to string");

    let mut tracks: BTreeMap<i64, TrackOut<'_>> = BTreeMap::new();
    let mut used_frames = BTreeSet::new();
    for (position, item) in items.iter().enumerate() {
        let frame = item
            .attributes
            .get(FRAME_ATTR)
            .and_then(AttrValue::as_i64)
            .and_then(|frame| u32::try_from(frame).ok())
            .filter(|frame| !used_frames.contains(frame))
            .unwrap_or_else(|| next_free_frame(&used_frames, position));
        used_frames.insert(frame);

        let name = save_item_image(item, images_dir, options, "jpg")?;
        let size = match &item.image {
            Some(image) => image.read_size()?,
            None => None,
        };
        write!(xml, "  <image id=\"{frame}\" name=\"{}\"", xml_escape(&name))
            .expect("write to string");
        if let Some((width, height)) = size {
            write!(xml, " width=\"{width}\" height=\"{height}\"").expect("write to string");
        }
        writeln!(xml, ">").expect("write to string");

        for ann in &item.annotations {
            let (Some(tag), Some(label)) = (shape_tag(&ann.kind), ann.label) else {
                skip_unsupported(FORMAT, item, ann);
                continue;
            };
            if let Some(track_id) = ann.attributes.get(TRACK_ID).and_then(AttrValue::as_i64) {
                if tag != "tag" {
                    tracks
                        .entry(track_id)
                        .or_insert_with(|| TrackOut {
                            label,
                            group: ann.group,
                            shapes: Vec::new(),
                        })
                        .shapes
                        .push((frame, ann));
                    continue;
                }
            }
            let Some(label_name) = labels.name(label) else {
                skip_unsupported(FORMAT, item, ann);
                continue;
            };

            write!(xml, "    <{tag} label=\"{}\"", xml_escape(label_name))
                .expect("write to string");
            if tag != "tag" {
                write!(
                    xml,
                    " occluded=\"{}\"{} z_order=\"{}\"",
                    u8::from(ann.flag(OCCLUDED)),
                    geometry_attrs(&ann.kind),
                    ann.z_order
                )
                .expect("write to string");
            }
            if ann.group != 0 {
                write!(xml, " group_id=\"{}\"", ann.group).expect("write to string");
            }
            writeln!(xml, ">").expect("write to string");
            write_attributes(&mut xml, &ann.attributes, "      ");
            writeln!(xml, "    </{tag}>").expect("write to string");
        }
        writeln!(xml, "  </image>").expect("write to string");
    }

    for (track_id, track) in &mut tracks {
        let Some(label_name) = labels.name(track.label) else {
            continue;
        };
        track.shapes.sort_by_key(|(frame, _)| *frame);
        write!(
            xml,
            "  <track id=\"{track_id}\" label=\"{}\"",
            xml_escape(label_name)
        )
        .expect("write to string");
        if track.group != 0 {
            write!(xml, " group_id=\"{}\"", track.group).expect("write to string");
        }
        writeln!(xml, ">").expect("write to string");
        for (frame, ann) in &track.shapes {
            let Some(tag) = shape_tag(&ann.kind) else {
                continue;
            };
            writeln!(
                xml,
                "    <{tag} frame=\"{frame}\" outside=\"{}\" occluded=\"{}\" keyframe=\"{}\"{} z_order=\"{}\">",
                u8::from(ann.flag(OUTSIDE)),
                u8::from(ann.flag(OCCLUDED)),
                u8::from(ann.flag(KEYFRAME)),
                geometry_attrs(&ann.kind),
                ann.z_order
            )
            .expect("write to string");
            write_attributes(&mut xml, &ann.attributes, "      ");
            writeln!(xml, "    </{tag}>").expect("write to string");
        }
        writeln!(xml, "  </track>").expect("write to string");
    }

    writeln!(xml, "</annotations>").expect("write to string");
    Ok(xml)
}

fn next_free_frame(used: &BTreeSet<u32>, position: usize) -> u32 {
    let mut frame = u32::try_from(position).unwrap_or(u32::MAX);
    while used.contains(&frame) {
        frame = frame.wrapping_add(1);
    }
    frame
}

fn shape_tag(kind: &AnnotationKind) -> Option<&'static str> {
    match kind {
        AnnotationKind::Bbox { .. } => Some("box"),
        AnnotationKind::Polygon { .. } => Some("polygon"),
        AnnotationKind::Polyline { .. } => Some("polyline"),
        AnnotationKind::Points { .. } => Some("points"),
        AnnotationKind::Label => Some("tag"),
        AnnotationKind::Mask { .. } | AnnotationKind::Caption { .. } => None,
    }
}

fn geometry_attrs(kind: &AnnotationKind) -> String {
    match kind {
        AnnotationKind::Bbox { bbox } => format!(
            " xtl=\"{}\" ytl=\"{}\" xbr=\"{}\" ybr=\"{}\"",
            bbox.xmin(),
            bbox.ymin(),
            bbox.xmax(),
            bbox.ymax()
        ),
        AnnotationKind::Polygon { points }
        | AnnotationKind::Polyline { points }
        | AnnotationKind::Points { points, .. } => {
            format!(" points=\"{}\"", format_points(points))
        }
        _ => String::new(),
    }
}

fn write_attributes(xml: &mut String, attributes: &Attributes, indent: &str) {
    for (key, value) in attributes {
        if RESERVED_ATTRS.contains(&key.as_str()) {
            continue;
        }
        writeln!(
            xml,
            "{indent}<attribute name=\"{}\">{}</attribute>",
            xml_escape(key),
            xml_escape(&value.to_string())
        )
        .expect("write to string");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<annotations>
  <version>1.1</version>
  <meta><task><labels>
    <label><name>car</name><attributes><attribute><name>color</name></attribute></attributes></label>
    <label><name>person</name></label>
  </labels></task></meta>
  <image id="0" name="frame0.jpg" width="640" height="480">
    <box label="car" occluded="1" xtl="10" ytl="20" xbr="110" ybr="220" z_order="2" group_id="3">
      <attribute name="color">red</attribute>
    </box>
    <polygon label="person" occluded="0" points="1,2;3,4;5,6" />
    <tag label="person" />
  </image>
  <image id="1" name="frame1.jpg" width="640" height="480" />
  <track id="7" label="person">
    <box frame="0" outside="0" occluded="0" keyframe="1" xtl="1" ytl="1" xbr="5" ybr="5" z_order="0" />
    <box frame="1" outside="1" occluded="0" keyframe="1" xtl="2" ytl="2" xbr="6" ybr="6" z_order="0" />
  </track>
</annotations>"#;

    #[test]
    fn parses_shapes_and_tracks() {
        let parsed = parse_cvat_xml(SAMPLE, Path::new("a.xml")).expect("parse");
        assert_eq!(parsed.labels.len(), 2);
        assert!(parsed.labels.get(0).unwrap().attributes.contains("color"));
        assert_eq!(parsed.items.len(), 2);

        let first = &parsed.items[0];
        assert_eq!(first.size, Some((640, 480)));
        assert_eq!(first.annotations.len(), 4);

        let bbox = &first.annotations[0];
        assert_eq!(bbox.label, Some(0));
        assert_eq!(bbox.group, 3);
        assert_eq!(bbox.z_order, 2);
        assert!(bbox.flag("occluded"));
        assert_eq!(bbox.attributes.get("color"), Some(&AttrValue::Text("red".into())));

        let polygon = &first.annotations[1];
        assert_eq!(polygon.group, 0);
        assert_eq!(
            polygon.kind,
            AnnotationKind::Polygon {
                points: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
            }
        );
        assert_eq!(first.annotations[2].kind, AnnotationKind::Label);

        let tracked = &parsed.items[1].annotations[0];
        assert!(tracked.flag("outside"));
        assert_eq!(tracked.attributes.get("track_id"), Some(&AttrValue::Int(7)));
    }

    #[test]
    fn invalid_outside_flag_names_the_attribute() {
        let xml = SAMPLE.replace(r#"frame="1" outside="1""#, r#"frame="1" outside="2""#);
        match parse_cvat_xml(&xml, Path::new("a.xml")).unwrap_err() {
            AnnosetError::UnreadableSource { message, .. } => {
                assert!(message.contains("outside"), "{message}")
            }
            other => panic!("expected UnreadableSource, got {other:?}"),
        }
    }

    #[test]
    fn track_frames_out_of_order_are_rejected() {
        let xml = SAMPLE
            .replace(r#"<box frame="0""#, r#"<box frame="9""#)
            .replace(r#"<box frame="1""#, r#"<box frame="0""#);
        assert!(matches!(
            parse_cvat_xml(&xml, Path::new("a.xml")),
            Err(AnnosetError::MalformedAnnotation(_))
        ));
    }

    #[test]
    fn undeclared_label_is_rejected_when_meta_present() {
        let xml = SAMPLE.replace(r#"<tag label="person" />"#, r#"<tag label="dog" />"#);
        assert!(parse_cvat_xml(&xml, Path::new("a.xml")).is_err());
    }

    #[test]
    fn labels_are_collected_without_meta() {
        let xml = r#"<annotations><image id="0" name="a.png"><tag label="b"/><tag label="a"/></image></annotations>"#;
        let parsed = parse_cvat_xml(xml, Path::new("a.xml")).expect("parse");
        assert_eq!(parsed.labels.index_of("b"), Some(0));
        assert_eq!(parsed.labels.index_of("a"), Some(1));
    }

    #[test]
    fn points_parse_and_format() {
        assert_eq!(parse_points("1,2;3.5,4"), Some(vec![1.0, 2.0, 3.5, 4.0]));
        assert_eq!(parse_points("1,2;3"), None);
        assert_eq!(format_points(&[1.0, 2.0, 3.5, 4.0]), "1,2;3.5,4");
    }

    #[test]
    fn roundtrip_keeps_tracks_and_attributes() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("train.xml");
        fs::write(&path, SAMPLE).expect("write");
        let source = CvatExtractor::open(&path, &SourceOptions::new()).expect("open");

        let out = temp.path().join("out");
        CvatConverter
            .convert(&source, &out, &ConvertOptions::default())
            .expect("convert");

        let sources = CvatImporter.detect(&out).expect("detect");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "train");
        let back = CvatExtractor::open(&sources[0].url, &sources[0].options).expect("reopen");

        assert_eq!(back.categories(), source.categories());
        let before = source.collect_items().expect("items");
        let after = back.collect_items().expect("items");
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.annotations, b.annotations);
        }
    }
}
