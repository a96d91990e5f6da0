//! PASCAL VOC format.
//!
//! # Layout
//!
//! ```text
//! <root>/Annotations/<id>.xml
//! <root>/ImageSets/Main/<subset>.txt
//! <root>/JPEGImages/<id>.jpg
//! <root>/SegmentationClass/<id>.png      (optional)
//! <root>/labelmap.txt                    (optional)
//! ```
//!
//! Boxes are `xmin, ymin, xmax, ymax` in pixels. Class masks are color
//! images mapped back to labels through the colormap in `labelmap.txt`, or
//! the standard VOC colormap when there is none. Annotation XML is parsed
//! one item at a time during iteration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use super::common::{
    child_element, child_elements, find_image, id_from_path, optional_child_text,
    parse_required_f64, required_child_element, required_child_text, subset_option, xml_escape,
    SUBSET_OPTION,
};
use crate::converter::{save_image, skip_unsupported, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{file_stem, find_files, require_sources, Importer};
use crate::ir::{
    Annotation, AnnotationKind, AttrValue, Attributes, BBoxXYXY, Categories, DatasetItem, Image,
    LabelCategories, MaskCategories, Pixel, RleMask, DEFAULT_SUBSET,
};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "voc";

const ANNOTATIONS_DIR: &str = "Annotations";
const IMAGES_DIR: &str = "JPEGImages";
const SEGMENTATION_DIR: &str = "SegmentationClass";
const LABELMAP_FILE: &str = "labelmap.txt";
const MAIN_SETS: [&str; 2] = ["ImageSets", "Main"];

/// Object attributes with a dedicated VOC element.
const BOOL_ATTRS: [&str; 3] = ["truncated", "difficult", "occluded"];

/// The 20 VOC classes plus background.
pub const VOC_LABELS: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
];

fn main_sets_dir(root: &Path) -> PathBuf {
    MAIN_SETS.iter().fold(root.to_path_buf(), |dir, part| dir.join(part))
}

// ============================================================================
// Label map
// ============================================================================

/// Reads `labelmap.txt` (`name:r,g,b:parts:actions`) or falls back to the
/// standard VOC labels.
pub fn load_labelmap(root: &Path) -> Result<Categories> {
    let path = root.join(LABELMAP_FILE);
    if !path.is_file() {
        let labels = LabelCategories::from_names(VOC_LABELS)?;
        return Ok(Categories::from_labels(labels)
            .with_masks(MaskCategories::voc_colormap(VOC_LABELS.len())));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b':')
        .comment(Some(b'#'))
        .has_headers(false)
        .flexible(true)
        .from_path(&path)
        .map_err(|err| AnnosetError::unreadable(&path, err.to_string()))?;

    let mut labels = LabelCategories::new();
    let mut colors = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|err| AnnosetError::unreadable(&path, err.to_string()))?;
        let Some(name) = record.get(0).map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        let index = labels.add(name, None::<String>)?;
        if let Some(raw) = record.get(1).map(str::trim).filter(|c| !c.is_empty()) {
            colors.insert(index, parse_color(raw, &path)?);
        }
    }

    let masks = if colors.is_empty() {
        MaskCategories::voc_colormap(labels.len())
    } else {
        MaskCategories { colormap: colors }
    };
    Ok(Categories::from_labels(labels).with_masks(masks))
}

fn parse_color(raw: &str, path: &Path) -> Result<[u8; 3]> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let parsed: Option<Vec<u8>> = parts.iter().map(|p| p.parse::<u8>().ok()).collect();
    match parsed.as_deref() {
        Some(&[r, g, b]) => Ok([r, g, b]),
        _ => Err(AnnosetError::unreadable(
            path,
            format!("invalid color '{raw}'; expected r,g,b"),
        )),
    }
}

fn write_labelmap(root: &Path, categories: &Categories) -> Result<()> {
    let fallback = MaskCategories::voc_colormap(categories.labels.len());
    let masks = categories.masks.as_ref().unwrap_or(&fallback);

    let mut out = String::new();
    writeln!(out, "# label:color_rgb:parts:actions").expect("write to string");
    for (index, label) in categories.labels.iter().enumerate() {
        let color = masks
            .color_of(index)
            .or_else(|| fallback.color_of(index))
            .map(|[r, g, b]| format!("{r},{g},{b}"))
            .unwrap_or_default();
        writeln!(out, "{}:{color}::", label.name).expect("write to string");
    }
    fs::write(root.join(LABELMAP_FILE), out)?;
    Ok(())
}

// ============================================================================
// Extractor
// ============================================================================

pub struct VocExtractor {
    root: PathBuf,
    subset: String,
    ids: Vec<String>,
    categories: Categories,
}

impl VocExtractor {
    /// Opens a VOC source.
    ///
    /// `url` is either an `ImageSets/Main/<subset>.txt` list or the dataset
    /// root, in which case every `Annotations/*.xml` file becomes an item of
    /// the `subset` option.
    pub fn open(url: &Path, options: &SourceOptions) -> Result<Self> {
        let (root, subset, ids) = if url.is_file() {
            let root = url
                .ancestors()
                .nth(3)
                .map(Path::to_path_buf)
                .ok_or_else(|| AnnosetError::unreadable(url, "not inside ImageSets/Main"))?;
            let subset = file_stem(url).unwrap_or_default().to_string();
            (root, subset, read_subset_list(url)?)
        } else if url.is_dir() {
            let annotations = url.join(ANNOTATIONS_DIR);
            if !annotations.is_dir() {
                return Err(AnnosetError::unreadable(url, "missing Annotations/ directory"));
            }
            let ids = find_files(&annotations, &["xml"], usize::MAX)?
                .iter()
                .map(|path| id_from_path(&annotations, path))
                .collect();
            (url.to_path_buf(), subset_option(options), ids)
        } else {
            return Err(AnnosetError::unreadable(url, "path does not exist"));
        };

        let categories = load_labelmap(&root)?;
        Ok(Self {
            root,
            subset,
            ids,
            categories,
        })
    }

    fn load_item(&self, id: &str) -> Result<DatasetItem> {
        let mut item = DatasetItem::new(id).with_subset(self.subset.clone());

        let xml_path = self.root.join(ANNOTATIONS_DIR).join(format!("{id}.xml"));
        let parsed = if xml_path.is_file() {
            let xml = fs::read_to_string(&xml_path)?;
            Some(parse_voc_xml(&xml, &xml_path, &self.categories.labels)?)
        } else {
            None
        };

        let images_dir = self.root.join(IMAGES_DIR);
        let image_path = find_image(&images_dir, id).or_else(|| {
            parsed
                .as_ref()
                .and_then(|p| p.filename.as_ref())
                .map(|name| images_dir.join(name))
        });
        if let Some(path) = image_path {
            let mut image = Image::from_path(path);
            if let Some((width, height)) = parsed.as_ref().and_then(|p| p.size) {
                image = image.with_size(width, height);
            }
            item.image = Some(image);
        }

        if let Some(parsed) = parsed {
            item.annotations = parsed.annotations;
        }

        let mask_path = self.root.join(SEGMENTATION_DIR).join(format!("{id}.png"));
        if mask_path.is_file() {
            item.annotations
                .extend(read_class_mask(&mask_path, &self.categories)?);
        }
        Ok(item)
    }
}

fn read_subset_list(path: &Path) -> Result<Vec<String>> {
    let data = fs::read_to_string(path)?;
    Ok(data
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(ToOwned::to_owned)
        .collect())
}

impl Extractor for VocExtractor {
    fn iter(&self) -> ItemIter<'_> {
        Box::new(self.ids.iter().map(move |id| self.load_item(id)))
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        Some([self.subset.clone()].into())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

/// One parsed `Annotations/<id>.xml`.
#[derive(Debug)]
pub struct ParsedVoc {
    pub filename: Option<String>,
    /// `(width, height)`
    pub size: Option<(u32, u32)>,
    pub annotations: Vec<Annotation>,
}

/// Parses one VOC annotation document.
///
/// Object names must be declared in `labels`.
pub fn parse_voc_xml(xml: &str, path: &Path, labels: &LabelCategories) -> Result<ParsedVoc> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|source| AnnosetError::unreadable(path, source.to_string()))?;

    let root = document.root_element();
    if root.tag_name().name() != "annotation" {
        return Err(AnnosetError::unreadable(
            path,
            "missing <annotation> root element",
        ));
    }

    let filename = optional_child_text(root, "filename");
    let size = match child_element(root, "size") {
        Some(size) => {
            let width = parse_required_f64(size, "width", path, "<size>")?;
            let height = parse_required_f64(size, "height", path, "<size>")?;
            (width > 0.0 && height > 0.0).then_some((width as u32, height as u32))
        }
        None => None,
    };

    let mut annotations = Vec::new();
    for object in child_elements(root, "object") {
        let name = required_child_text(object, "name", path, "<object>")?;
        let label = labels.index_of(&name).ok_or_else(|| {
            AnnosetError::unreadable(path, format!("object label '{name}' is not declared"))
        })?;

        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;
        let xmin = parse_required_f64(bndbox, "xmin", path, "<bndbox>")?;
        let ymin = parse_required_f64(bndbox, "ymin", path, "<bndbox>")?;
        let xmax = parse_required_f64(bndbox, "xmax", path, "<bndbox>")?;
        let ymax = parse_required_f64(bndbox, "ymax", path, "<bndbox>")?;

        let mut attributes = Attributes::new();
        if let Some(pose) = optional_child_text(object, "pose") {
            attributes.insert("pose".to_string(), AttrValue::Text(pose));
        }
        for key in BOOL_ATTRS {
            if let Some(raw) = optional_child_text(object, key) {
                let value = parse_bool(&raw).ok_or_else(|| {
                    AnnosetError::unreadable(
                        path,
                        format!("invalid <{key}> value '{raw}' in <object>; expected 0 or 1"),
                    )
                })?;
                attributes.insert(key.to_string(), AttrValue::Bool(value));
            }
        }
        if let Some(extra) = child_element(object, "attributes") {
            for attr in child_elements(extra, "attribute") {
                let key = required_child_text(attr, "name", path, "<attribute>")?;
                let value = optional_child_text(attr, "value").unwrap_or_default();
                attributes.insert(key, AttrValue::parse(&value));
            }
        }

        let mut ann = Annotation::bbox(xmin, ymin, xmax, ymax).with_label(label);
        ann.attributes = attributes;
        annotations.push(ann);
    }

    Ok(ParsedVoc {
        filename,
        size,
        annotations,
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Splits a color class mask into one mask annotation per label.
fn read_class_mask(path: &Path, categories: &Categories) -> Result<Vec<Annotation>> {
    let fallback;
    let masks = match &categories.masks {
        Some(masks) => masks,
        None => {
            fallback = MaskCategories::voc_colormap(categories.labels.len());
            &fallback
        }
    };
    let pixels = image::open(path)
        .map_err(|source| AnnosetError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let (width, height) = pixels.dimensions();
    let pixel_count = width as usize * height as usize;

    let mut bitmaps: BTreeMap<usize, Vec<bool>> = BTreeMap::new();
    for (x, y, Rgb(color)) in pixels.enumerate_pixels() {
        let label = masks.label_of(*color).ok_or_else(|| {
            AnnosetError::unreadable(
                path,
                format!("pixel ({x}, {y}) has color {color:?} that maps to no label"),
            )
        })?;
        if is_background(categories, label) {
            continue;
        }
        bitmaps
            .entry(label)
            .or_insert_with(|| vec![false; pixel_count])[pixel_offset(x, y, width)] = true;
    }

    bitmaps
        .into_iter()
        .map(|(label, bitmap)| {
            Ok(Annotation::mask(RleMask::from_bitmap(width, height, &bitmap)?).with_label(label))
        })
        .collect()
}

/// Row-major index of `(x, y)`, computed in `usize`.
fn pixel_offset(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}

fn is_background(categories: &Categories, label: usize) -> bool {
    label == 0 && categories.labels.name(0) == Some("background")
}

// ============================================================================
// Importer
// ============================================================================

pub struct VocImporter;

impl Importer for VocImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let sets_dir = main_sets_dir(root);
        let lists = if sets_dir.is_dir() {
            find_files(&sets_dir, &["txt"], 1)?
        } else {
            Vec::new()
        };

        let stems: BTreeSet<String> = lists
            .iter()
            .filter_map(|path| file_stem(path).map(ToOwned::to_owned))
            .collect();
        let mut sources: Vec<Source> = lists
            .into_iter()
            .filter_map(|path| {
                let subset = file_stem(&path)?.to_string();
                // Per-class lists such as `cat_train.txt` sit next to `train.txt`.
                let per_class = subset
                    .rsplit_once('_')
                    .is_some_and(|(_, tail)| stems.contains(tail));
                (!per_class).then(|| Source::new(subset, FORMAT, path))
            })
            .collect();

        if sources.is_empty() && root.join(ANNOTATIONS_DIR).is_dir() {
            let xml = find_files(&root.join(ANNOTATIONS_DIR), &["xml"], usize::MAX)?;
            if !xml.is_empty() {
                sources.push(
                    Source::new(DEFAULT_SUBSET, FORMAT, root)
                        .with_option(SUBSET_OPTION, DEFAULT_SUBSET),
                );
            }
        }
        require_sources(FORMAT, root, sources)
    }
}

// ============================================================================
// Converter
// ============================================================================

pub struct VocConverter;

impl Converter for VocConverter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn convert(
        &self,
        extractor: &dyn Extractor,
        save_dir: &Path,
        options: &ConvertOptions,
    ) -> Result<()> {
        let categories = extractor.categories();
        let fallback = MaskCategories::voc_colormap(categories.labels.len());
        let masks = categories.masks.as_ref().unwrap_or(&fallback);

        let mut subsets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in extractor.iter() {
            let item = item?;
            let ext = options.image_ext_for(item.image.as_ref(), "jpg");
            let file_name = format!("{}.{ext}", item.id);
            let mut size = None;
            if let Some(image) = &item.image {
                if options.save_images {
                    save_image(image, &save_dir.join(IMAGES_DIR).join(&file_name))?;
                }
                size = image.read_size()?;
            }

            let xml = build_voc_xml(&item, &file_name, size, &categories.labels);
            let xml_path = save_dir.join(ANNOTATIONS_DIR).join(format!("{}.xml", item.id));
            if let Some(parent) = xml_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&xml_path, xml)?;

            if let Some(mask) = render_class_mask(&item, masks, &fallback) {
                let mask_path = save_dir.join(SEGMENTATION_DIR).join(format!("{}.png", item.id));
                if let Some(parent) = mask_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                mask.save(&mask_path)
                    .map_err(|source| AnnosetError::ImageEncode {
                        path: mask_path.clone(),
                        source,
                    })?;
            }

            subsets.entry(item.subset).or_default().push(item.id);
        }

        let sets_dir = main_sets_dir(save_dir);
        fs::create_dir_all(&sets_dir)?;
        for (subset, ids) in &subsets {
            let mut list = ids.join("\n");
            list.push('\n');
            fs::write(sets_dir.join(format!("{subset}.txt")), list)?;
        }
        write_labelmap(save_dir, categories)?;
        log::info!(
            "wrote {} VOC subset(s) to {}",
            subsets.len(),
            save_dir.display()
        );
        Ok(())
    }
}

fn build_voc_xml(
    item: &DatasetItem,
    file_name: &str,
    size: Option<(u32, u32)>,
    labels: &LabelCategories,
) -> String {
    let mut xml = String::new();

    writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").expect("write to string");
    writeln!(xml, "<annotation>").expect("write to string");
    writeln!(xml, "  <folder>{IMAGES_DIR}</folder>").expect("write to string");
    writeln!(xml, "  <filename>{}</filename>", xml_escape(file_name)).expect("write to string");
    if let Some((width, height)) = size {
        writeln!(xml, "  <size>").expect("write to string");
        writeln!(xml, "    <width>{width}</width>").expect("write to string");
        writeln!(xml, "    <height>{height}</height>").expect("write to string");
        writeln!(xml, "    <depth>3</depth>").expect("write to string");
        writeln!(xml, "  </size>").expect("write to string");
    }

    for ann in &item.annotations {
        let (AnnotationKind::Bbox { bbox }, Some(name)) =
            (&ann.kind, ann.label.and_then(|label| labels.name(label)))
        else {
            if !matches!(ann.kind, AnnotationKind::Mask { .. }) {
                skip_unsupported(FORMAT, item, ann);
            }
            continue;
        };

        writeln!(xml, "  <object>").expect("write to string");
        writeln!(xml, "    <name>{}</name>", xml_escape(name)).expect("write to string");
        if let Some(pose) = ann.attributes.get("pose") {
            writeln!(xml, "    <pose>{}</pose>", xml_escape(&pose.to_string()))
                .expect("write to string");
        }
        for key in BOOL_ATTRS {
            if let Some(value) = ann.attributes.get(key).and_then(AttrValue::as_bool) {
                writeln!(xml, "    <{key}>{}</{key}>", u8::from(value)).expect("write to string");
            }
        }
        write_bndbox(&mut xml, bbox);

        let extra: Vec<_> = ann
            .attributes
            .iter()
            .filter(|(key, _)| key.as_str() != "pose" && !BOOL_ATTRS.contains(&key.as_str()))
            .collect();
        if !extra.is_empty() {
            writeln!(xml, "    <attributes>").expect("write to string");
            for (key, value) in extra {
                writeln!(xml, "      <attribute>").expect("write to string");
                writeln!(xml, "        <name>{}</name>", xml_escape(key)).expect("write to string");
                writeln!(xml, "        <value>{}</value>", xml_escape(&value.to_string()))
                    .expect("write to string");
                writeln!(xml, "      </attribute>").expect("write to string");
            }
            writeln!(xml, "    </attributes>").expect("write to string");
        }
        writeln!(xml, "  </object>").expect("write to string");
    }

    writeln!(xml, "</annotation>").expect("write to string");
    xml
}

fn write_bndbox(xml: &mut String, bbox: &BBoxXYXY<Pixel>) {
    writeln!(xml, "    <bndbox>").expect("write to string");
    writeln!(xml, "      <xmin>{}</xmin>", bbox.xmin()).expect("write to string");
    writeln!(xml, "      <ymin>{}</ymin>", bbox.ymin()).expect("write to string");
    writeln!(xml, "      <xmax>{}</xmax>", bbox.xmax()).expect("write to string");
    writeln!(xml, "      <ymax>{}</ymax>", bbox.ymax()).expect("write to string");
    writeln!(xml, "    </bndbox>").expect("write to string");
}

/// Paints every labeled mask of the item into one color image.
fn render_class_mask(
    item: &DatasetItem,
    masks: &MaskCategories,
    fallback: &MaskCategories,
) -> Option<RgbImage> {
    let mut layers: Vec<(&Annotation, &RleMask)> = item
        .annotations
        .iter()
        .filter_map(|ann| match &ann.kind {
            AnnotationKind::Mask { rle } if ann.label.is_some() => Some((ann, rle)),
            _ => None,
        })
        .collect();
    let (_, first) = layers.first()?;
    let (width, height) = (first.width, first.height);
    layers.sort_by_key(|(ann, _)| ann.z_order);

    let background = masks.color_of(0).unwrap_or([0, 0, 0]);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb(background));
    for (ann, rle) in layers {
        if (rle.width, rle.height) != (width, height) {
            log::warn!(
                "voc: mask on item '{}' is {}x{}, expected {width}x{height}; skipped",
                item.id,
                rle.width,
                rle.height
            );
            continue;
        }
        let Some(label) = ann.label else { continue };
        let color = masks
            .color_of(label)
            .or_else(|| fallback.color_of(label))
            .unwrap_or([0, 0, 0]);
        for (idx, set) in rle.to_bitmap().into_iter().enumerate() {
            if set {
                let (x, y) = (idx as u32 % width, idx as u32 / width);
                canvas.put_pixel(x, y, Rgb(color));
            }
        }
    }
    Some(canvas)
}

/// Parses a VOC annotation document against the standard labels; used by
/// fuzzing and benches.
#[doc(hidden)]
pub fn parse_voc_slice(bytes: &[u8]) -> Result<usize> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|err| AnnosetError::unreadable("<memory>", err.to_string()))?;
    let labels = LabelCategories::from_names(VOC_LABELS)?;
    Ok(parse_voc_xml(xml, Path::new("<memory>"), &labels)?
        .annotations
        .len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<annotation>
  <filename>000001.jpg</filename>
  <size><width>353</width><height>500</height><depth>3</depth></size>
  <object>
    <name>dog</name>
    <pose>Left</pose>
    <truncated>1</truncated>
    <difficult>0</difficult>
    <bndbox><xmin>48</xmin><ymin>240</ymin><xmax>195</xmax><ymax>371</ymax></bndbox>
  </object>
</annotation>"#;

    #[test]
    fn parses_objects_with_attributes() {
        let labels = LabelCategories::from_names(VOC_LABELS).unwrap();
        let parsed = parse_voc_xml(SAMPLE, Path::new("x.xml"), &labels).expect("parse");
        assert_eq!(parsed.size, Some((353, 500)));
        assert_eq!(parsed.filename.as_deref(), Some("000001.jpg"));

        let ann = &parsed.annotations[0];
        assert_eq!(ann.label, labels.index_of("dog"));
        assert_eq!(
            ann.bounding_box().map(|b| b.coords()),
            Some([48.0, 240.0, 195.0, 371.0])
        );
        assert_eq!(ann.attributes.get("pose"), Some(&AttrValue::Text("Left".into())));
        assert!(ann.flag("truncated"));
        assert!(!ann.flag("difficult"));
    }

    #[test]
    fn undeclared_label_is_an_error() {
        let labels = LabelCategories::from_names(["cat"]).unwrap();
        assert!(matches!(
            parse_voc_xml(SAMPLE, Path::new("x.xml"), &labels),
            Err(AnnosetError::UnreadableSource { .. })
        ));
    }

    #[test]
    fn labelmap_roundtrip() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let labels = LabelCategories::from_names(["background", "road", "car"]).unwrap();
        let mut masks = MaskCategories::voc_colormap(3);
        masks.colormap.insert(2, [10, 20, 30]);
        let categories = Categories::from_labels(labels).with_masks(masks);

        write_labelmap(temp.path(), &categories).expect("write");
        let loaded = load_labelmap(temp.path()).expect("load");
        assert_eq!(loaded, categories);
    }

    #[test]
    fn missing_labelmap_uses_voc_labels() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let categories = load_labelmap(temp.path()).expect("load");
        assert_eq!(categories.labels.len(), 21);
        assert_eq!(categories.labels.index_of("person"), Some(15));
    }

    #[test]
    fn per_class_lists_are_not_subsets() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let sets = main_sets_dir(temp.path());
        fs::create_dir_all(&sets).expect("mkdir");
        for name in ["train", "val", "cat_train", "cat_val"] {
            fs::write(sets.join(format!("{name}.txt")), "a\n").expect("write");
        }
        let sources = VocImporter.detect(temp.path()).expect("detect");
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["train", "val"]);
    }

    #[test]
    fn pixel_offset_does_not_wrap_on_large_masks() {
        assert_eq!(pixel_offset(3, 2, 10), 23);
        let (width, height) = (70_000u32, 70_000u32);
        assert_eq!(
            pixel_offset(width - 1, height - 1, width),
            width as usize * height as usize - 1
        );
    }
}
