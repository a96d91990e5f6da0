//! TensorFlow Object Detection API format.
//!
//! # Layout
//!
//! ```text
//! <root>/<subset>.tfrecord
//! <root>/label_map.pbtxt
//! ```
//!
//! Each record is a `tf.train.Example` with the detection API feature keys
//! (`image/encoded`, `image/object/bbox/xmin`, ...). Boxes are normalized and
//! class ids are 1-based, resolved through the label map.
//!
//! Records are framed as
//! `u64 length (LE) | u32 masked crc32c(length) | payload | u32 masked crc32c(payload)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;

use super::common::{subset_option, SUBSET_OPTION};
use crate::converter::{encode_image, skip_unsupported, ConvertOptions, Converter};
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ItemIter};
use crate::importer::{file_stem, find_files, require_sources, Importer};
use crate::ir::{
    Annotation, AnnotationKind, BBoxXYXY, Categories, DatasetItem, Image, LabelCategories,
    Normalized,
};
use crate::source::{Source, SourceOptions};

pub const FORMAT: &str = "tf_detection_api";

const RECORD_EXTENSION: &str = "tfrecord";
const LABEL_MAP_FILE: &str = "label_map.pbtxt";
/// Upper bound on a single record payload.
const MAX_RECORD_LEN: u64 = 1 << 31;

const CRC_MASK_DELTA: u32 = 0xa282_ead8;

// ============================================================================
// tf.train.Example
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(btree_map = "string, message", tag = "1")]
    pub feature: BTreeMap<String, Feature>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

impl Feature {
    fn bytes(values: Vec<Vec<u8>>) -> Self {
        Self {
            kind: Some(feature::Kind::BytesList(BytesList { value: values })),
        }
    }

    fn floats(values: Vec<f32>) -> Self {
        Self {
            kind: Some(feature::Kind::FloatList(FloatList { value: values })),
        }
    }

    fn ints(values: Vec<i64>) -> Self {
        Self {
            kind: Some(feature::Kind::Int64List(Int64List { value: values })),
        }
    }
}

mod keys {
    pub const HEIGHT: &str = "image/height";
    pub const WIDTH: &str = "image/width";
    pub const FILENAME: &str = "image/filename";
    pub const SOURCE_ID: &str = "image/source_id";
    pub const ENCODED: &str = "image/encoded";
    pub const IMAGE_FORMAT: &str = "image/format";
    pub const XMIN: &str = "image/object/bbox/xmin";
    pub const XMAX: &str = "image/object/bbox/xmax";
    pub const YMIN: &str = "image/object/bbox/ymin";
    pub const YMAX: &str = "image/object/bbox/ymax";
    pub const CLASS_TEXT: &str = "image/object/class/text";
    pub const CLASS_LABEL: &str = "image/object/class/label";
}

/// Typed lookups over an example's feature map.
struct FeatureView<'a>(&'a BTreeMap<String, Feature>);

impl FeatureView<'_> {
    fn bytes(&self, key: &str) -> &[Vec<u8>] {
        match self.0.get(key).and_then(|f| f.kind.as_ref()) {
            Some(feature::Kind::BytesList(list)) => &list.value,
            _ => &[],
        }
    }

    fn floats(&self, key: &str) -> &[f32] {
        match self.0.get(key).and_then(|f| f.kind.as_ref()) {
            Some(feature::Kind::FloatList(list)) => &list.value,
            _ => &[],
        }
    }

    fn ints(&self, key: &str) -> &[i64] {
        match self.0.get(key).and_then(|f| f.kind.as_ref()) {
            Some(feature::Kind::Int64List(list)) => &list.value,
            _ => &[],
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        self.bytes(key)
            .first()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .filter(|text| !text.is_empty())
    }

    fn dimension(&self, key: &str) -> Option<u32> {
        self.ints(key)
            .first()
            .and_then(|value| u32::try_from(*value).ok())
            .filter(|value| *value > 0)
    }
}

// ============================================================================
// Record framing
// ============================================================================

pub fn masked_crc(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
        .rotate_right(15)
        .wrapping_add(CRC_MASK_DELTA)
}

/// Reads framed records one at a time.
pub struct RecordReader<R> {
    reader: R,
    path: PathBuf,
    failed: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            failed: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 8];
        self.read_exact(&mut len_bytes, "record length")?;
        let expected = self.read_u32("length checksum")?;
        if masked_crc(&len_bytes) != expected {
            return Err(AnnosetError::unreadable(
                &self.path,
                "record length checksum mismatch",
            ));
        }

        let len = u64::from_le_bytes(len_bytes);
        if len > MAX_RECORD_LEN {
            return Err(AnnosetError::unreadable(
                &self.path,
                format!("record length {len} exceeds {MAX_RECORD_LEN} bytes"),
            ));
        }
        // Grows with the bytes actually present, not the declared length.
        let mut payload = Vec::new();
        let read = (&mut self.reader).take(len).read_to_end(&mut payload)?;
        if read as u64 != len {
            return Err(AnnosetError::unreadable(
                &self.path,
                format!("truncated record payload: expected {len} bytes, found {read}"),
            ));
        }
        let expected = self.read_u32("payload checksum")?;
        if masked_crc(&payload) != expected {
            return Err(AnnosetError::unreadable(
                &self.path,
                "record payload checksum mismatch",
            ));
        }
        Ok(Some(payload))
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.reader.read_exact(buf).map_err(|err| {
            AnnosetError::unreadable(&self.path, format!("truncated {what}: {err}"))
        })
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, what)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let record = self.read_record().transpose();
        if matches!(record, Some(Err(_))) {
            self.failed = true;
        }
        record
    }
}

pub fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let len_bytes = (payload.len() as u64).to_le_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(&masked_crc(&len_bytes).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&masked_crc(payload).to_le_bytes())
}

// ============================================================================
// Label map
// ============================================================================

/// A label map entry: a 1-based class id and its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMapEntry {
    pub id: i64,
    pub name: String,
}

/// Parses the `item { id: N name: 'x' }` blocks of a `.pbtxt` label map.
pub fn parse_label_map(text: &str, path: &Path) -> Result<Vec<LabelMapEntry>> {
    let mut entries = Vec::new();
    let mut current: Option<(Option<i64>, Option<String>)> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let err = |message: &str| {
            AnnosetError::unreadable(path, format!("line {}: {message}", idx + 1))
        };

        if line.starts_with("item") && line.ends_with('{') {
            if current.is_some() {
                return Err(err("nested item block"));
            }
            current = Some((None, None));
            continue;
        }
        if line == "}" {
            let (id, name) = current.take().ok_or_else(|| err("unbalanced '}'"))?;
            let id = id.ok_or_else(|| err("item without id"))?;
            let name = name.ok_or_else(|| err("item without name"))?;
            entries.push(LabelMapEntry { id, name });
            continue;
        }

        let Some((id, name)) = current.as_mut() else {
            return Err(err("field outside of an item block"));
        };
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| err("expected 'key: value'"))?;
        let value = value.trim();
        match key.trim() {
            "id" => {
                *id = Some(value.parse().map_err(|_| err("invalid id"))?);
            }
            "name" => *name = Some(unquote(value)),
            "display_name" if name.is_none() => *name = Some(unquote(value)),
            _ => {}
        }
    }

    if current.is_some() {
        return Err(AnnosetError::unreadable(path, "unterminated item block"));
    }
    Ok(entries)
}

fn unquote(value: &str) -> String {
    value
        .trim_matches(|c| c == '\'' || c == '"')
        .replace("\\'", "'")
}

fn render_label_map(labels: &LabelCategories) -> String {
    let mut out = String::new();
    for (index, label) in labels.iter().enumerate() {
        writeln!(out, "item {{").expect("write to string");
        writeln!(out, "  id: {}", index + 1).expect("write to string");
        writeln!(out, "  name: '{}'", label.name.replace('\'', "\\'")).expect("write to string");
        writeln!(out, "}}").expect("write to string");
        writeln!(out).expect("write to string");
    }
    out
}

/// Label categories in ascending id order plus the id -> index mapping.
fn categories_from_label_map(
    entries: &[LabelMapEntry],
) -> Result<(LabelCategories, BTreeMap<i64, usize>)> {
    let mut sorted: Vec<&LabelMapEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.id);

    let mut labels = LabelCategories::new();
    let mut ids = BTreeMap::new();
    for entry in sorted {
        let index = labels.add(entry.name.clone(), None::<String>)?;
        ids.insert(entry.id, index);
    }
    Ok((labels, ids))
}

// ============================================================================
// Extractor
// ============================================================================

pub struct TfRecordExtractor {
    path: PathBuf,
    subset: String,
    label_ids: BTreeMap<i64, usize>,
    categories: Categories,
}

impl TfRecordExtractor {
    /// Opens `<subset>.tfrecord`; the label map is read from its directory.
    pub fn open(path: &Path, options: &SourceOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(AnnosetError::unreadable(path, "file does not exist"));
        }
        let subset = options
            .get(SUBSET_OPTION)
            .cloned()
            .or_else(|| file_stem(path).map(ToOwned::to_owned))
            .unwrap_or_else(|| subset_option(options));

        let label_map_path = path
            .parent()
            .map(|dir| dir.join(LABEL_MAP_FILE))
            .unwrap_or_else(|| PathBuf::from(LABEL_MAP_FILE));
        let entries = if label_map_path.is_file() {
            parse_label_map(&fs::read_to_string(&label_map_path)?, &label_map_path)?
        } else {
            Vec::new()
        };
        let (labels, label_ids) = categories_from_label_map(&entries)?;

        Ok(Self {
            path: path.to_path_buf(),
            subset,
            label_ids,
            categories: Categories::from_labels(labels),
        })
    }

    fn records(&self) -> Result<RecordReader<BufReader<File>>> {
        let file = File::open(&self.path)
            .map_err(|err| AnnosetError::unreadable(&self.path, err.to_string()))?;
        Ok(RecordReader::new(BufReader::new(file), &self.path))
    }

    fn decode_item(&self, payload: &[u8], index: usize) -> Result<DatasetItem> {
        let example = Example::decode(payload).map_err(|err| {
            AnnosetError::unreadable(&self.path, format!("record {index}: {err}"))
        })?;
        let features = example.features.unwrap_or_default();
        let view = FeatureView(&features.feature);

        let filename = view.text(keys::FILENAME);
        let id = match (&filename, view.text(keys::SOURCE_ID)) {
            (Some(name), _) => Path::new(name)
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/"),
            (None, Some(source_id)) => source_id,
            (None, None) => index.to_string(),
        };
        let mut item = DatasetItem::new(id).with_subset(self.subset.clone());

        let size = view.dimension(keys::WIDTH).zip(view.dimension(keys::HEIGHT));
        if let Some(encoded) = view.bytes(keys::ENCODED).first().filter(|b| !b.is_empty()) {
            let mut image =
                Image::from_bytes(encoded.clone(), filename.as_ref().map(PathBuf::from));
            if let Some((width, height)) = size {
                image = image.with_size(width, height);
            }
            item.image = Some(image);
        } else if let Some(name) = &filename {
            let mut image = Image::from_path(self.path.with_file_name(name));
            if let Some((width, height)) = size {
                image = image.with_size(width, height);
            }
            item.image = Some(image);
        }

        let xmin = view.floats(keys::XMIN);
        let ymin = view.floats(keys::YMIN);
        let xmax = view.floats(keys::XMAX);
        let ymax = view.floats(keys::YMAX);
        let class_ids = view.ints(keys::CLASS_LABEL);
        let class_names = view.bytes(keys::CLASS_TEXT);
        let count = xmin.len();
        if [ymin.len(), xmax.len(), ymax.len()].iter().any(|len| *len != count) {
            return Err(AnnosetError::unreadable(
                &self.path,
                format!("record {index}: bbox coordinate lists differ in length"),
            ));
        }
        if count == 0 {
            return Ok(item);
        }

        let (width, height) = match (size, &item.image) {
            (Some(size), _) => size,
            (None, Some(image)) => image.read_size()?.ok_or_else(|| {
                AnnosetError::unreadable(&self.path, format!("record {index}: image size unknown"))
            })?,
            (None, None) => {
                return Err(AnnosetError::unreadable(
                    &self.path,
                    format!("record {index}: image size unknown"),
                ))
            }
        };

        for obj in 0..count {
            let label = match class_ids.get(obj) {
                Some(id) => self.label_ids.get(id).copied().ok_or_else(|| {
                    AnnosetError::unreadable(
                        &self.path,
                        format!("record {index}: class id {id} is not in the label map"),
                    )
                })?,
                None => {
                    let name = class_names
                        .get(obj)
                        .map(|raw| String::from_utf8_lossy(raw).into_owned())
                        .unwrap_or_default();
                    self.categories.labels.index_of(&name).ok_or_else(|| {
                        AnnosetError::unreadable(
                            &self.path,
                            format!("record {index}: class '{name}' is not in the label map"),
                        )
                    })?
                }
            };
            let normalized: BBoxXYXY<Normalized> = BBoxXYXY::from_xyxy(
                f64::from(xmin[obj]),
                f64::from(ymin[obj]),
                f64::from(xmax[obj]),
                f64::from(ymax[obj]),
            );
            let bbox = normalized.to_pixel(f64::from(width), f64::from(height));
            item.annotations
                .push(Annotation::new(AnnotationKind::Bbox { bbox }).with_label(label));
        }
        Ok(item)
    }
}

impl Extractor for TfRecordExtractor {
    fn iter(&self) -> ItemIter<'_> {
        let records = match self.records() {
            Ok(records) => records,
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        Box::new(
            records
                .enumerate()
                .map(move |(index, record)| self.decode_item(&record?, index)),
        )
    }

    fn subsets(&self) -> Option<BTreeSet<String>> {
        Some([self.subset.clone()].into())
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }
}

// ============================================================================
// Importer
// ============================================================================

pub struct TfRecordImporter;

impl Importer for TfRecordImporter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn detect(&self, root: &Path) -> Result<Vec<Source>> {
        let sources = find_files(root, &[RECORD_EXTENSION], 1)?
            .into_iter()
            .filter_map(|path| {
                let subset = file_stem(&path)?.to_string();
                Some(Source::new(subset.clone(), FORMAT, path).with_option(SUBSET_OPTION, subset))
            })
            .collect();
        require_sources(FORMAT, root, sources)
    }
}

// ============================================================================
// Converter
// ============================================================================

pub struct TfRecordConverter;

impl Converter for TfRecordConverter {
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

        let mut writers: BTreeMap<String, BufWriter<File>> = BTreeMap::new();
        for item in extractor.iter() {
            let item = item?;
            let example = item_to_example(&item, labels, options)?;
            let writer = match writers.entry(item.subset.clone()) {
                std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::btree_map::Entry::Vacant(entry) => {
                    let path = save_dir.join(format!("{}.{RECORD_EXTENSION}", item.subset));
                    entry.insert(BufWriter::new(File::create(path)?))
                }
            };
            write_record(writer, &example.encode_to_vec())?;
        }
        for writer in writers.values_mut() {
            writer.flush()?;
        }

        fs::write(save_dir.join(LABEL_MAP_FILE), render_label_map(labels))?;
        log::info!(
            "wrote {} TFRecord subset(s) to {}",
            writers.len(),
            save_dir.display()
        );
        Ok(())
    }
}

fn item_to_example(
    item: &DatasetItem,
    labels: &LabelCategories,
    options: &ConvertOptions,
) -> Result<Example> {
    let mut feature = BTreeMap::new();
    let ext = options.image_ext_for(item.image.as_ref(), "jpg");
    let filename = format!("{}.{ext}", item.id);
    feature.insert(
        keys::FILENAME.to_string(),
        Feature::bytes(vec![filename.into_bytes()]),
    );
    feature.insert(
        keys::SOURCE_ID.to_string(),
        Feature::bytes(vec![item.id.clone().into_bytes()]),
    );

    let size = match &item.image {
        Some(image) => image.read_size()?,
        None => None,
    };
    if let Some((width, height)) = size {
        feature.insert(keys::WIDTH.to_string(), Feature::ints(vec![i64::from(width)]));
        feature.insert(keys::HEIGHT.to_string(), Feature::ints(vec![i64::from(height)]));
    }
    if options.save_images {
        if let Some(encoded) = item
            .image
            .as_ref()
            .map(|image| encode_image(image, &ext))
            .transpose()?
            .flatten()
        {
            feature.insert(keys::ENCODED.to_string(), Feature::bytes(vec![encoded]));
            feature.insert(
                keys::IMAGE_FORMAT.to_string(),
                Feature::bytes(vec![ext.clone().into_bytes()]),
            );
        }
    }

    let mut coords: [Vec<f32>; 4] = Default::default();
    let mut class_ids = Vec::new();
    let mut class_names = Vec::new();
    for ann in &item.annotations {
        let (AnnotationKind::Bbox { bbox }, Some(label)) = (&ann.kind, ann.label) else {
            skip_unsupported(FORMAT, item, ann);
            continue;
        };
        let (width, height) = size.ok_or_else(|| AnnosetError::MissingImage {
            subset: item.subset.clone(),
            id: item.id.clone(),
        })?;
        let normalized = bbox.to_normalized(f64::from(width), f64::from(height));
        for (list, value) in coords.iter_mut().zip(normalized.coords()) {
            list.push(value as f32);
        }
        class_ids.push(label as i64 + 1);
        class_names.push(labels.name(label).unwrap_or_default().as_bytes().to_vec());
    }
    if !class_ids.is_empty() {
        let [xmin, ymin, xmax, ymax] = coords;
        feature.insert(keys::XMIN.to_string(), Feature::floats(xmin));
        feature.insert(keys::YMIN.to_string(), Feature::floats(ymin));
        feature.insert(keys::XMAX.to_string(), Feature::floats(xmax));
        feature.insert(keys::YMAX.to_string(), Feature::floats(ymax));
        feature.insert(keys::CLASS_LABEL.to_string(), Feature::ints(class_ids));
        feature.insert(keys::CLASS_TEXT.to_string(), Feature::bytes(class_names));
    }

    Ok(Example {
        features: Some(Features { feature }),
    })
}

/// Decodes every record of an in-memory TFRecord stream; used by fuzzing
/// and benches.
#[doc(hidden)]
pub fn parse_records_slice(bytes: &[u8]) -> Result<usize> {
    let mut count = 0;
    for record in RecordReader::new(bytes, "<memory>") {
        Example::decode(record?.as_slice())
            .map_err(|err| AnnosetError::unreadable("<memory>", err.to_string()))?;
        count += 1;
    }
    Ok(count)
}
