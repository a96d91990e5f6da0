use std::path::PathBuf;
use thiserror::Error;

use crate::registry::PluginKind;
use crate::validation::ValidationReport;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnnosetError>;

/// The main error type for annoset operations.
///
/// None of these are retried internally: they describe structural or data
/// problems. I/O failures are surfaced unchanged through [`AnnosetError::Io`].
#[derive(Debug, Error)]
pub enum AnnosetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read source {path}: {message}")]
    UnreadableSource { path: PathBuf, message: String },

    #[error("Failed to parse JSON from {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write JSON to {path}: {source}")]
    JsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YAML from {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("No {format} dataset detected at {path}")]
    FormatNotDetected { format: String, path: PathBuf },

    #[error("Ambiguous dataset: subset '{subset}' is defined by several candidates: {}", format_candidates(.candidates))]
    AmbiguousDataset {
        subset: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Ambiguous item: '{id}' in subset '{subset}' is produced by more than one source")]
    AmbiguousItem { subset: String, id: String },

    #[error("Malformed annotation: {0}")]
    MalformedAnnotation(String),

    #[error("{kind} format '{tag}' is already registered")]
    DuplicateFormat { kind: PluginKind, tag: String },

    #[error("{kind} format '{tag}' is not registered")]
    UnknownFormat { kind: PluginKind, tag: String },

    #[error("Source '{0}' already exists")]
    DuplicateSource(String),

    #[error("Source '{0}' does not exist")]
    UnknownSource(String),

    #[error("Label '{0}' already exists")]
    DuplicateLabel(String),

    #[error("Incompatible categories at index {index}: '{left}' vs '{right}'")]
    IncompatibleCategories {
        index: usize,
        left: String,
        right: String,
    },

    #[error("Label index {label} is out of range (have {bound} label(s))")]
    LabelOutOfRange { label: usize, bound: usize },

    #[error("Item '{id}' in subset '{subset}' has no image")]
    MissingImage { subset: String, id: String },

    #[error("Launcher returned {actual} result(s) for a batch of {expected} image(s)")]
    LauncherOutput { expected: usize, actual: usize },

    #[error("Invalid transform parameters: {0}")]
    InvalidTransform(String),

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },
}

impl AnnosetError {
    /// Creates an [`AnnosetError::UnreadableSource`] for `path`.
    pub fn unreadable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AnnosetError::UnreadableSource {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an [`AnnosetError::FormatNotDetected`] for `path`.
    pub fn not_detected(format: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        AnnosetError::FormatNotDetected {
            format: format.into(),
            path: path.into(),
        }
    }

    /// Returns true if an importer simply did not recognize the layout.
    ///
    /// Auto-detection moves on to the next importer only in this case; any
    /// other error means the format matched but the data is broken.
    pub fn is_format_not_detected(&self) -> bool {
        matches!(self, AnnosetError::FormatNotDetected { .. })
    }
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
