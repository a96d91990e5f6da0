//! Format-tagged bindings to raw dataset locations.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Free-form per-source options, passed through to the extractor.
pub type SourceOptions = BTreeMap<String, String>;

/// A named, format-tagged dataset location inside a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub format: String,
    pub url: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: SourceOptions,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        format: impl Into<String>,
        url: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            url: url.into(),
            options: SourceOptions::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Splits the source into its name and the rest.
    pub fn into_spec(self) -> (String, SourceSpec) {
        (
            self.name,
            SourceSpec {
                url: self.url,
                format: self.format,
                options: self.options,
            },
        )
    }
}

/// Everything about a source except its name; the argument to
/// [`Project::add_source`](crate::project::Project::add_source).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpec {
    pub url: PathBuf,
    pub format: String,
    pub options: SourceOptions,
}

impl SourceSpec {
    pub fn new(format: impl Into<String>, url: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            format: format.into(),
            options: SourceOptions::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}
