//! Tag-to-implementation tables for the four plugin kinds.
//!
//! Nothing is discovered implicitly: built-in formats are registered by
//! [`Environment::builtin`], and callers add their own with the
//! `register_*` methods at process start.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::converter::Converter;
use crate::error::{AnnosetError, Result};
use crate::extractor::{Extractor, ExtractorFactory};
use crate::importer::Importer;
use crate::launcher::{Launcher, LauncherFactory};
use crate::source::{Source, SourceOptions};

/// The namespace a tag is registered in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Extractor,
    Importer,
    Converter,
    Launcher,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginKind::Extractor => "Extractor",
            PluginKind::Importer => "Importer",
            PluginKind::Converter => "Converter",
            PluginKind::Launcher => "Launcher",
        };
        f.write_str(name)
    }
}

/// One namespace: unique tags in registration order.
pub struct Registry<F> {
    kind: PluginKind,
    items: HashMap<String, F>,
    order: Vec<String>,
}

impl<F> Registry<F> {
    pub fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            items: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Adds `factory` under `tag`; fails with `DuplicateFormat` if taken.
    pub fn register(&mut self, tag: impl Into<String>, factory: F) -> Result<()> {
        let tag = tag.into();
        if self.items.contains_key(&tag) {
            return Err(AnnosetError::DuplicateFormat {
                kind: self.kind,
                tag,
            });
        }
        self.order.push(tag.clone());
        self.items.insert(tag, factory);
        Ok(())
    }

    /// Looks up `tag`; fails with `UnknownFormat` if it is not registered.
    pub fn get(&self, tag: &str) -> Result<&F> {
        self.items.get(tag).ok_or_else(|| AnnosetError::UnknownFormat {
            kind: self.kind,
            tag: tag.to_string(),
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.items.contains_key(tag)
    }

    /// Tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// `(tag, factory)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &F)> {
        self.order
            .iter()
            .filter_map(|tag| self.items.get(tag).map(|f| (tag.as_str(), f)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<F> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("tags", &self.order)
            .finish()
    }
}

/// The four plugin namespaces.
#[derive(Debug)]
pub struct Environment {
    pub extractors: Registry<ExtractorFactory>,
    pub importers: Registry<Arc<dyn Importer>>,
    pub converters: Registry<Arc<dyn Converter>>,
    pub launchers: Registry<LauncherFactory>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with nothing registered.
    pub fn new() -> Self {
        Self {
            extractors: Registry::new(PluginKind::Extractor),
            importers: Registry::new(PluginKind::Importer),
            converters: Registry::new(PluginKind::Converter),
            launchers: Registry::new(PluginKind::Launcher),
        }
    }

    /// An environment with every built-in format registered.
    pub fn builtin() -> Result<Self> {
        let mut env = Self::new();
        crate::formats::register_builtins(&mut env)?;
        Ok(env)
    }

    pub fn register_extractor(
        &mut self,
        tag: impl Into<String>,
        factory: ExtractorFactory,
    ) -> Result<()> {
        self.extractors.register(tag, factory)
    }

    pub fn register_importer(
        &mut self,
        tag: impl Into<String>,
        importer: Arc<dyn Importer>,
    ) -> Result<()> {
        self.importers.register(tag, importer)
    }

    pub fn register_converter(
        &mut self,
        tag: impl Into<String>,
        converter: Arc<dyn Converter>,
    ) -> Result<()> {
        self.converters.register(tag, converter)
    }

    pub fn register_launcher(
        &mut self,
        tag: impl Into<String>,
        factory: LauncherFactory,
    ) -> Result<()> {
        self.launchers.register(tag, factory)
    }

    /// Resolves a source to an extractor through its format tag.
    pub fn make_extractor(&self, source: &Source) -> Result<Box<dyn Extractor>> {
        let factory = self.extractors.get(&source.format)?;
        log::debug!(
            "opening source '{}' ({}) at {}",
            source.name,
            source.format,
            source.url.display()
        );
        factory(&source.url, &source.options)
    }

    pub fn importer(&self, tag: &str) -> Result<Arc<dyn Importer>> {
        self.importers.get(tag).cloned()
    }

    pub fn converter(&self, tag: &str) -> Result<Arc<dyn Converter>> {
        self.converters.get(tag).cloned()
    }

    pub fn make_launcher(&self, tag: &str, options: &SourceOptions) -> Result<Box<dyn Launcher>> {
        let factory = self.launchers.get(tag)?;
        factory(options)
    }

    /// Runs every importer against `root` in registration order.
    ///
    /// Returns the first match. Only `FormatNotDetected` moves on to the next
    /// importer; any other error means a format matched but its data is
    /// broken, and is returned as is.
    pub fn detect_format(&self, root: &Path) -> Result<(String, Vec<Source>)> {
        for (tag, importer) in self.importers.iter() {
            match importer.detect(root) {
                Ok(sources) => return Ok((tag.to_string(), sources)),
                Err(err) if err.is_format_not_detected() => {
                    log::debug!("{tag}: no dataset at {}", root.display());
                }
                Err(err) => return Err(err),
            }
        }
        Err(AnnosetError::not_detected("supported", root))
    }

    /// Tags of every importer whose layout matches `root`.
    pub fn matching_formats(&self, root: &Path) -> Result<Vec<String>> {
        let mut matches = Vec::new();
        for (tag, importer) in self.importers.iter() {
            match importer.detect(root) {
                Ok(_) => matches.push(tag.to_string()),
                Err(err) if err.is_format_not_detected() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(matches)
    }
}
