//! Validation report types for structured error reporting.
//!
//! Reports can be displayed to users or inspected programmatically by
//! issue code.

use std::fmt;

use crate::error::{AnnosetError, Result};

/// The result of validating a dataset.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// Returns true if there are no issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_code(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    /// Turns a failing report into [`AnnosetError::ValidationFailed`].
    ///
    /// In strict mode warnings fail too.
    pub fn into_result(self, strict: bool) -> Result<Self> {
        let failed = if strict { !self.is_clean() } else { !self.is_ok() };
        if failed {
            return Err(AnnosetError::ValidationFailed {
                error_count: self.error_count(),
                warning_count: self.warning_count(),
                report: self,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single validation issue (error or warning).
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: Severity,

    /// A stable code for the issue type.
    pub code: IssueCode,

    pub message: String,

    /// Where the issue occurred.
    pub context: IssueContext,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        context: IssueContext,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Error, code, message, context)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Warning, code, message, context)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Suspicious but still convertible data.
    Warning,
    /// Data that breaks the annotation model's invariants.
    Error,
}

/// A stable code identifying the type of validation issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IssueCode {
    // Item issues
    EmptyItemId,
    /// Two items share a `(subset, id)` key.
    DuplicateItem,

    // Category issues
    EmptyCategoryName,
    /// A label index is outside the dataset's label categories.
    LabelOutOfRange,

    // Geometry issues
    /// Non-finite coordinates (NaN or Infinity).
    NotFinite,
    /// A bounding box has min > max.
    InvalidBBoxOrdering,
    /// A shape extends outside the known image size.
    OutOfBounds,
    /// A polygon encloses zero area.
    DegeneratePolygon,
}

/// Where a validation issue occurred.
#[derive(Clone, Debug)]
pub enum IssueContext {
    Dataset,
    Item { subset: String, id: String },
    /// The `index`-th annotation of an item.
    Annotation {
        subset: String,
        id: String,
        index: usize,
    },
    Category { index: usize },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Dataset => write!(f, "dataset"),
            IssueContext::Item { subset, id } => write!(f, "item {subset}/{id}"),
            IssueContext::Annotation { subset, id, index } => {
                write!(f, "annotation #{index} of {subset}/{id}")
            }
            IssueContext::Category { index } => write!(f, "category {index}"),
        }
    }
}
