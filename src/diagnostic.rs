//! Individual diagnostics.
//!
//! A `Diagnostic` is an opaque payload as far as aggregation is concerned: the
//! service stores, filters by suppression, and hands diagnostics back. Only the
//! suppression flag influences query results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, ProjectId};

/// Diagnostic severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Not shown to users by default.
    Hidden,
    /// Informational or style finding.
    Info,
    /// Potential problem.
    Warning,
    /// Definite problem.
    Error,
}

impl Severity {
    /// Returns true for `Severity::Error`.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hidden => write!(f, "hidden"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Half-open byte range `[start, end)` inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    /// Inclusive start offset.
    pub start: u32,
    /// Exclusive end offset.
    pub end: u32,
}

impl TextSpan {
    /// Creates a span. `start` must not exceed `end`.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Length of the span in bytes; zero for inverted spans.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true for an empty (caret) span.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a diagnostic applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// A document, optionally narrowed to a span.
    Document {
        /// Owning document.
        document: DocumentId,
        /// Range inside the document, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        span: Option<TextSpan>,
    },
    /// A whole project (e.g. a missing reference).
    Project {
        /// Owning project.
        project: ProjectId,
    },
    /// Not tied to any document or project.
    None,
}

/// One finding produced by an analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the finding.
    pub severity: Severity,
    /// Human readable message.
    pub message: String,
    /// Producer-specific code, e.g. `E0308`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Location of the finding.
    pub location: Location,
    /// Suppressed findings are hidden unless a query asks for them.
    #[serde(default)]
    pub suppressed: bool,
}

impl Diagnostic {
    /// Creates an unsuppressed diagnostic with no location.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            code: None,
            location: Location::None,
            suppressed: false,
        }
    }

    /// Shorthand for an error diagnostic.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Shorthand for a warning diagnostic.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Sets the diagnostic code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Places the diagnostic in a document.
    #[must_use]
    pub fn in_document(mut self, document: DocumentId, span: Option<TextSpan>) -> Self {
        self.location = Location::Document { document, span };
        self
    }

    /// Places the diagnostic on a project.
    #[must_use]
    pub fn in_project(mut self, project: ProjectId) -> Self {
        self.location = Location::Project { project };
        self
    }

    /// Marks the diagnostic as suppressed.
    #[must_use]
    pub fn suppressed(mut self) -> Self {
        self.suppressed = true;
        self
    }

    /// Returns true if this diagnostic should be returned for a query.
    #[must_use]
    pub const fn is_visible(&self, include_suppressed: bool) -> bool {
        include_suppressed || !self.suppressed
    }

    /// Checks producer output for structural faults.
    ///
    /// Message text is opaque and never checked. Only called from
    /// `debug_assert!` on the reporting thread; a failure is a producer bug.
    pub(crate) fn debug_validate(&self) -> Result<(), String> {
        if let Location::Document { span: Some(span), .. } = &self.location {
            if span.start > span.end {
                return Err(format!("inverted span {}..{}", span.start, span.end));
            }
        }
        Ok(())
    }
}

/// Filters `diagnostics` by suppression, cloning the survivors.
pub(crate) fn visible(diagnostics: &[Diagnostic], include_suppressed: bool) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| d.is_visible(include_suppressed))
        .cloned()
        .collect()
}
