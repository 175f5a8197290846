//! The per-format extractor contract and the registry used to pick one.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ detect ──▶ extract ──▶ validate ──▶ finalize
//!          (format)   (FieldMap)  (issues)     (derived columns)
//! ```
//!
//! 1. [`Extractor::detect`]: pure keyword test on the raw text
//! 2. [`Extractor::extract`]: fixed patterns → a full-schema [`FieldMap`];
//!    a miss leaves the column empty instead of failing
//! 3. [`Extractor::validate`]: best-effort, group-aware checks driven by the
//!    format's [`crate::format::FormatDescriptor`]
//! 4. [`Extractor::finalize`]: post-validation normalisation (plate / check
//!    digit split)
//!
//! Extractors hold no mutable state; one instance serves every task of every
//! batch concurrently.

pub mod crt;
pub mod homologacion;
pub mod permiso;
pub mod soap;

use crate::error::{DocumentError, ValidationIssue};
use crate::format::{DocumentFormat, FieldMap, FormatDescriptor};
use std::sync::Arc;
use tracing::debug;

/// Result of [`Extractor::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Match,
    NoMatch,
}

impl Detection {
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            Detection::Match
        } else {
            Detection::NoMatch
        }
    }

    pub fn is_match(self) -> bool {
        self == Detection::Match
    }
}

/// Per-task tracing context.
///
/// Every step an extractor wants to report goes through [`TaskContext::note`],
/// which both emits a `tracing` event and keeps the line, so one task's trace
/// can be inspected without installing a global subscriber.
#[derive(Debug, Clone)]
pub struct TaskContext {
    index: usize,
    file_name: String,
    steps: Vec<String>,
}

impl TaskContext {
    pub fn new(index: usize, file_name: impl Into<String>) -> Self {
        Self {
            index,
            file_name: file_name.into(),
            steps: Vec::new(),
        }
    }

    /// Submission index of the document.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Record one extraction/validation step.
    pub fn note(&mut self, step: impl Into<String>) {
        let step = step.into();
        debug!(index = self.index, file = %self.file_name, "{}", step);
        self.steps.push(step);
    }

    /// Steps recorded so far, in order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

/// One document format: detection, field extraction and validation.
///
/// Implementations must be `Send + Sync`; the scheduler shares a single
/// instance across concurrently running tasks.
pub trait Extractor: Send + Sync {
    /// The format this extractor handles.
    fn format(&self) -> DocumentFormat;

    /// Static layout and validation rules.
    fn descriptor(&self) -> &'static FormatDescriptor {
        self.format().descriptor()
    }

    /// Does `text` look like this format? Must be a pure function of `text`.
    fn detect(&self, text: &str) -> Detection;

    /// Pull every schema column out of `text`.
    ///
    /// A fixed pattern that does not match yields `""` for its column; this
    /// never fails because of a missing field.
    fn extract(&self, text: &str, ctx: &mut TaskContext) -> Result<FieldMap, DocumentError>;

    /// Best-effort validation; an empty list means the row is accepted.
    fn validate(&self, fields: &FieldMap, ctx: &mut TaskContext) -> Vec<ValidationIssue> {
        let issues = self.descriptor().validate(fields);
        if issues.is_empty() {
            ctx.note("validation passed");
        }
        for issue in &issues {
            ctx.note(format!("validation: {}", issue.message));
        }
        issues
    }

    /// Normalise a validated row (derived columns, cosmetic cleanup).
    fn finalize(&self, fields: &mut FieldMap) {
        let _ = fields;
    }

    /// Document title, when the format carries one.
    fn title(&self, text: &str) -> Option<String> {
        let _ = text;
        None
    }

    /// `(column, pattern)` pairs used by [`Extractor::extract`], for
    /// diagnostics.
    fn patterns(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// The closed set of extractors, in detection priority order.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Registry with the four built-in formats.
    pub fn builtin() -> Self {
        Self {
            extractors: vec![
                Arc::new(homologacion::HomologacionExtractor),
                Arc::new(crt::CrtExtractor),
                Arc::new(soap::SoapExtractor),
                Arc::new(permiso::PermisoExtractor),
            ],
        }
    }

    /// Registry with no extractors; every document fails detection.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Register an extractor, replacing any existing one for the same format.
    ///
    /// A new format is appended, i.e. gets the lowest detection priority.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        let format = extractor.format();
        match self.extractors.iter_mut().find(|e| e.format() == format) {
            Some(slot) => *slot = extractor,
            None => self.extractors.push(extractor),
        }
    }

    /// Extractor for an explicit format.
    pub fn get(&self, format: DocumentFormat) -> Option<&Arc<dyn Extractor>> {
        self.extractors.iter().find(|e| e.format() == format)
    }

    /// First extractor (in priority order) whose `detect` matches.
    pub fn detect(&self, text: &str) -> Option<&Arc<dyn Extractor>> {
        self.extractors.iter().find(|e| e.detect(text).is_match())
    }

    /// Registered formats in priority order.
    pub fn formats(&self) -> impl Iterator<Item = DocumentFormat> + '_ {
        self.extractors.iter().map(|e| e.format())
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.formats()).finish()
    }
}
