//! Error types for the doc2table library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] is **fatal**: the batch cannot start at all (no files,
//!   too many files, an oversized payload, a bad concurrency override) or the
//!   finished report cannot be turned into a table. Returned as
//!   `Err(BatchError)` from the top-level `process_batch*` functions, before
//!   any document is scheduled.
//!
//! * [`DocumentError`] is **non-fatal**: a single document failed (no text
//!   layer, wrong format, missing fields, timeout) but every other document
//!   is unaffected. Stored inside the
//!   [`crate::output::ExtractionOutcome::Failure`] for that document so the
//!   batch always completes with a report, even when every document fails.

use crate::format::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doc2table library.
///
/// Document-level failures use [`DocumentError`] and end up in the
/// [`crate::output::BatchReport`] rather than being propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Preconditions ─────────────────────────────────────────────────────
    /// The batch contained no documents.
    #[error("No documents were provided")]
    EmptyBatch,

    /// More documents than the configured limit.
    #[error("Too many documents: {count} submitted, the limit is {max}")]
    TooManyFiles { count: usize, max: usize },

    /// A single payload exceeds the configured size limit.
    #[error("File '{file}' is {size} bytes, exceeding the maximum of {max} bytes")]
    FileTooLarge { file: String, size: usize, max: usize },

    /// The per-request concurrency override is unusable.
    #[error("Invalid concurrency {requested}: must be at least 1")]
    InvalidConcurrency { requested: usize },

    /// A format tag that is not one of the supported formats.
    #[error("Unknown document format '{input}'. Allowed values: {allowed}")]
    UnknownFormat { input: String, allowed: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The tabular sink could not serialise the report.
    #[error("Failed to build the output table: {0}")]
    TableOutput(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// True for errors raised by the pre-flight checks, i.e. the batch was
    /// rejected before any document was scheduled.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BatchError::EmptyBatch
                | BatchError::TooManyFiles { .. }
                | BatchError::FileTooLarge { .. }
                | BatchError::InvalidConcurrency { .. }
                | BatchError::UnknownFormat { .. }
        )
    }
}

/// Machine-readable classification of a per-document failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NoExtractableText,
    FormatMismatch,
    NoFormatDetected,
    MissingRequiredField,
    MalformedField,
    MissingAllOptionalGroups,
    Timeout,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One problem found while validating an extracted field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: ErrorKind,
    /// Column (or group name, for [`ErrorKind::MissingAllOptionalGroups`]).
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn missing(field: &str) -> Self {
        Self {
            kind: ErrorKind::MissingRequiredField,
            field: field.to_string(),
            message: format!("Missing required field \"{field}\"."),
        }
    }

    pub fn too_short(field: &str, min_len: usize) -> Self {
        Self {
            kind: ErrorKind::MalformedField,
            field: field.to_string(),
            message: format!("Field \"{field}\" is incomplete (fewer than {min_len} characters)."),
        }
    }

    pub fn malformed(field: &str, value: &str) -> Self {
        Self {
            kind: ErrorKind::MalformedField,
            field: field.to_string(),
            message: format!(
                "Field \"{field}\" with value \"{value}\" does not match the expected format."
            ),
        }
    }

    pub fn no_optional_group(groups: &[&str]) -> Self {
        let names = groups
            .iter()
            .map(|g| format!("\"{g}\""))
            .collect::<Vec<_>>()
            .join(" or ");
        Self {
            kind: ErrorKind::MissingAllOptionalGroups,
            field: groups.join("|"),
            message: format!("At least one of the sections {names} must be present."),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A non-fatal error for a single document.
///
/// Converted into an [`crate::output::ExtractionOutcome::Failure`] at the
/// task boundary; it never unwinds past the scheduler.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum DocumentError {
    /// The text layer is missing, empty or unreadable.
    #[error("no extractable text ({detail})")]
    NoExtractableText { detail: String },

    /// An explicit target format was requested but the document is another one.
    #[error(
        "does not match the expected format ({expected}). Detected format: {}",
        detected_name(.found)
    )]
    FormatMismatch {
        expected: DocumentFormat,
        found: Option<DocumentFormat>,
    },

    /// Auto-detection found no registered format.
    #[error("could not be identified as any supported format")]
    NoFormatDetected,

    /// Best-effort validation rejected the extracted fields.
    #[error("has data problems:\n - {}", join_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    /// The document did not finish within its time budget.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The task crashed; only this document is affected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    /// Classify the error for the report and the progress stream.
    ///
    /// Validation failures take the kind of their first issue; required
    /// fields are checked before optional groups, so a missing required field
    /// wins over everything else.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::NoExtractableText { .. } => ErrorKind::NoExtractableText,
            DocumentError::FormatMismatch { .. } => ErrorKind::FormatMismatch,
            DocumentError::NoFormatDetected => ErrorKind::NoFormatDetected,
            DocumentError::Validation { issues } => issues
                .first()
                .map(|i| i.kind)
                .unwrap_or(ErrorKind::MalformedField),
            DocumentError::Timeout { .. } => ErrorKind::Timeout,
            DocumentError::Internal(_) => ErrorKind::Internal,
        }
    }
}

fn detected_name(found: &Option<DocumentFormat>) -> String {
    match found {
        Some(f) => f.to_string(),
        None => "unknown format".to_string(),
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("\n - ")
}
