//! Output types: per-document outcomes, progress events and the batch report.
//!
//! Wire names follow the event protocol consumed by the upload front-end
//! (`progress`, `elapsedMsSoFar`, `totalExitosos`, …), so these types can be
//! serialised straight onto an SSE stream.

use crate::error::{DocumentError, ErrorKind};
use crate::format::{DocumentFormat, FieldMap};
use base64::Engine as _;
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of processing one document. Produced exactly once per task.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Success(DocumentSuccess),
    Failure(DocumentFailure),
}

impl ExtractionOutcome {
    /// Submission index of the source document.
    pub fn index(&self) -> usize {
        match self {
            ExtractionOutcome::Success(s) => s.index,
            ExtractionOutcome::Failure(f) => f.index,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ExtractionOutcome::Success(s) => &s.file_name,
            ExtractionOutcome::Failure(f) => &f.file_name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    /// Build the failure outcome for `error`.
    pub fn failure(index: usize, file_name: impl Into<String>, error: DocumentError) -> Self {
        let file_name = file_name.into();
        ExtractionOutcome::Failure(DocumentFailure {
            index,
            kind: error.kind(),
            message: format!("{file_name}: {error}"),
            file_name,
            error,
        })
    }
}

/// A document whose fields were extracted and accepted.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSuccess {
    #[serde(skip)]
    pub index: usize,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(skip)]
    pub format: DocumentFormat,
    /// Exactly the descriptor's columns, in descriptor order.
    #[serde(rename = "datos")]
    pub fields: FieldMap,
    #[serde(rename = "titulo")]
    pub title: Option<String>,
    /// `{column: pattern}`, present only when diagnostics were requested.
    #[serde(rename = "regexes")]
    pub patterns: Option<BTreeMap<String, String>>,
}

/// A document that failed; the batch carries on without it.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub index: usize,
    pub file_name: String,
    pub kind: ErrorKind,
    /// Display-ready message, prefixed with the file name.
    pub message: String,
    pub error: DocumentError,
}

/// Status of one completed document on the progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Fulfilled,
    Rejected,
}

/// One progress event; emitted once per completed document.
///
/// `progress` runs from 1 to `total` with no gaps, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub progress: usize,
    pub total: usize,
    pub file: String,
    pub status: ProgressStatus,
    pub successes: usize,
    pub failures: usize,
    pub elapsed_ms_so_far: u64,
    pub estimated_ms_left: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// `{fileName, error}` row of the failure list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRow {
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub error: String,
    pub kind: ErrorKind,
}

/// Final, submission-ordered result of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    #[serde(rename = "totalProcesados")]
    pub total_processed: usize,
    #[serde(rename = "totalExitosos")]
    pub total_success: usize,
    #[serde(rename = "totalFallidos")]
    pub total_failure: usize,
    #[serde(rename = "exitosos")]
    pub successes: Vec<DocumentSuccess>,
    #[serde(rename = "fallidos")]
    pub failures: Vec<FailureRow>,
    /// Format requested for the batch; `None` in auto mode.
    #[serde(skip)]
    pub format: Option<DocumentFormat>,
}

impl BatchReport {
    /// Distinct formats among the successes, in detection priority order.
    pub fn formats_present(&self) -> Vec<DocumentFormat> {
        let mut formats: Vec<DocumentFormat> = self.successes.iter().map(|s| s.format).collect();
        formats.sort();
        formats.dedup();
        formats
    }
}

/// Table produced by a [`crate::sink::TableSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Report plus the tables built from it.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub report: BatchReport,
    pub table: TableArtifact,
    /// Totals and failed files.
    pub statistics: TableArtifact,
}

/// Terminal event payload: the report with the table inlined as base64.
#[derive(Debug, Clone, Serialize)]
pub struct FinalSummary {
    #[serde(flatten)]
    pub report: BatchReport,
    pub table: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    /// Statistics table, base64.
    #[serde(rename = "estadisticas")]
    pub statistics: String,
}

impl From<&BatchOutput> for FinalSummary {
    fn from(out: &BatchOutput) -> Self {
        Self {
            report: out.report.clone(),
            table: base64::engine::general_purpose::STANDARD.encode(&out.table.bytes),
            file_name: out.table.file_name.clone(),
            statistics: base64::engine::general_purpose::STANDARD.encode(&out.statistics.bytes),
        }
    }
}

/// An item on the batch event stream.
///
/// A stream carries N `Progress` events followed by exactly one `Final`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchEvent {
    Progress(ProgressEvent),
    Final {
        #[serde(rename = "final")]
        summary: Box<FinalSummary>,
    },
}

impl BatchEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, BatchEvent::Final { .. })
    }

    /// Render as one Server-Sent Events frame (`data: {json}\n\n`).
    pub fn to_sse(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {json}\n\n"),
            Err(e) => format!("data: {{\"error\":\"{e}\"}}\n\n"),
        }
    }
}
