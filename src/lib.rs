//! # doc2table
//!
//! Batch-extract the fields of Chilean vehicle documents (technical review
//! certificates, mandatory insurance, circulation permits, homologation
//! certificates) into one table.
//!
//! Each document's text layer is run through a hand-written, per-format
//! extractor: fixed patterns pull the fields out, a best-effort validator
//! accepts or rejects the row. One bad document never fails the batch; it
//! ends up in the failure list with a display-ready message.
//!
//! ## Pipeline Overview
//!
//! ```text
//! N documents
//!  │
//!  ├─ 1. Prepare    preconditions, safe file names         (batch)
//!  ├─ 2. Schedule   C worker slots over an ordered backlog (pipeline::scheduler)
//!  ├─ 3. Text       bytes → text on the blocking pool      (source)
//!  ├─ 4. Extract    detect → extract → validate → finalize (extractor)
//!  ├─ 5. Progress   one event per document, seq 1..N, ETA  (pipeline::progress)
//!  ├─ 6. Aggregate  outcomes in submission order           (pipeline::aggregate)
//!  └─ 7. Table      columns + rows → CSV artifact          (sink)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2table::{BatchPipeline, BatchRequest, DocumentFormat, DocumentInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let docs = vec![DocumentInput::new("a.pdf", std::fs::read("a.pdf")?)];
//!     let request = BatchRequest::new(docs).format(DocumentFormat::Crt);
//!     let output = BatchPipeline::default().process_batch(request).await?;
//!     eprintln!(
//!         "{} ok / {} failed",
//!         output.report.total_success, output.report.total_failure
//!     );
//!     std::fs::write(&output.table.file_name, &output.table.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2table` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `pdf`   | on      | PDF text layer via `pdf-extract`; without it the default backend is plain text |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod extractor;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod source;
pub mod stream;
pub mod text;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchPipeline, BatchRequest, BatchState, DocumentInput};
pub use config::{BatchConfig, BatchConfigBuilder};
pub use error::{BatchError, DocumentError, ErrorKind, ValidationIssue};
pub use extractor::{Detection, Extractor, ExtractorRegistry, TaskContext};
pub use format::{DocumentFormat, FieldMap, FormatDescriptor};
pub use output::{
    BatchEvent, BatchOutput, BatchReport, DocumentFailure, DocumentSuccess, ExtractionOutcome,
    FailureRow, ProgressEvent, ProgressStatus, TableArtifact,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback};
#[cfg(feature = "pdf")]
pub use source::PdfTextExtractor;
pub use source::{PlainTextExtractor, TextExtractor};
pub use sink::{CsvTableSink, TableSink};
pub use stream::{process_batch_stream, BatchStream};
