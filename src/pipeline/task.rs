//! One document, start to finish.
//!
//! [`process_document`] never returns an error: every failure becomes an
//! [`ExtractionOutcome::Failure`] carrying the file name, so nothing a single
//! document does can abort the batch.

use crate::error::DocumentError;
use crate::extractor::{Extractor, ExtractorRegistry, TaskContext};
use crate::format::{DocumentFormat, FILE_NAME_COLUMN};
use crate::output::{DocumentSuccess, ExtractionOutcome};
use crate::source::{require_text, TextExtractor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

/// A document waiting for, or owned by, a worker slot.
#[derive(Debug, Clone)]
pub struct DocumentTask {
    /// Submission index (0-based).
    pub index: usize,
    /// Sanitised file name.
    pub file_name: String,
    pub payload: Arc<[u8]>,
    /// Explicit target format; `None` means auto-detect.
    pub requested_format: Option<DocumentFormat>,
}

/// Shared, read-only collaborators of every task in a batch.
#[derive(Clone)]
pub struct TaskEnv {
    pub registry: Arc<ExtractorRegistry>,
    pub text_extractor: Arc<dyn TextExtractor>,
    pub include_patterns: bool,
}

impl std::fmt::Debug for TaskEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnv")
            .field("registry", &self.registry)
            .field("text_extractor", &self.text_extractor.backend_name())
            .field("include_patterns", &self.include_patterns)
            .finish()
    }
}

/// Run one document through text extraction, format resolution, extraction,
/// validation and finalisation.
pub async fn process_document(task: DocumentTask, env: TaskEnv) -> ExtractionOutcome {
    let span = info_span!("document", index = task.index, file = %task.file_name);
    let index = task.index;
    let file_name = task.file_name.clone();

    match run(task, env).instrument(span).await {
        Ok(success) => ExtractionOutcome::Success(success),
        Err(e) => {
            warn!(index, file = %file_name, kind = %e.kind(), "document failed: {e}");
            ExtractionOutcome::failure(index, file_name, e)
        }
    }
}

async fn run(task: DocumentTask, env: TaskEnv) -> Result<DocumentSuccess, DocumentError> {
    let DocumentTask {
        index,
        file_name,
        payload,
        requested_format,
    } = task;

    // ── Step 1: Text layer (blocking pool) ──────────────────────────────
    let text_extractor = Arc::clone(&env.text_extractor);
    let name = file_name.clone();
    let text = tokio::task::spawn_blocking(move || text_extractor.extract_text(&name, &payload))
        .await
        .map_err(|e| DocumentError::Internal(format!("text extraction crashed: {e}")))??;
    let text = require_text(text)?;
    debug!(chars = text.len(), "text extracted");

    // ── Step 2: Resolve the extractor ───────────────────────────────────
    let extractor = resolve_extractor(&env.registry, &text, requested_format)?;

    // ── Step 3: Extract → validate → finalize ───────────────────────────
    let mut ctx = TaskContext::new(index, file_name.clone());
    ctx.note(format!("format {}", extractor.format()));

    let mut fields = extractor.extract(&text, &mut ctx)?;
    fields.set(FILE_NAME_COLUMN, file_name.as_str());

    let issues = extractor.validate(&fields, &mut ctx);
    if !issues.is_empty() {
        return Err(DocumentError::Validation { issues });
    }
    extractor.finalize(&mut fields);

    let patterns = env.include_patterns.then(|| {
        extractor
            .patterns()
            .into_iter()
            .map(|(column, pattern)| (column.to_string(), pattern))
            .collect::<BTreeMap<_, _>>()
    });

    Ok(DocumentSuccess {
        index,
        file_name,
        format: extractor.format(),
        title: extractor.title(&text),
        fields,
        patterns,
    })
}

/// Explicit target: the detected format must be the target. Auto: the first
/// extractor (in priority order) whose `detect` matches.
pub fn resolve_extractor(
    registry: &ExtractorRegistry,
    text: &str,
    requested: Option<DocumentFormat>,
) -> Result<Arc<dyn Extractor>, DocumentError> {
    let detected = registry.detect(text);
    match requested {
        Some(expected) => match detected {
            Some(e) if e.format() == expected => Ok(Arc::clone(e)),
            other => Err(DocumentError::FormatMismatch {
                expected,
                found: other.map(|e| e.format()),
            }),
        },
        None => detected.map(Arc::clone).ok_or(DocumentError::NoFormatDetected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::PlainTextExtractor;

    const CRT: &str = "FECHA REVISIÓN: 15 DICIEMBRE 2024\nPLANTA: SGS-001\nPLACA PATENTE ABCD12\n\
        CERTIFICADO DE REVISIÓN TÉCNICA\nVÁLIDO HASTA DICIEMBRE 2025\nN°B123456\n";

    fn env(include_patterns: bool) -> TaskEnv {
        TaskEnv {
            registry: Arc::new(ExtractorRegistry::builtin()),
            text_extractor: Arc::new(PlainTextExtractor),
            include_patterns,
        }
    }

    fn task(text: &str, format: Option<DocumentFormat>) -> DocumentTask {
        DocumentTask {
            index: 7,
            file_name: "doc.pdf".into(),
            payload: Arc::from(text.as_bytes()),
            requested_format: format,
        }
    }

    fn expect_failure(outcome: ExtractionOutcome) -> crate::output::DocumentFailure {
        match outcome {
            ExtractionOutcome::Failure(f) => f,
            ExtractionOutcome::Success(s) => panic!("expected failure, got {:?}", s.fields),
        }
    }

    #[tokio::test]
    async fn auto_detects_and_fills_file_name() {
        let outcome = process_document(task(CRT, None), env(false)).await;
        match outcome {
            ExtractionOutcome::Success(s) => {
                assert_eq!(s.index, 7);
                assert_eq!(s.format, DocumentFormat::Crt);
                assert_eq!(s.fields.value(FILE_NAME_COLUMN), "doc.pdf");
                assert!(s.patterns.is_none());
            }
            ExtractionOutcome::Failure(f) => panic!("unexpected failure: {}", f.message),
        }
    }

    #[tokio::test]
    async fn patterns_included_on_request() {
        let outcome = process_document(task(CRT, Some(DocumentFormat::Crt)), env(true)).await;
        match outcome {
            ExtractionOutcome::Success(s) => {
                let patterns = s.patterns.unwrap();
                assert!(patterns.contains_key("Folio"));
            }
            ExtractionOutcome::Failure(f) => panic!("unexpected failure: {}", f.message),
        }
    }

    #[tokio::test]
    async fn explicit_format_mismatch_names_detected_format() {
        let outcome = process_document(task(CRT, Some(DocumentFormat::Soap)), env(false)).await;
        let f = expect_failure(outcome);
        assert_eq!(f.kind, ErrorKind::FormatMismatch);
        assert!(f.message.contains("CRT"), "got: {}", f.message);
        assert!(f.message.contains("SOAP"), "got: {}", f.message);
    }

    #[tokio::test]
    async fn unknown_document_in_auto_mode() {
        let outcome = process_document(task("Factura 123", None), env(false)).await;
        assert_eq!(expect_failure(outcome).kind, ErrorKind::NoFormatDetected);
    }

    #[tokio::test]
    async fn unknown_document_with_target_is_mismatch() {
        let outcome =
            process_document(task("Factura 123", Some(DocumentFormat::Crt)), env(false)).await;
        let f = expect_failure(outcome);
        assert_eq!(f.kind, ErrorKind::FormatMismatch);
        assert!(f.message.contains("unknown format"), "got: {}", f.message);
    }

    #[tokio::test]
    async fn blank_text_is_no_extractable_text() {
        let outcome = process_document(task("   \n ", None), env(false)).await;
        assert_eq!(expect_failure(outcome).kind, ErrorKind::NoExtractableText);
    }

    #[tokio::test]
    async fn validation_failure_keeps_file_name() {
        let text = CRT.replace("PLANTA: SGS-001\n", "");
        let outcome = process_document(task(&text, None), env(false)).await;
        let f = expect_failure(outcome);
        assert_eq!(f.kind, ErrorKind::MissingRequiredField);
        assert_eq!(f.file_name, "doc.pdf");
        assert!(f.message.contains("Planta"), "got: {}", f.message);
    }
}
