//! Text-extraction backends: document bytes → plain text.
//!
//! The pipeline only ever sees a `String` per document. Everything about
//! how that string is obtained lives behind [`TextExtractor`], which is
//! synchronous and always called from `tokio::task::spawn_blocking`.

use crate::error::DocumentError;

/// Turns one document payload into its text layer.
///
/// Implementations may block (parsing a PDF is CPU-bound) and must be
/// `Send + Sync`: one instance serves every concurrently running task.
pub trait TextExtractor: Send + Sync {
    /// Extract the text of `bytes`. `file_name` is only used for messages.
    ///
    /// Returning an empty string is allowed; the pipeline treats empty or
    /// whitespace-only text as [`DocumentError::NoExtractableText`].
    fn extract_text(&self, file_name: &str, bytes: &[u8]) -> Result<String, DocumentError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Reject text with nothing but whitespace in it.
pub fn require_text(text: String) -> Result<String, DocumentError> {
    if text.trim().is_empty() {
        Err(DocumentError::NoExtractableText {
            detail: "the document has no text layer".into(),
        })
    } else {
        Ok(text)
    }
}

/// PDF text layer via the `pdf-extract` crate.
///
/// Scanned PDFs without an embedded text layer come back empty and fail with
/// [`DocumentError::NoExtractableText`]; there is no OCR fallback.
#[cfg(feature = "pdf")]
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

#[cfg(feature = "pdf")]
impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, file_name: &str, bytes: &[u8]) -> Result<String, DocumentError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(DocumentError::NoExtractableText {
                detail: format!("'{file_name}' is not a PDF"),
            });
        }
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| DocumentError::NoExtractableText {
            detail: format!("PDF parse error: {e}"),
        })
    }

    fn backend_name(&self) -> &'static str {
        "pdf-extract"
    }
}

/// UTF-8 passthrough for already-extracted text (`.txt` inputs, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, file_name: &str, bytes: &[u8]) -> Result<String, DocumentError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| DocumentError::NoExtractableText {
            detail: format!("'{file_name}' is not valid UTF-8: {e}"),
        })
    }

    fn backend_name(&self) -> &'static str {
        "plain-text"
    }
}

/// The default backend: PDF when the `pdf` feature is on, plain text otherwise.
pub fn default_text_extractor() -> std::sync::Arc<dyn TextExtractor> {
    #[cfg(feature = "pdf")]
    {
        std::sync::Arc::new(PdfTextExtractor)
    }
    #[cfg(not(feature = "pdf"))]
    {
        std::sync::Arc::new(PlainTextExtractor)
    }
}
