//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch driver records each completed document. This is the
//! synchronous counterpart of the event stream returned by
//! [`crate::stream::process_batch_stream`]; both see the same sequence.
//!
//! # Example
//!
//! ```rust
//! use doc2table::{BatchConfig, BatchProgressCallback, ProgressEvent};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, event: &ProgressEvent) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {}", event.progress, event.total, event.file);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchReport, ProgressEvent};
use std::sync::Arc;

/// Called by the batch driver as documents complete.
///
/// All methods have default no-op implementations. Calls come from the single
/// driver task, one at a time, in event order; a slow callback delays event
/// delivery but never extraction.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the preconditions pass and before any document runs.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called for every completed document, successful or not.
    fn on_document_complete(&self, event: &ProgressEvent) {
        let _ = event;
    }

    /// Called once with the final report, before the table is built.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ProgressStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        started_total: Arc<AtomicUsize>,
        completes: Arc<AtomicUsize>,
        rejected: Arc<AtomicUsize>,
        final_total: Arc<AtomicUsize>,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_documents: usize) {
            self.started_total.store(total_documents, Ordering::SeqCst);
        }

        fn on_document_complete(&self, event: &ProgressEvent) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if event.status == ProgressStatus::Rejected {
                self.rejected.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_batch_complete(&self, report: &BatchReport) {
            self.final_total.store(report.total_processed, Ordering::SeqCst);
        }
    }

    fn event(progress: usize, status: ProgressStatus) -> ProgressEvent {
        ProgressEvent {
            progress,
            total: 2,
            file: format!("{progress}.pdf"),
            status,
            successes: 0,
            failures: 0,
            elapsed_ms_so_far: 0,
            estimated_ms_left: 0,
            error: None,
            kind: None,
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(5);
        cb.on_document_complete(&event(1, ProgressStatus::Fulfilled));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            started_total: Arc::new(AtomicUsize::new(0)),
            completes: Arc::new(AtomicUsize::new(0)),
            rejected: Arc::new(AtomicUsize::new(0)),
            final_total: Arc::new(AtomicUsize::new(0)),
        };

        tracker.on_batch_start(2);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 2);

        tracker.on_document_complete(&event(1, ProgressStatus::Fulfilled));
        tracker.on_document_complete(&event(2, ProgressStatus::Rejected));
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.rejected.load(Ordering::SeqCst), 1);

        tracker.on_batch_complete(&BatchReport {
            total_processed: 2,
            total_success: 1,
            total_failure: 1,
            successes: Vec::new(),
            failures: Vec::new(),
            format: None,
        });
        assert_eq!(tracker.final_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
    }
}
