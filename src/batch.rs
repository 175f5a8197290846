//! Batch orchestration: preconditions, the driver loop and finalisation.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──▶ Running ──▶ Finalizing ──▶ Done
//!   │                      │
//!   └──────▶ Aborted ◀─────┘
//! ```
//!
//! `Idle → Aborted` happens when a precondition fails (empty batch, too many
//! files, oversized payload, bad concurrency); nothing is scheduled and no
//! event is emitted. `Finalizing → Aborted` happens only when the table sink
//! fails. A failing document never aborts the batch.
//!
//! Use [`BatchPipeline::process_batch`] to wait for the whole report, or
//! [`crate::stream::process_batch_stream`] to receive progress events as
//! documents complete.

use crate::config::BatchConfig;
use crate::error::{BatchError, DocumentError};
use crate::extractor::ExtractorRegistry;
use crate::format::DocumentFormat;
use crate::output::{BatchEvent, BatchOutput, BatchReport, ExtractionOutcome, FinalSummary};
use crate::pipeline::aggregate::ResultAggregator;
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::scheduler::WorkerPool;
use crate::pipeline::task::{DocumentTask, TaskEnv};
use crate::sink::{self, CsvTableSink, TableSink};
use crate::source::{default_text_extractor, TextExtractor};
use crate::text::safe_filename;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Item type of the event channel.
pub type EventItem = Result<BatchEvent, BatchError>;
pub(crate) type EventSender = mpsc::Sender<EventItem>;

// ── Request ──────────────────────────────────────────────────────────────

/// One uploaded document.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl DocumentInput {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A batch submission.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub documents: Vec<DocumentInput>,
    /// Target format; `None` auto-detects each document.
    pub format: Option<DocumentFormat>,
    /// Per-request concurrency; clamped to the configured maximum.
    pub concurrency: Option<usize>,
    /// Attach each extractor's field patterns to its successes.
    pub include_patterns: bool,
}

impl BatchRequest {
    pub fn new(documents: Vec<DocumentInput>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    pub fn format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    pub fn include_patterns(mut self, v: bool) -> Self {
        self.include_patterns = v;
        self
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Finalizing,
    Done,
    Aborted,
}

impl BatchState {
    pub fn can_advance_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Idle, Running) | (Idle, Aborted) | (Running, Finalizing) | (Finalizing, Done) | (Finalizing, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Done | BatchState::Aborted)
    }
}

/// Tracks the state of one batch and rejects illegal transitions.
#[derive(Debug)]
pub struct BatchLifecycle {
    state: BatchState,
}

impl Default for BatchLifecycle {
    fn default() -> Self {
        Self {
            state: BatchState::Idle,
        }
    }
}

impl BatchLifecycle {
    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn advance(&mut self, next: BatchState) -> Result<(), BatchError> {
        if !self.state.can_advance_to(next) {
            return Err(BatchError::Internal(format!(
                "illegal batch transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "batch state");
        self.state = next;
        Ok(())
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// A batch that passed its preconditions and is ready to run.
#[derive(Debug)]
pub struct PreparedBatch {
    tasks: Vec<DocumentTask>,
    file_names: Vec<String>,
    format: Option<DocumentFormat>,
    concurrency: usize,
    include_patterns: bool,
    lifecycle: BatchLifecycle,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// `Idle` until the batch is run.
    pub fn state(&self) -> BatchState {
        self.lifecycle.state()
    }

    /// Sanitised file names, in submission order.
    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }
}

/// Runs batches: one config, one registry, one text backend, one sink.
///
/// Cheap to clone; every collaborator is behind an `Arc`.
#[derive(Clone)]
pub struct BatchPipeline {
    config: BatchConfig,
    registry: Arc<ExtractorRegistry>,
    text_extractor: Arc<dyn TextExtractor>,
    sink: Arc<dyn TableSink>,
}

impl fmt::Debug for BatchPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchPipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("text_extractor", &self.text_extractor.backend_name())
            .finish()
    }
}

impl Default for BatchPipeline {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

impl BatchPipeline {
    /// Built-in formats, the default text backend and CSV output.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ExtractorRegistry::builtin()),
            text_extractor: default_text_extractor(),
            sink: Arc::new(CsvTableSink::new()),
        }
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_text_extractor(mut self, text_extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = text_extractor;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TableSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Check the preconditions and turn the request into tasks.
    ///
    /// Any error here means the batch is aborted before it starts.
    pub fn prepare(&self, request: BatchRequest) -> Result<PreparedBatch, BatchError> {
        self.check(request).or_else(|e| {
            let mut lifecycle = BatchLifecycle::default();
            lifecycle.advance(BatchState::Aborted)?;
            warn!(state = ?lifecycle.state(), "Batch rejected: {e}");
            Err(e)
        })
    }

    fn check(&self, request: BatchRequest) -> Result<PreparedBatch, BatchError> {
        let count = request.documents.len();
        if count == 0 {
            return Err(BatchError::EmptyBatch);
        }
        if count > self.config.max_files {
            return Err(BatchError::TooManyFiles {
                count,
                max: self.config.max_files,
            });
        }
        let concurrency = self.config.effective_concurrency(request.concurrency)?;

        let mut tasks = Vec::with_capacity(count);
        for (index, doc) in request.documents.into_iter().enumerate() {
            let file_name = safe_filename(&doc.file_name, self.config.max_filename_len);
            if doc.bytes.len() > self.config.max_file_size_bytes {
                return Err(BatchError::FileTooLarge {
                    file: file_name,
                    size: doc.bytes.len(),
                    max: self.config.max_file_size_bytes,
                });
            }
            tasks.push(DocumentTask {
                index,
                file_name,
                payload: Arc::from(doc.bytes),
                requested_format: request.format,
            });
        }
        let file_names = tasks.iter().map(|t| t.file_name.clone()).collect();

        Ok(PreparedBatch {
            tasks,
            file_names,
            format: request.format,
            concurrency,
            include_patterns: request.include_patterns,
            lifecycle: BatchLifecycle::default(),
        })
    }

    /// Run a batch to completion and return the report and its table.
    ///
    /// # Errors
    /// Returns `Err(BatchError)` only when a precondition fails or the table
    /// sink fails. Document failures are inside the report.
    pub async fn process_batch(&self, request: BatchRequest) -> Result<BatchOutput, BatchError> {
        let prepared = self.prepare(request)?;
        self.run(prepared, None).await
    }

    /// Run a batch and write its table to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn process_batch_to_file(
        &self,
        request: BatchRequest,
        output_path: impl AsRef<Path>,
    ) -> Result<BatchReport, BatchError> {
        let output = self.process_batch(request).await?;
        let path = output_path.as_ref();
        let write_err = |e| BatchError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &output.table.bytes)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        Ok(output.report)
    }

    /// Drive a prepared batch.
    ///
    /// With `events`, every progress event and then exactly one final event
    /// are sent on it. A subscriber that goes away stops event delivery only.
    pub(crate) async fn run(
        &self,
        prepared: PreparedBatch,
        events: Option<EventSender>,
    ) -> Result<BatchOutput, BatchError> {
        let PreparedBatch {
            tasks,
            file_names,
            format,
            concurrency,
            include_patterns,
            mut lifecycle,
        } = prepared;
        let total = tasks.len();
        let callback = Arc::clone(&self.config.progress_callback);

        lifecycle.advance(BatchState::Running)?;
        info!(
            "Starting batch: {} documents, format {}, concurrency {}",
            total,
            format.map(|f| f.tag()).unwrap_or("auto"),
            concurrency
        );
        callback.on_batch_start(total);

        let env = TaskEnv {
            registry: Arc::clone(&self.registry),
            text_extractor: Arc::clone(&self.text_extractor),
            include_patterns,
        };
        let mut pool = WorkerPool::new(tasks, concurrency, self.config.task_timeout, env);
        let reporter = ProgressReporter::new(total);
        let mut aggregator = ResultAggregator::new(file_names);
        let mut outbox: VecDeque<BatchEvent> = VecDeque::new();
        let mut subscribed = events.is_some();

        // ── Step 1: Drive the pool until done or out of time ────────────
        let deadline = Instant::now() + self.config.batch_timeout;
        let batch_timer = tokio::time::sleep_until(deadline);
        tokio::pin!(batch_timer);
        let mut timed_out = false;

        while !aggregator.is_complete() {
            tokio::select! {
                biased;

                _ = &mut batch_timer => {
                    timed_out = true;
                    break;
                }

                permit = reserve_slot(events.as_ref()), if subscribed && !outbox.is_empty() => {
                    match permit {
                        Ok(permit) => {
                            if let Some(event) = outbox.pop_front() {
                                permit.send(Ok(event));
                            }
                        }
                        Err(_) => {
                            debug!("event subscriber went away; continuing without events");
                            subscribed = false;
                            outbox.clear();
                        }
                    }
                }

                next = pool.next_completion() => match next {
                    Some(outcome) => {
                        let event = reporter.record(&outcome);
                        callback.on_document_complete(&event);
                        if subscribed {
                            outbox.push_back(BatchEvent::Progress(event));
                        }
                        aggregator.insert(outcome);
                    }
                    None => break,
                },
            }
        }

        // ── Step 2: Batch timeout: everything unfinished fails ──────────
        if timed_out {
            for outcome in pool.drain_finished() {
                let event = reporter.record(&outcome);
                callback.on_document_complete(&event);
                if subscribed {
                    outbox.push_back(BatchEvent::Progress(event));
                }
                aggregator.insert(outcome);
            }
            let unfinished = pool.abort_all();
            warn!(
                "Batch timed out after {:?}; {} documents did not finish",
                self.config.batch_timeout,
                unfinished.len()
            );
            let after_ms = self.config.batch_timeout.as_millis() as u64;
            for (index, file_name) in unfinished {
                let outcome =
                    ExtractionOutcome::failure(index, file_name, DocumentError::Timeout { after_ms });
                let event = reporter.record(&outcome);
                callback.on_document_complete(&event);
                if subscribed {
                    outbox.push_back(BatchEvent::Progress(event));
                }
                aggregator.insert(outcome);
            }
        }
        drop(pool);

        // ── Step 3: Deliver outstanding progress events ─────────────────
        if subscribed {
            if let Some(tx) = events.as_ref() {
                while let Some(event) = outbox.pop_front() {
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("event subscriber went away during flush");
                        subscribed = false;
                        break;
                    }
                }
            }
        }

        // ── Step 4: Report and table ────────────────────────────────────
        lifecycle.advance(BatchState::Finalizing)?;
        let report = aggregator.finish(format);
        info!(
            "Batch complete: {}/{} succeeded, {} failed",
            report.total_success, report.total_processed, report.total_failure
        );
        callback.on_batch_complete(&report);

        let tables = sink::write_report(self.sink.as_ref(), &report).and_then(|table| {
            sink::write_statistics(self.sink.as_ref(), &report).map(|stats| (table, stats))
        });
        let (table, statistics) = match tables {
            Ok(tables) => tables,
            Err(e) => {
                lifecycle.advance(BatchState::Aborted)?;
                warn!("Batch aborted while building the table: {e}");
                return Err(e);
            }
        };
        let output = BatchOutput {
            report,
            table,
            statistics,
        };

        // ── Step 5: Final event ─────────────────────────────────────────
        if subscribed {
            if let Some(tx) = events.as_ref() {
                let summary = Box::new(FinalSummary::from(&output));
                if tx.send(Ok(BatchEvent::Final { summary })).await.is_err() {
                    debug!("event subscriber went away before the final event");
                }
            }
        }

        lifecycle.advance(BatchState::Done)?;
        Ok(output)
    }

    /// Synchronous wrapper around [`BatchPipeline::process_batch`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn process_batch_sync(&self, request: BatchRequest) -> Result<BatchOutput, BatchError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.process_batch(request))
    }
}

/// A send permit on `tx`; never resolves without a subscriber.
async fn reserve_slot(
    tx: Option<&EventSender>,
) -> Result<mpsc::Permit<'_, EventItem>, mpsc::error::SendError<()>> {
    match tx {
        Some(tx) => tx.reserve().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PlainTextExtractor;

    fn pipeline(config: BatchConfig) -> BatchPipeline {
        BatchPipeline::new(config).with_text_extractor(Arc::new(PlainTextExtractor))
    }

    fn docs(n: usize) -> Vec<DocumentInput> {
        (0..n)
            .map(|i| DocumentInput::new(format!("{i}.pdf"), "x"))
            .collect()
    }

    #[test]
    fn lifecycle_transitions() {
        let mut l = BatchLifecycle::default();
        assert_eq!(l.state(), BatchState::Idle);
        assert!(l.advance(BatchState::Finalizing).is_err());
        l.advance(BatchState::Running).unwrap();
        assert!(l.advance(BatchState::Aborted).is_err());
        l.advance(BatchState::Finalizing).unwrap();
        l.advance(BatchState::Done).unwrap();
        assert!(l.state().is_terminal());
        assert!(l.advance(BatchState::Running).is_err());
    }

    #[test]
    fn rejection_moves_idle_to_aborted() {
        let mut l = BatchLifecycle::default();
        l.advance(BatchState::Aborted).unwrap();
        assert!(l.state().is_terminal());
        assert!(l.advance(BatchState::Running).is_err());
    }

    #[test]
    fn prepared_batch_starts_idle() {
        let prepared = pipeline(BatchConfig::default())
            .prepare(BatchRequest::new(docs(2)))
            .unwrap();
        assert_eq!(prepared.state(), BatchState::Idle);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = pipeline(BatchConfig::default())
            .prepare(BatchRequest::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, BatchError::EmptyBatch));
        assert!(err.is_precondition());
    }

    #[test]
    fn too_many_files_is_rejected() {
        let config = BatchConfig::builder()
            .max_files(2)
            .concurrency(1)
            .build()
            .unwrap();
        let err = pipeline(config)
            .prepare(BatchRequest::new(docs(3)))
            .unwrap_err();
        assert!(matches!(err, BatchError::TooManyFiles { count: 3, max: 2 }));
    }

    #[test]
    fn oversized_file_names_the_file() {
        let config = BatchConfig::builder().max_file_size_bytes(4).build().unwrap();
        let request = BatchRequest::new(vec![
            DocumentInput::new("ok.pdf", "1234"),
            DocumentInput::new("../big.pdf", "12345"),
        ]);
        let err = pipeline(config).prepare(request).unwrap_err();
        match err {
            BatchError::FileTooLarge { file, size, max } => {
                assert_eq!(file, "big.pdf");
                assert_eq!((size, max), (5, 4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_concurrency_rejected_and_large_clamped() {
        let p = pipeline(BatchConfig::default());
        let err = p
            .prepare(BatchRequest::new(docs(1)).concurrency(0))
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConcurrency { requested: 0 }));

        let prepared = p
            .prepare(BatchRequest::new(docs(1)).concurrency(1_000))
            .unwrap();
        assert_eq!(prepared.concurrency(), 50);
    }

    #[test]
    fn file_names_are_sanitised_in_order() {
        let prepared = pipeline(BatchConfig::default())
            .prepare(BatchRequest::new(vec![
                DocumentInput::new("dir/a?.pdf", "x"),
                DocumentInput::new("b.pdf", "x"),
            ]))
            .unwrap();
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared.file_names(), ["a_.pdf".to_string(), "b.pdf".to_string()]);
    }
}
