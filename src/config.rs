//! Configuration types for batch extraction.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. One config is shared by every batch a
//! [`crate::batch::BatchPipeline`] runs; per-request knobs (target format,
//! concurrency override) live on [`crate::batch::BatchRequest`] instead.

use crate::error::BatchError;
use crate::progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for batch extraction.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use doc2table::BatchConfig;
/// use std::time::Duration;
///
/// let config = BatchConfig::builder()
///     .concurrency(8)
///     .task_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Largest accepted payload, in bytes. Default: 10 MiB.
    pub max_file_size_bytes: usize,

    /// Largest accepted batch. Default: 15 000.
    pub max_files: usize,

    /// Default number of documents processed at once. Default: 15.
    ///
    /// Text extraction runs on the blocking pool, so this bounds both the
    /// number of in-flight tasks and the number of blocking threads a batch
    /// can occupy.
    pub concurrency: usize,

    /// Upper bound for a per-request concurrency override. Default: 50.
    ///
    /// Larger overrides are clamped, not rejected.
    pub max_concurrency: usize,

    /// Time budget for one document, measured from when it starts. Default: 30 s.
    pub task_timeout: Duration,

    /// Time budget for the whole batch. Default: 30 min.
    ///
    /// When it expires, every unfinished document is reported as a timeout
    /// failure and the batch finalises with what it has.
    pub batch_timeout: Duration,

    /// Capacity of the event channel used by the streaming API. Default: 64.
    pub event_buffer: usize,

    /// Sanitised file names are truncated to this many characters. Default: 255.
    pub max_filename_len: usize,

    /// Receives per-document events as the batch runs.
    pub progress_callback: ProgressCallback,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * 1024 * 1024,
            max_files: 15_000,
            concurrency: 15,
            max_concurrency: 50,
            task_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(30 * 60),
            event_buffer: 64,
            max_filename_len: 255,
            progress_callback: Arc::new(NoopProgressCallback),
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("max_files", &self.max_files)
            .field("concurrency", &self.concurrency)
            .field("max_concurrency", &self.max_concurrency)
            .field("task_timeout", &self.task_timeout)
            .field("batch_timeout", &self.batch_timeout)
            .field("event_buffer", &self.event_buffer)
            .field("max_filename_len", &self.max_filename_len)
            .field("progress_callback", &"<dyn BatchProgressCallback>")
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective concurrency for one request.
    ///
    /// `None` uses the configured default; `Some(0)` is rejected; anything
    /// above [`BatchConfig::max_concurrency`] is clamped.
    pub fn effective_concurrency(&self, requested: Option<usize>) -> Result<usize, BatchError> {
        match requested {
            None => Ok(self.concurrency.min(self.max_concurrency)),
            Some(0) => Err(BatchError::InvalidConcurrency { requested: 0 }),
            Some(n) => Ok(n.min(self.max_concurrency)),
        }
    }

    /// Plain-data view of the limits, for logging and `--json` output.
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_file_size_bytes: self.max_file_size_bytes,
            max_files: self.max_files,
            concurrency: self.concurrency,
            max_concurrency: self.max_concurrency,
            task_timeout_ms: self.task_timeout.as_millis() as u64,
            batch_timeout_ms: self.batch_timeout.as_millis() as u64,
        }
    }
}

/// Serialisable snapshot of the numeric limits in a [`BatchConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLimits {
    pub max_file_size_bytes: usize,
    pub max_files: usize,
    pub concurrency: usize,
    pub max_concurrency: usize,
    pub task_timeout_ms: u64,
    pub batch_timeout_ms: u64,
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn max_file_size_bytes(mut self, n: usize) -> Self {
        self.config.max_file_size_bytes = n;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn task_timeout(mut self, d: Duration) -> Self {
        self.config.task_timeout = d;
        self
    }

    pub fn batch_timeout(mut self, d: Duration) -> Self {
        self.config.batch_timeout = d;
        self
    }

    pub fn event_buffer(mut self, n: usize) -> Self {
        self.config.event_buffer = n.max(1);
        self
    }

    pub fn max_filename_len(mut self, n: usize) -> Self {
        self.config.max_filename_len = n.max(8);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = cb;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if c.max_concurrency < c.concurrency {
            return Err(BatchError::InvalidConfig(format!(
                "max_concurrency ({}) must not be below concurrency ({})",
                c.max_concurrency, c.concurrency
            )));
        }
        if c.max_files == 0 || c.max_file_size_bytes == 0 {
            return Err(BatchError::InvalidConfig(
                "max_files and max_file_size_bytes must be positive".into(),
            ));
        }
        if c.task_timeout.is_zero() || c.batch_timeout.is_zero() {
            return Err(BatchError::InvalidConfig(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}
