//! Running counters, elapsed time and ETA.

use crate::output::{ExtractionOutcome, ProgressEvent, ProgressStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Tracks completion of one batch and builds its progress events.
///
/// The counters are atomics so a reporter can be shared for read access
/// (e.g. by a status endpoint) while the driver records completions.
#[derive(Debug)]
pub struct ProgressReporter {
    total: usize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self::starting_at(total, Instant::now())
    }

    pub fn starting_at(total: usize, started: Instant) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            started,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Record one completed document and build its event.
    pub fn record(&self, outcome: &ExtractionOutcome) -> ProgressEvent {
        self.record_at(outcome, Instant::now())
    }

    /// [`ProgressReporter::record`] with an explicit clock reading.
    pub fn record_at(&self, outcome: &ExtractionOutcome, now: Instant) -> ProgressEvent {
        let (status, error, kind) = match outcome {
            ExtractionOutcome::Success(_) => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                (ProgressStatus::Fulfilled, None, None)
            }
            ExtractionOutcome::Failure(f) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                (ProgressStatus::Rejected, Some(f.message.clone()), Some(f.kind))
            }
        };
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        let elapsed_ms = now.saturating_duration_since(self.started).as_millis() as u64;
        let remaining = self.total.saturating_sub(completed) as u64;
        let estimated_ms_left = if remaining == 0 {
            0
        } else {
            elapsed_ms.saturating_mul(remaining) / completed as u64
        };

        ProgressEvent {
            progress: completed,
            total: self.total,
            file: outcome.file_name().to_string(),
            status,
            successes: self.succeeded(),
            failures: self.failed(),
            elapsed_ms_so_far: elapsed_ms,
            estimated_ms_left,
            error,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentError;
    use std::time::Duration;

    fn fail(i: usize) -> ExtractionOutcome {
        ExtractionOutcome::failure(i, format!("{i}.pdf"), DocumentError::NoFormatDetected)
    }

    #[test]
    fn sequence_and_running_totals() {
        let reporter = ProgressReporter::new(3);
        let e1 = reporter.record(&fail(2));
        let e2 = reporter.record(&fail(0));
        assert_eq!((e1.progress, e2.progress), (1, 2));
        assert_eq!(e2.failures, 2);
        assert_eq!(e2.successes, 0);
        assert_eq!(e1.file, "2.pdf");
        assert_eq!(e1.status, ProgressStatus::Rejected);
        assert!(e1.error.as_deref().unwrap().starts_with("2.pdf: "));
    }

    #[test]
    fn eta_trends_to_zero_for_uniform_latency() {
        let start = Instant::now();
        let reporter = ProgressReporter::starting_at(5, start);
        let etas: Vec<u64> = (1..=5)
            .map(|k| {
                reporter
                    .record_at(&fail(k - 1), start + Duration::from_millis(100 * k as u64))
                    .estimated_ms_left
            })
            .collect();
        assert_eq!(etas, vec![400, 300, 200, 100, 0]);
    }

    #[test]
    fn last_event_has_zero_eta_even_when_fast() {
        let reporter = ProgressReporter::new(1);
        let e = reporter.record(&fail(0));
        assert_eq!(e.estimated_ms_left, 0);
        assert_eq!(e.progress, e.total);
    }
}
