//! Outcome slots and the submission-ordered report.

use crate::error::DocumentError;
use crate::format::DocumentFormat;
use crate::output::{BatchReport, ExtractionOutcome, FailureRow};
use tracing::warn;

/// Stores each document's outcome in its submission slot.
#[derive(Debug)]
pub struct ResultAggregator {
    file_names: Vec<String>,
    slots: Vec<Option<ExtractionOutcome>>,
    filled: usize,
}

impl ResultAggregator {
    /// One slot per submitted document, named by its sanitised file name.
    pub fn new(file_names: Vec<String>) -> Self {
        let slots = vec![None; file_names.len()];
        Self {
            file_names,
            slots,
            filled: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Store an outcome. Returns `false` (and keeps the first) for a slot
    /// that is already filled or out of range.
    pub fn insert(&mut self, outcome: ExtractionOutcome) -> bool {
        let index = outcome.index();
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(outcome);
                self.filled += 1;
                true
            }
            Some(_) => {
                warn!(index, "duplicate outcome ignored");
                false
            }
            None => {
                warn!(index, "outcome for unknown document ignored");
                false
            }
        }
    }

    /// Fold the slots, in submission order, into the report.
    ///
    /// An empty slot is reported as an internal failure so the totals always
    /// add up to the number of submitted documents.
    pub fn finish(self, format: Option<DocumentFormat>) -> BatchReport {
        let total_processed = self.slots.len();
        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for (index, (slot, file_name)) in self.slots.into_iter().zip(self.file_names).enumerate() {
            let outcome = slot.unwrap_or_else(|| {
                ExtractionOutcome::failure(
                    index,
                    file_name,
                    DocumentError::Internal("the document never completed".into()),
                )
            });
            match outcome {
                ExtractionOutcome::Success(s) => successes.push(s),
                ExtractionOutcome::Failure(f) => failures.push(FailureRow {
                    file_name: f.file_name,
                    error: f.message,
                    kind: f.kind,
                }),
            }
        }

        BatchReport {
            total_processed,
            total_success: successes.len(),
            total_failure: failures.len(),
            successes,
            failures,
            format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::output::DocumentSuccess;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{i}.pdf")).collect()
    }

    fn ok(i: usize) -> ExtractionOutcome {
        ExtractionOutcome::Success(DocumentSuccess {
            index: i,
            file_name: format!("{i}.pdf"),
            format: DocumentFormat::Soap,
            fields: DocumentFormat::Soap.descriptor().empty_row(),
            title: None,
            patterns: None,
        })
    }

    fn fail(i: usize) -> ExtractionOutcome {
        ExtractionOutcome::failure(i, format!("{i}.pdf"), DocumentError::NoFormatDetected)
    }

    #[test]
    fn report_is_in_submission_order() {
        let mut agg = ResultAggregator::new(names(4));
        for o in [fail(3), ok(2), fail(0), ok(1)] {
            assert!(agg.insert(o));
        }
        assert!(agg.is_complete());
        let report = agg.finish(None);
        assert_eq!(report.total_processed, 4);
        assert_eq!(report.total_success + report.total_failure, 4);
        let ok_files: Vec<_> = report.successes.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(ok_files, vec!["1.pdf", "2.pdf"]);
        let failed: Vec<_> = report.failures.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(failed, vec!["0.pdf", "3.pdf"]);
    }

    #[test]
    fn duplicates_and_strays_are_ignored() {
        let mut agg = ResultAggregator::new(names(1));
        assert!(agg.insert(ok(0)));
        assert!(!agg.insert(fail(0)));
        assert!(!agg.insert(ok(5)));
        assert_eq!(agg.filled(), 1);
        assert_eq!(agg.finish(None).total_success, 1);
    }

    #[test]
    fn missing_slot_becomes_internal_failure() {
        let mut agg = ResultAggregator::new(names(2));
        agg.insert(ok(0));
        let report = agg.finish(Some(DocumentFormat::Soap));
        assert_eq!(report.total_failure, 1);
        assert_eq!(report.failures[0].kind, ErrorKind::Internal);
        assert_eq!(report.failures[0].file_name, "1.pdf");
    }

    #[test]
    fn empty_aggregator_gives_zeroed_report() {
        let report = ResultAggregator::new(Vec::new()).finish(None);
        assert_eq!(report.total_processed, 0);
        assert!(report.successes.is_empty() && report.failures.is_empty());
    }
}
