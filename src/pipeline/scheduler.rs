//! Bounded worker pool over an ordered backlog.
//!
//! At most `slots` documents run at once. Documents are admitted in
//! submission order; a finishing slot admits the next pending document
//! before the completion is handed to the caller. Completion order is
//! whatever the tasks make it.
//!
//! Each task runs under its own timeout, measured from admission. A timed-out
//! task's slot is released immediately; a blocking text extraction already in
//! flight on the blocking pool is left to finish on its own and its result is
//! discarded.

use super::task::{process_document, DocumentTask, TaskEnv};
use crate::error::DocumentError;
use crate::output::ExtractionOutcome;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub struct WorkerPool {
    set: JoinSet<ExtractionOutcome>,
    backlog: VecDeque<DocumentTask>,
    /// Admitted, not yet completed: index → file name.
    running: BTreeMap<usize, String>,
    slots: usize,
    task_timeout: Duration,
    env: TaskEnv,
}

impl WorkerPool {
    pub fn new(tasks: Vec<DocumentTask>, slots: usize, task_timeout: Duration, env: TaskEnv) -> Self {
        Self {
            set: JoinSet::new(),
            backlog: tasks.into(),
            running: BTreeMap::new(),
            slots: slots.max(1),
            task_timeout,
            env,
        }
    }

    /// Number of slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Documents currently occupying a slot.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// Documents not yet admitted.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_idle(&self) -> bool {
        self.backlog.is_empty() && self.running.is_empty()
    }

    fn admit(&mut self) {
        while self.running.len() < self.slots {
            let Some(task) = self.backlog.pop_front() else {
                break;
            };
            debug!(index = task.index, file = %task.file_name, "admitting document");
            self.running.insert(task.index, task.file_name.clone());
            self.set
                .spawn(guarded(task, self.env.clone(), self.task_timeout));
        }
    }

    /// Wait for the next completed document. `None` once every document has
    /// completed.
    ///
    /// Cancel-safe: dropping the returned future loses no outcome.
    pub async fn next_completion(&mut self) -> Option<ExtractionOutcome> {
        loop {
            self.admit();
            match self.set.join_next().await? {
                Ok(outcome) => {
                    self.running.remove(&outcome.index());
                    self.admit();
                    return Some(outcome);
                }
                // Only reachable through `abort_all`; the wrapper catches panics.
                Err(e) => warn!("worker task ended without an outcome: {e}"),
            }
        }
    }

    /// Outcomes of tasks that have already finished but were not yet handed
    /// out, without waiting and without admitting anything new.
    pub fn drain_finished(&mut self) -> Vec<ExtractionOutcome> {
        let mut finished = Vec::new();
        while let Some(joined) = self.set.try_join_next() {
            match joined {
                Ok(outcome) => {
                    self.running.remove(&outcome.index());
                    finished.push(outcome);
                }
                Err(e) => warn!("worker task ended without an outcome: {e}"),
            }
        }
        finished
    }

    /// Stop everything: admitted tasks are aborted, pending ones dropped.
    ///
    /// Returns `(index, file_name)` of every document that had not completed,
    /// in submission order.
    pub fn abort_all(&mut self) -> Vec<(usize, String)> {
        self.set.abort_all();
        let mut unfinished: Vec<(usize, String)> =
            std::mem::take(&mut self.running).into_iter().collect();
        unfinished.extend(self.backlog.drain(..).map(|t| (t.index, t.file_name)));
        unfinished.sort_by_key(|(index, _)| *index);
        unfinished
    }
}

/// One task, with its timeout applied and panics turned into outcomes.
async fn guarded(task: DocumentTask, env: TaskEnv, task_timeout: Duration) -> ExtractionOutcome {
    let index = task.index;
    let file_name = task.file_name.clone();

    let run = tokio::time::timeout(task_timeout, process_document(task, env));
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_elapsed)) => {
            warn!(index, file = %file_name, "document timed out after {:?}", task_timeout);
            ExtractionOutcome::failure(
                index,
                file_name,
                DocumentError::Timeout {
                    after_ms: task_timeout.as_millis() as u64,
                },
            )
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!(index, file = %file_name, "document task panicked: {msg}");
            ExtractionOutcome::failure(index, file_name, DocumentError::Internal(msg))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
