//! Pipeline stages for batch extraction.
//!
//! Each submodule owns one concern of a running batch, so each can be tested
//! on its own and the batch driver in [`crate::batch`] only wires them.
//!
//! ## Data Flow
//!
//! ```text
//! backlog ──▶ scheduler ──▶ task ──────────────▶ progress ──▶ events
//! (ordered)   (C slots)     (text → extractor)      │
//!                                                   └──────▶ aggregate ──▶ report
//! ```
//!
//! 1. [`scheduler`]: bounded worker pool; admits the next document as soon
//!    as a slot frees, applies the per-task timeout, turns panics into
//!    failures
//! 2. [`task`]: runs one document through text extraction on the blocking pool,
//!    format resolution, extract → validate → finalize
//! 3. [`progress`]: running counters, elapsed time and ETA; one event per
//!    completed document with sequence numbers 1..N
//! 4. [`aggregate`]: outcomes stored by submission index and folded into
//!    the submission-ordered [`crate::output::BatchReport`]

pub mod aggregate;
pub mod progress;
pub mod scheduler;
pub mod task;
