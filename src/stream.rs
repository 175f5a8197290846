//! Streaming batch API: emit progress events as documents complete.
//!
//! Unlike [`crate::batch::BatchPipeline::process_batch`], which returns only
//! after every document finishes, [`process_batch_stream`] yields one
//! [`BatchEvent::Progress`] per completed document (in completion order,
//! `progress` numbered 1..N) followed by exactly one [`BatchEvent::Final`].
//!
//! The driver runs on its own task and talks to the stream through a bounded
//! channel. A slow consumer delays event delivery; it never delays
//! extraction. Dropping the stream stops delivery but not the batch.

use crate::batch::{BatchPipeline, BatchRequest, EventItem};
use crate::error::BatchError;
use crate::output::BatchEvent;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of batch events.
///
/// An `Err` item is terminal: the table sink failed after every progress
/// event had been delivered.
pub type BatchStream = Pin<Box<dyn Stream<Item = EventItem> + Send>>;

/// Run a batch in the background, streaming its events.
///
/// Must be called from within a tokio runtime.
///
/// # Returns
/// - `Ok(BatchStream)`: N progress events, then one final event
/// - `Err(BatchError)`: a precondition failed; nothing was scheduled
///
/// # Example
/// ```rust,no_run
/// use doc2table::{process_batch_stream, BatchPipeline, BatchRequest, DocumentInput};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("crt.pdf")?;
/// let request = BatchRequest::new(vec![DocumentInput::new("crt.pdf", bytes)]);
/// let mut events = process_batch_stream(&BatchPipeline::default(), request)?;
/// while let Some(event) = events.next().await {
///     print!("{}", event?.to_sse());
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_batch_stream(
    pipeline: &BatchPipeline,
    request: BatchRequest,
) -> Result<BatchStream, BatchError> {
    let prepared = pipeline.prepare(request)?;
    info!("Starting streaming batch: {} documents", prepared.len());

    let (tx, rx) = mpsc::channel(pipeline.config().event_buffer.max(1));
    let pipeline = pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.run(prepared, Some(tx.clone())).await {
            if tx.send(Err(e)).await.is_err() {
                debug!("stream dropped before the batch error could be delivered");
            }
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

/// Render a stream of events as Server-Sent Events frames.
///
/// A terminal error becomes one `data: {"error": "..."}` frame.
pub fn sse_frames(stream: BatchStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    use futures::StreamExt;

    Box::pin(stream.map(|item| match item {
        Ok(event) => event.to_sse(),
        Err(e) => format!(
            "data: {}\n\n",
            serde_json::json!({ "error": e.to_string() })
        ),
    }))
}

/// Wait for the final event of a stream, discarding progress events.
pub async fn final_event(mut stream: BatchStream) -> Option<EventItem> {
    use futures::StreamExt;

    while let Some(item) = stream.next().await {
        match item {
            Ok(BatchEvent::Progress(_)) => continue,
            other => return Some(other),
        }
    }
    None
}
