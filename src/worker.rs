//! Background batches with a one-way event stream.
//!
//! ## Why a spawned task plus a channel?
//!
//! A front end (GUI, TUI, web handler) must stay responsive while a batch
//! spends tens of seconds on the network. [`spawn_batch`] moves the whole
//! run onto its own Tokio task and hands back two things: a stream of
//! [`BatchEvent`]s the front end can render as they arrive, and the task's
//! `JoinHandle` carrying the final [`SheetSummary`]. Nothing mutable is
//! shared between the two sides; events are values sent one way.
//!
//! The event stream ends when the batch task finishes, whether it succeeded
//! or not.

use crate::batch::build_sheet_to_file;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::output::SheetSummary;
use crate::pipeline::classify::CardRequest;
use crate::progress::{ProgressCallback, ProxyProgressCallback};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// Progress of a background batch. Indices are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEvent {
    Started {
        total_entries: usize,
        total_cards: u32,
    },
    CardStarted {
        index: usize,
        total: usize,
        identifier: String,
    },
    CardResolved {
        index: usize,
        total: usize,
        identifier: String,
        provenance: String,
        watermarked: bool,
    },
    CardCompleted {
        index: usize,
        total: usize,
        identifier: String,
        copies: u32,
    },
    CardFailed {
        index: usize,
        total: usize,
        identifier: String,
        error: String,
    },
    Finished {
        total_entries: usize,
        rendered_cards: u32,
    },
}

/// A boxed stream of batch events.
pub type EventStream = Pin<Box<dyn Stream<Item = BatchEvent> + Send>>;

/// Handle to a running background batch.
pub struct BatchHandle {
    /// Events in the order they happened.
    pub events: EventStream,
    /// Resolves to the written sheet's summary (or the fatal error).
    pub task: JoinHandle<Result<SheetSummary, ProxyError>>,
}

/// Forwards progress callbacks into a channel, and on to any callback that
/// was already configured.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<BatchEvent>,
    inner: Option<ProgressCallback>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::UnboundedSender<BatchEvent>, inner: Option<ProgressCallback>) -> Self {
        Self { tx, inner }
    }

    fn send(&self, event: BatchEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(event);
    }
}

impl ProxyProgressCallback for ChannelProgress {
    fn on_batch_start(&self, total_entries: usize, total_cards: u32) {
        if let Some(ref cb) = self.inner {
            cb.on_batch_start(total_entries, total_cards);
        }
        self.send(BatchEvent::Started {
            total_entries,
            total_cards,
        });
    }

    fn on_card_start(&self, index: usize, total: usize, identifier: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_card_start(index, total, identifier);
        }
        self.send(BatchEvent::CardStarted {
            index,
            total,
            identifier: identifier.to_string(),
        });
    }

    fn on_card_resolved(
        &self,
        index: usize,
        total: usize,
        identifier: &str,
        provenance: &str,
        watermarked: bool,
    ) {
        if let Some(ref cb) = self.inner {
            cb.on_card_resolved(index, total, identifier, provenance, watermarked);
        }
        self.send(BatchEvent::CardResolved {
            index,
            total,
            identifier: identifier.to_string(),
            provenance: provenance.to_string(),
            watermarked,
        });
    }

    fn on_card_complete(&self, index: usize, total: usize, identifier: &str, copies: u32) {
        if let Some(ref cb) = self.inner {
            cb.on_card_complete(index, total, identifier, copies);
        }
        self.send(BatchEvent::CardCompleted {
            index,
            total,
            identifier: identifier.to_string(),
            copies,
        });
    }

    fn on_card_error(&self, index: usize, total: usize, identifier: &str, error: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_card_error(index, total, identifier, error);
        }
        self.send(BatchEvent::CardFailed {
            index,
            total,
            identifier: identifier.to_string(),
            error: error.to_string(),
        });
    }

    fn on_batch_complete(&self, total_entries: usize, rendered_cards: u32) {
        if let Some(ref cb) = self.inner {
            cb.on_batch_complete(total_entries, rendered_cards);
        }
        self.send(BatchEvent::Finished {
            total_entries,
            rendered_cards,
        });
    }
}

/// Run [`build_sheet_to_file`] on a background task.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use op_proxy::{parse_decklist, spawn_batch, BatchEvent, ProxyConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let requests = parse_decklist("4x OP01-001\n2 ST01-012\n");
/// let mut handle = spawn_batch(requests, "deck.pdf".into(), ProxyConfig::default());
/// while let Some(event) = handle.events.next().await {
///     if let BatchEvent::CardFailed { identifier, error, .. } = event {
///         eprintln!("{identifier}: {error}");
///     }
/// }
/// let summary = handle.task.await??;
/// println!("{} pages", summary.page_count);
/// # Ok(())
/// # }
/// ```
pub fn spawn_batch(requests: Vec<CardRequest>, output: PathBuf, config: ProxyConfig) -> BatchHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut config = config;
    let forward = ChannelProgress::new(tx, config.progress_callback.take());
    config.progress_callback = Some(Arc::new(forward));

    let task = tokio::spawn(async move { build_sheet_to_file(&requests, &output, &config).await });

    BatchHandle {
        events: Box::pin(UnboundedReceiverStream::new(rx)),
        task,
    }
}
