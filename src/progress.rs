//! Progress-callback trait for per-card batch events.
//!
//! Inject an [`Arc<dyn ProxyProgressCallback>`] via
//! [`crate::config::ProxyConfigBuilder::progress_callback`] to hear about
//! each decklist entry as it is resolved, downloaded and normalized.
//!
//! # Why callbacks instead of channels?
//!
//! A callback is the smallest integration point: the CLI drives a terminal
//! progress bar from it, [`crate::worker`] forwards it into a channel for
//! front ends, and the library never needs to know which one is listening.
//!
//! # Example
//!
//! ```rust
//! use op_proxy::{ProxyConfig, ProxyProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Misses(AtomicUsize);
//!
//! impl ProxyProgressCallback for Misses {
//!     fn on_card_error(&self, _index: usize, _total: usize, identifier: &str, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{identifier}: {error}");
//!     }
//! }
//!
//! let config = ProxyConfig::builder()
//!     .progress_callback(Arc::new(Misses(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it works through the decklist.
///
/// Entries are processed one at a time, so calls never overlap, but the
/// driver may run on any Tokio worker thread. `index` is 1-based and
/// `total` is the number of decklist entries (not card copies).
pub trait ProxyProgressCallback: Send + Sync {
    /// Called once before the first entry.
    ///
    /// # Arguments
    /// * `total_entries` — distinct decklist entries
    /// * `total_cards`   — sum of all quantities
    fn on_batch_start(&self, total_entries: usize, total_cards: u32) {
        let _ = (total_entries, total_cards);
    }

    /// Called before the sources are consulted for an entry.
    fn on_card_start(&self, index: usize, total: usize, identifier: &str) {
        let _ = (index, total, identifier);
    }

    /// Called when a source supplied an image reference.
    ///
    /// `watermarked` is true for sources whose art carries a SAMPLE stamp.
    fn on_card_resolved(
        &self,
        index: usize,
        total: usize,
        identifier: &str,
        provenance: &str,
        watermarked: bool,
    ) {
        let _ = (index, total, identifier, provenance, watermarked);
    }

    /// Called when the entry's image is normalized and ready for layout.
    fn on_card_complete(&self, index: usize, total: usize, identifier: &str, copies: u32) {
        let _ = (index, total, identifier, copies);
    }

    /// Called when the entry will be missing from the sheet.
    fn on_card_error(&self, index: usize, total: usize, identifier: &str, error: &str) {
        let _ = (index, total, identifier, error);
    }

    /// Called once after every entry has been attempted.
    ///
    /// # Arguments
    /// * `total_entries`  — entries attempted
    /// * `rendered_cards` — card copies that will be printed
    fn on_batch_complete(&self, total_entries: usize, rendered_cards: u32) {
        let _ = (total_entries, rendered_cards);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ProxyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProxyConfig`].
pub type ProgressCallback = Arc<dyn ProxyProgressCallback>;
