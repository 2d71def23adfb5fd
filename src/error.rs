//! Error types for the op-proxy library.
//!
//! Three layers of failure, matching how far each one is allowed to travel:
//!
//! * [`SourceError`] — a single source adapter failed (network, timeout,
//!   markup, bad URL). Never leaves the adapter: it is logged and turned
//!   into "no result" so the resolver simply moves on to the next source.
//!
//! * [`CardError`] — **Non-fatal**: one decklist entry could not be
//!   rendered (no source had it, the download failed, the bytes were not an
//!   image). Stored inside [`crate::output::CardOutcome`]; the batch carries
//!   on with the next entry.
//!
//! * [`ProxyError`] — **Fatal**: nothing sensible can be produced (the
//!   decklist is unreadable, no cards were requested, the PDF cannot be
//!   written). Returned as `Err(ProxyError)` from the top-level functions.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the op-proxy library.
///
/// Per-card failures use [`CardError`] and are stored in
/// [`crate::output::CardOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ProxyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The decklist file does not exist.
    #[error("Decklist not found: '{path}'\nCheck the path exists and is readable.")]
    DecklistNotFound { path: PathBuf },

    /// The decklist exists but could not be read.
    #[error("Failed to read decklist '{path}': {source}")]
    DecklistReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request list is empty after parsing.
    #[error("No cards specified.\nPass card codes/names or a decklist with --file.")]
    NoCards,

    /// A request asks for more copies than one entry may hold.
    #[error("'{identifier}' asks for {quantity} copies; at most {max} per entry")]
    QuantityTooLarge {
        identifier: String,
        quantity: u32,
        max: u32,
    },

    /// Every entry failed; there is nothing to lay out.
    #[error("None of the {requested} requested cards could be rendered")]
    NothingRendered { requested: u32 },

    // ── Environment errors ────────────────────────────────────────────────
    /// The image cache directory could not be created.
    #[error("Cannot create cache directory '{path}': {source}")]
    CacheDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// lopdf rejected the document while encoding.
    #[error("Failed to encode PDF: {0}")]
    PdfWriteFailed(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single decklist entry.
///
/// The batch records it against the entry and continues with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum CardError {
    /// Every source was tried and none produced an image.
    #[error("Card not found: {identifier}")]
    NotFound { identifier: String },

    /// A source produced a URL but fetching it failed.
    #[error("Failed to download image for '{identifier}' from {url}: {reason}")]
    DownloadFailed {
        identifier: String,
        url: String,
        reason: String,
    },

    /// Fetching the resolved URL exceeded the download timeout.
    #[error("Download of '{identifier}' timed out after {secs}s ({url})")]
    DownloadTimeout {
        identifier: String,
        url: String,
        secs: u64,
    },

    /// The image was fetched but could not be stored in the cache.
    #[error("Failed to cache image for '{identifier}' at {path}: {reason}")]
    CacheWriteFailed {
        identifier: String,
        path: String,
        reason: String,
    },

    /// The file was not a decodable image.
    #[error("Image for '{identifier}' could not be decoded: {reason}")]
    DecodeFailed { identifier: String, reason: String },
}

impl CardError {
    /// The decklist identifier this error is about.
    pub fn identifier(&self) -> &str {
        match self {
            CardError::NotFound { identifier }
            | CardError::DownloadFailed { identifier, .. }
            | CardError::DownloadTimeout { identifier, .. }
            | CardError::CacheWriteFailed { identifier, .. }
            | CardError::DecodeFailed { identifier, .. } => identifier,
        }
    }
}

/// Failure of an [`crate::pipeline::cache::ImageFetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),
}

/// Failure inside a single source adapter.
///
/// Adapters convert these to `None`; they are only ever seen in debug logs.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("markup could not be scanned: {0}")]
    Markup(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_rendered_display() {
        let e = ProxyError::NothingRendered { requested: 12 };
        assert!(e.to_string().contains("12"), "got: {e}");
    }

    #[test]
    fn quantity_too_large_display() {
        let e = ProxyError::QuantityTooLarge {
            identifier: "OP01-001".into(),
            quantity: 5000,
            max: 1000,
        };
        let msg = e.to_string();
        assert!(msg.contains("5000") && msg.contains("1000"), "got: {msg}");
    }

    #[test]
    fn not_found_names_the_card() {
        let e = CardError::NotFound {
            identifier: "OP01-001".into(),
        };
        assert!(e.to_string().contains("OP01-001"));
        assert_eq!(e.identifier(), "OP01-001");
    }

    #[test]
    fn download_timeout_display() {
        let e = CardError::DownloadTimeout {
            identifier: "ST01-012".into(),
            url: "https://example.com/a.png".into(),
            secs: 30,
        };
        let msg = e.to_string();
        assert!(msg.contains("30s"));
        assert!(msg.contains("ST01-012"));
        assert_eq!(e.identifier(), "ST01-012");
    }

    #[test]
    fn card_error_serialises() {
        let e = CardError::DecodeFailed {
            identifier: "Nami".into(),
            reason: "bad header".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("DecodeFailed"));
        let back: CardError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }

    #[test]
    fn fetch_error_display() {
        assert_eq!(FetchError::Status(404).to_string(), "HTTP 404");
        assert_eq!(FetchError::Timeout { secs: 5 }.to_string(), "timed out after 5s");
    }
}
