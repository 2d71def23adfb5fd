//! # op-proxy
//!
//! Build print-ready proxy sheets for the One Piece Card Game.
//!
//! ## Why this crate?
//!
//! Playtesting a deck means printing it. Card art is scattered across a
//! handful of CDNs and community sites, none of which has every card, any
//! of which may be down, and each of which lays out its pages differently.
//! This crate takes a decklist, finds each card's image through an ordered
//! list of sources, caches what it downloads, resizes everything to exact
//! card dimensions and lays the result out as a 3 × 3 grid PDF ready for a
//! home printer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! decklist
//!  │
//!  ├─ 1. Classify   card code (OP01-001) or free-text name
//!  ├─ 2. Resolve    local scans → Limitless CDN → scraped sites → official CDN
//!  ├─ 3. Cache      download once, keep on disk by card name
//!  ├─ 4. Normalize  flatten, scale to cover, center crop (spawn_blocking)
//!  ├─ 5. Layout     row-major 3 × 3 grid per US Letter page
//!  └─ 6. Render     PDF with one shared JPEG XObject per distinct card
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use op_proxy::{build_sheet_to_file, parse_decklist, ProxyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let requests = parse_decklist("4x OP01-001\n2x ST01-012\n1 Nami\n");
//!     let config = ProxyConfig::builder().image_dir("scans").build()?;
//!     let summary = build_sheet_to_file(&requests, "proxies.pdf", &config).await?;
//!     eprintln!(
//!         "{}/{} cards on {} pages",
//!         summary.stats.rendered_cards,
//!         summary.stats.requested_cards,
//!         summary.page_count
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `op-proxy` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! op-proxy = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{build_sheet, build_sheet_sync, build_sheet_to_file, resolve_all};
pub use config::{ProxyConfig, ProxyConfigBuilder};
pub use error::{CardError, FetchError, ProxyError};
pub use output::{BatchOutput, BatchStats, CardOutcome, SheetOutput, SheetSummary};
pub use pipeline::cache::{cache_key, HttpFetcher, ImageCache, ImageFetcher};
pub use pipeline::classify::{
    classify, load_decklist, parse_decklist, parse_entry, CardIdentifier, CardRequest, MAX_QUANTITY,
};
pub use pipeline::layout::{paginate, Page, Placement, RenderedCard, SheetLayout};
pub use pipeline::normalize::{normalize, CardSize, NormalizedImage};
pub use pipeline::render::write_pdf;
pub use pipeline::resolve::Resolver;
pub use pipeline::sources::{ImageRef, Language, ResolvedCard, SourceAdapter};
pub use progress::{NoopProgressCallback, ProgressCallback, ProxyProgressCallback};
pub use worker::{spawn_batch, BatchEvent, BatchHandle};
