//! Pipeline stages for building a proxy sheet.
//!
//! Each submodule implements exactly one step, so each can be tested in
//! isolation and swapped (a new source site, another output format) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! classify ──▶ resolve ──▶ cache ──▶ normalize ──▶ layout ──▶ render
//! (code/text)  (sources)   (disk)    (resize)      (grid)     (PDF)
//! ```
//!
//! 1. [`classify`]  — decide whether an identifier is a card code or free
//!    text; parse decklist lines
//! 2. [`resolve`]   — walk the [`sources`] in priority order until one names
//!    an image; the only stage that talks to card sites
//! 3. [`cache`]     — download remote images once and keep them on disk
//! 4. [`normalize`] — flatten, scale to cover and center crop to the exact
//!    print size; runs in `spawn_blocking`
//! 5. [`layout`]    — place copies row-major on fixed-grid pages
//! 6. [`render`]    — embed the pages as JPEG image XObjects in a PDF

pub mod cache;
pub mod classify;
pub mod layout;
pub mod normalize;
pub mod render;
pub mod resolve;
pub mod sources;
