//! Batch driver: decklist in, proxy sheet out.
//!
//! ## Why one card at a time?
//!
//! Every card may hit five different third-party sites. Working through the
//! list sequentially, with a pause between cards, keeps the load on those
//! sites at roughly one request per 200 ms and makes the log read in
//! decklist order. The CPU-heavy parts (decode, resize, JPEG) run on the
//! blocking pool so network I/O is never starved.
//!
//! A card that cannot be found or decoded is recorded in its
//! [`CardOutcome`] and the batch moves on. Only an empty decklist, a batch
//! in which nothing rendered, or a failure to write the PDF aborts the run.

use crate::config::ProxyConfig;
use crate::error::{CardError, ProxyError};
use crate::output::{BatchOutput, BatchStats, CardOutcome, SheetOutput, SheetSummary};
use crate::pipeline::cache::{HttpFetcher, ImageCache, ImageFetcher};
use crate::pipeline::classify::{CardRequest, MAX_QUANTITY};
use crate::pipeline::layout::{paginate, RenderedCard};
use crate::pipeline::normalize::{normalize_file, NormalizedImage};
use crate::pipeline::render::render_pdf;
use crate::pipeline::resolve::Resolver;
use crate::pipeline::sources::{ImageRef, ResolvedCard, SourceHttp};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Resolve, download and normalize every entry of `requests`.
///
/// # Returns
/// `Ok(BatchOutput)` even when some (or all) entries failed; check
/// `output.stats.failed_entries`.
///
/// # Errors
/// Only for problems that affect the whole batch: an empty request list, a
/// quantity above [`MAX_QUANTITY`], an uncreatable cache directory, or an
/// HTTP client that cannot be built.
pub async fn resolve_all(
    requests: &[CardRequest],
    config: &ProxyConfig,
) -> Result<BatchOutput, ProxyError> {
    let started = Instant::now();
    if requests.is_empty() {
        return Err(ProxyError::NoCards);
    }
    if let Some(r) = requests.iter().find(|r| r.quantity > MAX_QUANTITY) {
        return Err(ProxyError::QuantityTooLarge {
            identifier: r.identifier.clone(),
            quantity: r.quantity,
            max: MAX_QUANTITY,
        });
    }

    // ── Step 1: Sources and cache ────────────────────────────────────────
    let resolver = match config.resolver {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(Resolver::standard(config)?),
    };
    let fetcher: Arc<dyn ImageFetcher> = match config.fetcher {
        Some(ref f) => Arc::clone(f),
        None => {
            let http = SourceHttp::from_config(config)?;
            Arc::new(HttpFetcher::new(
                http.client().clone(),
                config.download_timeout_secs,
            ))
        }
    };
    let cache = ImageCache::new(&config.cache_dir, !config.use_cache, fetcher)?;
    debug!("Sources: {:?}", resolver.source_names());
    debug!("Image cache: {}", cache.dir().display());

    let total = requests.len();
    let total_cards: u32 = requests.iter().map(|r| r.quantity).fold(0, u32::saturating_add);
    info!("Building proxies for {} cards ({} entries)", total_cards, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total, total_cards);
    }

    // ── Step 2: One entry at a time ──────────────────────────────────────
    let delay = Duration::from_millis(config.request_delay_ms);
    let mut outcomes = Vec::with_capacity(total);
    let mut cards = Vec::new();

    for (i, request) in requests.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let index = i + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_card_start(index, total, &request.identifier);
        }

        let (resolved, result) = process_entry(request, index, total, &resolver, &cache, config).await;

        match result {
            Ok(image) => {
                let label = resolved
                    .as_ref()
                    .map(|r| r.display_name.clone())
                    .unwrap_or_else(|| request.identifier.clone());
                for _ in 0..request.quantity {
                    cards.push(RenderedCard::new(label.clone(), Arc::clone(&image)));
                }
                if let Some(ref cb) = config.progress_callback {
                    cb.on_card_complete(index, total, &request.identifier, request.quantity);
                }
                outcomes.push(CardOutcome {
                    identifier: request.identifier.clone(),
                    quantity: request.quantity,
                    resolved,
                    error: None,
                });
            }
            Err(e) => {
                warn!("{}", e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_card_error(index, total, &request.identifier, &e.to_string());
                }
                outcomes.push(CardOutcome {
                    identifier: request.identifier.clone(),
                    quantity: request.quantity,
                    resolved,
                    error: Some(e),
                });
            }
        }
    }

    // ── Step 3: Stats ────────────────────────────────────────────────────
    let stats = BatchStats::from_outcomes(&outcomes, started.elapsed().as_millis() as u64);
    info!(
        "Rendered {}/{} cards ({} entries failed, {} watermarked) in {}ms",
        stats.rendered_cards,
        stats.requested_cards,
        stats.failed_entries,
        stats.watermarked_cards,
        stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, stats.rendered_cards);
    }

    Ok(BatchOutput {
        outcomes,
        cards,
        stats,
    })
}

/// Resolve, fetch and normalize a single entry.
///
/// The resolved card is returned alongside the result so a download or
/// decode failure still reports which source was used.
async fn process_entry(
    request: &CardRequest,
    index: usize,
    total: usize,
    resolver: &Resolver,
    cache: &ImageCache,
    config: &ProxyConfig,
) -> (Option<ResolvedCard>, Result<Arc<NormalizedImage>, CardError>) {
    let Some(card) = resolver.resolve_card(&request.identifier, config.language).await else {
        let err = CardError::NotFound {
            identifier: request.identifier.clone(),
        };
        return (None, Err(err));
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_card_resolved(
            index,
            total,
            &request.identifier,
            &card.provenance,
            card.watermarked,
        );
    }

    let fetched = match &card.image_ref {
        ImageRef::Local(path) => Ok(path.clone()),
        ImageRef::Remote(url) => cache.get_or_fetch(url, &card.display_name).await,
    };
    let path = match fetched {
        Ok(path) => path,
        Err(e) => return (Some(card), Err(e)),
    };

    let label = card.display_name.clone();
    let (size, dpi) = (config.layout.card, config.dpi);
    let normalized = tokio::task::spawn_blocking(move || normalize_file(&path, &label, size, dpi))
        .await
        .unwrap_or_else(|e| {
            Err(CardError::DecodeFailed {
                identifier: card.display_name.clone(),
                reason: format!("normalize task panicked: {e}"),
            })
        });

    (Some(card), normalized.map(Arc::new))
}

/// Build the whole sheet in memory.
///
/// # Errors
/// Everything [`resolve_all`] returns, plus
/// [`ProxyError::NothingRendered`] when no entry produced an image.
pub async fn build_sheet(
    requests: &[CardRequest],
    config: &ProxyConfig,
) -> Result<SheetOutput, ProxyError> {
    let batch = resolve_all(requests, config).await?;
    if batch.cards.is_empty() {
        return Err(ProxyError::NothingRendered {
            requested: batch.stats.requested_cards,
        });
    }

    let pages = paginate(&batch.cards, &config.layout);
    let page_count = pages.len();
    let pdf = render_pdf(pages, config.layout).await?;
    info!("Laid out {} cards on {} pages", batch.cards.len(), page_count);

    Ok(SheetOutput {
        pdf,
        page_count,
        outcomes: batch.outcomes,
        stats: batch.stats,
    })
}

/// Build the sheet and write it to `output_path`.
///
/// Uses atomic write (temp file + rename) so an interrupted run never
/// leaves a truncated PDF behind.
pub async fn build_sheet_to_file(
    requests: &[CardRequest],
    output_path: impl AsRef<Path>,
    config: &ProxyConfig,
) -> Result<SheetSummary, ProxyError> {
    let sheet = build_sheet(requests, config).await?;
    let path = output_path.as_ref();
    let write_failed = |e| ProxyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &sheet.pdf)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;

    info!("Saved {} ({} pages)", path.display(), sheet.page_count);
    Ok(SheetSummary {
        output: path.to_path_buf(),
        page_count: sheet.page_count,
        stats: sheet.stats,
        outcomes: sheet.outcomes,
    })
}

/// Synchronous wrapper around [`build_sheet_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_sheet_sync(
    requests: &[CardRequest],
    output_path: impl AsRef<Path>,
    config: &ProxyConfig,
) -> Result<SheetSummary, ProxyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ProxyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build_sheet_to_file(requests, output_path, config))
}
