//! Ordered fallback over the image sources.
//!
//! ## Why a fixed order?
//!
//! Sources differ wildly in image quality: the user's own scans beat a
//! clean CDN render, which beats a scraped thumbnail, which beats the
//! publisher's SAMPLE-stamped art. Trying them best-first and stopping at
//! the first hit makes the outcome for a given identifier depend only on
//! which sources are reachable, never on timing.

use super::classify::classify;
use super::sources::{
    CdnProbe, Language, LocalOverride, ResolvedCard, ScrapeSite, ScrapeSource, SourceAdapter,
    SourceHttp,
};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use tracing::{debug, info, warn};

/// Runs source adapters in priority order.
pub struct Resolver {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("adapters", &self.source_names())
            .finish()
    }
}

impl Resolver {
    /// A resolver over `adapters`, tried first to last.
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    /// The production order: local scans, Limitless CDN, the scraped sites,
    /// and the watermarked official CDN last.
    pub fn standard(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let http = SourceHttp::from_config(config)?;

        let mut adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(LocalOverride::new(config.image_dir.clone())),
            Box::new(CdnProbe::limitless(http.clone())),
        ];
        for site in ScrapeSite::ALL {
            adapters.push(Box::new(ScrapeSource::new(site, http.clone())));
        }
        adapters.push(Box::new(CdnProbe::official(http)));

        Ok(Self::new(adapters))
    }

    /// Provenance labels in the order they are tried.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Classify `identifier` and return the first source's answer.
    ///
    /// Later sources are not contacted once one succeeds.
    pub async fn resolve_card(&self, identifier: &str, language: Language) -> Option<ResolvedCard> {
        let id = classify(identifier);
        debug!(
            "Resolving {} ({})",
            id,
            if id.is_structured() { "code" } else { "free text" }
        );

        for adapter in &self.adapters {
            debug!("Trying {} for {}", adapter.name(), id);
            if let Some(card) = adapter.resolve(&id, language).await {
                if card.watermarked {
                    info!(
                        "Found {} via {} (image carries a SAMPLE watermark)",
                        id, card.provenance
                    );
                } else {
                    info!("Found {} via {}", id, card.provenance);
                }
                return Some(card);
            }
        }

        warn!("Card not found: {}", id);
        None
    }
}
