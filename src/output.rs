//! Result types for a proxy-sheet run.

use crate::error::CardError;
use crate::pipeline::layout::RenderedCard;
use crate::pipeline::sources::ResolvedCard;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one decklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardOutcome {
    /// The identifier as written in the decklist.
    pub identifier: String,
    pub quantity: u32,
    /// The source that supplied the image, when one did.
    pub resolved: Option<ResolvedCard>,
    /// Why the entry is missing from the sheet.
    pub error: Option<CardError>,
}

impl CardOutcome {
    /// The entry's image made it onto the sheet.
    pub fn is_rendered(&self) -> bool {
        self.error.is_none() && self.resolved.is_some()
    }

    /// Rendered from a source known to stamp a SAMPLE overlay.
    pub fn is_watermarked(&self) -> bool {
        self.is_rendered() && self.resolved.as_ref().is_some_and(|r| r.watermarked)
    }
}

/// Counts for the final report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Sum of all requested quantities.
    pub requested_cards: u32,
    /// Card copies that will be printed.
    pub rendered_cards: u32,
    /// Decklist entries that produced nothing.
    pub failed_entries: usize,
    /// Printed copies that carry a SAMPLE watermark.
    pub watermarked_cards: u32,
    pub duration_ms: u64,
}

impl BatchStats {
    /// Tally `outcomes`.
    pub fn from_outcomes(outcomes: &[CardOutcome], duration_ms: u64) -> Self {
        let mut stats = BatchStats {
            duration_ms,
            ..Default::default()
        };
        for outcome in outcomes {
            stats.requested_cards = stats.requested_cards.saturating_add(outcome.quantity);
            if outcome.is_rendered() {
                stats.rendered_cards = stats.rendered_cards.saturating_add(outcome.quantity);
                if outcome.is_watermarked() {
                    stats.watermarked_cards = stats.watermarked_cards.saturating_add(outcome.quantity);
                }
            } else {
                stats.failed_entries += 1;
            }
        }
        stats
    }
}

/// Every entry resolved and normalized, ready for layout.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub outcomes: Vec<CardOutcome>,
    /// One element per printed copy, in decklist order.
    pub cards: Vec<RenderedCard>,
    pub stats: BatchStats,
}

/// A finished sheet held in memory.
#[derive(Debug, Clone)]
pub struct SheetOutput {
    /// The encoded PDF document.
    pub pdf: Vec<u8>,
    pub page_count: usize,
    pub outcomes: Vec<CardOutcome>,
    pub stats: BatchStats,
}

/// Report for a sheet written to disk. Serialised by `op-proxy --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetSummary {
    pub output: PathBuf,
    pub page_count: usize,
    pub stats: BatchStats,
    pub outcomes: Vec<CardOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::classify;
    use crate::pipeline::sources::ImageRef;

    fn resolved(id: &str, watermarked: bool) -> ResolvedCard {
        ResolvedCard {
            identifier: classify(id),
            display_name: id.to_string(),
            image_ref: ImageRef::Remote(format!("https://example.com/{id}.png")),
            provenance: "Test".into(),
            watermarked,
        }
    }

    #[test]
    fn stats_count_copies_and_entries() {
        let outcomes = vec![
            CardOutcome {
                identifier: "OP01-001".into(),
                quantity: 4,
                resolved: Some(resolved("OP01-001", false)),
                error: None,
            },
            CardOutcome {
                identifier: "ST01-012".into(),
                quantity: 2,
                resolved: Some(resolved("ST01-012", true)),
                error: None,
            },
            CardOutcome {
                identifier: "Nobody".into(),
                quantity: 3,
                resolved: None,
                error: Some(CardError::NotFound {
                    identifier: "Nobody".into(),
                }),
            },
        ];

        let stats = BatchStats::from_outcomes(&outcomes, 42);
        assert_eq!(
            stats,
            BatchStats {
                requested_cards: 9,
                rendered_cards: 6,
                failed_entries: 1,
                watermarked_cards: 2,
                duration_ms: 42,
            }
        );
    }

    #[test]
    fn resolved_but_undecodable_is_not_rendered() {
        let outcome = CardOutcome {
            identifier: "Nami".into(),
            quantity: 1,
            resolved: Some(resolved("Nami", true)),
            error: Some(CardError::DecodeFailed {
                identifier: "Nami".into(),
                reason: "bad".into(),
            }),
        };
        assert!(!outcome.is_rendered());
        assert!(!outcome.is_watermarked());
    }

    #[test]
    fn summary_serialises_to_json() {
        let summary = SheetSummary {
            output: PathBuf::from("proxies.pdf"),
            page_count: 1,
            stats: BatchStats::default(),
            outcomes: vec![],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["output"], "proxies.pdf");
        assert_eq!(json["stats"]["rendered_cards"], 0);
    }
}
