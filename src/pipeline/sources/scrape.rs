//! HTML-scraped sources: fetch a card or search page, pick an `<img>`.
//!
//! Every site gets the same treatment and differs only in data: where to
//! search, which CSS selectors point at card art, which attribute carries
//! the URL (lazy-loading sites park it in `data-src`), whether only the first
//! matching element counts, and a cheap plausibility check on the URL.
//!
//! Markup is scanned with `lol_html`'s streaming selector engine. Matching
//! elements are collected in document order, so "first match" means the
//! same thing it would in a browser's `querySelector`.

use super::{absolute_url, absorb, resolved_by, ImageRef, Language, ResolvedCard, SourceAdapter, SourceHttp};
use crate::error::SourceError;
use crate::pipeline::classify::CardIdentifier;
use async_trait::async_trait;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use reqwest::Url;
use std::cell::RefCell;
use tracing::debug;

/// How many matched elements a site's heuristic may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Only the first element matching any selector; reject → no result.
    FirstOnly,
    /// Walk every match until one is accepted.
    All,
}

/// The community and retail sites scraped for card art.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeSite {
    Opcgdb,
    LimitlessSite,
    TopDecks,
    OfficialSite,
    TcgPlayer,
}

impl ScrapeSite {
    /// Scrape priority, best images first.
    pub const ALL: [ScrapeSite; 5] = [
        ScrapeSite::Opcgdb,
        ScrapeSite::LimitlessSite,
        ScrapeSite::TopDecks,
        ScrapeSite::OfficialSite,
        ScrapeSite::TcgPlayer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScrapeSite::Opcgdb => "OPCGDB",
            ScrapeSite::LimitlessSite => "Limitless Site",
            ScrapeSite::TopDecks => "Top Decks",
            ScrapeSite::OfficialSite => "Official Site",
            ScrapeSite::TcgPlayer => "TCGPlayer",
        }
    }

    /// Origin that relative image URLs are resolved against.
    pub fn base(self) -> &'static str {
        match self {
            ScrapeSite::Opcgdb => "https://opcgdb.com",
            ScrapeSite::LimitlessSite => "https://onepiece.limitlesstcg.com",
            ScrapeSite::TopDecks => "https://onepiecetopdecks.com",
            ScrapeSite::OfficialSite => "https://en.onepiece-cardgame.com",
            ScrapeSite::TcgPlayer => "https://www.tcgplayer.com",
        }
    }

    /// The official card list serves the same SAMPLE-stamped art as its CDN.
    pub fn watermarked(self) -> bool {
        self == ScrapeSite::OfficialSite
    }

    pub fn selectors(self) -> &'static [&'static str] {
        match self {
            ScrapeSite::Opcgdb => &[
                "img.card-image",
                ".card img",
                r#"img[alt*="card"]"#,
                r#"img[src*="/cards/"]"#,
            ],
            ScrapeSite::LimitlessSite => &["img.card", ".card-image img", r#"img[src*="/cards/"]"#],
            ScrapeSite::TopDecks => &[
                "img.card-image",
                ".card-img img",
                r#"article img[src*="card"]"#,
                ".wp-post-image",
            ],
            ScrapeSite::OfficialSite => &[
                "div.resultCol a img",
                ".cardImg img",
                r#"img[data-src*="card"]"#,
            ],
            ScrapeSite::TcgPlayer => &[
                "img.product-image__image",
                r#"img[data-testid="product-image"]"#,
            ],
        }
    }

    /// Attributes holding the image URL, in preference order.
    pub fn attributes(self) -> &'static [&'static str] {
        match self {
            ScrapeSite::Opcgdb => &["src", "data-src"],
            ScrapeSite::LimitlessSite | ScrapeSite::TcgPlayer => &["src"],
            ScrapeSite::TopDecks | ScrapeSite::OfficialSite => &["data-src", "src"],
        }
    }

    pub fn scan(self) -> Scan {
        match self {
            ScrapeSite::OfficialSite => Scan::All,
            _ => Scan::FirstOnly,
        }
    }

    /// The page to fetch for `identifier`.
    pub fn page_url(self, identifier: &CardIdentifier) -> Result<Url, SourceError> {
        let id = identifier.as_str();
        let structured = identifier.is_structured();
        match self {
            ScrapeSite::Opcgdb => with_segment("https://opcgdb.com/cards/", id),
            ScrapeSite::LimitlessSite if structured => {
                with_segment("https://onepiece.limitlesstcg.com/cards/", id)
            }
            ScrapeSite::LimitlessSite => {
                with_query("https://onepiece.limitlesstcg.com/cards", &[("q", id)])
            }
            ScrapeSite::TopDecks if structured => {
                parse_url(&format!("https://onepiecetopdecks.com/card/{id}/"))
            }
            ScrapeSite::TopDecks => with_query(
                "https://onepiecetopdecks.com/",
                &[("s", id), ("post_type", "card")],
            ),
            ScrapeSite::OfficialSite => match identifier.set_code() {
                Some(set) => with_query("https://en.onepiece-cardgame.com/cardlist/", &[("series", set)]),
                None => with_query("https://en.onepiece-cardgame.com/cardlist/", &[("freewords", id)]),
            },
            ScrapeSite::TcgPlayer => {
                let query = format!("One Piece {id}");
                with_query(
                    "https://www.tcgplayer.com/search/one-piece-card-game/product",
                    &[("q", query.as_str())],
                )
            }
        }
    }

    /// Plausibility check on a candidate URL.
    pub fn accepts(self, identifier: &CardIdentifier, src: &str) -> bool {
        if src.trim().is_empty() {
            return false;
        }
        match self {
            ScrapeSite::TopDecks => {
                let lower = src.to_lowercase();
                ["card", "op", "st"].iter().any(|k| lower.contains(k))
            }
            ScrapeSite::TcgPlayer => src.contains("tcgplayer"),
            ScrapeSite::OfficialSite => match identifier {
                CardIdentifier::StructuredCode(code) => {
                    src.to_lowercase().contains(&code.to_lowercase())
                }
                CardIdentifier::FreeText(_) => true,
            },
            ScrapeSite::Opcgdb | ScrapeSite::LimitlessSite => true,
        }
    }

    /// Choose the image URL from the candidates found on the page.
    pub fn pick(self, identifier: &CardIdentifier, candidates: Vec<String>) -> Option<String> {
        match self.scan() {
            Scan::FirstOnly => candidates
                .into_iter()
                .next()
                .filter(|src| self.accepts(identifier, src)),
            Scan::All => candidates
                .into_iter()
                .find(|src| self.accepts(identifier, src)),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, SourceError> {
    Url::parse(raw).map_err(|e| SourceError::InvalidUrl(format!("{raw}: {e}")))
}

fn with_segment(base: &str, segment: &str) -> Result<Url, SourceError> {
    let mut url = parse_url(base)?;
    url.path_segments_mut()
        .map_err(|_| SourceError::InvalidUrl(format!("{base}: cannot be a base")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

fn with_query(base: &str, params: &[(&str, &str)]) -> Result<Url, SourceError> {
    Url::parse_with_params(base, params).map_err(|e| SourceError::InvalidUrl(format!("{base}: {e}")))
}

/// Collect the image URL of every element matching any of `selectors`,
/// in document order. An element with none of `attributes` set yields an
/// empty string so that "first match" semantics are preserved.
pub fn image_candidates(
    html: &str,
    selectors: &[&str],
    attributes: &[&str],
) -> Result<Vec<String>, SourceError> {
    let found = RefCell::new(Vec::new());

    let handlers = selectors
        .iter()
        .copied()
        .map(|selector| {
            let found = &found;
            element!(selector, move |el| {
                let src = attributes
                    .iter()
                    .find_map(|attr| el.get_attribute(attr).filter(|v| !v.trim().is_empty()))
                    .unwrap_or_default();
                found.borrow_mut().push(src);
                Ok(())
            })
        })
        .collect::<Vec<_>>();

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| SourceError::Markup(e.to_string()))?;

    Ok(found.into_inner())
}

/// A scraped site behind the [`SourceAdapter`] contract.
#[derive(Debug, Clone)]
pub struct ScrapeSource {
    site: ScrapeSite,
    http: SourceHttp,
}

impl ScrapeSource {
    pub fn new(site: ScrapeSite, http: SourceHttp) -> Self {
        Self { site, http }
    }

    pub fn site(&self) -> ScrapeSite {
        self.site
    }

    async fn lookup(&self, identifier: &CardIdentifier) -> Result<Option<String>, SourceError> {
        let page_url = self.site.page_url(identifier)?;
        debug!("{}: GET {}", self.site.name(), page_url);

        let html = self.http.page(page_url).await?;
        let candidates = image_candidates(&html, self.site.selectors(), self.site.attributes())?;
        debug!("{}: {} candidate images", self.site.name(), candidates.len());

        match self.site.pick(identifier, candidates) {
            Some(src) => Ok(Some(absolute_url(self.site.base(), &src)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SourceAdapter for ScrapeSource {
    fn name(&self) -> &'static str {
        self.site.name()
    }

    fn watermarked(&self) -> bool {
        self.site.watermarked()
    }

    async fn resolve(&self, identifier: &CardIdentifier, _language: Language) -> Option<ResolvedCard> {
        let result = self.lookup(identifier).await;
        let url = absorb(self.name(), identifier, result)?;
        Some(resolved_by(self, identifier, ImageRef::Remote(url)))
    }
}
