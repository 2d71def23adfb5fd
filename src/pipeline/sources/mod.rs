//! Card image sources.
//!
//! Each source is a [`SourceAdapter`]: given a classified identifier it
//! either names an image (local file or URL) or returns `None`. A source
//! that is down, slow, redesigned or simply missing the card looks exactly
//! the same to the caller as one that never had it, so the resolver's
//! fallback loop stays a plain value check.
//!
//! Three shapes exist:
//!
//! * [`local::LocalOverride`] — user-supplied scans on disk, no network.
//! * [`probe::CdnProbe`] — build a URL from the card code and `HEAD` it.
//! * [`scrape::ScrapeSource`] — `GET` a card or search page and pick an
//!   `<img>` out of the markup with per-site CSS selectors.

pub mod local;
pub mod probe;
pub mod scrape;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, SourceError};
use crate::pipeline::classify::CardIdentifier;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub use local::LocalOverride;
pub use probe::CdnProbe;
pub use scrape::{ScrapeSite, ScrapeSource};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Which printing of a card to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    /// English printing (default).
    #[default]
    English,
    /// Japanese printing; some sources have cleaner JP scans.
    Japanese,
}

impl Language {
    /// Two-letter code used in CDN file names.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "EN",
            Language::Japanese => "JP",
        }
    }
}

/// Where a resolved image lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRef {
    /// A file on disk (local override); no download needed.
    Local(PathBuf),
    /// An absolute URL to fetch through the image cache.
    Remote(String),
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Local(path) => write!(f, "{}", path.display()),
            ImageRef::Remote(url) => f.write_str(url),
        }
    }
}

/// A card that some source could supply an image for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCard {
    pub identifier: CardIdentifier,
    /// Name used for labels and the cache key.
    pub display_name: String,
    pub image_ref: ImageRef,
    /// Name of the source that produced the image.
    pub provenance: String,
    /// The source is known to stamp a promotional overlay on its images.
    pub watermarked: bool,
}

/// One card image source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provenance label reported for results of this source.
    fn name(&self) -> &'static str;

    /// Whether images from this source carry a visible overlay.
    fn watermarked(&self) -> bool {
        false
    }

    /// Look the card up. Never fails; any problem is `None`.
    async fn resolve(&self, identifier: &CardIdentifier, language: Language) -> Option<ResolvedCard>;
}

/// Build the result record for `adapter`.
pub(crate) fn resolved_by(
    adapter: &dyn SourceAdapter,
    identifier: &CardIdentifier,
    image_ref: ImageRef,
) -> ResolvedCard {
    ResolvedCard {
        identifier: identifier.clone(),
        display_name: identifier.as_str().to_string(),
        image_ref,
        provenance: adapter.name().to_string(),
        watermarked: adapter.watermarked(),
    }
}

/// Turn an adapter's internal result into the uniform `Option` contract.
pub(crate) fn absorb<T>(
    source: &str,
    identifier: &CardIdentifier,
    result: Result<Option<T>, SourceError>,
) -> Option<T> {
    match result {
        Ok(found) => found,
        Err(e) => {
            debug!("{}: lookup of {} failed: {}", source, identifier, e);
            None
        }
    }
}

/// Resolve `src` (absolute, scheme-relative or path) against `base`.
pub(crate) fn absolute_url(base: &str, src: &str) -> Result<String, SourceError> {
    let base = Url::parse(base).map_err(|e| SourceError::InvalidUrl(format!("{base}: {e}")))?;
    base.join(src.trim())
        .map(|u| u.to_string())
        .map_err(|e| SourceError::InvalidUrl(format!("{src}: {e}")))
}

/// HTTP plumbing shared by every network source.
///
/// One client (connection pool, default headers) and the two timeouts:
/// short for existence probes, longer for full page fetches.
#[derive(Debug, Clone)]
pub struct SourceHttp {
    client: reqwest::Client,
    probe_timeout: Duration,
    page_timeout: Duration,
}

impl SourceHttp {
    pub fn new(probe_timeout: Duration, page_timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .build()
            .map_err(|e| ProxyError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            probe_timeout,
            page_timeout,
        })
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::new(
            Duration::from_secs(config.probe_timeout_secs),
            Duration::from_secs(config.page_timeout_secs),
        )
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `HEAD` the URL; `true` only for a 200.
    pub(crate) async fn exists(&self, url: &str) -> Result<bool, SourceError> {
        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    /// `GET` a page and return its body; any status but 200 is an error.
    pub(crate) async fn page(&self, url: Url) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
    headers
}
