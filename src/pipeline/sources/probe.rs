//! Direct CDN probes: derive the image URL from the card code and `HEAD` it.
//!
//! Only structured codes can be probed. Nothing is downloaded or parsed
//! here; a 200 is taken as proof the image exists and the URL is handed to
//! the cache.

use super::{absorb, resolved_by, ImageRef, Language, ResolvedCard, SourceAdapter, SourceHttp};
use crate::pipeline::classify::CardIdentifier;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cdn {
    Limitless,
    Official,
}

/// A CDN existence probe.
#[derive(Debug, Clone)]
pub struct CdnProbe {
    cdn: Cdn,
    http: SourceHttp,
}

impl CdnProbe {
    /// High-quality card scans hosted by Limitless TCG.
    pub fn limitless(http: SourceHttp) -> Self {
        Self {
            cdn: Cdn::Limitless,
            http,
        }
    }

    /// The publisher's own card images. These carry a "SAMPLE" stamp, so
    /// the resolver only falls back to them after everything else.
    pub fn official(http: SourceHttp) -> Self {
        Self {
            cdn: Cdn::Official,
            http,
        }
    }

    /// The URL this probe would check, or `None` for free text.
    pub fn url_for(&self, identifier: &CardIdentifier, language: Language) -> Option<String> {
        let CardIdentifier::StructuredCode(code) = identifier else {
            return None;
        };
        let set = identifier.set_code().unwrap_or(code);
        Some(match self.cdn {
            Cdn::Limitless => limitless_url(code, set, language),
            Cdn::Official => official_url(code, language),
        })
    }
}

fn limitless_url(code: &str, set: &str, language: Language) -> String {
    format!(
        "https://limitlesstcg.nyc3.digitaloceanspaces.com/one-piece/{set}/{code}_{}.webp",
        language.code()
    )
}

fn official_url(code: &str, language: Language) -> String {
    let base = match language {
        Language::English => "https://en.onepiece-cardgame.com",
        Language::Japanese => "https://www.onepiece-cardgame.com",
    };
    format!("{base}/images/cardlist/card/{code}.png")
}

#[async_trait]
impl SourceAdapter for CdnProbe {
    fn name(&self) -> &'static str {
        match self.cdn {
            Cdn::Limitless => "Limitless CDN",
            Cdn::Official => "Official CDN",
        }
    }

    fn watermarked(&self) -> bool {
        self.cdn == Cdn::Official
    }

    async fn resolve(&self, identifier: &CardIdentifier, language: Language) -> Option<ResolvedCard> {
        let url = self.url_for(identifier, language)?;
        debug!("{}: HEAD {}", self.name(), url);

        let exists = absorb(
            self.name(),
            identifier,
            self.http.exists(&url).await.map(Some),
        )?;
        exists.then(|| resolved_by(self, identifier, ImageRef::Remote(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::classify;
    use std::time::Duration;

    fn http() -> SourceHttp {
        SourceHttp::new(Duration::from_secs(5), Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn limitless_url_uses_set_and_language() {
        let probe = CdnProbe::limitless(http());
        assert_eq!(
            probe.url_for(&classify("op01-001"), Language::English).unwrap(),
            "https://limitlesstcg.nyc3.digitaloceanspaces.com/one-piece/OP01/OP01-001_EN.webp"
        );
        assert_eq!(
            probe.url_for(&classify("ST10-005"), Language::Japanese).unwrap(),
            "https://limitlesstcg.nyc3.digitaloceanspaces.com/one-piece/ST10/ST10-005_JP.webp"
        );
    }

    #[test]
    fn official_url_switches_host_by_language() {
        let probe = CdnProbe::official(http());
        assert_eq!(
            probe.url_for(&classify("OP02-013"), Language::English).unwrap(),
            "https://en.onepiece-cardgame.com/images/cardlist/card/OP02-013.png"
        );
        assert_eq!(
            probe.url_for(&classify("OP02-013"), Language::Japanese).unwrap(),
            "https://www.onepiece-cardgame.com/images/cardlist/card/OP02-013.png"
        );
    }

    #[test]
    fn free_text_is_never_probed() {
        let probe = CdnProbe::limitless(http());
        assert_eq!(probe.url_for(&classify("Nami"), Language::English), None);
        let result = tokio_test::block_on(probe.resolve(&classify("Nami"), Language::English));
        assert!(result.is_none());
    }

    #[test]
    fn watermark_flags() {
        assert!(!CdnProbe::limitless(http()).watermarked());
        assert!(CdnProbe::official(http()).watermarked());
        assert_eq!(CdnProbe::official(http()).name(), "Official CDN");
    }
}
