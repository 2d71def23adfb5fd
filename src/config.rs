//! Configuration for a proxy-sheet run.
//!
//! Every knob lives in [`ProxyConfig`], built via [`ProxyConfigBuilder`].
//! Values that used to be process-wide (the scan folder, the printing
//! language) are plain fields here, so two runs with different settings can
//! share a process without stepping on each other.
//!
//! # Design choice: builder over constructor
//! Most callers only change the DPI or point at a scan folder. The builder
//! lets them set just that and rely on documented defaults for the rest.

use crate::error::ProxyError;
use crate::pipeline::cache::ImageFetcher;
use crate::pipeline::layout::SheetLayout;
use crate::pipeline::normalize::CardSize;
use crate::pipeline::resolve::Resolver;
use crate::pipeline::sources::Language;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Lowest and highest accepted print resolution.
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 1200;

/// Configuration for building a proxy sheet.
///
/// # Example
/// ```rust
/// use op_proxy::ProxyConfig;
///
/// let config = ProxyConfig::builder()
///     .dpi(600)
///     .image_dir("scans")
///     .use_cache(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 600);
/// ```
#[derive(Clone)]
pub struct ProxyConfig {
    /// Print resolution of the embedded card images. Range: 72–1200. Default: 300.
    ///
    /// 300 dpi is what home and copy-shop printers actually resolve; a card
    /// is then 750 × 1050 px. Higher values only grow the PDF.
    pub dpi: u32,

    /// Which printing to look for on sources that distinguish. Default: English.
    pub language: Language,

    /// Folder of user-supplied scans checked before any network source.
    pub image_dir: Option<PathBuf>,

    /// Where downloaded images are kept between runs.
    /// Default: `<platform cache dir>/op-proxy/images`, else `./cache`.
    pub cache_dir: PathBuf,

    /// Serve previously downloaded images from `cache_dir`. Default: true.
    ///
    /// When false every image is downloaded again (and the cache refreshed).
    pub use_cache: bool,

    /// Pause between consecutive cards, in milliseconds. Default: 200.
    ///
    /// The scraped sites are community projects; hammering them gets the
    /// user's IP blocked. The pause is skipped before the first card.
    pub request_delay_ms: u64,

    /// Timeout for `HEAD` existence probes. Default: 5.
    pub probe_timeout_secs: u64,

    /// Timeout for scraped page fetches. Default: 15.
    pub page_timeout_secs: u64,

    /// Timeout for image downloads. Default: 30.
    pub download_timeout_secs: u64,

    /// Page grid and physical card size. Default: 3 × 3 cards of
    /// 2.5in × 3.5in on US Letter.
    ///
    /// `layout.card` is the only card size: the normalizer sizes bitmaps
    /// from it and the PDF writer sizes slots from it.
    pub layout: SheetLayout,

    /// Pre-built resolver. Takes precedence over the standard source order.
    pub resolver: Option<Arc<Resolver>>,

    /// Pre-built image fetcher. Default: HTTP via `reqwest`.
    pub fetcher: Option<Arc<dyn ImageFetcher>>,

    /// Optional per-card progress events.
    pub progress_callback: Option<ProgressCallback>,
}

/// Platform cache directory for downloaded card images.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("op-proxy").join("images"))
        .unwrap_or_else(|| PathBuf::from("cache"))
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            language: Language::default(),
            image_dir: None,
            cache_dir: default_cache_dir(),
            use_cache: true,
            request_delay_ms: 200,
            probe_timeout_secs: 5,
            page_timeout_secs: 15,
            download_timeout_secs: 30,
            layout: SheetLayout::default(),
            resolver: None,
            fetcher: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("dpi", &self.dpi)
            .field("language", &self.language)
            .field("image_dir", &self.image_dir)
            .field("cache_dir", &self.cache_dir)
            .field("use_cache", &self.use_cache)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("layout", &self.layout)
            .field("resolver", &self.resolver)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn ImageFetcher>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProxyProgressCallback>"),
            )
            .finish()
    }
}

impl ProxyConfig {
    /// Create a new builder for `ProxyConfig`.
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProxyConfig`].
#[derive(Debug)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    pub fn japanese(self, yes: bool) -> Self {
        self.language(if yes {
            Language::Japanese
        } else {
            Language::English
        })
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn use_cache(mut self, v: bool) -> Self {
        self.config.use_cache = v;
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn layout(mut self, layout: SheetLayout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Shorthand for changing only `layout.card`.
    pub fn card_size(mut self, size: CardSize) -> Self {
        self.config.layout.card = size;
        self
    }

    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.config.resolver = Some(resolver);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProxyConfig, ProxyError> {
        let c = &self.config;
        if c.dpi < MIN_DPI || c.dpi > MAX_DPI {
            return Err(ProxyError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if c.probe_timeout_secs == 0 || c.page_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(ProxyError::InvalidConfig(
                "Timeouts must be at least 1 second".into(),
            ));
        }
        let card = c.layout.card;
        if card.width_in <= 0.0 || card.height_in <= 0.0 {
            return Err(ProxyError::InvalidConfig(format!(
                "Card size must be positive, got {}in × {}in",
                card.width_in, card.height_in
            )));
        }
        if !c.layout.fits() {
            return Err(ProxyError::InvalidConfig(format!(
                "A {}×{} grid of {}in × {}in cards does not fit a {}pt × {}pt page",
                c.layout.rows,
                c.layout.cols,
                c.layout.card.width_in,
                c.layout.card.height_in,
                c.layout.page_width_pt,
                c.layout.page_height_pt
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ProxyConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.language, Language::English);
        assert!(c.use_cache);
        assert_eq!(c.request_delay_ms, 200);
        assert_eq!(
            (c.probe_timeout_secs, c.page_timeout_secs, c.download_timeout_secs),
            (5, 15, 30)
        );
        assert!(c.cache_dir.ends_with("images") || c.cache_dir == PathBuf::from("cache"));
    }

    #[test]
    fn builder_sets_fields() {
        let c = ProxyConfig::builder()
            .dpi(600)
            .japanese(true)
            .image_dir("scans")
            .cache_dir("/tmp/op-cache")
            .use_cache(false)
            .request_delay_ms(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 600);
        assert_eq!(c.language, Language::Japanese);
        assert_eq!(c.image_dir, Some(PathBuf::from("scans")));
        assert_eq!(c.cache_dir, PathBuf::from("/tmp/op-cache"));
        assert!(!c.use_cache);
        assert_eq!(c.request_delay_ms, 0);
    }

    #[test]
    fn dpi_out_of_range_is_rejected() {
        assert!(matches!(
            ProxyConfig::builder().dpi(50).build(),
            Err(ProxyError::InvalidConfig(_))
        ));
        assert!(ProxyConfig::builder().dpi(2400).build().is_err());
        assert!(ProxyConfig::builder().dpi(72).build().is_ok());
        assert!(ProxyConfig::builder().dpi(1200).build().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(ProxyConfig::builder().probe_timeout_secs(0).build().is_err());
    }

    #[test]
    fn grid_must_fit_page() {
        let layout = SheetLayout {
            cols: 4,
            ..SheetLayout::default()
        };
        assert!(ProxyConfig::builder().layout(layout).build().is_err());
    }

    #[test]
    fn card_size_updates_layout() {
        let mini = CardSize {
            width_in: 2.0,
            height_in: 3.0,
        };
        let c = ProxyConfig::builder().card_size(mini).build().unwrap();
        assert_eq!(c.layout.card, mini);
    }

    #[test]
    fn later_layout_replaces_card_size() {
        let mini = CardSize {
            width_in: 2.0,
            height_in: 3.0,
        };
        let c = ProxyConfig::builder()
            .card_size(mini)
            .layout(SheetLayout::default())
            .build()
            .unwrap();
        assert_eq!(c.layout.card, CardSize::default());

        let c = ProxyConfig::builder()
            .layout(SheetLayout::default())
            .card_size(mini)
            .build()
            .unwrap();
        assert_eq!(c.layout.card, mini);
    }

    #[test]
    fn non_positive_card_is_rejected() {
        let flat = CardSize {
            width_in: 2.5,
            height_in: 0.0,
        };
        assert!(matches!(
            ProxyConfig::builder().card_size(flat).build(),
            Err(ProxyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn debug_hides_trait_objects() {
        let s = format!("{:?}", ProxyConfig::default());
        assert!(s.contains("dpi: 300"));
        assert!(s.contains("fetcher: None"));
    }
}
