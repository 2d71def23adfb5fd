//! On-disk image cache.
//!
//! ## Why key by name only?
//!
//! A decklist usually repeats the same handful of cards across runs, and the
//! expensive part of a run is the network. Keying by the card's display
//! name means a second run never touches the network for cards it has seen,
//! whichever source originally supplied them. The cost is that two names
//! which sanitise to the same key share one file (`a/b` and `a_b`); that is
//! accepted.
//!
//! Writes go through a temp file in the cache directory followed by a
//! rename, so a reader never observes a half-written image even when two
//! fetches of the same key race.

use crate::error::{CardError, FetchError, ProxyError};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Characters replaced by `_` in cache keys, besides the space.
const UNSAFE_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// File-system safe key for a display name.
///
/// Lowercase, spaces and `<>:"/\|?*` become `_`. Lossy and deterministic.
pub fn cache_key(display_name: &str) -> String {
    display_name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c == ' ' || UNSAFE_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Downloads image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest` implementation of [`ImageFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout_secs,
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let to_fetch_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(to_fetch_error)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await.map_err(to_fetch_error)?;
        Ok(bytes.to_vec())
    }
}

/// The cache directory plus the fetcher used on a miss.
pub struct ImageCache {
    dir: PathBuf,
    bypass: bool,
    fetcher: Arc<dyn ImageFetcher>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("dir", &self.dir)
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Open (and create if needed) the cache at `dir`.
    ///
    /// With `bypass` set, existing entries are ignored but fresh downloads
    /// are still stored.
    pub fn new(
        dir: impl Into<PathBuf>,
        bypass: bool,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Result<Self, ProxyError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ProxyError::CacheDirFailed {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self {
            dir,
            bypass,
            fetcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the entry for `display_name` lives (whether or not it exists).
    pub fn path_for(&self, display_name: &str) -> PathBuf {
        self.dir.join(format!("{}.png", cache_key(display_name)))
    }

    /// Return the cached file for `display_name`, downloading `url` on a miss.
    pub async fn get_or_fetch(&self, url: &str, display_name: &str) -> Result<PathBuf, CardError> {
        let path = self.path_for(display_name);

        let cached = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !self.bypass && cached {
            debug!("Cache hit: {} → {}", display_name, path.display());
            return Ok(path);
        }

        info!("Downloading {} from {}", display_name, url);
        let bytes = self.fetcher.fetch(url).await.map_err(|e| match e {
            FetchError::Timeout { secs } => CardError::DownloadTimeout {
                identifier: display_name.to_string(),
                url: url.to_string(),
                secs,
            },
            other => CardError::DownloadFailed {
                identifier: display_name.to_string(),
                url: url.to_string(),
                reason: other.to_string(),
            },
        })?;

        let len = bytes.len();
        let (dir, target) = (self.dir.clone(), path.clone());
        tokio::task::spawn_blocking(move || store(&dir, &target, &bytes))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(format!("cache write task panicked: {e}"))))
            .map_err(|e| CardError::CacheWriteFailed {
                identifier: display_name.to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!("Cached {} bytes at {}", len, path.display());
        Ok(path)
    }
}

/// Write `bytes` to a temp file in `dir`, then rename it over `path`.
fn store(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        result: Result<Vec<u8>, u16>,
    }

    impl CountingFetcher {
        fn ok(bytes: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Ok(bytes.to_vec()),
            })
        }

        fn status(code: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Err(code),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(FetchError::Status)
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl ImageFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Timeout { secs: 30 })
        }
    }

    #[test]
    fn cache_key_sanitises() {
        assert_eq!(cache_key("OP01-001"), "op01-001");
        assert_eq!(cache_key("Monkey D. Luffy"), "monkey_d._luffy");
        assert_eq!(cache_key(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn cache_key_collisions_are_possible() {
        assert_eq!(cache_key("a/b"), cache_key("a_b"));
        assert_eq!(cache_key("Nami"), cache_key("NAMI"));
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::ok(b"png bytes");
        let cache = ImageCache::new(dir.path(), false, fetcher.clone()).unwrap();

        let first = cache.get_or_fetch("https://x/a.webp", "OP01-001").await.unwrap();
        let second = cache.get_or_fetch("https://y/b.png", "OP01-001").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("op01-001.png"));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn bypass_refetches_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("op01-001.png"), b"stale").unwrap();
        let fetcher = CountingFetcher::ok(b"fresh");
        let cache = ImageCache::new(dir.path(), true, fetcher.clone()).unwrap();

        let path = cache.get_or_fetch("https://x/a.png", "OP01-001").await.unwrap();
        cache.get_or_fetch("https://x/a.png", "OP01-001").await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(std::fs::read(path).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn colliding_names_share_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::ok(b"first");
        let cache = ImageCache::new(dir.path(), false, fetcher.clone()).unwrap();

        let a = cache.get_or_fetch("https://x/1.png", "Zoro/Alt").await.unwrap();
        let b = cache.get_or_fetch("https://x/2.png", "zoro_alt").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn http_status_becomes_download_failed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), false, CountingFetcher::status(404)).unwrap();

        let err = cache.get_or_fetch("https://x/a.png", "Nami").await.unwrap_err();
        match err {
            CardError::DownloadFailed { identifier, reason, .. } => {
                assert_eq!(identifier, "Nami");
                assert_eq!(reason, "HTTP 404");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!cache.path_for("Nami").exists());
    }

    #[tokio::test]
    async fn timeout_becomes_download_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), false, Arc::new(SlowFetcher)).unwrap();

        let err = cache.get_or_fetch("https://x/a.png", "Nami").await.unwrap_err();
        assert!(matches!(err, CardError::DownloadTimeout { secs: 30, .. }));
    }

    /// Hands out a different full-size payload per call, yielding first so
    /// two concurrent lookups both reach the store step.
    struct RacingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageFetcher for RacingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(vec![b'a' + n as u8; 256 * 1024])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_writers_leave_one_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(RacingFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = ImageCache::new(dir.path(), true, fetcher.clone()).unwrap();

        let (a, b) = tokio::join!(
            cache.get_or_fetch("https://x/1.png", "OP01-001"),
            cache.get_or_fetch("https://x/2.png", "OP01-001"),
        );
        let path = a.unwrap();
        assert_eq!(path, b.unwrap());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 256 * 1024);
        assert!(bytes == vec![b'a'; bytes.len()] || bytes == vec![b'b'; bytes.len()]);

        // No temp files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn new_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = ImageCache::new(&nested, false, CountingFetcher::ok(b"")).unwrap();
        assert!(nested.is_dir());
        assert_eq!(cache.dir(), nested.as_path());
    }
}
