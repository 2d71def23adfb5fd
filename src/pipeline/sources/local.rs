//! Local scan folder: the user's own images win over every network source.

use super::{absorb, resolved_by, ImageRef, Language, ResolvedCard, SourceAdapter};
use crate::error::SourceError;
use crate::pipeline::cache::cache_key;
use crate::pipeline::classify::CardIdentifier;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions accepted in the scan folder (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Looks up `<identifier>.<ext>` in a user-designated directory.
///
/// Stems tried in order: `OP01-001`, `op01-001`, then the cache-key form
/// (`monkey_d._luffy`). A last pass ignores case entirely.
#[derive(Debug, Clone)]
pub struct LocalOverride {
    dir: Option<PathBuf>,
}

impl LocalOverride {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Find the override file for `identifier`, if any.
    pub fn find(&self, identifier: &CardIdentifier) -> Result<Option<PathBuf>, SourceError> {
        let Some(dir) = self.dir.as_deref() else {
            return Ok(None);
        };
        if !dir.is_dir() {
            debug!("Local: image directory {} does not exist", dir.display());
            return Ok(None);
        }

        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let raw = identifier.as_str();
        let stems = [raw.to_uppercase(), raw.to_lowercase(), cache_key(raw)];

        for stem in &stems {
            if let Some(name) = names.iter().find(|n| matches_stem(n, stem, false)) {
                return Ok(Some(dir.join(name)));
            }
        }
        for stem in &stems {
            if let Some(name) = names.iter().find(|n| matches_stem(n, stem, true)) {
                return Ok(Some(dir.join(name)));
            }
        }
        Ok(None)
    }
}

/// `name` is `<stem>.<anything>` with an accepted image extension.
fn matches_stem(name: &str, stem: &str, ignore_case: bool) -> bool {
    if name.len() <= stem.len() + 1 || !name.is_char_boundary(stem.len()) {
        return false;
    }
    let (head, tail) = name.split_at(stem.len());
    let head_ok = if ignore_case {
        head.eq_ignore_ascii_case(stem)
    } else {
        head == stem
    };
    head_ok && tail.starts_with('.') && has_image_extension(Path::new(name))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
        .unwrap_or(false)
}

#[async_trait]
impl SourceAdapter for LocalOverride {
    fn name(&self) -> &'static str {
        "Local"
    }

    async fn resolve(&self, identifier: &CardIdentifier, _language: Language) -> Option<ResolvedCard> {
        let (local, id) = (self.clone(), identifier.clone());
        let lookup = tokio::task::spawn_blocking(move || local.find(&id))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e.to_string()).into()));
        let found = absorb(self.name(), identifier, lookup)?;
        debug!("Local: {} → {}", identifier, found.display());
        Some(resolved_by(self, identifier, ImageRef::Local(found)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::classify;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn no_directory_configured() {
        let local = LocalOverride::new(None);
        assert_eq!(local.find(&classify("OP01-001")).unwrap(), None);
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let local = LocalOverride::new(Some(PathBuf::from("/no/such/scans")));
        assert_eq!(local.find(&classify("OP01-001")).unwrap(), None);
    }

    #[test]
    fn finds_uppercase_then_lowercase() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "op01-001.jpg");
        touch(dir.path(), "OP01-001.png");
        let local = LocalOverride::new(Some(dir.path().to_path_buf()));

        let found = local.find(&classify("op01-001")).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "OP01-001.png");
    }

    #[test]
    fn finds_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "monkey_d._luffy.webp");
        let local = LocalOverride::new(Some(dir.path().to_path_buf()));

        let found = local.find(&classify("Monkey D. Luffy")).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "monkey_d._luffy.webp");
    }

    #[test]
    fn mixed_case_file_name_matches_last() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Op01-001.JPEG");
        let local = LocalOverride::new(Some(dir.path().to_path_buf()));

        let found = local.find(&classify("OP01-001")).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "Op01-001.JPEG");
    }

    #[test]
    fn ignores_other_extensions_and_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "OP01-001.txt");
        touch(dir.path(), "OP01-0012.png");
        touch(dir.path(), "OP01-001");
        let local = LocalOverride::new(Some(dir.path().to_path_buf()));

        assert_eq!(local.find(&classify("OP01-001")).unwrap(), None);
    }

    #[test]
    fn resolve_tags_provenance() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ST01-012.png");
        let local = LocalOverride::new(Some(dir.path().to_path_buf()));

        let card = tokio_test::block_on(local.resolve(&classify("st01-012"), Language::English))
            .expect("local hit");
        assert_eq!(card.provenance, "Local");
        assert!(!card.watermarked);
        assert_eq!(card.display_name, "ST01-012");
        assert!(matches!(card.image_ref, ImageRef::Local(_)));
    }
}
