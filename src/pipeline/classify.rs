//! Identifier classification and decklist parsing.
//!
//! Every later stage branches on whether a request names a card by its
//! printed code (`OP01-001`, `ST10-005`, `EB01-012P`) or by free text
//! (`Monkey.D.Luffy`). Codes unlock the direct CDN probes and the per-card
//! pages on the scraped sites; free text only works with the search pages.

use crate::error::ProxyError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

static RE_CARD_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,3}[0-9]{2}-[0-9]{3}[A-Z]?$").unwrap());

static RE_QUANTITY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)([0-9]+)x?\s+(.+)$").unwrap());

/// Most copies of one card a single entry may ask for. Anything above is
/// a typo, and would otherwise allocate one placement per copy.
pub const MAX_QUANTITY: u32 = 1000;

/// A classified card identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardIdentifier {
    /// Set letters, set number, hyphen, card number, optional variant letter.
    /// Always stored in canonical uppercase.
    StructuredCode(String),
    /// Anything else, trimmed.
    FreeText(String),
}

impl CardIdentifier {
    /// The canonical text: uppercase code or trimmed free text.
    pub fn as_str(&self) -> &str {
        match self {
            CardIdentifier::StructuredCode(code) => code,
            CardIdentifier::FreeText(text) => text,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, CardIdentifier::StructuredCode(_))
    }

    /// The set prefix of a structured code (`OP01` for `OP01-001`).
    pub fn set_code(&self) -> Option<&str> {
        match self {
            CardIdentifier::StructuredCode(code) => code.split('-').next(),
            CardIdentifier::FreeText(_) => None,
        }
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a raw identifier. Pure and total.
///
/// Matching is case-insensitive; a match is returned uppercased. Callers
/// are expected to drop empty strings before classifying.
pub fn classify(raw: &str) -> CardIdentifier {
    let trimmed = raw.trim();
    let upper = trimmed.to_uppercase();
    if RE_CARD_CODE.is_match(&upper) {
        CardIdentifier::StructuredCode(upper)
    } else {
        CardIdentifier::FreeText(trimmed.to_string())
    }
}

/// One parsed decklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRequest {
    pub identifier: String,
    pub quantity: u32,
}

impl CardRequest {
    pub fn new(identifier: impl Into<String>, quantity: u32) -> Self {
        Self {
            identifier: identifier.into(),
            quantity,
        }
    }
}

/// Parse a single decklist line or CLI argument.
///
/// Accepts `4x OP01-001`, `4 OP01-001`, `4X Nami` and bare `OP01-001`.
/// Blank lines and `#` comments yield `None`, as do entries whose quantity
/// is zero or above [`MAX_QUANTITY`].
pub fn parse_entry(line: &str) -> Option<CardRequest> {
    let entry = line.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }

    let Some(caps) = RE_QUANTITY_PREFIX.captures(entry) else {
        return Some(CardRequest::new(entry, 1));
    };

    let identifier = caps[2].trim();
    match caps[1].parse::<u32>() {
        Ok(0) => {
            warn!("Skipping '{}': quantity must be at least 1", entry);
            None
        }
        Ok(quantity) if quantity > MAX_QUANTITY => {
            warn!("Skipping '{}': quantity above {}", entry, MAX_QUANTITY);
            None
        }
        Ok(quantity) => Some(CardRequest::new(identifier, quantity)),
        Err(e) => {
            warn!("Skipping '{}': bad quantity ({})", entry, e);
            None
        }
    }
}

/// Parse a whole decklist, one entry per line.
pub fn parse_decklist(text: &str) -> Vec<CardRequest> {
    text.lines().filter_map(parse_entry).collect()
}

/// Read and parse a decklist file.
///
/// This is the only input failure that aborts a run.
pub fn load_decklist(path: impl AsRef<Path>) -> Result<Vec<CardRequest>, ProxyError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProxyError::DecklistNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ProxyError::DecklistReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let requests = parse_decklist(&text);
    debug!("Loaded {} entries from {}", requests.len(), path.display());
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_codes_classify_in_any_case() {
        for raw in ["OP01-001", "op01-001", "St01-012", "EB01-012P", "PRB01-001", "  OP05-119  "] {
            assert!(classify(raw).is_structured(), "{raw} should be a code");
        }
        assert_eq!(
            classify("op01-001"),
            CardIdentifier::StructuredCode("OP01-001".into())
        );
    }

    #[test]
    fn everything_else_is_free_text() {
        for raw in [
            "Monkey.D.Luffy",
            "OP1-001",
            "OP01-01",
            "OP01001",
            "ABCD01-001",
            "OP01-001PP",
            "OP01-001 Luffy",
            "０P01-001",
        ] {
            assert!(!classify(raw).is_structured(), "{raw} should be free text");
        }
        assert_eq!(classify(" Nami "), CardIdentifier::FreeText("Nami".into()));
    }

    #[test]
    fn set_code_is_the_prefix() {
        assert_eq!(classify("op01-001").set_code(), Some("OP01"));
        assert_eq!(classify("PRB01-001").set_code(), Some("PRB01"));
        assert_eq!(classify("Zoro").set_code(), None);
    }

    #[test]
    fn parse_entry_quantity_forms() {
        assert_eq!(parse_entry("4x OP01-001"), Some(CardRequest::new("OP01-001", 4)));
        assert_eq!(parse_entry("4 OP01-001"), Some(CardRequest::new("OP01-001", 4)));
        assert_eq!(parse_entry("4X OP01-001"), Some(CardRequest::new("OP01-001", 4)));
        assert_eq!(parse_entry("OP01-001"), Some(CardRequest::new("OP01-001", 1)));
        assert_eq!(
            parse_entry("  2x   Monkey D. Luffy  "),
            Some(CardRequest::new("Monkey D. Luffy", 2))
        );
    }

    #[test]
    fn parse_entry_skips_comments_and_blanks() {
        assert_eq!(parse_entry("# comment"), None);
        assert_eq!(parse_entry("   # indented comment"), None);
        assert_eq!(parse_entry(""), None);
        assert_eq!(parse_entry("   \t"), None);
    }

    #[test]
    fn parse_entry_without_separator_is_an_identifier() {
        // No whitespace after the digits: not a quantity prefix.
        assert_eq!(parse_entry("4xOP01-001"), Some(CardRequest::new("4xOP01-001", 1)));
    }

    #[test]
    fn parse_entry_rejects_zero_and_overflow() {
        assert_eq!(parse_entry("0x OP01-001"), None);
        assert_eq!(parse_entry("99999999999 OP01-001"), None);
    }

    #[test]
    fn parse_entry_caps_quantity() {
        assert_eq!(parse_entry("4000000000 OP01-001"), None);
        assert_eq!(parse_entry("1001x Nami"), None);
        assert_eq!(
            parse_entry("1000x Nami"),
            Some(CardRequest::new("Nami", MAX_QUANTITY))
        );
    }

    #[test]
    fn parse_decklist_keeps_order() {
        let text = "# Red Zoro\n4x OP01-001\n\n2 ST01-012\nNami\n";
        let requests = parse_decklist(text);
        assert_eq!(
            requests,
            vec![
                CardRequest::new("OP01-001", 4),
                CardRequest::new("ST01-012", 2),
                CardRequest::new("Nami", 1),
            ]
        );
    }

    #[test]
    fn load_decklist_missing_file() {
        let err = load_decklist("/definitely/not/here/deck.txt").unwrap_err();
        assert!(matches!(err, ProxyError::DecklistNotFound { .. }));
    }

    #[test]
    fn load_decklist_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.txt");
        std::fs::write(&path, "4x OP01-001\n# skip\n1 ST01-012\n").unwrap();
        let requests = load_decklist(&path).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], CardRequest::new("ST01-012", 1));
    }
}
