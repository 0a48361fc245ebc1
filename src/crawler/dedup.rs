//! Claim ledger and language canonicalization
//!
//! Every identifier a worker touches is claimed exactly once in the
//! [`DedupLedger`]. A record whose title is not in the canonical language is
//! swapped for its canonical sibling when that sibling is still unclaimed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::crawler::fetcher::DocumentFetcher;
use crate::models::{DocumentId, ExtractedRecord};
use crate::parser::Extractor;

/// Minimum share of Latin-script characters for a canonical title
pub const CANONICAL_THRESHOLD: f64 = 0.90;

/// Typographic punctuation counted alongside ASCII
const CANONICAL_PUNCTUATION: &[char] = &[
    '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2013}', '\u{2014}',
];

/// Language name of the canonical variant in the language-link map
pub const CANONICAL_LANGUAGE: &str = "English";

/// Decide whether a title is already in the canonical language
///
/// # Examples
///
/// ```
/// use pib_crawler::crawler::dedup::is_canonical_title;
///
/// assert!(is_canonical_title("PM’s address – Digital India"));
/// assert!(!is_canonical_title("प्रधानमंत्री का संबोधन"));
/// assert!(!is_canonical_title(""));
/// ```
pub fn is_canonical_title(title: &str) -> bool {
    let total = title.chars().count();
    if total == 0 {
        return false;
    }

    let latin = title
        .chars()
        .filter(|c| (*c as u32) < 128 || CANONICAL_PUNCTUATION.contains(c))
        .count();

    latin as f64 / total as f64 > CANONICAL_THRESHOLD
}

/// Process-wide set of claimed identifiers
///
/// Claims are linearizable: two concurrent claims of one identifier never
/// both succeed.
#[derive(Debug, Default)]
pub struct DedupLedger {
    claimed: Mutex<HashSet<DocumentId>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an identifier; `false` if someone already holds it
    pub fn claim(&self, id: &DocumentId) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        claimed.insert(id.clone())
    }

    pub fn is_claimed(&self, id: &DocumentId) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a worker emits for one discovered identifier
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Original record is the output (canonical already, or no usable sibling)
    Keep(ExtractedRecord),
    /// Canonical sibling replaces the original
    Substitute(ExtractedRecord),
    /// Sibling is owned by another worker; emit nothing
    Suppressed { canonical: DocumentId },
}

impl Resolution {
    pub fn into_record(self) -> Option<ExtractedRecord> {
        match self {
            Self::Keep(record) | Self::Substitute(record) => Some(record),
            Self::Suppressed { .. } => None,
        }
    }
}

/// Swaps non-canonical records for their canonical sibling
pub struct CanonicalResolver {
    ledger: Arc<DedupLedger>,
    fetcher: Arc<dyn DocumentFetcher>,
    extractor: Arc<dyn Extractor>,
    language: String,
}

impl CanonicalResolver {
    pub fn new(
        ledger: Arc<DedupLedger>,
        fetcher: Arc<dyn DocumentFetcher>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            extractor,
            language: CANONICAL_LANGUAGE.to_string(),
        }
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }

    /// Resolve the output for `id`, whose record was just extracted
    ///
    /// The caller must already hold the claim on `id`.
    pub async fn resolve(&self, id: &DocumentId, record: ExtractedRecord) -> Resolution {
        if is_canonical_title(&record.title) {
            return Resolution::Keep(record);
        }

        let Some(value) = record.language_prid(&self.language) else {
            return Resolution::Keep(record);
        };

        let canonical = DocumentId::new(id.portal, value);
        if canonical == *id {
            return Resolution::Keep(record);
        }

        if !self.ledger.claim(&canonical) {
            tracing::debug!(
                prid = %id,
                canonical = %canonical,
                known_miss_possible = true,
                "Canonical variant already claimed, emitting nothing"
            );
            return Resolution::Suppressed { canonical };
        }

        tracing::debug!(prid = %id, canonical = %canonical, "Switching to canonical variant");

        match self.fetcher.fetch(&canonical).await {
            Ok(raw) => {
                let substitute = self.extractor.extract(&raw.redirected_from(id.clone()));
                Resolution::Substitute(substitute)
            }
            Err(e) => {
                tracing::warn!(
                    prid = %id,
                    canonical = %canonical,
                    error = %e,
                    "Canonical fetch failed, keeping original record"
                );
                Resolution::Keep(record)
            }
        }
    }
}
