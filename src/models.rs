// Core data structures for the press release crawler

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::utils::prid_from_href;

/// Portal generation a document identifier belongs to
///
/// Identifiers from the two generations live in disjoint namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortalGeneration {
    /// archive.pib.gov.in callback search (`relid`)
    Legacy,
    /// www.pib.gov.in date listing (`PRID`)
    #[default]
    Modern,
}

impl PortalGeneration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
        }
    }

    /// Query parameter the detail endpoint expects
    pub fn id_param(&self) -> &'static str {
        match self {
            Self::Legacy => "relid",
            Self::Modern => "PRID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "legacy" | "archive" => Some(Self::Legacy),
            "modern" | "current" => Some(Self::Modern),
            _ => None,
        }
    }
}

impl std::fmt::Display for PortalGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque numeric identifier of one release on one portal generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    pub portal: PortalGeneration,
    pub value: String,
}

impl DocumentId {
    pub fn new(portal: PortalGeneration, value: impl Into<String>) -> Self {
        Self {
            portal,
            value: value.into(),
        }
    }

    pub fn legacy(value: impl Into<String>) -> Self {
        Self::new(PortalGeneration::Legacy, value)
    }

    pub fn modern(value: impl Into<String>) -> Self {
        Self::new(PortalGeneration::Modern, value)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Numeric ordering key; identifiers are digit strings
    pub fn sort_key(&self) -> (usize, &str) {
        (self.value.len(), self.value.as_str())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Search mode code sent as `searchtype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SearchMode {
    /// Free-text search over titles and bodies
    Keyword,
    /// Everything released in the date window
    #[default]
    Date,
    /// Any other code the portal accepts
    Code(u8),
}

impl SearchMode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Keyword => 1,
            Self::Date => 2,
            Self::Code(c) => *c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Keyword,
            2 => Self::Date,
            c => Self::Code(c),
        }
    }
}

/// Search filters applied to every date of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchFilters {
    /// Free-text query (empty for none)
    pub query: String,

    /// Ministry code, 0 for all ministries
    pub ministry: u32,

    /// Search mode
    pub mode: SearchMode,
}

/// Inclusive date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CrawlWindow {
    /// Window covering a single day
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Window covering `start..=end`; `None` if the range is inverted
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Parse a pair of ISO-8601 dates
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
        Self::new(start, end)
    }

    /// Number of days in the window
    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Dates in ascending order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len() as i64).map(move |offset| start + Duration::days(offset))
    }
}

/// One unit of crawl work; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    /// Traceability identifier
    pub id: Uuid,

    /// Dates to crawl
    pub window: CrawlWindow,

    /// Search filters
    pub filters: SearchFilters,

    /// Which portal generation to discover on
    pub portal: PortalGeneration,

    /// Optional cap on identifiers processed per date
    pub limit: Option<usize>,
}

impl CrawlTask {
    pub fn new(window: CrawlWindow, filters: SearchFilters, portal: PortalGeneration) -> Self {
        Self {
            id: Uuid::new_v4(),
            window,
            filters,
            portal,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|n| *n > 0);
        self
    }
}

/// Ordered, duplicate-free identifiers found for one date
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    ids: Vec<DocumentId>,
    seen: HashSet<DocumentId>,
}

impl DiscoveryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an identifier; returns false if it was already present
    pub fn push(&mut self, id: DocumentId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.ids.push(id);
        true
    }

    pub fn ids(&self) -> &[DocumentId] {
        &self.ids
    }

    pub fn into_ids(self) -> Vec<DocumentId> {
        self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.seen.contains(id)
    }
}

impl FromIterator<DocumentId> for DiscoveryResult {
    fn from_iter<I: IntoIterator<Item = DocumentId>>(iter: I) -> Self {
        let mut result = Self::new();
        for id in iter {
            result.push(id);
        }
        result
    }
}

/// Raw body of a fetched release
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: DocumentId,
    pub body: String,
    /// Set when fetched as the canonical substitute of another identifier
    pub redirected_from: Option<DocumentId>,
    pub fetched_at: DateTime<Utc>,
}

impl RawDocument {
    pub fn new(id: DocumentId, body: String) -> Self {
        Self {
            id,
            body,
            redirected_from: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn redirected_from(mut self, original: DocumentId) -> Self {
        self.redirected_from = Some(original);
        self
    }
}

/// Provenance attached to every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Identifier this record was fetched for
    pub prid: String,
    pub portal: PortalGeneration,
    /// Non-canonical identifier this record replaced
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_prid: Option<String>,
    /// Crawl date on which the identifier was discovered
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub discovered_on: Option<NaiveDate>,
    pub crawled_at: DateTime<Utc>,
    /// SHA-256 of the body text
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
}

impl RecordMetadata {
    pub fn for_document(id: &DocumentId) -> Self {
        Self {
            prid: id.value.clone(),
            portal: id.portal,
            original_prid: None,
            discovered_on: None,
            crawled_at: Utc::now(),
            content_hash: None,
        }
    }

    pub fn document_id(&self) -> DocumentId {
        DocumentId::new(self.portal, self.prid.clone())
    }
}

/// Structured release produced by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ministry: Option<String>,
    /// `#PrDateTime` text with the entry-date label removed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_time_raw: Option<String>,
    /// `DD MMM YYYY H:MMAM` fragment of the raw date text
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Language name to alternate release link
    #[serde(default)]
    pub languages: BTreeMap<String, String>,
    #[serde(flatten)]
    pub metadata: RecordMetadata,
}

impl ExtractedRecord {
    /// Empty record for a document, used when extraction finds nothing
    pub fn empty(id: &DocumentId) -> Self {
        Self {
            title: String::new(),
            text: String::new(),
            ministry: None,
            date_time_raw: None,
            timestamp: None,
            published_at: None,
            images: Vec::new(),
            languages: BTreeMap::new(),
            metadata: RecordMetadata::for_document(id),
        }
    }

    pub fn prid(&self) -> &str {
        &self.metadata.prid
    }

    pub fn original_prid(&self) -> Option<&str> {
        self.metadata.original_prid.as_deref()
    }

    /// Identifier of the variant in `language`, if linked
    pub fn language_prid(&self, language: &str) -> Option<String> {
        self.languages
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(language))
            .and_then(|(_, href)| prid_from_href(href))
    }

    /// Calculate content hash using SHA256
    pub fn compute_hash(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        self.metadata.content_hash = Some(format!("{:x}", hasher.finalize()));
    }

    /// Partition key: publication year, else the discovery date's year
    pub fn publication_year(&self, fallback: NaiveDate) -> i32 {
        self.published_at
            .map(|ts| ts.year())
            .or_else(|| self.metadata.discovered_on.map(|d| d.year()))
            .unwrap_or_else(|| fallback.year())
    }
}

/// Outcome counters for a crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub dates_processed: u32,
    pub dates_failed: u32,
    pub dates_skipped: u32,
    pub discovered: u64,
    pub extracted: u64,
    pub failed_items: u64,
    pub skipped_duplicates: u64,
    pub cancelled: bool,
}

impl CrawlSummary {
    /// Share of discovered identifiers that produced a record
    pub fn yield_rate(&self) -> f64 {
        if self.discovered == 0 {
            0.0
        } else {
            self.extracted as f64 / self.discovered as f64
        }
    }
}

impl std::fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "extracted {} records from {} discovered identifiers \
             ({} dates, {} failed dates, {} failed items)",
            self.extracted,
            self.discovered,
            self.dates_processed,
            self.dates_failed,
            self.failed_items
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_days_inclusive() {
        let window = CrawlWindow::new(date(2024, 1, 30), date(2024, 2, 2)).unwrap();
        let days: Vec<_> = window.days().collect();
        assert_eq!(window.len(), 4);
        assert_eq!(days.first(), Some(&date(2024, 1, 30)));
        assert_eq!(days.last(), Some(&date(2024, 2, 2)));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(CrawlWindow::new(date(2024, 2, 1), date(2024, 1, 1)).is_none());
        assert!(CrawlWindow::parse("2024-01-01", "2024-01-31").is_some());
        assert!(CrawlWindow::parse("01/01/2024", "2024-01-31").is_none());
    }

    #[test]
    fn test_discovery_result_first_seen_wins() {
        let result: DiscoveryResult = ["5", "3", "5", "9", "3"]
            .into_iter()
            .map(DocumentId::modern)
            .collect();

        let values: Vec<_> = result.ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(values, vec!["5", "3", "9"]);
    }

    #[test]
    fn test_identifier_namespaces_are_disjoint() {
        assert_ne!(DocumentId::legacy("100"), DocumentId::modern("100"));
        let result: DiscoveryResult = vec![DocumentId::legacy("100"), DocumentId::modern("100")]
            .into_iter()
            .collect();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_search_mode_codes() {
        assert_eq!(SearchMode::default().code(), 2);
        assert_eq!(SearchMode::from_code(1), SearchMode::Keyword);
        assert_eq!(SearchMode::from_code(7).code(), 7);
    }

    #[test]
    fn test_language_prid_lookup() {
        let mut record = ExtractedRecord::empty(&DocumentId::modern("1"));
        record.languages.insert(
            " English ".to_string(),
            "/PressReleasePage.aspx?PRID=999".to_string(),
        );
        assert_eq!(record.language_prid("english"), Some("999".to_string()));
        assert_eq!(record.language_prid("Hindi"), None);
    }

    #[test]
    fn test_content_hash() {
        let mut record = ExtractedRecord::empty(&DocumentId::modern("1"));
        record.text = "Cabinet approves scheme".to_string();
        record.compute_hash();
        assert_eq!(record.metadata.content_hash.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_publication_year_fallback() {
        let mut record = ExtractedRecord::empty(&DocumentId::modern("1"));
        assert_eq!(record.publication_year(date(2023, 5, 1)), 2023);

        record.metadata.discovered_on = Some(date(2022, 1, 1));
        assert_eq!(record.publication_year(date(2023, 5, 1)), 2022);

        record.published_at = date(2021, 3, 4).and_hms_opt(15, 55, 0);
        assert_eq!(record.publication_year(date(2023, 5, 1)), 2021);
    }

    #[test]
    fn test_record_serializes_flat_provenance() {
        let mut record = ExtractedRecord::empty(&DocumentId::modern("999"));
        record.metadata.original_prid = Some("123".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["prid"], "999");
        assert_eq!(json["original_prid"], "123");

        let restored: ExtractedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(restored.original_prid(), Some("123"));
    }

    #[test]
    fn test_summary_display() {
        let summary = CrawlSummary {
            discovered: 10,
            extracted: 8,
            ..Default::default()
        };
        assert!(summary.to_string().contains("extracted 8 records from 10"));
        assert!((summary.yield_rate() - 0.8).abs() < f64::EPSILON);
    }
}
