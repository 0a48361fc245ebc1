//! Press release detail page extractor

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html};

use crate::models::{ExtractedRecord, RawDocument};
use crate::parser::sanitize::{
    clean_inline, find_timestamp, is_boilerplate_paragraph, strip_date_label,
};
use crate::parser::selectors::{
    CHROME_IMAGE_MARKERS, CONTENT, DATE_TIME, IMAGE, LANGUAGE_LINKS, MINISTRY, PARAGRAPH, TITLE,
};
use crate::parser::Extractor;

/// Timestamp layout on the detail pages, e.g. `18 FEB 2026 3:55PM`
pub const TIMESTAMP_FORMAT: &str = "%d %b %Y %I:%M%p";

/// Extractor for the shared detail page template
///
/// Missing elements leave the matching field empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseExtractor;

impl ReleaseExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract fields from raw HTML for the given record shell
    pub fn extract_html(&self, html: &str, record: &mut ExtractedRecord) {
        let document = Html::parse_document(html);

        record.ministry = first_text(&document, &MINISTRY);
        record.title = first_text(&document, &TITLE).unwrap_or_default();

        if let Some(raw) = first_text(&document, &DATE_TIME).map(|t| strip_date_label(&t)) {
            record.timestamp = find_timestamp(&raw);
            record.published_at = record.timestamp.as_deref().and_then(parse_timestamp);
            record.date_time_raw = Some(raw);
        }

        if let Some(content) = document.select(&CONTENT).next() {
            record.text = content
                .select(&PARAGRAPH)
                .map(element_text)
                .filter(|p| !is_boilerplate_paragraph(p))
                .collect::<Vec<_>>()
                .join("\n\n");

            record.images = content
                .select(&IMAGE)
                .filter_map(|img| img.value().attr("src"))
                .filter(|src| !CHROME_IMAGE_MARKERS.iter().any(|m| src.contains(m)))
                .map(str::to_string)
                .collect();
        }

        for link in document.select(&LANGUAGE_LINKS) {
            if let Some(href) = link.value().attr("href") {
                record
                    .languages
                    .insert(element_text(link), href.trim().to_string());
            }
        }
    }
}

impl Extractor for ReleaseExtractor {
    fn extract(&self, doc: &RawDocument) -> ExtractedRecord {
        let mut record = ExtractedRecord::empty(&doc.id);
        record.metadata.original_prid = doc.redirected_from.as_ref().map(|id| id.value.clone());

        self.extract_html(&doc.body, &mut record);
        record.compute_hash();

        if record.title.is_empty() && record.text.is_empty() {
            tracing::warn!(prid = %doc.id, "Detail page had no release content");
        }

        record
    }
}

/// Parse a `DD MMM YYYY H:MMAM` timestamp
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let normalized = clean_inline(raw);
    NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT).ok()
}

fn first_text(document: &Html, selector: &scraper::Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn element_text(element: ElementRef) -> String {
    clean_inline(&element.text().collect::<String>())
}
