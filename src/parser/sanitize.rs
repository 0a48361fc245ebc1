//! Text cleanup for extracted release content
//!
//! Element text comes out of scraper with entities already decoded but with
//! the page's indentation, non-breaking spaces and the occasional invisible
//! formatting character still in place.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2}\s+[A-Z]{3}\s+\d{4}\s+\d{1,2}:\d{2}[AP]M)")
        .expect("Invalid regex pattern")
});

/// Labels the portal prefixes to the release date line
pub const DATE_LABELS: &[&str] = &["प्रविष्टि तिथि:", "Posted On:"];

/// Clean a single text node run into one line
///
/// # Examples
///
/// ```
/// use pib_crawler::parser::sanitize::clean_inline;
///
/// let text = "  Cabinet\u{200B} approves\u{a0}\n  scheme ";
/// assert_eq!(clean_inline(text), "Cabinet approves scheme");
/// ```
pub fn clean_inline(text: &str) -> String {
    let visible = remove_zero_width(text);
    WHITESPACE_REGEX
        .replace_all(visible.trim(), " ")
        .trim()
        .to_string()
}

/// Remove zero-width and bidi formatting characters
pub fn remove_zero_width(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(*c,
                '\u{200B}'..='\u{200F}' |
                '\u{2028}'..='\u{202F}' |
                '\u{FEFF}'
            )
        })
        .collect()
}

/// Paragraphs that carry page furniture instead of release text
///
/// Dropped: empty lines, `******` separators, the trailing "Release ID"
/// line, and the "by PIB Delhi" byline.
pub fn is_boilerplate_paragraph(text: &str) -> bool {
    text.is_empty()
        || text.starts_with("******")
        || text.starts_with("Release ID")
        || text.contains("PIB Delhi")
}

/// Strip the entry-date label from the raw date line
pub fn strip_date_label(text: &str) -> String {
    let mut cleaned = text.to_string();
    for label in DATE_LABELS {
        cleaned = cleaned.replace(label, "");
    }
    clean_inline(&cleaned)
}

/// Find the `DD MMM YYYY H:MMAM` fragment of a date line
pub fn find_timestamp(text: &str) -> Option<String> {
    TIMESTAMP_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
