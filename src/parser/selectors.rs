//! CSS selectors for press release detail pages
//!
//! Both portal generations render detail pages from the same template, so a
//! single selector set covers them.

use scraper::Selector;
use std::sync::LazyLock;

// Helper macro to parse selectors that are known to be valid
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

/// Issuing ministry heading
pub static MINISTRY: LazyLock<Selector> = LazyLock::new(|| parse_selector!("#MinistryName"));

/// Release title
pub static TITLE: LazyLock<Selector> = LazyLock::new(|| parse_selector!("#Titleh2"));

/// "Posted on" date line
pub static DATE_TIME: LazyLock<Selector> = LazyLock::new(|| parse_selector!("#PrDateTime"));

/// Main content container (the class name is misspelled on the site)
pub static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| parse_selector!("div.innner-page-main-about-us-content-right-part"));

pub static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| parse_selector!("p"));

pub static IMAGE: LazyLock<Selector> = LazyLock::new(|| parse_selector!("img[src]"));

/// Links to the same release in other languages
pub static LANGUAGE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| parse_selector!("div.ReleaseLang a[href]"));

/// Image paths that belong to page chrome rather than the release
pub const CHROME_IMAGE_MARKERS: &[&str] = &["socialmedianew", "printer_icon"];
