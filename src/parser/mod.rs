//! HTML parsing and data extraction
//!
//! This module turns fetched release pages into [`ExtractedRecord`]s.
//! Extraction is total: a page missing some elements produces a partial
//! record rather than an error.

pub mod release;
pub mod sanitize;
pub mod selectors;

pub use release::{parse_timestamp, ReleaseExtractor};

use crate::models::{ExtractedRecord, RawDocument};
use crate::utils::error::ExtractionError;

/// Converts a raw document into a structured record
pub trait Extractor: Send + Sync {
    /// Extract every field that is present; missing ones stay empty
    fn extract(&self, doc: &RawDocument) -> ExtractedRecord;

    /// Extract and reject pages that carry no release at all
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError::EmptyDocument` when both title and body are
    /// empty.
    fn extract_checked(&self, doc: &RawDocument) -> Result<ExtractedRecord, ExtractionError> {
        let record = self.extract(doc);
        if record.title.is_empty() && record.text.is_empty() {
            return Err(ExtractionError::EmptyDocument {
                prid: doc.id.value.clone(),
            });
        }
        Ok(record)
    }
}
