//! ASP.NET client callback response envelope
//!
//! Grammar accepted by [`CallbackEnvelope::decode`]:
//!
//! ```text
//! envelope := marker "|" [ marker "|" ] payload "|"
//! marker   := DIGIT+
//! error    := "e" message
//! ```
//!
//! Typical responses are `0|1|<html>|` and `1|<html>|`. The payload may be
//! empty when a date has no releases.

use regex::Regex;
use std::sync::OnceLock;

use crate::utils::error::EnvelopeError;

/// Decoded callback response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEnvelope {
    /// Leading numeric segment markers (one or two)
    pub markers: Vec<String>,

    /// HTML fragment between the markers and the trailing `|`
    pub payload: String,
}

impl CallbackEnvelope {
    /// Decode a raw callback response
    ///
    /// # Errors
    ///
    /// - `EnvelopeError::ServerError` when the server reports a callback error
    /// - `EnvelopeError::Malformed` when the text does not follow the grammar
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        static ENVELOPE_RE: OnceLock<Regex> = OnceLock::new();

        if let Some(message) = text.strip_prefix('e') {
            return Err(EnvelopeError::ServerError(message.trim().to_string()));
        }

        if text.trim().is_empty() {
            return Err(EnvelopeError::malformed("empty response"));
        }

        if !text.ends_with('|') {
            return Err(EnvelopeError::malformed("missing trailing marker"));
        }

        let re = ENVELOPE_RE.get_or_init(|| {
            Regex::new(r"(?s)\A(\d+)\|(?:(\d+)\|)?(.*)\|\z").expect("Invalid regex pattern")
        });

        let caps = re
            .captures(text)
            .ok_or_else(|| EnvelopeError::malformed("missing leading segment marker"))?;

        let markers = [caps.get(1), caps.get(2)]
            .into_iter()
            .flatten()
            .map(|m| m.as_str().to_string())
            .collect();

        let payload = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Ok(Self { markers, payload })
    }

    pub fn is_empty(&self) -> bool {
        self.payload.trim().is_empty()
    }
}
