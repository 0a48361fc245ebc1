//! Detail page retrieval
//!
//! [`DetailFetcher`] wraps a single GET in the shared [`RetryPolicy`] and
//! shapes every attempt: a user agent drawn from the pool and a short random
//! pause before the request goes out.
//!
//! [`RetryPolicy`]: crate::utils::retry::RetryPolicy

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::crawler::headers::{build_browser_headers, random_user_agent};
use crate::crawler::{classify_transport_error, PortalClient};
use crate::models::{DocumentId, RawDocument};
use crate::utils::error::FetchError;
use crate::utils::retry::{random_between, with_retry, RetryFailure};

/// Retrieves the full document for an identifier
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch with internal retry
    ///
    /// # Errors
    ///
    /// A `FetchError` is a per-item failure; callers skip the item.
    async fn fetch(&self, id: &DocumentId) -> Result<RawDocument, FetchError>;
}

/// HTTP fetcher for release detail pages on either portal generation
pub struct DetailFetcher {
    client: Arc<PortalClient>,
}

impl DetailFetcher {
    pub fn new(client: Arc<PortalClient>) -> Self {
        Self { client }
    }

    async fn attempt(&self, id: &DocumentId, attempt: u32) -> Result<String, FetchError> {
        let (min, max) = self.client.pre_request_delay();
        let pause = random_between(min, max);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let url = self.client.detail_url(id)?;
        let user_agent = random_user_agent();
        let referer = self.client.portal().modern_base_url.clone();

        tracing::trace!(prid = %id, attempt, user_agent, "Requesting detail page");

        self.client
            .get_text(&url, build_browser_headers(user_agent, Some(&referer)))
            .await
    }
}

#[async_trait]
impl DocumentFetcher for DetailFetcher {
    async fn fetch(&self, id: &DocumentId) -> Result<RawDocument, FetchError> {
        let label = format!("{}:{}", id.portal, id);

        let body = with_retry(self.client.retry_policy(), &label, |attempt| {
            self.attempt(id, attempt)
        })
        .await
        .map_err(|failure| match failure {
            RetryFailure::Exhausted { attempts, last } => FetchError::RetriesExhausted {
                target: label.clone(),
                attempts,
                last_error: last.to_string(),
            },
            RetryFailure::Aborted(e) => e,
        })?;

        tracing::debug!(prid = %id, portal = %id.portal, bytes = body.len(), "Fetched release");

        Ok(RawDocument::new(id.clone(), body))
    }
}

/// Read a response body and decode it to UTF-8
pub async fn decode_response(response: reqwest::Response) -> Result<String, FetchError> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(classify_transport_error)?;

    decode_bytes(&bytes, content_type.as_deref())
}

/// Decode raw bytes using the declared charset
///
/// Resolution order: the `Content-Type` charset, a `<meta charset>` in the
/// first 1 KiB, strict UTF-8, then windows-1252.
pub fn decode_bytes(bytes: &[u8], content_type: Option<&str>) -> Result<String, FetchError> {
    let declared = content_type
        .and_then(charset_from_content_type)
        .or_else(|| charset_from_meta(bytes));

    if let Some(label) = declared {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| FetchError::Decode(format!("unknown charset {label}")))?;
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            tracing::debug!(charset = encoding.name(), "Replaced malformed byte sequences");
        }
        return Ok(text.into_owned());
    }

    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return Ok(text.into_owned());
    }

    let (text, _, had_errors) = WINDOWS_1252.decode(bytes);
    if had_errors {
        return Err(FetchError::Decode(
            "body is neither UTF-8 nor windows-1252".to_string(),
        ));
    }
    Ok(text.into_owned())
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn charset_from_meta(bytes: &[u8]) -> Option<String> {
    static META_RE: OnceLock<Regex> = OnceLock::new();

    let re = META_RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-z0-9_\-]+)"#)
            .expect("Invalid regex pattern")
    });

    let head = &bytes[..bytes.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    re.captures(&head)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_utf8() {
        let text = decode_bytes("प्रविष्टि तिथि".as_bytes(), None).unwrap();
        assert_eq!(text, "प्रविष्टि तिथि");
    }

    #[test]
    fn test_decode_declared_charset() {
        let bytes = [b'c', b'a', b'f', 0xE9];
        let text = decode_bytes(&bytes, Some("text/html; charset=ISO-8859-1")).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn test_decode_meta_charset() {
        let mut bytes = br#"<html><head><meta charset="windows-1252"></head>"#.to_vec();
        bytes.push(0x93);
        let text = decode_bytes(&bytes, Some("text/html")).unwrap();
        assert!(text.ends_with('\u{201C}'));
    }

    #[test]
    fn test_decode_falls_back_to_windows_1252() {
        let text = decode_bytes(&[b'a', 0x96, b'b'], None).unwrap();
        assert_eq!(text, "a\u{2013}b");
    }

    #[test]
    fn test_unknown_charset_is_error() {
        let err = decode_bytes(b"abc", Some("text/html; charset=klingon")).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=\"utf-8\""),
            Some("utf-8".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
