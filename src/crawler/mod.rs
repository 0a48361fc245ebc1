//! Crawl engine for the press release portals
//!
//! This module owns the shared client context and the pieces that drive it:
//!
//! - [`session`] - hidden-field state harvesting for the legacy archive
//! - [`envelope`] - callback response decoding
//! - [`discovery`] - callback and listing discovery strategies
//! - [`fetcher`] - detail page retrieval with retry and request shaping
//! - [`dedup`] - claim ledger and language canonicalization
//! - [`pipeline`] - date-cursor coordinator with a bounded worker pool

pub mod dedup;
pub mod discovery;
pub mod envelope;
pub mod fetcher;
pub mod headers;
pub mod pipeline;
pub mod session;

use chrono::{Datelike, NaiveDate};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

use crate::config::{Config, PortalConfig};
use crate::models::{DocumentId, PortalGeneration};
use crate::utils::error::FetchError;
use crate::utils::retry::RetryPolicy;

/// Shared client context
///
/// One instance is owned by the coordinator and handed to every worker behind
/// an `Arc`. The underlying connection pool and cookie jar are shared, so the
/// session cookies set by the bootstrap page are visible to later requests.
pub struct PortalClient {
    /// HTTP client with cookie store and pooled connections
    http: Client,

    /// Rate limiter shared by all requests
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Endpoint configuration
    portal: PortalConfig,

    /// Retry policy for discovery and fetch
    retry: RetryPolicy,

    /// Randomized delay range before detail requests
    pre_request_delay: (Duration, Duration),
}

impl PortalClient {
    /// Create a new client context
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let pool_size = config
            .crawler
            .pool_max_idle_per_host
            .max(config.crawler.workers);

        let http = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .cookie_store(true)
            .pool_max_idle_per_host(pool_size)
            .danger_accept_invalid_certs(config.crawler.accept_invalid_certs)
            .build()?;

        let rate = NonZeroU32::new(config.crawler.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            http,
            rate_limiter,
            portal: config.portal.clone(),
            retry: config.retry_policy(),
            pre_request_delay: config.pre_request_delay(),
        })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn pre_request_delay(&self) -> (Duration, Duration) {
        self.pre_request_delay
    }

    /// Wait for a rate limiter slot
    pub async fn throttle(&self) {
        self.rate_limiter.until_ready().await;
    }

    /// Legacy search page hosting the callback
    pub fn legacy_search_url(&self) -> Result<Url, FetchError> {
        join_url(&self.portal.legacy_base_url, &self.portal.legacy_search_path)
    }

    /// Scheme and host of the legacy archive, sent as `Origin`
    pub fn legacy_origin(&self) -> Result<String, FetchError> {
        let url = Url::parse(&self.portal.legacy_base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", self.portal.legacy_base_url)))?;
        Ok(url.origin().ascii_serialization())
    }

    /// Modern date listing page
    ///
    /// Format: `AllRelease.aspx?d={day}&m={month}&y={year}&lang={language}&reg={region}`
    pub fn listing_url(&self, date: NaiveDate) -> Result<Url, FetchError> {
        let mut url = join_url(&self.portal.modern_base_url, &self.portal.listing_path)?;
        url.query_pairs_mut()
            .append_pair("d", &date.day().to_string())
            .append_pair("m", &date.month().to_string())
            .append_pair("y", &date.year().to_string())
            .append_pair("lang", &self.portal.language.to_string())
            .append_pair("reg", &self.portal.region.to_string());
        Ok(url)
    }

    /// Detail page for an identifier on its own portal generation
    pub fn detail_url(&self, id: &DocumentId) -> Result<Url, FetchError> {
        let mut url = match id.portal {
            PortalGeneration::Legacy => Url::parse(&self.portal.legacy_print_url).map_err(|e| {
                FetchError::InvalidUrl(format!("{}: {e}", self.portal.legacy_print_url))
            })?,
            PortalGeneration::Modern => {
                join_url(&self.portal.modern_base_url, &self.portal.detail_path)?
            }
        };
        url.query_pairs_mut()
            .append_pair(id.portal.id_param(), id.as_str());
        Ok(url)
    }

    /// Issue one GET and decode the body; no retry
    pub async fn get_text(&self, url: &Url, headers: HeaderMap) -> Result<String, FetchError> {
        self.throttle().await;

        tracing::debug!(url = %url, "Fetching URL");

        let response = self
            .http
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        fetcher::decode_response(response).await
    }
}

/// Map reqwest timeouts onto the dedicated variant
pub(crate) fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Http(e)
    }
}

fn join_url(base: &str, path: &str) -> Result<Url, FetchError> {
    Url::parse(base)
        .and_then(|b| b.join(path))
        .map_err(|e| FetchError::InvalidUrl(format!("{base} + {path}: {e}")))
}
