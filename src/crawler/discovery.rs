//! Identifier discovery strategies
//!
//! Both portal generations sit behind the [`Discovery`] trait:
//!
//! - [`CallbackDiscovery`] - legacy archive; harvests session state and
//!   replays the search page's client callback as a form POST
//! - [`ListingDiscovery`] - modern portal; one GET of the date listing page
//!
//! The HTML scanning is split into pure functions
//! ([`extract_release_ids`], [`extract_listing_ids`]) so it can be tested
//! without a server.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use crate::crawler::envelope::CallbackEnvelope;
use crate::crawler::headers::{build_browser_headers, build_callback_headers, random_user_agent};
use crate::crawler::session::{SessionHarvester, SessionState};
use crate::crawler::{classify_transport_error, fetcher, PortalClient};
use crate::error::CrawlErrorTrait;
use crate::models::{CrawlWindow, DiscoveryResult, DocumentId, PortalGeneration, SearchFilters};
use crate::utils::error::{DiscoveryError, FetchError, SessionError};
use crate::utils::prid_from_href;
use crate::utils::retry::{with_retry, RetryDecision, RetryFailure, Retryable};

/// Lists candidate identifiers for a date window
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Portal generation the discovered identifiers belong to
    fn portal(&self) -> PortalGeneration;

    /// Verify the portal is reachable before a crawl starts
    async fn preflight(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }

    /// Discover identifiers released within `window`
    async fn discover(
        &self,
        window: &CrawlWindow,
        filters: &SearchFilters,
    ) -> Result<DiscoveryResult, DiscoveryError>;
}

impl Retryable for DiscoveryError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::Fetch(e) => e.retry_decision(),
            Self::Session(SessionError::Status { status, .. }) if matches!(*status, 429 | 403) => {
                RetryDecision::RateLimited
            }
            other if other.is_recoverable() => RetryDecision::Transient,
            _ => RetryDecision::Abort,
        }
    }
}

fn flatten_failure(failure: RetryFailure<DiscoveryError>) -> DiscoveryError {
    match failure {
        RetryFailure::Exhausted { attempts, last } => {
            tracing::debug!(attempts, "Discovery retries exhausted");
            last
        }
        RetryFailure::Aborted(e) => e,
    }
}

// ============================================================================
// Callback strategy (legacy archive)
// ============================================================================

/// Build the pipe-delimited `__CALLBACKPARAM` value
///
/// Layout: `1|query|fd|fm|fy|td|tm|ty|ministry|searchtype|1`
pub fn build_callback_param(window: &CrawlWindow, filters: &SearchFilters) -> String {
    let (from, to) = (window.start, window.end);
    format!(
        "1|{}|{}|{}|{}|{}|{}|{}|{}|{}|1",
        filters.query,
        from.day(),
        from.month(),
        from.year(),
        to.day(),
        to.month(),
        to.year(),
        filters.ministry,
        filters.mode.code()
    )
}

/// Ordered form fields for the callback POST
///
/// `__EVENTVALIDATION` is only sent when the bootstrap page carried one.
/// The `rdate`/`rmonth`/`ryear` fields mirror the window start.
pub fn build_callback_form(
    state: &SessionState,
    window: &CrawlWindow,
    filters: &SearchFilters,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("__EVENTTARGET", String::new()),
        ("__EVENTARGUMENT", String::new()),
        ("__VIEWSTATE", state.view_state.clone()),
        ("__VIEWSTATEGENERATOR", state.view_state_generator.clone()),
    ];

    if state.has_event_validation() {
        form.push(("__EVENTVALIDATION", state.event_validation.clone()));
    }

    let start = window.start;
    form.extend([
        ("__VIEWSTATEENCRYPTED", String::new()),
        ("searchtype", filters.mode.code().to_string()),
        ("minname", filters.ministry.to_string()),
        ("rdate", start.day().to_string()),
        ("rmonth", start.month().to_string()),
        ("ryear", start.year().to_string()),
        ("__CALLBACKID", "__Page".to_string()),
        ("__CALLBACKPARAM", build_callback_param(window, filters)),
    ]);

    form
}

/// Collect release identifiers from a callback HTML fragment
///
/// Union of `Getrelease(<id>` and `relid=<id>` references, deduplicated and
/// sorted numerically.
pub fn extract_release_ids(html: &str) -> Vec<String> {
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    static PARAM_RE: OnceLock<Regex> = OnceLock::new();

    let call_re =
        CALL_RE.get_or_init(|| Regex::new(r"Getrelease\((\d+)").expect("Invalid regex pattern"));
    let param_re =
        PARAM_RE.get_or_init(|| Regex::new(r"relid=(\d+)").expect("Invalid regex pattern"));

    let ids: BTreeSet<(usize, String)> = call_re
        .captures_iter(html)
        .chain(param_re.captures_iter(html))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.as_str().len(), m.as_str().to_string()))
        .collect();

    ids.into_iter().map(|(_, id)| id).collect()
}

/// Legacy archive search through the ASP.NET client callback
pub struct CallbackDiscovery {
    client: Arc<PortalClient>,
}

impl CallbackDiscovery {
    pub fn new(client: Arc<PortalClient>) -> Self {
        Self { client }
    }

    /// One harvest-then-search round trip
    async fn search_once(
        &self,
        window: &CrawlWindow,
        filters: &SearchFilters,
    ) -> Result<Vec<String>, DiscoveryError> {
        let search_url = self.client.legacy_search_url()?;
        let origin = self.client.legacy_origin()?;

        let state = SessionHarvester::new(&self.client).acquire(&search_url).await?;
        let form = build_callback_form(&state, window, filters);

        self.client.throttle().await;

        let headers = build_callback_headers(random_user_agent(), search_url.as_str(), &origin);
        let response = self
            .client
            .http()
            .post(search_url.clone())
            .headers(headers)
            .form(&form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()).into());
        }

        let text = fetcher::decode_response(response).await?;
        let envelope = CallbackEnvelope::decode(&text)?;

        Ok(extract_release_ids(&envelope.payload))
    }
}

#[async_trait]
impl Discovery for CallbackDiscovery {
    fn portal(&self) -> PortalGeneration {
        PortalGeneration::Legacy
    }

    async fn preflight(&self) -> Result<(), DiscoveryError> {
        let search_url = self.client.legacy_search_url()?;
        let state = SessionHarvester::new(&self.client).acquire(&search_url).await?;
        if state.view_state.is_empty() {
            tracing::warn!(url = %search_url, "Search page carried no view state");
        }
        Ok(())
    }

    async fn discover(
        &self,
        window: &CrawlWindow,
        filters: &SearchFilters,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let label = format!("callback:{}", window.start);

        let ids = with_retry(self.client.retry_policy(), &label, |attempt| {
            tracing::debug!(from = %window.start, to = %window.end, attempt, "Callback search");
            self.search_once(window, filters)
        })
        .await
        .map_err(flatten_failure)?;

        tracing::info!(
            from = %window.start,
            to = %window.end,
            count = ids.len(),
            "Callback search complete"
        );

        Ok(ids.into_iter().map(DocumentId::legacy).collect())
    }
}

// ============================================================================
// Listing strategy (modern portal)
// ============================================================================

struct ListingSelectors {
    groups: Selector,
    links: Selector,
    content_area: Selector,
    any_link: Selector,
}

fn listing_selectors() -> &'static ListingSelectors {
    static SELECTORS: OnceLock<ListingSelectors> = OnceLock::new();

    SELECTORS.get_or_init(|| ListingSelectors {
        groups: Selector::parse("ul.release_list").expect("Invalid selector"),
        links: Selector::parse("a").expect("Invalid selector"),
        content_area: Selector::parse("div.content-area").expect("Invalid selector"),
        any_link: Selector::parse("a[href]").expect("Invalid selector"),
    })
}

fn child_elements<'a>(
    parent: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

/// Collect identifiers from a date listing page in first-seen order
///
/// Entries of `ul.release_list` groups prefer their "English" link and fall
/// back to the title link. Without any group, every detail-page link in the
/// content area (or the whole page) counts.
pub fn extract_listing_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let sel = listing_selectors();
    let mut result = DiscoveryResult::new();

    let groups: Vec<ElementRef> = document.select(&sel.groups).collect();

    if !groups.is_empty() {
        for group in groups {
            for entry in child_elements(group, "li") {
                let english = entry.select(&sel.links).find(|a| {
                    a.text()
                        .collect::<String>()
                        .trim()
                        .eq_ignore_ascii_case("english")
                });

                let link = english.or_else(|| {
                    child_elements(entry, "a").find(|a| a.value().attr("href").is_some())
                });

                if let Some(prid) = link
                    .and_then(|a| a.value().attr("href"))
                    .and_then(prid_from_href)
                {
                    result.push(DocumentId::modern(prid));
                }
            }
        }
    } else {
        let root = document
            .select(&sel.content_area)
            .next()
            .unwrap_or_else(|| document.root_element());

        for href in root
            .select(&sel.any_link)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| {
                href.contains("PressReleasePage.aspx") || href.contains("PressReleseDetail.aspx")
            })
        {
            if let Some(prid) = prid_from_href(href) {
                result.push(DocumentId::modern(prid));
            }
        }
    }

    result.into_ids().into_iter().map(|id| id.value).collect()
}

/// Modern portal discovery over the per-day listing page
pub struct ListingDiscovery {
    client: Arc<PortalClient>,
}

impl ListingDiscovery {
    pub fn new(client: Arc<PortalClient>) -> Self {
        Self { client }
    }

    async fn list_day(&self, date: NaiveDate) -> Result<Vec<String>, DiscoveryError> {
        let url = self.client.listing_url(date)?;
        let label = format!("listing:{date}");
        let referer = self.client.portal().modern_base_url.clone();

        let html = with_retry(self.client.retry_policy(), &label, |_| {
            let headers = build_browser_headers(random_user_agent(), Some(&referer));
            let url = url.clone();
            async move { self.client.get_text(&url, headers).await }
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

        Ok(extract_listing_ids(&html))
    }
}

#[async_trait]
impl Discovery for ListingDiscovery {
    fn portal(&self) -> PortalGeneration {
        PortalGeneration::Modern
    }

    async fn discover(
        &self,
        window: &CrawlWindow,
        filters: &SearchFilters,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        if !filters.query.is_empty() || filters.ministry != 0 {
            tracing::debug!(
                query = %filters.query,
                ministry = filters.ministry,
                "Listing pages do not support search filters; ignoring"
            );
        }

        let mut result = DiscoveryResult::new();
        for date in window.days() {
            let ids = self.list_day(date).await?;
            tracing::info!(date = %date, count = ids.len(), "Listing scan complete");
            for id in ids {
                result.push(DocumentId::modern(id));
            }
        }

        Ok(result)
    }
}

/// Discovery strategy for a portal generation
pub fn discovery_for(portal: PortalGeneration, client: Arc<PortalClient>) -> Arc<dyn Discovery> {
    match portal {
        PortalGeneration::Legacy => Arc::new(CallbackDiscovery::new(client)),
        PortalGeneration::Modern => Arc::new(ListingDiscovery::new(client)),
    }
}
