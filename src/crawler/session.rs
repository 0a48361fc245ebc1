//! ASP.NET hidden-field state harvesting
//!
//! The legacy archive only accepts a callback that echoes the `__VIEWSTATE`
//! family of hidden inputs from a fresh page load. Tokens rotate per load, so
//! every discovery request sequence harvests its own [`SessionState`].

use scraper::{Html, Selector};
use url::Url;

use crate::crawler::headers::{build_browser_headers, random_user_agent};
use crate::crawler::PortalClient;
use crate::utils::error::SessionError;

pub const VIEWSTATE: &str = "__VIEWSTATE";
pub const VIEWSTATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";

/// Tokens the legacy portal requires on the next request
///
/// Absent fields are empty strings, never errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

impl SessionState {
    /// Read the hidden inputs out of a page
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            view_state: hidden_field(&document, VIEWSTATE).unwrap_or_default(),
            view_state_generator: hidden_field(&document, VIEWSTATE_GENERATOR)
                .unwrap_or_default(),
            event_validation: hidden_field(&document, EVENT_VALIDATION).unwrap_or_default(),
        }
    }

    /// Some endpoints omit the validation token
    pub fn has_event_validation(&self) -> bool {
        !self.event_validation.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.view_state.is_empty()
            && self.view_state_generator.is_empty()
            && self.event_validation.is_empty()
    }
}

/// Find an input by `name`, falling back to `id`
fn hidden_field(document: &Html, field: &str) -> Option<String> {
    [
        format!(r#"input[name="{field}"]"#),
        format!(r#"input[id="{field}"]"#),
    ]
    .iter()
    .filter_map(|css| Selector::parse(css).ok())
    .find_map(|selector| {
        document
            .select(&selector)
            .next()
            .map(|input| input.value().attr("value").unwrap_or_default().to_string())
    })
}

/// Acquires fresh state tokens from a bootstrap page
pub struct SessionHarvester<'a> {
    client: &'a PortalClient,
}

impl<'a> SessionHarvester<'a> {
    pub fn new(client: &'a PortalClient) -> Self {
        Self { client }
    }

    /// Load `endpoint` and harvest its hidden state fields
    ///
    /// The GET also refreshes the session cookies held by the shared client.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on transport failure or a non-success status.
    /// The caller decides whether to retry.
    pub async fn acquire(&self, endpoint: &Url) -> Result<SessionState, SessionError> {
        self.client.throttle().await;

        let headers = build_browser_headers(random_user_agent(), None);
        let response = self
            .client
            .http()
            .get(endpoint.clone())
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status {
                status: status.as_u16(),
                url: endpoint.to_string(),
            });
        }

        let html = response.text().await?;
        let state = SessionState::from_html(&html);

        tracing::debug!(
            url = %endpoint,
            view_state_len = state.view_state.len(),
            has_generator = !state.view_state_generator.is_empty(),
            has_event_validation = state.has_event_validation(),
            "Harvested session state"
        );

        Ok(state)
    }
}
