//! Error types for the press release crawler
//!
//! This module defines the per-concern error types used throughout the crawl
//! engine. The unified [`crate::error::Error`] wraps all of them.

use thiserror::Error;

/// Errors raised while harvesting the hidden ASP.NET state fields
#[derive(Error, Debug)]
pub enum SessionError {
    /// Transport-level failure talking to the bootstrap page
    #[error("Session bootstrap request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Bootstrap page answered with a non-success status
    #[error("Session bootstrap returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// Endpoint could not be joined onto the configured base URL
    #[error("Invalid session endpoint: {0}")]
    InvalidUrl(String),
}

/// Errors raised while decoding a callback response envelope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Response did not follow `<marker>|[<marker>|]<payload>|`
    #[error("Malformed callback envelope: {reason}")]
    Malformed { reason: String },

    /// Server signalled a callback error (`e` prefix)
    #[error("Callback reported a server-side error: {0}")]
    ServerError(String),
}

impl EnvelopeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors raised by a discovery strategy
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Session tokens could not be acquired before the search
    #[error("Session acquisition failed: {0}")]
    Session(#[from] SessionError),

    /// Search or listing request failed after retries
    #[error("Discovery request failed: {0}")]
    Fetch(#[from] FetchError),

    /// Callback response could not be decoded
    #[error("Discovery response unparseable: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Date or filter values the portal cannot represent
    #[error("Invalid discovery request: {0}")]
    InvalidRequest(String),
}

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a blocking status (429 or 403)
    #[error("Rate limited with status {0}")]
    RateLimited(u16),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Non-retryable client error (404 and friends)
    #[error("Client error: {0}")]
    ClientError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Retry budget spent without a successful response
    #[error("Gave up on {target} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        last_error: String,
    },

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 403 => Self::RateLimited(status),
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError(status),
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::RateLimited(_) | Self::ServerError(_) | Self::Timeout => true,
            Self::ClientError(_)
            | Self::RetriesExhausted { .. }
            | Self::Decode(_)
            | Self::InvalidUrl(_) => false,
        }
    }

    /// Whether the server explicitly asked us to slow down
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Errors that can occur while extracting a release page
///
/// These never abort a crawl: the extractor degrades to a partial record and
/// callers that need a usable release check it explicitly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Document had none of the expected release structure
    #[error("Release {prid} has no title or body")]
    EmptyDocument { prid: String },
}
