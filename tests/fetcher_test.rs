//! Integration tests for DetailFetcher using wiremock
//!
//! These tests validate retry, backoff classification and decoding against
//! mock detail endpoints.

mod common;

use common::{mock_client, release_page};
use pib_crawler::crawler::fetcher::{DetailFetcher, DocumentFetcher};
use pib_crawler::error::{CrawlErrorTrait, ErrorCategory, FetchError};
use pib_crawler::models::DocumentId;
use pib_crawler::parser::{Extractor, ReleaseExtractor};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DETAIL_PATH: &str = "/PressReleasePage.aspx";

/// Test successful fetch and extraction
#[tokio::test]
async fn test_fetch_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .and(query_param("PRID", "2001234"))
        .and(header_exists("user-agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(release_page("Cabinet approves scheme", "The Union Cabinet met."))
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let raw = assert_ok!(fetcher.fetch(&DocumentId::modern("2001234")).await);

    let record = ReleaseExtractor::new().extract(&raw);
    assert_eq!(record.prid(), "2001234");
    assert_eq!(record.title, "Cabinet approves scheme");
    assert_eq!(record.text, "The Union Cabinet met.");
    assert_eq!(record.ministry.as_deref(), Some("Ministry of Finance"));
    assert_eq!(record.timestamp.as_deref(), Some("05 JAN 2024 3:55PM"));
    assert!(record.published_at.is_some());
}

/// Rate limiting twice, then success on the third attempt
#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(release_page("Ok", "Body")))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let raw = assert_ok!(fetcher.fetch(&DocumentId::modern("7")).await);
    assert!(raw.body.contains("Body"));
}

/// Rate limiting on every attempt surfaces a non-fatal per-item failure
#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let err = assert_err!(fetcher.fetch(&DocumentId::modern("7")).await);

    match &err {
        FetchError::RetriesExhausted {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(*attempts, 3);
            assert!(last_error.contains("429"));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert!(!err.is_recoverable());
    assert_eq!(err.category(), ErrorCategory::Network);
}

/// Test 404 does not retry
#[tokio::test]
async fn test_404_no_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1) // Should only be called once (no retry)
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let err = assert_err!(fetcher.fetch(&DocumentId::modern("404")).await);
    assert!(matches!(err, FetchError::ClientError(404)));
}

/// Server errors are transient and retried
#[tokio::test]
async fn test_server_error_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    assert_ok!(fetcher.fetch(&DocumentId::modern("1")).await);
}

/// Legacy identifiers go to the print endpoint with `relid`
#[tokio::test]
async fn test_legacy_detail_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/newsite/PrintRelease.aspx"))
        .and(query_param("relid", "77"))
        .respond_with(ResponseTemplate::new(200).set_body_string(release_page("Archive", "Old")))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let raw = assert_ok!(fetcher.fetch(&DocumentId::legacy("77")).await);
    assert_eq!(raw.id, DocumentId::legacy("77"));
}

/// Bodies declared as windows-1252 are transcoded
#[tokio::test]
async fn test_windows_1252_decoding() {
    let server = MockServer::start().await;

    // "Caf\xe9" in windows-1252
    let body: Vec<u8> = b"<html><body><h2 id=\"Titleh2\">Caf\xe9</h2></body></html>".to_vec();

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/html; charset=windows-1252"),
        )
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let raw = assert_ok!(fetcher.fetch(&DocumentId::modern("9")).await);
    let record = ReleaseExtractor::new().extract(&raw);
    assert_eq!(record.title, "Café");
}

/// A page without release structure is rejected by the checked extractor
#[tokio::test]
async fn test_empty_page_rejected_by_checked_extraction() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let fetcher = DetailFetcher::new(mock_client(&server));
    let raw = assert_ok!(fetcher.fetch(&DocumentId::modern("10")).await);
    assert_err!(ReleaseExtractor::new().extract_checked(&raw));
}
