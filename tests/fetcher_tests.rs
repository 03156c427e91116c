//! Fetcher behaviour against a mock server
//!
//! Covers outcome classification, retry counts, 429 widening, the request
//! interval and size-capped downloads.

use archivist::config::FetchConfig;
use archivist::crawler::{DownloadOutcome, FetchOutcome, RateLimitedFetcher};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetch_config(delay_ms: u64, max_retries: u32) -> FetchConfig {
    FetchConfig {
        request_delay_ms: delay_ms,
        max_retries,
        retry_jitter_ms: 0,
        rate_limit_ceiling_ms: delay_ms.max(1) * 3,
        timeout_secs: 5,
        ..FetchConfig::default()
    }
}

fn fetcher(delay_ms: u64, max_retries: u32) -> RateLimitedFetcher {
    RateLimitedFetcher::new(&fetch_config(delay_ms, max_retries))
        .expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_not_found_is_never_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 3);
    let outcome = fetcher.fetch(&format!("{}/gone/", mock_server.uri())).await;

    assert_eq!(outcome, FetchOutcome::NotFound);
    assert_eq!(fetcher.request_count(), 1);
}

#[tokio::test]
async fn test_server_error_retried_until_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 3);
    let outcome = fetcher.fetch(&format!("{}/flaky/", mock_server.uri())).await;

    assert_eq!(outcome, FetchOutcome::Success("ok".to_string()));
    assert_eq!(fetcher.request_count(), 2);
}

#[tokio::test]
async fn test_rate_limited_widens_interval_up_to_ceiling() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    // 100ms base, 300ms ceiling: 200ms, then capped at 300ms
    let fetcher = fetcher(100, 3);
    let outcome = fetcher.fetch(&format!("{}/busy/", mock_server.uri())).await;

    assert_eq!(outcome, FetchOutcome::Failed("HTTP 429".to_string()));
    assert_eq!(fetcher.current_delay().await, Duration::from_millis(300));
}

#[tokio::test]
async fn test_consecutive_requests_respect_delay() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("page"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(200, 1);
    let start = Instant::now();
    for page in 0..3 {
        let url = format!("{}/page/{}/", mock_server.uri(), page);
        assert!(matches!(fetcher.fetch(&url).await, FetchOutcome::Success(_)));
    }

    assert!(start.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_download_refuses_oversized_content_length() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 5000]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("big.jpg");
    let outcome = fetcher(0, 3)
        .download(&format!("{}/big.jpg", mock_server.uri()), &dest, 1000)
        .await;

    assert_eq!(outcome, DownloadOutcome::TooLarge { size: 5000 });
    assert!(!dest.exists());
    assert!(!dir.path().join("big.jpg.part").exists());
}

#[tokio::test]
async fn test_download_saves_file_without_partial() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/small.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 100]))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("images").join("small.png");
    let outcome = fetcher(0, 1)
        .download(&format!("{}/small.png", mock_server.uri()), &dest, 1000)
        .await;

    assert_eq!(outcome, DownloadOutcome::Saved { bytes: 100 });
    assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 100]);
    assert!(!dir.path().join("images").join("small.png.part").exists());
}

#[tokio::test]
async fn test_download_not_found() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("missing.gif");
    let outcome = fetcher(0, 3)
        .download(&format!("{}/missing.gif", mock_server.uri()), &dest, 1000)
        .await;

    assert_eq!(outcome, DownloadOutcome::NotFound);
    assert!(!dest.exists());
}
