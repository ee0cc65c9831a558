//! Dispatcher integration tests against a local JSON test server.
//!
//! Covers the all-or-nothing result contract: every success is returned,
//! any single failure discards the batch, and cancellation stops the run
//! without issuing further requests.

mod common;

use common::json_server::{self, JsonServerOptions};
use muxd_core::crawler::{CrawlError, Crawler, CrawlerConfig, FetchError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn crawler(max_connections: usize, timeout_ms: u64) -> Crawler {
    Crawler::new(CrawlerConfig {
        max_connections,
        request_timeout: Duration::from_millis(timeout_ms),
    })
    .expect("build crawler")
}

#[tokio::test]
async fn empty_url_list_returns_empty() {
    let crawler = crawler(4, 1000);
    let results = crawler.crawl(&CancellationToken::new(), &[]).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn all_successes_return_every_result() {
    let server = json_server::start_with_options(JsonServerOptions {
        body: "{\n  \"name\": \"debian\",\n  \"stable\": true\n}".to_string(),
        ..Default::default()
    });
    let urls: Vec<String> = (0..5).map(|i| format!("{}item/{}", server.url, i)).collect();

    let crawler = crawler(4, 5000);
    let results = crawler.crawl(&CancellationToken::new(), &urls).await.unwrap();

    assert_eq!(results.len(), 5);
    for result in &results {
        assert_eq!(result.status_code, 200);
        assert_eq!(result.body.get(), r#"{"name":"debian","stable":true}"#);
        assert!(result.source_url.starts_with(&server.url));
    }
}

#[tokio::test]
async fn worker_pool_never_exceeds_cap() {
    let server = json_server::start_with_options(JsonServerOptions {
        delay: Duration::from_millis(150),
        ..Default::default()
    });
    let urls: Vec<String> = (0..5).map(|i| format!("{}slow/{}", server.url, i)).collect();

    let crawler = crawler(2, 5000);
    let results = crawler.crawl(&CancellationToken::new(), &urls).await.unwrap();

    assert_eq!(results.len(), 5);
    assert!(
        server.max_in_flight() <= 2,
        "saw {} concurrent requests with cap 2",
        server.max_in_flight()
    );
}

#[tokio::test]
async fn first_error_discards_the_batch() {
    let ok = json_server::start_with_options(JsonServerOptions {
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let bad = json_server::start_with_options(JsonServerOptions {
        body: "<html>not json</html>".to_string(),
        ..Default::default()
    });
    let urls = vec![
        format!("{}a", ok.url),
        format!("{}b", ok.url),
        format!("{}broken", bad.url),
        format!("{}c", ok.url),
    ];

    let crawler = crawler(4, 5000);
    let err = crawler
        .crawl(&CancellationToken::new(), &urls)
        .await
        .unwrap_err();

    match err {
        CrawlError::Fetch { url, source } => {
            assert!(url.contains("broken"), "error must reference the bad URL, got {url}");
            assert!(matches!(source, FetchError::InvalidJson(_)), "got {source}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_success_status_fails_the_batch() {
    let server = json_server::start_with_options(JsonServerOptions {
        status: 404,
        body: r#"{"error":"missing"}"#.to_string(),
        ..Default::default()
    });
    let urls = vec![format!("{}gone", server.url)];

    let crawler = crawler(2, 5000);
    let err = crawler
        .crawl(&CancellationToken::new(), &urls)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            CrawlError::Fetch {
                source: FetchError::UnexpectedStatus(404),
                ..
            }
        ),
        "got {err}"
    );
}

#[tokio::test]
async fn malformed_url_fails_as_task_error() {
    let crawler = crawler(2, 1000);
    let urls = vec!["not a url at all".to_string()];

    let err = crawler
        .crawl(&CancellationToken::new(), &urls)
        .await
        .unwrap_err();

    match err {
        CrawlError::Fetch { url, source } => {
            assert_eq!(url, "not a url at all");
            assert!(matches!(source, FetchError::BuildRequest(_)), "got {source}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn timeout_fails_the_batch() {
    let server = json_server::start_with_options(JsonServerOptions {
        delay: Duration::from_secs(3),
        ..Default::default()
    });
    let urls = vec![format!("{}slow", server.url)];

    let crawler = crawler(2, 100);
    let err = crawler
        .crawl(&CancellationToken::new(), &urls)
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Fetch { .. }), "got {err}");
}

#[tokio::test]
async fn cancelled_before_start_returns_cancellation_error() {
    let crawler = crawler(2, 1000);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = crawler
        .crawl(&cancel, &["http://127.0.0.1:9/".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Cancelled));
}

#[tokio::test]
async fn cancelling_mid_flight_aborts_the_run() {
    let server = json_server::start_with_options(JsonServerOptions {
        delay: Duration::from_secs(5),
        ..Default::default()
    });
    let urls: Vec<String> = (0..3).map(|i| format!("{}hang/{}", server.url, i)).collect();

    let crawler = crawler(2, 30_000);
    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        })
    };

    let start = Instant::now();
    let err = crawler.crawl(&cancel, &urls).await.unwrap_err();
    assert!(matches!(err, CrawlError::Cancelled), "got {err}");
    assert!(
        start.elapsed() < Duration::from_secs(4),
        "crawl must stop well before the server responds, took {:?}",
        start.elapsed()
    );
    canceller.await.unwrap();
    assert!(
        server.hits() <= 2,
        "no new requests after cancellation, saw {}",
        server.hits()
    );
}
