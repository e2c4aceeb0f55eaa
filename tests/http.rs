//! End-to-end tests against a mock HTTP server

mod common;

use common::*;
use httpmock::prelude::*;
use std::time::Duration;
use zipstream::{
    Error, ExtractionResult, Fetch, FetchConfig, FetchError, HttpFetcher, ZipExtractor,
    list_entries,
};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(FetchConfig::default()).unwrap()
}

#[tokio::test]
async fn test_list_remote_archive() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/archive.zip");
            then.status(200)
                .header("content-type", "application/zip")
                .body(sample_archive());
        })
        .await;

    let extractor = ZipExtractor::new(fetcher());
    let listing = extractor.list(&server.url("/archive.zip")).await.unwrap();

    mock.assert_async().await;
    let paths: Vec<_> = listing.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["readme.txt", "docs/", "docs/spec.md"]);
}

#[tokio::test]
async fn test_extract_remote_entry() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/archive.zip");
            then.status(200).body(sample_archive());
        })
        .await;

    let extractor = ZipExtractor::new(fetcher());
    let url = server.url("/archive.zip");

    let mut sink = RecordingSink::default();
    let result = extractor
        .extract(&url, "docs/spec.md", &mut sink)
        .await
        .unwrap();
    assert_eq!(result, ExtractionResult::Found { bytes: 30 });
    assert_eq!(sink.data, SPEC_MD);

    let mut sink = RecordingSink::default();
    let result = extractor
        .extract(&url, "missing.txt", &mut sink)
        .await
        .unwrap();
    assert_eq!(result, ExtractionResult::NotFound);
    assert!(sink.data.is_empty());
}

#[tokio::test]
async fn test_source_reports_content_length() {
    let archive = sample_archive();
    let len = archive.len() as u64;

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/archive.zip");
            then.status(200).body(archive);
        })
        .await;

    let source = fetcher().open(&server.url("/archive.zip")).await.unwrap();
    assert_eq!(source.content_length(), Some(len));
    assert_eq!(source.origin(), server.url("/archive.zip"));

    let listing = list_entries(source).await.unwrap();
    assert_eq!(listing.len(), 3);
}

#[tokio::test]
async fn test_non_success_status_is_surfaced() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gone.zip");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/broken.zip");
            then.status(503);
        })
        .await;

    let extractor = ZipExtractor::new(fetcher());

    let err = extractor.list(&server.url("/gone.zip")).await.unwrap_err();
    assert_eq!(err.status(), Some(404));

    let mut sink = RecordingSink::default();
    let err = extractor
        .extract(&server.url("/broken.zip"), "readme.txt", &mut sink)
        .await
        .unwrap_err();
    match err {
        Error::Fetch(FetchError::Status { status, url }) => {
            assert_eq!(status, 503);
            assert_eq!(url, server.url("/broken.zip"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(sink.data.is_empty());
}

#[tokio::test]
async fn test_redirects_follow_config() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/latest.zip");
            then.status(302).header("location", server.url("/v1.zip"));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1.zip");
            then.status(200).body(sample_archive());
        })
        .await;

    let following = ZipExtractor::new(fetcher());
    let listing = following.list(&server.url("/latest.zip")).await.unwrap();
    assert_eq!(listing.len(), 3);

    let strict = ZipExtractor::new(
        HttpFetcher::new(FetchConfig {
            max_redirects: 0,
            ..FetchConfig::default()
        })
        .unwrap(),
    );
    let err = strict.list(&server.url("/latest.zip")).await.unwrap_err();
    assert_eq!(err.status(), Some(302));
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow.zip");
            then.status(200)
                .delay(Duration::from_secs(2))
                .body(sample_archive());
        })
        .await;

    let fetcher = HttpFetcher::new(FetchConfig {
        timeout: Some(Duration::from_millis(200)),
        ..FetchConfig::default()
    })
    .unwrap();

    let err = fetcher.open(&server.url("/slow.zip")).await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_connection_failure() {
    let fetcher = HttpFetcher::new(FetchConfig {
        connect_timeout: Duration::from_secs(2),
        ..FetchConfig::default()
    })
    .unwrap();

    let err = fetcher
        .open("http://127.0.0.1:1/archive.zip")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
}
