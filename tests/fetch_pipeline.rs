//! End-to-end fetch pipeline tests against a mock Entrez endpoint

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use pmc_corpus::{Config, EntrezSource, FetchCoordinator, ProgressStore, WorkItem};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EFETCH_PATH: &str = "/entrez/eutils/efetch.fcgi";

fn article_body(pmc_num: &str) -> String {
    format!(
        "<pmc-articleset><article><front><article-meta>\
         <article-id pub-id-type=\"pmc\">{pmc_num}</article-id>\
         <title-group><article-title>Sample article {pmc_num}</article-title></title-group>\
         </article-meta></front><body><sec><title>Introduction</title><p>{}</p></sec></body>\
         </article></pmc-articleset>",
        "Fermentation results and discussion text. ".repeat(10)
    )
}

fn test_config(server: &MockServer, data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.api.email = "tests@example.org".to_string();
    config.api.base_url = format!("{}{EFETCH_PATH}", server.uri());
    config.api.max_requests_per_second = 0.0;
    config.fetch.worker_count = 2;
    config.storage.data_dir = data_dir.to_path_buf();
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.retry.jitter = false;
    config
}

fn coordinator(config: &Config) -> FetchCoordinator {
    let source = Arc::new(EntrezSource::new(&config.api).unwrap());
    FetchCoordinator::new(config.clone(), source).unwrap()
}

#[tokio::test]
async fn fetches_articles_end_to_end() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let config = test_config(&server, dir.path());

    for num in ["11", "12"] {
        Mock::given(method("GET"))
            .and(path(EFETCH_PATH))
            .and(query_param("id", num))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_body(num)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let items = vec![WorkItem::new("PMC11"), WorkItem::new("PMC12")];
    let summary = coordinator(&config).run(&items).await.unwrap();

    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);

    let stored = std::fs::read_to_string(config.storage.xml_dir().join("PMC11.xml")).unwrap();
    assert!(stored.contains("Sample article 11"));

    let record = ProgressStore::new(config.storage.progress_path()).load();
    assert!(record.downloaded.contains("PMC11"));
    assert!(record.downloaded.contains("PMC12"));
}

#[tokio::test]
async fn sends_the_required_query_parameters() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.api.api_key = Some("secret-key".to_string());

    Mock::given(method("GET"))
        .and(path(EFETCH_PATH))
        .and(query_param("db", "pmc"))
        .and(query_param("id", "42"))
        .and(query_param("rettype", "xml"))
        .and(query_param("retmode", "xml"))
        .and(query_param("email", "tests@example.org"))
        .and(query_param("tool", "pmc-corpus"))
        .and(query_param("api_key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body("42")))
        .expect(1)
        .mount(&server)
        .await;

    let summary = coordinator(&config)
        .run(&[WorkItem::new("PMC42")])
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn recovers_from_transient_server_errors() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let config = test_config(&server, dir.path());

    // Two failures, then success: mounted first so it matches first
    Mock::given(method("GET"))
        .and(path(EFETCH_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EFETCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body("7")))
        .expect(1)
        .mount(&server)
        .await;

    let summary = coordinator(&config)
        .run(&[WorkItem::new("PMC7")])
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(config.storage.xml_dir().join("PMC7.xml").exists());
}

#[tokio::test]
async fn persistent_server_errors_exhaust_the_retry_budget() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let config = test_config(&server, dir.path());

    Mock::given(method("GET"))
        .and(path(EFETCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let summary = coordinator(&config)
        .run(&[WorkItem::new("PMC7")])
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);

    let record = ProgressStore::new(config.storage.progress_path()).load();
    assert!(record.failed.contains("PMC7"));
}

#[tokio::test]
async fn interrupted_run_resumes_without_refetching() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let config = test_config(&server, dir.path());

    Mock::given(method("GET"))
        .and(path(EFETCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body("1")))
        // Across both runs, each article is fetched exactly once
        .expect(3)
        .mount(&server)
        .await;

    let first = coordinator(&config)
        .run(&[WorkItem::new("PMC1"), WorkItem::new("PMC2")])
        .await
        .unwrap();
    assert_eq!(first.succeeded, 2);

    let second = coordinator(&config)
        .run(&[
            WorkItem::new("PMC1"),
            WorkItem::new("PMC2"),
            WorkItem::new("PMC3"),
        ])
        .await
        .unwrap();
    assert_eq!(second.dispatched, 1);
    assert_eq!(second.downloaded_total, 3);
}
