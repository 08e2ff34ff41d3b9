//! Live test against the real NCBI Entrez API
//!
//! Ignored by default; run with `cargo test --features live-tests` and a
//! network connection. Keep the item count tiny: this hits the production
//! endpoint.

#![cfg(feature = "live-tests")]
// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use pmc_corpus::{Config, EntrezSource, FetchCoordinator, WorkItem};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn fetches_one_known_open_access_article() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.api.email = "pmc-corpus-tests@example.org".to_string();
    config.fetch.worker_count = 1;
    config.storage.data_dir = dir.path().to_path_buf();

    let source = Arc::new(EntrezSource::new(&config.api).unwrap());
    let coordinator = FetchCoordinator::new(config.clone(), source).unwrap();

    // PMC13900 is one of the earliest open-access articles and is stable
    let summary = coordinator.run(&[WorkItem::new("PMC13900")]).await.unwrap();
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.succeeded, 1);

    let artifact = config.storage.xml_dir().join("PMC13900.xml");
    assert!(std::fs::metadata(&artifact).unwrap().len() > 1000);
}
