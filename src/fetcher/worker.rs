//! Per-article fetch execution
//!
//! A [`FetchWorker`] turns one work item into exactly one [`FetchOutcome`].
//! All per-item error handling lives here: validity checks on the response
//! body, the retry loop with backoff for transient failures, and atomic
//! artifact storage. Errors never escape this boundary; they become the
//! `detail` string of a `Failed` outcome.

use crate::config::{FetchConfig, RetryConfig};
use crate::error::{FetchError, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::{Backoff, IsRetryable};
use crate::types::{FetchOutcome, WorkItem};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::source::ArticleSource;

/// How much of the response head is scanned for API error markers
const ERROR_MARKER_WINDOW: usize = 512;

/// Executes fetch attempts for individual work items
///
/// Cheap to clone; every member of the worker pool holds one. The rate
/// limiter clone shares its state across the pool, so the request ceiling is
/// global.
#[derive(Clone)]
pub(super) struct FetchWorker {
    source: Arc<dyn ArticleSource>,
    rate_limiter: RateLimiter,
    retry: RetryConfig,
    fetch: FetchConfig,
    xml_dir: PathBuf,
}

impl FetchWorker {
    pub(super) fn new(
        source: Arc<dyn ArticleSource>,
        rate_limiter: RateLimiter,
        retry: RetryConfig,
        fetch: FetchConfig,
        xml_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            rate_limiter,
            retry,
            fetch,
            xml_dir,
        }
    }

    fn artifact_path(&self, item: &WorkItem) -> PathBuf {
        self.xml_dir.join(item.artifact_filename())
    }

    /// Whether a valid artifact for this item already exists on disk
    fn artifact_is_valid(&self, path: &Path) -> bool {
        std::fs::metadata(path).is_ok_and(|m| m.len() > self.fetch.min_artifact_bytes)
    }

    /// Process one work item to its terminal outcome.
    ///
    /// Skips without a remote call when a valid artifact already exists.
    /// Otherwise attempts the fetch up to `max_attempts` times total, waiting
    /// on the shared rate limiter before every attempt and backing off between
    /// attempts on transient failures. Permanent failures short-circuit.
    pub(super) async fn fetch_article(&self, item: &WorkItem) -> FetchOutcome {
        let path = self.artifact_path(item);
        if self.artifact_is_valid(&path) {
            tracing::debug!(pmcid = %item.pmcid, "Valid artifact exists, skipping fetch");
            return FetchOutcome::skipped(&item.pmcid);
        }

        let mut backoff = Backoff::new(&self.retry);
        let mut saw_empty_response = false;

        for attempt in 1..=self.retry.max_attempts {
            self.rate_limiter.wait().await;

            let body = match self.source.fetch_raw(&item.pmc_num).await {
                Ok(body) => body,
                Err(e) if e.is_retryable() => {
                    tracing::debug!(
                        pmcid = %item.pmcid,
                        attempt,
                        error = %e,
                        "Transient fetch failure"
                    );
                    if attempt < self.retry.max_attempts {
                        backoff.sleep().await;
                        continue;
                    }
                    let detail = FetchError::RetriesExhausted {
                        pmcid: item.pmcid.clone(),
                    };
                    return FetchOutcome::failed(&item.pmcid, detail.to_string());
                }
                Err(e) => {
                    tracing::debug!(pmcid = %item.pmcid, error = %e, "Permanent fetch failure");
                    return FetchOutcome::failed(&item.pmcid, e.to_string());
                }
            };

            // Implausibly short bodies are treated as transient hiccups
            if body.len() < self.fetch.min_response_bytes {
                saw_empty_response = true;
                tracing::debug!(
                    pmcid = %item.pmcid,
                    attempt,
                    bytes = body.len(),
                    "Response body too short"
                );
                if attempt < self.retry.max_attempts {
                    backoff.sleep().await;
                }
                continue;
            }

            // The API answers "no such article" with a 200 and an error
            // document; that failure is permanent
            if has_error_marker(&body) {
                let detail = FetchError::NotAvailable {
                    pmcid: item.pmcid.clone(),
                };
                tracing::debug!(pmcid = %item.pmcid, "API reported article unavailable");
                return FetchOutcome::failed(&item.pmcid, detail.to_string());
            }

            return match store_artifact(&path, &body) {
                Ok(()) => {
                    tracing::debug!(pmcid = %item.pmcid, bytes = body.len(), "Artifact stored");
                    FetchOutcome::success(&item.pmcid)
                }
                Err(e) => {
                    let detail = FetchError::ArtifactWrite {
                        pmcid: item.pmcid.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(pmcid = %item.pmcid, error = %e, "Artifact write failed");
                    FetchOutcome::failed(&item.pmcid, detail.to_string())
                }
            };
        }

        let detail = if saw_empty_response {
            FetchError::EmptyResponse {
                pmcid: item.pmcid.clone(),
            }
            .to_string()
        } else {
            FetchError::RetriesExhausted {
                pmcid: item.pmcid.clone(),
            }
            .to_string()
        };
        FetchOutcome::failed(&item.pmcid, detail)
    }
}

/// Whether the response head carries an Entrez error marker
fn has_error_marker(body: &[u8]) -> bool {
    let window = &body[..body.len().min(ERROR_MARKER_WINDOW)];
    let head = String::from_utf8_lossy(window).to_lowercase();
    head.contains("<error>") || head.contains("id not found")
}

/// Write the artifact atomically: temp file in the same directory, flush,
/// fsync, rename. A crash mid-write never leaves a partial artifact that a
/// later run would mistake for a complete one.
fn store_artifact(path: &Path, body: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| crate::error::Error::Io(e.error))?;
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_marker_is_detected_case_insensitively() {
        assert!(has_error_marker(b"<ERROR>cannot process</ERROR>"));
        assert!(has_error_marker(b"<eFetchResult>ID not found</eFetchResult>"));
        assert!(!has_error_marker(b"<article><front/></article>"));
    }

    #[test]
    fn error_marker_only_scans_the_head() {
        let mut body = vec![b'x'; ERROR_MARKER_WINDOW];
        body.extend_from_slice(b"<error>late</error>");
        assert!(!has_error_marker(&body));
    }

    #[test]
    fn store_artifact_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PMC1.xml");

        store_artifact(&path, b"<article>one</article>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<article>one</article>");

        // Overwrite replaces the whole artifact
        store_artifact(&path, b"<article>two</article>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<article>two</article>");

        // No temp files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
