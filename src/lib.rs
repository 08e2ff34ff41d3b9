//! # pmc-corpus
//!
//! A resumable, rate-limited bulk-fetch pipeline for building a
//! model-training text corpus from PubMed Central open-access articles.
//!
//! The pipeline has three stages, each usable on its own:
//!
//! 1. **Catalog** ([`catalog`]) - filter the PMC open-access file list down
//!    to the articles whose citation matches the configured topic keywords.
//! 2. **Fetch** ([`fetcher`]) - download each article's XML through the NCBI
//!    Entrez API with a fixed worker pool behind one global rate limiter.
//!    Progress is checkpointed so an interrupted run resumes where it left
//!    off, and artifacts already on disk are never fetched twice.
//! 3. **Extract** ([`extract`], [`corpus`]) - convert the fetched JATS XML
//!    into clean training text and write the JSONL/TXT corpus files.
//!
//! # Quick start
//!
//! ```no_run
//! use pmc_corpus::{CatalogFilter, Config, EntrezSource, Extractor, FetchCoordinator};
//! use std::sync::Arc;
//!
//! # async fn example() -> pmc_corpus::Result<()> {
//! let mut config = Config::default();
//! config.api.email = "researcher@example.org".to_string();
//!
//! // 1. Select articles from the open-access file list
//! let filter = CatalogFilter::new(&config.catalog);
//! let entries = filter.filter_file_list("data/oa_file_list.csv".as_ref())?;
//! let items: Vec<_> = entries.iter().map(|e| e.work_item()).collect();
//!
//! // 2. Fetch them (resumable; Ctrl-C checkpoints and stops cleanly)
//! let source = Arc::new(EntrezSource::new(&config.api)?);
//! let coordinator = FetchCoordinator::new(config.clone(), source)?;
//! let summary = pmc_corpus::run_with_shutdown(&coordinator, &items).await?;
//! println!("fetched {}, failed {}", summary.succeeded, summary.failed);
//!
//! // 3. Build the training corpus from the fetched artifacts
//! let extractor = Extractor::new(config.extract.clone());
//! let stats = pmc_corpus::build_corpus(
//!     &extractor,
//!     &config.storage.xml_dir(),
//!     &config.storage.processed_dir(),
//! )?;
//! println!("~{} training tokens", stats.estimated_tokens);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod catalog;
pub mod config;
pub mod corpus;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod progress;
pub mod rate_limiter;
pub mod retry;
pub mod types;

pub use catalog::{CatalogEntry, CatalogFilter};
pub use config::Config;
pub use corpus::{CorpusStats, CorpusWriter, build_corpus};
pub use error::{CatalogError, Error, ExtractError, FetchError, Result};
pub use extract::{ArticleText, Extractor, Section};
pub use fetcher::{ArticleSource, EntrezSource, FetchCoordinator};
pub use progress::{ProgressRecord, ProgressStore};
pub use rate_limiter::RateLimiter;
pub use retry::IsRetryable;
pub use types::{Event, FetchOutcome, FetchStatus, FetchSummary, WorkItem};

/// Run a fetch to completion, checkpointing and stopping cleanly on SIGTERM
/// or Ctrl-C.
///
/// On the first signal the coordinator's cancellation token is triggered:
/// workers finish their in-flight article, the final checkpoint is written,
/// and the partial summary is returned. A second signal is not handled
/// specially; the process exits whenever the runtime tears down.
///
/// # Errors
///
/// Same failure modes as [`FetchCoordinator::run`].
pub async fn run_with_shutdown(
    coordinator: &FetchCoordinator,
    items: &[WorkItem],
) -> Result<FetchSummary> {
    let run = coordinator.run(items);
    tokio::pin!(run);

    tokio::select! {
        summary = &mut run => return summary,
        _ = wait_for_signal() => {
            coordinator.shutdown();
        }
    }
    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());
    match (sigterm, sigint) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (term, int) => {
            if let Err(e) = term {
                tracing::error!(error = %e, "Could not install SIGTERM handler");
            }
            if let Err(e) = int {
                tracing::error!(error = %e, "Could not install SIGINT handler");
            }
            // Without handlers the run proceeds uninterruptible
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl-C");
}
