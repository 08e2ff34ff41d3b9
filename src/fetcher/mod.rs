//! Concurrent, resumable, rate-limited article fetching
//!
//! The fetch pipeline is organized in three layers:
//!
//! - [`source`] - the [`ArticleSource`] seam to the remote API
//! - [`worker`] - per-article retry loop and artifact storage
//! - [`FetchCoordinator`] (this module) - dedup against the checkpoint and
//!   disk, the worker pool, outcome aggregation, and periodic checkpointing
//!
//! The coordinator is the only component that touches the progress record:
//! workers report outcomes over a channel and a single aggregation loop owns
//! all shared state, so no per-item bookkeeping needs a lock.

mod source;
mod worker;


pub use source::{ArticleSource, EntrezSource};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::{ProgressRecord, ProgressStore};
use crate::rate_limiter::RateLimiter;
use crate::types::{Event, FetchOutcome, FetchStatus, FetchSummary, WorkItem};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use worker::FetchWorker;

/// Capacity of the broadcast event channel; slow subscribers lose oldest events
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Orchestrates a fetch run end to end
///
/// Owns the run lifecycle: loads the progress checkpoint, reconciles it with
/// artifacts already on disk, dispatches the remaining work to a fixed pool
/// of workers sharing one rate limiter, aggregates their outcomes, and
/// checkpoints progress periodically and at the end of the run.
///
/// # Examples
///
/// ```no_run
/// use pmc_corpus::{Config, EntrezSource, FetchCoordinator, WorkItem};
/// use std::sync::Arc;
///
/// # async fn example() -> pmc_corpus::Result<()> {
/// let mut config = Config::default();
/// config.api.email = "researcher@example.org".to_string();
///
/// let source = Arc::new(EntrezSource::new(&config.api)?);
/// let coordinator = FetchCoordinator::new(config, source)?;
///
/// let items = vec![WorkItem::new("PMC1234567")];
/// let summary = coordinator.run(&items).await?;
/// println!("fetched {} articles", summary.succeeded);
/// # Ok(())
/// # }
/// ```
pub struct FetchCoordinator {
    config: Arc<Config>,
    source: Arc<dyn ArticleSource>,
    rate_limiter: RateLimiter,
    progress_store: ProgressStore,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FetchCoordinator {
    // The source is a trait object, so this cannot be derived
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("source", &self.source.name())
            .field("workers", &self.config.fetch.worker_count)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl FetchCoordinator {
    /// Create a coordinator, validating the configuration and storage layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is invalid or the
    /// artifact directory cannot be created or written to. These are the only
    /// fatal errors in the pipeline; everything after dispatch is recorded
    /// per item instead.
    pub fn new(config: Config, source: Arc<dyn ArticleSource>) -> Result<Self> {
        config.validate()?;

        let xml_dir = config.storage.xml_dir();
        std::fs::create_dir_all(&xml_dir)
            .and_then(|()| tempfile::NamedTempFile::new_in(&xml_dir).map(drop))
            .map_err(|e| Error::Config {
                message: format!("artifact directory {} is not writable: {e}", xml_dir.display()),
                key: Some("storage.data_dir".to_string()),
            })?;

        let rate_limiter = RateLimiter::new(config.api.max_requests_per_second);
        let progress_store = ProgressStore::new(config.storage.progress_path());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            source,
            rate_limiter,
            progress_store,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The token cancelled by [`shutdown`](Self::shutdown)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request an orderly shutdown: workers finish their in-flight item,
    /// no new items are dispatched, and a final checkpoint is written.
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.cancel.cancel();
    }

    fn emit_event(&self, event: Event) {
        // Nobody listening is fine
        self.event_tx.send(event).ok();
    }

    /// Identifiers of valid artifacts already in the artifact directory.
    ///
    /// Used at startup to repair the checkpoint after a crash: an artifact on
    /// disk is evidence of a completed download even if the checkpoint never
    /// recorded it.
    fn scan_existing_artifacts(&self) -> Vec<String> {
        let xml_dir = self.config.storage.xml_dir();
        let entries = match std::fs::read_dir(&xml_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %xml_dir.display(), error = %e, "Could not scan artifacts");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .metadata()
                    .is_ok_and(|m| m.is_file() && m.len() > self.config.fetch.min_artifact_bytes)
            })
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "xml") {
                    return None;
                }
                let stem = path.file_stem()?.to_string_lossy().into_owned();
                stem.starts_with("PMC").then_some(stem)
            })
            .collect()
    }

    /// Run the fetch pipeline over `items` to completion (or cancellation).
    ///
    /// Items already in the checkpoint's downloaded or failed sets, or backed
    /// by a valid artifact on disk, are not dispatched; re-running with the
    /// same input is idempotent. Every dispatched item produces exactly one
    /// outcome, and a checkpoint is written every `checkpoint_interval`
    /// outcomes and once at the end.
    ///
    /// # Errors
    ///
    /// Per-item failures are recorded in the summary and the failed set, not
    /// returned; this only fails on pre-dispatch storage errors.
    pub async fn run(&self, items: &[WorkItem]) -> Result<FetchSummary> {
        let mut record = self.progress_store.load();

        let reconciled = self.reconcile(&mut record);
        if reconciled > 0 {
            tracing::info!(reconciled, "Adopted on-disk artifacts missing from the checkpoint");
        }

        let mut seen = HashSet::new();
        let to_fetch: VecDeque<WorkItem> = items
            .iter()
            .filter(|item| !record.is_known(&item.pmcid) && seen.insert(item.pmcid.clone()))
            .cloned()
            .collect();

        tracing::info!(
            total = items.len(),
            to_fetch = to_fetch.len(),
            already_downloaded = record.downloaded.len(),
            previously_failed = record.failed.len(),
            workers = self.config.fetch.worker_count,
            "Starting fetch run"
        );
        self.emit_event(Event::RunStarted {
            total: items.len(),
            to_fetch: to_fetch.len(),
        });

        let mut summary = FetchSummary::default();
        if !to_fetch.is_empty() {
            summary = self.dispatch(to_fetch, &mut record).await;
        }

        summary.downloaded_total = record.downloaded.len();
        summary.failed_total = record.failed.len();

        // The final checkpoint must not lose a completed run's outcomes, but
        // a failed save at this point doesn't invalidate the fetched
        // artifacts either: log it and report the summary
        if let Err(e) = self.progress_store.save(&mut record) {
            tracing::warn!(error = %e, "Final progress checkpoint failed");
        } else {
            self.emit_event(Event::CheckpointSaved {
                downloaded: record.downloaded.len(),
                failed: record.failed.len(),
            });
        }

        tracing::info!(
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Fetch run complete"
        );
        self.emit_event(Event::RunCompleted {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Fold valid on-disk artifacts into the downloaded set; returns how many
    /// were missing from the checkpoint.
    fn reconcile(&self, record: &mut ProgressRecord) -> usize {
        let mut adopted = 0;
        for pmcid in self.scan_existing_artifacts() {
            if !record.downloaded.contains(&pmcid) {
                record.mark_downloaded(pmcid);
                adopted += 1;
            }
        }
        adopted
    }

    /// Drive the worker pool over the queue and aggregate outcomes
    async fn dispatch(&self, queue: VecDeque<WorkItem>, record: &mut ProgressRecord) -> FetchSummary {
        let queue = Arc::new(Mutex::new(queue));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<FetchOutcome>(
            self.config.fetch.worker_count.saturating_mul(2).max(16),
        );

        let worker = FetchWorker::new(
            Arc::clone(&self.source),
            self.rate_limiter.clone(),
            self.config.retry.clone(),
            self.config.fetch.clone(),
            self.config.storage.xml_dir(),
        );

        let mut handles = Vec::with_capacity(self.config.fetch.worker_count);
        for id in 0..self.config.fetch.worker_count {
            let worker = worker.clone();
            let queue = Arc::clone(&queue);
            let outcome_tx = outcome_tx.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        tracing::debug!(worker = id, "Worker stopping on cancellation");
                        break;
                    }
                    let item = {
                        // Sync mutex held only for the pop, never across await
                        let mut queue = match queue.lock() {
                            Ok(queue) => queue,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        queue.pop_front()
                    };
                    let Some(item) = item else {
                        break;
                    };

                    let outcome = worker.fetch_article(&item).await;
                    if outcome_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(outcome_tx);

        let mut summary = FetchSummary::default();
        let mut since_checkpoint = 0usize;

        while let Some(outcome) = outcome_rx.recv().await {
            summary.dispatched += 1;
            match outcome.status {
                FetchStatus::Success => {
                    summary.succeeded += 1;
                    record.mark_downloaded(outcome.pmcid.clone());
                    self.emit_event(Event::ArticleFetched {
                        pmcid: outcome.pmcid,
                    });
                }
                FetchStatus::SkippedExisting => {
                    summary.skipped += 1;
                    record.mark_downloaded(outcome.pmcid.clone());
                    self.emit_event(Event::ArticleSkipped {
                        pmcid: outcome.pmcid,
                    });
                }
                FetchStatus::Failed => {
                    summary.failed += 1;
                    let detail = outcome.detail.unwrap_or_default();
                    tracing::warn!(pmcid = %outcome.pmcid, detail = %detail, "Article failed");
                    record.mark_failed(outcome.pmcid.clone());
                    self.emit_event(Event::ArticleFailed {
                        pmcid: outcome.pmcid,
                        detail,
                    });
                }
            }

            since_checkpoint += 1;
            if since_checkpoint >= self.config.fetch.checkpoint_interval {
                since_checkpoint = 0;
                match self.progress_store.save(record) {
                    Ok(()) => self.emit_event(Event::CheckpointSaved {
                        downloaded: record.downloaded.len(),
                        failed: record.failed.len(),
                    }),
                    // The next checkpoint or the final save will retry
                    Err(e) => tracing::warn!(error = %e, "Periodic checkpoint failed"),
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }

        summary
    }
}
