//! Durable fetch progress checkpointing
//!
//! The progress checkpoint is what makes runs resumable: it records which
//! article identifiers have been downloaded and which have failed, and is
//! reloaded at startup so completed work is never repeated. Saves use a
//! write-to-temp-then-rename discipline so a crash mid-write can never leave
//! the store worse than the previous successful save.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable record of completed and failed article identifiers
///
/// Invariant: `downloaded` and `failed` are disjoint. Use
/// [`mark_downloaded`](Self::mark_downloaded) and
/// [`mark_failed`](Self::mark_failed) rather than touching the sets directly
/// when recording outcomes.
///
/// The serialized form tolerates schema drift in both directions: unknown
/// fields are ignored on load, and missing fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressRecord {
    /// Identifiers with a verified local artifact
    pub downloaded: HashSet<String>,
    /// Identifiers that failed permanently in some prior run
    pub failed: HashSet<String>,
    /// When this record was last persisted
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// Record an identifier as downloaded.
    ///
    /// Removes it from the failed set if present, preserving disjointness -
    /// disk evidence of a successful download outranks an old failure.
    pub fn mark_downloaded(&mut self, pmcid: impl Into<String>) {
        let pmcid = pmcid.into();
        self.failed.remove(&pmcid);
        self.downloaded.insert(pmcid);
    }

    /// Record an identifier as failed.
    ///
    /// A no-op if the identifier is already in the downloaded set: a known
    /// good artifact is never demoted by a later failure.
    pub fn mark_failed(&mut self, pmcid: impl Into<String>) {
        let pmcid = pmcid.into();
        if !self.downloaded.contains(&pmcid) {
            self.failed.insert(pmcid);
        }
    }

    /// Whether this identifier needs no further work (downloaded or failed)
    pub fn is_known(&self, pmcid: &str) -> bool {
        self.downloaded.contains(pmcid) || self.failed.contains(pmcid)
    }
}

/// Checkpoint file handle with atomic-replace save semantics
///
/// # Examples
///
/// ```no_run
/// use pmc_corpus::{ProgressRecord, ProgressStore};
///
/// # fn example() -> pmc_corpus::Result<()> {
/// let store = ProgressStore::new("data/download_progress.json");
/// let mut record = store.load();
/// record.mark_downloaded("PMC1234567");
/// store.save(&mut record)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Create a store for the checkpoint at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The checkpoint path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last persisted checkpoint.
    ///
    /// Returns an empty record when no checkpoint exists, and also when the
    /// file is truncated or unparseable - a corrupt checkpoint is recoverable
    /// (the startup reconciliation against on-disk artifacts restores most of
    /// the lost state), so it is logged and discarded, never fatal.
    pub fn load(&self) -> ProgressRecord {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No progress checkpoint, starting fresh");
                return ProgressRecord::default();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read progress checkpoint, starting fresh"
                );
                return ProgressRecord::default();
            }
        };

        match serde_json::from_slice::<ProgressRecord>(&bytes) {
            Ok(record) => {
                tracing::info!(
                    downloaded = record.downloaded.len(),
                    failed = record.failed.len(),
                    "Loaded progress checkpoint"
                );
                record
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Progress checkpoint is corrupt, starting fresh"
                );
                ProgressRecord::default()
            }
        }
    }

    /// Persist the record, stamping `last_updated`.
    ///
    /// The record is serialized to a temporary file in the checkpoint's
    /// directory, flushed and fsynced, then renamed over the checkpoint path.
    /// A crash at any point leaves either the previous checkpoint or the new
    /// one intact, never a partial write.
    pub fn save(&self, record: &mut ProgressRecord) -> Result<()> {
        record.last_updated = Some(Utc::now());

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, record)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            downloaded = record.downloaded.len(),
            failed = record.failed.len(),
            "Progress checkpoint saved"
        );
        Ok(())
    }
}
