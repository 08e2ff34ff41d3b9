//! Core types and events

use serde::{Deserialize, Serialize};

/// One unit of fetch work: a single article addressed by its PMC identifier.
///
/// Work items are created once per run from the catalog output and never
/// mutated afterwards. The external identifier (`pmcid`, e.g. `"PMC1234567"`)
/// is what appears in the progress checkpoint and artifact filenames; the
/// normalized numeric form (`pmc_num`) is what the Entrez API expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Full PMC identifier, e.g. "PMC1234567"
    pub pmcid: String,
    /// Numeric identifier used to address the API, e.g. "1234567"
    pub pmc_num: String,
}

impl WorkItem {
    /// Create a work item from a full PMC identifier.
    ///
    /// The numeric form is derived by stripping the `PMC` prefix; identifiers
    /// without the prefix are used as-is for the API and prefixed for storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use pmc_corpus::WorkItem;
    ///
    /// let item = WorkItem::new("PMC1234567");
    /// assert_eq!(item.pmc_num, "1234567");
    ///
    /// let item = WorkItem::new("1234567");
    /// assert_eq!(item.pmcid, "PMC1234567");
    /// ```
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        match identifier.strip_prefix("PMC") {
            Some(num) => Self {
                pmc_num: num.to_string(),
                pmcid: identifier,
            },
            None => Self {
                pmcid: format!("PMC{identifier}"),
                pmc_num: identifier,
            },
        }
    }

    /// Filename of the local artifact for this item, e.g. "PMC1234567.xml"
    pub fn artifact_filename(&self) -> String {
        format!("{}.xml", self.pmcid)
    }
}

/// Terminal status of one dispatched work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// The article was fetched and its artifact written
    Success,
    /// A valid artifact already existed on disk; no remote call was made
    SkippedExisting,
    /// The article could not be fetched; see the outcome detail
    Failed,
}

/// The result of processing one work item, produced exactly once per
/// dispatched item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The PMC identifier this outcome belongs to
    pub pmcid: String,
    /// Terminal status
    pub status: FetchStatus,
    /// Human-readable failure detail (only present for `Failed`)
    pub detail: Option<String>,
}

impl FetchOutcome {
    /// A successful fetch
    pub fn success(pmcid: impl Into<String>) -> Self {
        Self {
            pmcid: pmcid.into(),
            status: FetchStatus::Success,
            detail: None,
        }
    }

    /// A skip because a valid artifact already exists
    pub fn skipped(pmcid: impl Into<String>) -> Self {
        Self {
            pmcid: pmcid.into(),
            status: FetchStatus::SkippedExisting,
            detail: None,
        }
    }

    /// A failure with a human-readable detail string
    pub fn failed(pmcid: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            pmcid: pmcid.into(),
            status: FetchStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}

/// Summary of a completed (or cancelled) fetch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    /// Number of work items actually dispatched to workers this run
    pub dispatched: usize,
    /// Number of items fetched successfully this run
    pub succeeded: usize,
    /// Number of items that failed this run
    pub failed: usize,
    /// Number of items skipped because a valid artifact already existed
    pub skipped: usize,
    /// Total size of the downloaded set after the run (all sessions)
    pub downloaded_total: usize,
    /// Total size of the failed set after the run (all sessions)
    pub failed_total: usize,
}

/// Events emitted by the fetch coordinator
///
/// Consumers subscribe via [`crate::FetchCoordinator::subscribe`]. Events are
/// broadcast; if no subscriber is listening they are silently dropped.
#[derive(Debug, Clone)]
pub enum Event {
    /// A fetch run started
    RunStarted {
        /// Total items requested
        total: usize,
        /// Items remaining after dedup against the checkpoint and disk
        to_fetch: usize,
    },
    /// An article was fetched and stored
    ArticleFetched {
        /// The PMC identifier
        pmcid: String,
    },
    /// An article was skipped because its artifact already existed
    ArticleSkipped {
        /// The PMC identifier
        pmcid: String,
    },
    /// An article failed permanently for this run
    ArticleFailed {
        /// The PMC identifier
        pmcid: String,
        /// Human-readable failure detail
        detail: String,
    },
    /// A progress checkpoint was written
    CheckpointSaved {
        /// Size of the downloaded set at checkpoint time
        downloaded: usize,
        /// Size of the failed set at checkpoint time
        failed: usize,
    },
    /// The run finished (normally or after cancellation)
    RunCompleted {
        /// Final run summary
        summary: FetchSummary,
    },
}
