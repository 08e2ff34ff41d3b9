//! Configuration types for pmc-corpus

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder contact address rejected by [`Config::validate`].
///
/// NCBI requires a real contact e-mail on every E-utilities request; shipping
/// the placeholder would get the whole run blocked server-side.
pub const PLACEHOLDER_EMAIL: &str = "your_email@example.com";

/// NCBI Entrez API settings
///
/// Groups everything needed to address the E-utilities `efetch` endpoint.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Contact e-mail sent with every request (required by NCBI)
    #[serde(default = "default_email")]
    pub email: String,

    /// Tool identifier sent with every request (default: "pmc-corpus")
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Optional NCBI API key; raises the permitted request rate from 3/s to 10/s
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the efetch endpoint
    ///
    /// Overridable so tests can point the client at a mock server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Global request ceiling shared by all workers, in requests per second.
    ///
    /// Zero or negative disables rate limiting. Keep a margin under NCBI's
    /// published limit (default: 3.0 without an API key; 9.0 is safe with one).
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: f64,

    /// Timeout for each request (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            email: default_email(),
            tool: default_tool(),
            api_key: None,
            base_url: default_base_url(),
            max_requests_per_second: default_max_requests_per_second(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Fetch pipeline behavior (worker pool, validity thresholds, checkpointing)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Size of the fixed worker pool (default: 8)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Write a progress checkpoint every this many processed outcomes (default: 500)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Minimum size in bytes for an on-disk artifact to count as valid (default: 100)
    ///
    /// Artifacts at or below this size are treated as absent: they are
    /// re-fetched rather than skipped, and they are ignored during startup
    /// reconciliation.
    #[serde(default = "default_min_artifact_bytes")]
    pub min_artifact_bytes: u64,

    /// Minimum size in bytes for a response body to be considered plausible (default: 200)
    ///
    /// Shorter bodies are classified as transient empty responses and retried.
    #[serde(default = "default_min_response_bytes")]
    pub min_response_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            checkpoint_interval: default_checkpoint_interval(),
            min_artifact_bytes: default_min_artifact_bytes(),
            min_response_bytes: default_min_response_bytes(),
        }
    }
}

/// On-disk layout for artifacts, checkpoints, and corpus output
///
/// Everything lives under `data_dir`:
///
/// ```text
/// data/
///   xml/                        raw article artifacts (PMC*.xml)
///   processed/                  corpus output (jsonl/txt/stats)
///   download_progress.json      resumable fetch checkpoint
///   filtered_articles.json      cached catalog filter result
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base data directory (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Directory holding raw article XML artifacts
    pub fn xml_dir(&self) -> PathBuf {
        self.data_dir.join("xml")
    }

    /// Directory holding extracted corpus output
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Path of the resumable fetch progress checkpoint
    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join("download_progress.json")
    }

    /// Path of the cached catalog filter result
    pub fn catalog_cache_path(&self) -> PathBuf {
        self.data_dir.join("filtered_articles.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Retry behavior for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of fetch attempts per article (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Catalog filtering settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Keywords matched (case-insensitively) against the article citation column
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Cap on the number of matched articles (None = unlimited)
    #[serde(default)]
    pub max_articles: Option<usize>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            max_articles: None,
        }
    }
}

/// Extraction thresholds and section filtering
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Minimum body text length in characters for an article to be kept (default: 500)
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,

    /// Minimum caption length in characters for a figure/table caption to be kept (default: 10)
    #[serde(default = "default_min_caption_chars")]
    pub min_caption_chars: usize,

    /// Section titles dropped from the body (matched case-insensitively)
    ///
    /// These are boilerplate sections with no training value: funding notes,
    /// conflict-of-interest statements, author contributions, and the like.
    #[serde(default = "default_skip_section_titles")]
    pub skip_section_titles: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_body_chars: default_min_body_chars(),
            min_caption_chars: default_min_caption_chars(),
            skip_section_titles: default_skip_section_titles(),
        }
    }
}

/// Main configuration for pmc-corpus
///
/// All settings have sensible defaults except [`ApiConfig::email`], which must
/// be set to a real contact address before any fetch run.
///
/// # Examples
///
/// ```
/// use pmc_corpus::Config;
///
/// let mut config = Config::default();
/// config.api.email = "researcher@example.org".to_string();
/// config.fetch.worker_count = 4;
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// NCBI Entrez API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Fetch pipeline behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Catalog filtering settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Extraction thresholds
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl Config {
    /// Validate the configuration, returning the first fatal error found.
    ///
    /// Called by the coordinator before any dispatch; a failure here is the
    /// only kind of error that aborts a whole run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the contact e-mail is missing or still
    /// the placeholder, or when pool/retry sizes are zero.
    pub fn validate(&self) -> Result<()> {
        if self.api.email.trim().is_empty() || self.api.email == PLACEHOLDER_EMAIL {
            return Err(Error::Config {
                message: "a real contact e-mail is required by NCBI".to_string(),
                key: Some("api.email".to_string()),
            });
        }
        if self.fetch.worker_count == 0 {
            return Err(Error::Config {
                message: "worker_count must be at least 1".to_string(),
                key: Some("fetch.worker_count".to_string()),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("retry.max_attempts".to_string()),
            });
        }
        if self.fetch.checkpoint_interval == 0 {
            return Err(Error::Config {
                message: "checkpoint_interval must be at least 1".to_string(),
                key: Some("fetch.checkpoint_interval".to_string()),
            });
        }
        Ok(())
    }
}

fn default_email() -> String {
    PLACEHOLDER_EMAIL.to_string()
}

fn default_tool() -> String {
    "pmc-corpus".to_string()
}

fn default_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi".to_string()
}

fn default_max_requests_per_second() -> f64 {
    3.0
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_worker_count() -> usize {
    8
}

fn default_checkpoint_interval() -> usize {
    500
}

fn default_min_artifact_bytes() -> u64 {
    100
}

fn default_min_response_bytes() -> usize {
    200
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_min_body_chars() -> usize {
    500
}

fn default_min_caption_chars() -> usize {
    10
}

fn default_keywords() -> Vec<String> {
    crate::catalog::DEFAULT_KEYWORDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skip_section_titles() -> Vec<String> {
    [
        "competing interests",
        "conflict of interest",
        "conflicts of interest",
        "credit authorship contribution statement",
        "authorship contribution",
        "declaration of competing interest",
        "author contributions",
        "funding",
        "acknowledgements",
        "acknowledgments",
        "acknowledgment",
        "data availability",
        "supplementary material",
        "supplementary data",
        "abbreviations",
        "ethics statement",
        "ethical approval",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_on_placeholder_email() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("api.email")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_real_email() {
        let mut config = Config::default();
        config.api.email = "someone@example.org".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.api.email = "someone@example.org".to_string();
        config.fetch.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_from_partial_json() {
        let json = r#"{"api": {"email": "x@y.org"}, "fetch": {"worker_count": 2}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.api.email, "x@y.org");
        assert_eq!(config.fetch.worker_count, 2);
        // Everything else falls back to defaults
        assert_eq!(config.fetch.checkpoint_interval, 500);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn data_dir_defaults_when_absent() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(
            StorageConfig::default().data_dir,
            PathBuf::from("./data")
        );
    }

    #[test]
    fn storage_paths_are_derived_from_data_dir() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/tmp/corpus"),
        };
        assert_eq!(storage.xml_dir(), PathBuf::from("/tmp/corpus/xml"));
        assert_eq!(
            storage.progress_path(),
            PathBuf::from("/tmp/corpus/download_progress.json")
        );
    }
}
