//! Error types for pmc-corpus
//!
//! This module provides the error taxonomy for the library:
//! - Fatal configuration errors that abort a run before any dispatch
//! - Per-item fetch errors that are recorded, never propagated past the worker
//! - Extraction errors for malformed or too-short article XML
//! - Catalog errors for the open-access file list

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pmc-corpus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pmc-corpus
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.email")
        key: Option<String>,
    },

    /// Catalog file list error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Per-article fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Article XML extraction error
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from reading and filtering the open-access file list
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The file list CSV does not exist at the configured path
    #[error("file list not found: {path}")]
    FileListNotFound {
        /// The path where the file list was expected
        path: PathBuf,
    },

    /// CSV parsing failed
    #[error("file list parse error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error while reading the file list or the cached filter result
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-article fetch errors
///
/// These never escape the fetch worker boundary: they become the `detail`
/// string of a `Failed` outcome and are aggregated into the failed set.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote API reported the article as unavailable (permanent, never retried)
    #[error("article {pmcid} not available via API")]
    NotAvailable {
        /// The PMC identifier that is not available
        pmcid: String,
    },

    /// The response body was empty or implausibly short (transient)
    #[error("empty response for {pmcid}")]
    EmptyResponse {
        /// The PMC identifier whose response was empty
        pmcid: String,
    },

    /// All retry attempts were exhausted without a definitive classification
    #[error("max retries exceeded for {pmcid}")]
    RetriesExhausted {
        /// The PMC identifier whose retries were exhausted
        pmcid: String,
    },

    /// The artifact could not be written to local storage
    #[error("failed to store artifact for {pmcid}: {reason}")]
    ArtifactWrite {
        /// The PMC identifier whose artifact could not be stored
        pmcid: String,
        /// The reason the write failed
        reason: String,
    },
}

/// Article XML extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The artifact file could not be read
    #[error("failed to read {path}: {reason}")]
    Read {
        /// The artifact path that could not be read
        path: PathBuf,
        /// The reason the read failed
        reason: String,
    },

    /// The XML is malformed
    #[error("malformed XML in {path}: {reason}")]
    MalformedXml {
        /// The artifact path containing malformed XML
        path: PathBuf,
        /// The parser error
        reason: String,
    },

    /// The document contains no `<article>` element or article metadata
    #[error("no article element in {path}")]
    NotAnArticle {
        /// The artifact path that is not a JATS article
        path: PathBuf,
    },

    /// The article body is too short to be useful training text
    #[error("body text too short in {path}: {chars} chars")]
    TooShort {
        /// The artifact path whose body was too short
        path: PathBuf,
        /// The number of body characters found
        chars: usize,
    },
}
