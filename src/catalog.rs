//! Catalog filtering: selecting candidate articles from the PMC open-access file list
//!
//! The open-access file list (`oa_file_list.csv`) enumerates every article
//! whose full text may be bulk-fetched. This module filters it down to the
//! articles whose citation matches the configured topic keywords and turns
//! the matches into fetchable work items. The filtered list can be cached as
//! JSON so a resumed session skips the (large) CSV scan.

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::types::WorkItem;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default topic keywords, matched case-insensitively against the citation column.
///
/// Covers core food science, food categories, safety, processing, adjacent
/// agriculture topics, notable compounds, and food-specific journal names.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    // Core food science
    "food",
    "nutrition",
    "diet",
    "dietary",
    "nutrient",
    // Food categories
    "dairy",
    "meat",
    "beef",
    "pork",
    "poultry",
    "chicken",
    "seafood",
    "fish",
    "vegetable",
    "fruit",
    "cereal",
    "grain",
    "beverage",
    "milk",
    "cheese",
    "yogurt",
    "bread",
    "rice",
    // Food science topics
    "ferment",
    "flavor",
    "flavour",
    "sensory",
    "taste",
    "cooking",
    "culinary",
    "recipe",
    // Food safety & quality
    "foodborne",
    "food safety",
    "food contamination",
    "preserv",
    "shelf life",
    "spoilage",
    // Food processing
    "food processing",
    "food technology",
    "food packaging",
    // Agriculture related
    "agricult",
    "crop",
    "harvest",
    "livestock",
    // Specific compounds
    "antioxidant",
    "phenolic",
    "polyphenol",
    "vitamin",
    "fatty acid",
    "protein",
    "carbohydrate",
    "fiber",
    "fibre",
    // Journals (food-specific journals)
    "j food",
    "food res",
    "food chem",
    "food sci",
    "meat sci",
    "dairy sci",
    "appetite",
    "nutrients",
    "foods",
    "beverages",
];

/// One matched article from the open-access file list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Full PMC identifier, e.g. "PMC1234567"
    pub pmcid: String,
    /// Numeric identifier used to address the API
    pub pmc_num: String,
    /// PubMed identifier (may be empty)
    #[serde(default)]
    pub pmid: String,
    /// Article citation as listed in the file list
    #[serde(default)]
    pub citation: String,
    /// License string as listed in the file list
    #[serde(default)]
    pub license: String,
}

impl CatalogEntry {
    /// The fetchable work item for this entry
    pub fn work_item(&self) -> WorkItem {
        WorkItem {
            pmcid: self.pmcid.clone(),
            pmc_num: self.pmc_num.clone(),
        }
    }
}

/// Raw row shape of `oa_file_list.csv`; columns we don't use are ignored
#[derive(Debug, Deserialize)]
struct FileListRow {
    #[serde(rename = "Accession ID", default)]
    accession_id: String,
    #[serde(rename = "PMID", default)]
    pmid: String,
    #[serde(rename = "Article Citation", default)]
    citation: String,
    #[serde(rename = "License", default)]
    license: String,
}

/// Keyword filter over the open-access file list
pub struct CatalogFilter {
    keywords: Vec<String>,
    max_articles: Option<usize>,
}

impl CatalogFilter {
    /// Build a filter from the catalog configuration (keywords are lowercased once)
    #[must_use]
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            max_articles: config.max_articles,
        }
    }

    /// Whether a citation matches any configured keyword (case-insensitive substring)
    pub fn matches(&self, citation: &str) -> bool {
        let citation = citation.to_lowercase();
        self.keywords.iter().any(|k| citation.contains(k))
    }

    /// Scan the file list CSV and return the matching entries in file order.
    ///
    /// Rows without an accession ID are skipped. Stops early once
    /// `max_articles` matches have been collected.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::FileListNotFound`] when the CSV is missing and
    /// [`CatalogError::Csv`] when a row cannot be parsed.
    pub fn filter_file_list(&self, path: &Path) -> Result<Vec<CatalogEntry>, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::FileListNotFound {
                path: path.to_path_buf(),
            });
        }

        tracing::info!(path = %path.display(), "Filtering open-access file list");

        let mut reader = csv::Reader::from_path(path).map_err(CatalogError::Csv)?;
        let mut entries = Vec::new();
        let mut scanned: u64 = 0;

        for row in reader.deserialize::<FileListRow>() {
            let row = row?;
            scanned += 1;

            if row.accession_id.is_empty() || !self.matches(&row.citation) {
                continue;
            }

            let pmcid = row.accession_id;
            let pmc_num = pmcid
                .strip_prefix("PMC")
                .unwrap_or(pmcid.as_str())
                .to_string();
            entries.push(CatalogEntry {
                pmcid,
                pmc_num,
                pmid: row.pmid,
                citation: row.citation,
                license: row.license,
            });

            if let Some(max) = self.max_articles
                && entries.len() >= max
            {
                tracing::info!(max, "Reached article cap, stopping scan early");
                break;
            }
        }

        tracing::info!(
            scanned,
            matched = entries.len(),
            "File list filtering complete"
        );
        Ok(entries)
    }
}

/// Cache filtered entries as JSON so a resumed session skips the CSV scan
pub fn save_entries(path: &Path, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(entries).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a previously cached filter result
pub fn load_entries(path: &Path) -> Result<Vec<CatalogEntry>, CatalogError> {
    let bytes = std::fs::read(path)?;
    let entries = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
    Ok(entries)
}
