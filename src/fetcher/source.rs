//! Remote article sources
//!
//! The [`ArticleSource`] trait is the seam between the fetch pipeline and the
//! network: the worker retry loop and the coordinator are written against the
//! trait, so tests can substitute in-memory sources and the production code
//! uses [`EntrezSource`] against the NCBI E-utilities `efetch` endpoint.

use crate::config::ApiConfig;
use crate::error::Result;
use async_trait::async_trait;

/// A source of raw article XML addressed by numeric PMC identifier
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch the raw article body for one numeric PMC identifier.
    ///
    /// Implementations return the body bytes as received; validity checks
    /// (length thresholds, error markers) belong to the worker, which owns
    /// the retry decision.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures and non-success HTTP statuses.
    async fn fetch_raw(&self, pmc_num: &str) -> Result<Vec<u8>>;

    /// Short name for logging
    fn name(&self) -> &str;
}

/// NCBI Entrez `efetch` client
///
/// Issues `GET {base_url}?db=pmc&id={pmc_num}&rettype=xml&retmode=xml` with
/// the configured contact e-mail and tool identifier (and API key when set),
/// as NCBI's usage policy requires.
pub struct EntrezSource {
    client: reqwest::Client,
    base_url: String,
    email: String,
    tool: String,
    api_key: Option<String>,
}

impl EntrezSource {
    /// Build a client from the API configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            email: config.email.clone(),
            tool: config.tool.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ArticleSource for EntrezSource {
    async fn fetch_raw(&self, pmc_num: &str) -> Result<Vec<u8>> {
        let mut query: Vec<(&str, &str)> = vec![
            ("db", "pmc"),
            ("id", pmc_num),
            ("rettype", "xml"),
            ("retmode", "xml"),
            ("email", &self.email),
            ("tool", &self.tool),
        ];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }

    fn name(&self) -> &str {
        "entrez"
    }
}
