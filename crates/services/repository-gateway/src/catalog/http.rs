//! Kurento repository REST client

use super::{ItemMetadata, RepositoryItem, StorageCatalog};
use crate::config::RepositoryConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Catalog backed by a repository server's `/repo/item` API
#[derive(Debug, Clone)]
pub struct HttpRepositoryCatalog {
    client: Client,
    base_url: String,
}

impl HttpRepositoryCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from config; `None` when no repository URL is set
    pub fn from_config(config: &RepositoryConfig) -> Result<Option<Self>> {
        match &config.url {
            Some(url) => Self::new(url.clone(), Duration::from_secs(config.timeout_seconds)).map(Some),
            None => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn parse_item(response: reqwest::Response, what: &str) -> Result<RepositoryItem> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::CatalogUnavailable(format!(
                "{} returned HTTP {}",
                what, status
            )));
        }
        response
            .json::<RepositoryItem>()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("{} returned invalid item: {}", what, e)))
    }
}

#[async_trait]
impl StorageCatalog for HttpRepositoryCatalog {
    async fn create_item(&self, metadata: &ItemMetadata) -> Result<RepositoryItem> {
        let url = format!("{}/repo/item", self.base_url);
        debug!(url = %url, "Creating repository item");

        let response = self
            .client
            .post(&url)
            .json(metadata)
            .send()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("POST {}: {}", url, e)))?;

        Self::parse_item(response, "create item").await
    }

    async fn read_item(&self, id: &str) -> Result<RepositoryItem> {
        let url = format!("{}/repo/item/{}", self.base_url, id);
        debug!(url = %url, "Resolving repository item");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("GET {}: {}", url, e)))?;

        Self::parse_item(response, "read item").await
    }
}
