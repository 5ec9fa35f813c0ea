use async_trait::async_trait;
use impact_core::{CategoryAnalysis, CategoryAnalysisFetcher, ImpactResult};
use reqwest::Url;

use crate::error::{ClientError, ClientResult};
use crate::ClientConfig;

/// Fetches per-category impact detail from the analysis service
#[derive(Clone)]
pub struct HttpCategoryFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCategoryFetcher {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// `{base_url}/impact/{item_id}/categories/{category_key}`, each segment escaped
    pub fn category_url(&self, item_id: &str, category_key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["impact", item_id, "categories", category_key]);
        }
        url
    }

    pub async fn get_category_analysis(
        &self,
        item_id: &str,
        category_key: &str,
    ) -> ClientResult<CategoryAnalysis> {
        let url = self.category_url(item_id, category_key);
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str::<CategoryAnalysis>(&body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl CategoryAnalysisFetcher for HttpCategoryFetcher {
    async fn fetch_category_analysis(
        &self,
        item_id: &str,
        category_key: &str,
    ) -> ImpactResult<CategoryAnalysis> {
        Ok(self.get_category_analysis(item_id, category_key).await?)
    }
}
