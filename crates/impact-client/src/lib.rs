pub mod error;
pub mod fetcher;

pub use error::{ClientError, ClientResult};
pub use fetcher::HttpCategoryFetcher;

use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8010";

/// Configuration for the impact analysis service
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("IMPACT_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string()),
            timeout: Duration::from_secs(10),
        }
    }
}
