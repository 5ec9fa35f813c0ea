use async_trait::async_trait;
use crate::{CategoryAnalysis, ImpactResult};

/// Remote source of per-category impact detail for an item.
///
/// Implementations are called repeatedly while a category is still being
/// processed upstream; a `Complete` status ends polling for that category.
#[async_trait]
pub trait CategoryAnalysisFetcher: Send + Sync {
    async fn fetch_category_analysis(
        &self,
        item_id: &str,
        category_key: &str,
    ) -> ImpactResult<CategoryAnalysis>;
}
