use dashmap::DashMap;
use impact_core::{AffectedInstrument, CategoryAnalysisFetcher, ImpactResult};

/// Cache key: the item id is part of the key so items never collide
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    item_id: String,
    category_key: String,
}

impl CacheKey {
    fn new(item_id: &str, category_key: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            category_key: category_key.to_string(),
        }
    }
}

/// Per-(item, category) store of fetched affected instruments
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<CacheKey, Vec<AffectedInstrument>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: &str, category_key: &str) -> Option<Vec<AffectedInstrument>> {
        self.entries
            .get(&CacheKey::new(item_id, category_key))
            .map(|entry| entry.value().clone())
    }

    /// Store the latest instruments for a key, replacing what was there
    pub fn put(&self, item_id: &str, category_key: &str, instruments: Vec<AffectedInstrument>) {
        self.entries
            .insert(CacheKey::new(item_id, category_key), instruments);
    }

    pub fn contains(&self, item_id: &str, category_key: &str) -> bool {
        self.entries.contains_key(&CacheKey::new(item_id, category_key))
    }

    /// Cached instruments for the key, fetching them once on a miss.
    ///
    /// Concurrent misses may each call the fetcher; whichever response lands
    /// first is kept and returned to every caller that lands after it.
    /// Errors are returned without touching the cache.
    pub async fn get_or_fetch(
        &self,
        item_id: &str,
        category_key: &str,
        fetcher: &dyn CategoryAnalysisFetcher,
    ) -> ImpactResult<Vec<AffectedInstrument>> {
        if let Some(hit) = self.get(item_id, category_key) {
            tracing::debug!("Cache hit for {}/{}", item_id, category_key);
            return Ok(hit);
        }

        let analysis = fetcher
            .fetch_category_analysis(item_id, category_key)
            .await?;

        let stored = self
            .entries
            .entry(CacheKey::new(item_id, category_key))
            .or_insert(analysis.instruments)
            .value()
            .clone();

        Ok(stored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
