use impact_core::{
    AffectedInstrument, CategoryAnalysisFetcher, ChartSide, ImpactResult, RawImpactRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

use crate::aggregator::{aggregate, ChartData};
use crate::cache::ResultCache;
use crate::layout::{LayoutConfig, LayoutPoint, RadialLayout};
use crate::normalizer::{normalize, NormalizedRating};
use crate::polling::{PollingConfig, PollingCoordinator, PollingStatus};
use crate::sizing::ContainerSizeSource;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineConfig {
    pub polling: PollingConfig,
    pub layout: LayoutConfig,
}

/// What a clicked chart label reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelActivation {
    pub label: String,
    pub value: f64,
    pub category_key: String,
}

type LabelHandler = Box<dyn Fn(&LabelActivation) + Send + Sync>;

struct ActiveItem {
    item_id: String,
    rating: NormalizedRating,
    chart: ChartData,
}

/// Ties normalization, aggregation, polling, caching and label layout
/// together for the currently displayed item.
pub struct ImpactEngine {
    fetcher: Arc<dyn CategoryAnalysisFetcher>,
    cache: Arc<ResultCache>,
    coordinator: PollingCoordinator,
    sizes: Arc<dyn ContainerSizeSource>,
    config: EngineConfig,
    active: RwLock<Option<ActiveItem>>,
    layouts: Mutex<HashMap<ChartSide, RadialLayout>>,
    large_viewport: AtomicBool,
    label_handler: RwLock<Option<LabelHandler>>,
}

impl ImpactEngine {
    pub fn new(
        fetcher: Arc<dyn CategoryAnalysisFetcher>,
        sizes: Arc<dyn ContainerSizeSource>,
        config: EngineConfig,
    ) -> ImpactResult<Self> {
        Self::with_cache(fetcher, sizes, Arc::new(ResultCache::new()), config)
    }

    /// Build an engine around an existing cache, e.g. one shared by several views
    pub fn with_cache(
        fetcher: Arc<dyn CategoryAnalysisFetcher>,
        sizes: Arc<dyn ContainerSizeSource>,
        cache: Arc<ResultCache>,
        config: EngineConfig,
    ) -> ImpactResult<Self> {
        let coordinator =
            PollingCoordinator::new(Arc::clone(&fetcher), Arc::clone(&cache), config.polling)?;
        Ok(Self {
            fetcher,
            cache,
            coordinator,
            sizes,
            config,
            active: RwLock::new(None),
            layouts: Mutex::new(HashMap::new()),
            large_viewport: AtomicBool::new(false),
            label_handler: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Make `item_id` the displayed item and start polling its categories.
    ///
    /// Re-activating the current item with an equivalent record keeps the
    /// running cycle. Must be called from within a Tokio runtime.
    pub fn activate(&self, item_id: &str, record: &RawImpactRecord) -> ChartData {
        let rating = normalize(record);
        let chart = aggregate(&rating, record);

        let mut active = write_lock(&self.active);
        if let Some(current) = active.as_ref() {
            if current.item_id == item_id && current.rating == rating && current.chart == chart {
                tracing::debug!("{} already active, keeping current polling cycle", item_id);
                return chart;
            }
        }

        tracing::info!(
            "Activating {}: {} positive / {} negative categories{}{}",
            item_id,
            rating.positive_count,
            rating.negative_count,
            if chart.hide_positive { ", positive chart hidden" } else { "" },
            if chart.hide_negative { ", negative chart hidden" } else { "" },
        );

        self.coordinator.activate(item_id, &rating);
        *active = Some(ActiveItem {
            item_id: item_id.to_string(),
            rating,
            chart: chart.clone(),
        });

        chart
    }

    /// Drop the displayed item and stop polling
    pub fn deactivate(&self) {
        let mut active = write_lock(&self.active);
        if let Some(previous) = active.take() {
            tracing::info!("Deactivating {}", previous.item_id);
        }
        self.coordinator.deactivate();
    }

    pub fn active_item_id(&self) -> Option<String> {
        read_lock(&self.active).as_ref().map(|a| a.item_id.clone())
    }

    pub fn rating(&self) -> Option<NormalizedRating> {
        read_lock(&self.active).as_ref().map(|a| a.rating.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.coordinator.is_loading()
    }

    pub fn polling_status(&self) -> PollingStatus {
        self.coordinator.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollingStatus> {
        self.coordinator.subscribe()
    }

    pub async fn wait_until_settled(&self) -> PollingStatus {
        self.coordinator.wait_until_settled().await
    }

    pub fn chart_data(&self) -> Option<ChartData> {
        read_lock(&self.active).as_ref().map(|a| a.chart.clone())
    }

    /// Chart data once polling no longer holds the view in a loading state
    pub fn settled_chart_data(&self) -> Option<ChartData> {
        if self.is_loading() {
            return None;
        }
        self.chart_data()
    }

    pub fn set_large_viewport(&self, large: bool) {
        self.large_viewport.store(large, Ordering::Relaxed);
    }

    pub fn is_large_viewport(&self) -> bool {
        self.large_viewport.load(Ordering::Relaxed)
    }

    /// Label positions for one chart side; empty when nothing is active or
    /// the side is suppressed.
    pub fn layout_positions(&self, side: ChartSide) -> Vec<LayoutPoint> {
        let active = read_lock(&self.active);
        let Some(item) = active.as_ref() else {
            return Vec::new();
        };
        if item.chart.is_hidden(side) {
            return Vec::new();
        }

        let size = self.sizes.observe(side);
        let large = self.is_large_viewport();
        let mut layouts = match self.layouts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        layouts
            .entry(side)
            .or_insert_with(|| RadialLayout::new(self.config.layout))
            .positions(&item.chart.bucket(side).points, size, large)
            .to_vec()
    }

    /// Register the callback fired when a chart label is activated
    pub fn on_label_activate<F>(&self, handler: F)
    where
        F: Fn(&LabelActivation) + Send + Sync + 'static,
    {
        *write_lock(&self.label_handler) = Some(Box::new(handler));
    }

    /// Resolve a clicked label on `side` and notify the registered handler.
    ///
    /// `label` may be the display name or the category key.
    pub fn activate_label(&self, side: ChartSide, label: &str) -> Option<LabelActivation> {
        let activation = {
            let active = read_lock(&self.active);
            let item = active.as_ref()?;
            if item.chart.is_hidden(side) {
                return None;
            }
            let point = item.chart.bucket(side).find(label)?;
            LabelActivation {
                label: point.label.clone(),
                value: point.value,
                category_key: point.category_key.clone(),
            }
        };

        if let Some(handler) = read_lock(&self.label_handler).as_ref() {
            handler(&activation);
        }
        Some(activation)
    }

    /// Cached detail for tooltips; never triggers a fetch
    pub fn cached_instruments(&self, item_id: &str, category_key: &str) -> Option<Vec<AffectedInstrument>> {
        self.cache.get(item_id, category_key)
    }

    /// Detail for a category, fetched once if not cached yet
    pub async fn instruments(
        &self,
        item_id: &str,
        category_key: &str,
    ) -> ImpactResult<Vec<AffectedInstrument>> {
        self.cache
            .get_or_fetch(item_id, category_key, self.fetcher.as_ref())
            .await
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
