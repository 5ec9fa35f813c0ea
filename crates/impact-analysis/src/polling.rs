//! Polling Coordinator
//!
//! Time-boxed state machine (`Idle -> Polling -> Settled`) that keeps asking
//! the category analysis fetcher about every category of the active item
//! until all of them report complete or the deadline passes. Progress is
//! published on a watch channel; `loading` drops to false a short grace
//! period after settlement.

use impact_core::{CategoryAnalysis, CategoryAnalysisFetcher, ImpactError, ImpactResult};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::cache::ResultCache;
use crate::normalizer::NormalizedRating;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(2_000);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_millis(60_000);
pub const DEFAULT_SETTLE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Delay between fetch rounds
    pub tick_interval: Duration,
    /// Hard ceiling on one activation's polling
    pub deadline: Duration,
    /// Pause between settlement and `loading = false`
    pub settle_grace: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            deadline: DEFAULT_POLL_DEADLINE,
            settle_grace: DEFAULT_SETTLE_GRACE,
        }
    }
}

impl PollingConfig {
    /// Reject timings the driver cannot run with
    pub fn validate(&self) -> ImpactResult<()> {
        if self.tick_interval.is_zero() {
            return Err(ImpactError::InvalidConfig(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        if self.deadline.is_zero() {
            return Err(ImpactError::InvalidConfig(
                "polling deadline must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollingPhase {
    Idle,
    Polling,
    Settled,
}

/// Readiness of one category of the active item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollingEntry {
    pub category_key: String,
    /// True once complete, or once the deadline resolved it
    pub ready: bool,
    /// Resolved by the deadline rather than by a complete response
    pub timed_out: bool,
    pub attempts: u32,
}

impl PollingEntry {
    fn new(category_key: &str) -> Self {
        Self {
            category_key: category_key.to_string(),
            ready: false,
            timed_out: false,
            attempts: 0,
        }
    }
}

/// Snapshot published to subscribers on every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollingStatus {
    /// Increases with every activation; stale drivers compare against it
    pub activation: u64,
    pub item_id: Option<String>,
    pub phase: PollingPhase,
    pub loading: bool,
    /// The deadline settled this activation; see `PollingEntry::timed_out`
    pub timed_out: bool,
    pub entries: Vec<PollingEntry>,
}

impl PollingStatus {
    fn idle(activation: u64) -> Self {
        Self {
            activation,
            item_id: None,
            phase: PollingPhase::Idle,
            loading: false,
            timed_out: false,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, category_key: &str) -> Option<&PollingEntry> {
        self.entries.iter().find(|e| e.category_key == category_key)
    }

    pub fn all_ready(&self) -> bool {
        self.entries.iter().all(|e| e.ready)
    }

    pub fn ready_count(&self) -> usize {
        self.entries.iter().filter(|e| e.ready).count()
    }
}

struct ActiveCycle {
    item_id: String,
    driver: JoinHandle<()>,
}

struct CycleState {
    last_activation: u64,
    current: Option<ActiveCycle>,
}

pub struct PollingCoordinator {
    fetcher: Arc<dyn CategoryAnalysisFetcher>,
    cache: Arc<ResultCache>,
    config: PollingConfig,
    status_tx: Arc<watch::Sender<PollingStatus>>,
    state: Mutex<CycleState>,
}

impl PollingCoordinator {
    pub fn new(
        fetcher: Arc<dyn CategoryAnalysisFetcher>,
        cache: Arc<ResultCache>,
        config: PollingConfig,
    ) -> ImpactResult<Self> {
        config.validate()?;
        let (status_tx, _) = watch::channel(PollingStatus::idle(0));
        Ok(Self {
            fetcher,
            cache,
            config,
            status_tx: Arc::new(status_tx),
            state: Mutex::new(CycleState {
                last_activation: 0,
                current: None,
            }),
        })
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Start polling for a newly active item, cancelling any previous cycle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate(&self, item_id: &str, rating: &NormalizedRating) {
        let mut state = self.lock_state();
        Self::cancel_current(&mut state);

        state.last_activation += 1;
        let activation = state.last_activation;
        let entries: Vec<PollingEntry> = rating.keys().map(PollingEntry::new).collect();

        if entries.is_empty() {
            tracing::info!("No scored categories for {}, settling immediately", item_id);
            self.status_tx.send_replace(PollingStatus {
                activation,
                item_id: Some(item_id.to_string()),
                phase: PollingPhase::Settled,
                loading: false,
                timed_out: false,
                entries,
            });
            return;
        }

        tracing::info!(
            "Polling {} categories for {} (tick {:?}, deadline {:?})",
            entries.len(),
            item_id,
            self.config.tick_interval,
            self.config.deadline
        );

        self.status_tx.send_replace(PollingStatus {
            activation,
            item_id: Some(item_id.to_string()),
            phase: PollingPhase::Polling,
            loading: true,
            timed_out: false,
            entries: entries.clone(),
        });

        let driver = PollingDriver {
            activation,
            item_id: item_id.to_string(),
            entries,
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            config: self.config,
            status_tx: Arc::clone(&self.status_tx),
        };

        state.current = Some(ActiveCycle {
            item_id: item_id.to_string(),
            driver: tokio::spawn(driver.run()),
        });
    }

    /// Stop polling and return to idle
    pub fn deactivate(&self) {
        let mut state = self.lock_state();
        Self::cancel_current(&mut state);
        state.last_activation += 1;
        self.status_tx
            .send_replace(PollingStatus::idle(state.last_activation));
    }

    pub fn status(&self) -> PollingStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.status_tx.borrow().loading
    }

    pub fn subscribe(&self) -> watch::Receiver<PollingStatus> {
        self.status_tx.subscribe()
    }

    /// Resolves once the current activation has stopped loading
    pub async fn wait_until_settled(&self) -> PollingStatus {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|status| !status.loading).await;
        match settled {
            Ok(status) => status.clone(),
            // The sender lives in `self`, so this only happens during teardown
            Err(_) => self.status(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CycleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cancel_current(state: &mut CycleState) {
        if let Some(previous) = state.current.take() {
            previous.driver.abort();
            tracing::debug!("Cancelled polling for {}", previous.item_id);
        }
    }
}

impl Drop for PollingCoordinator {
    fn drop(&mut self) {
        let mut state = self.lock_state();
        Self::cancel_current(&mut state);
    }
}

type FetchOutcome = (String, ImpactResult<CategoryAnalysis>);

/// Owns the timers, in-flight fetches and entries of one activation
struct PollingDriver {
    activation: u64,
    item_id: String,
    entries: Vec<PollingEntry>,
    fetcher: Arc<dyn CategoryAnalysisFetcher>,
    cache: Arc<ResultCache>,
    config: PollingConfig,
    status_tx: Arc<watch::Sender<PollingStatus>>,
}

impl PollingDriver {
    async fn run(mut self) {
        let started = Instant::now();
        let deadline = time::sleep_until(started + self.config.deadline);
        tokio::pin!(deadline);

        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Dropping the set aborts whatever is still in flight
        let mut fetches: JoinSet<FetchOutcome> = JoinSet::new();

        let timed_out = loop {
            tokio::select! {
                biased;

                _ = &mut deadline => break true,

                Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                    match joined {
                        Ok((category_key, result)) => self.record(&category_key, result),
                        Err(e) => tracing::warn!("Fetch task for {} failed: {}", self.item_id, e),
                    }
                    if !self.publish_entries() {
                        return;
                    }
                    if self.all_ready() {
                        break false;
                    }
                }

                _ = ticker.tick() => {
                    if self.all_ready() {
                        break false;
                    }
                    self.dispatch_pending(&mut fetches);
                }
            }
        };

        fetches.abort_all();

        let ready = self.entries.iter().filter(|e| e.ready).count();
        if timed_out {
            for entry in self.entries.iter_mut().filter(|e| !e.ready) {
                entry.ready = true;
                entry.timed_out = true;
            }
        }
        if timed_out {
            tracing::warn!(
                "Polling for {} reached the {:?} deadline with {}/{} categories ready",
                self.item_id,
                self.config.deadline,
                ready,
                self.entries.len()
            );
        } else {
            tracing::info!(
                "All {} categories ready for {} after {:?}",
                self.entries.len(),
                self.item_id,
                started.elapsed()
            );
        }

        let entries = self.entries.clone();
        if !self.publish(|status| {
            status.phase = PollingPhase::Settled;
            status.timed_out = timed_out;
            status.entries = entries;
        }) {
            return;
        }

        time::sleep(self.config.settle_grace).await;
        self.publish(|status| status.loading = false);
    }

    fn dispatch_pending(&self, fetches: &mut JoinSet<FetchOutcome>) {
        let pending: Vec<&PollingEntry> = self.entries.iter().filter(|e| !e.ready).collect();
        tracing::debug!(
            "Polling tick for {}: {} categories pending",
            self.item_id,
            pending.len()
        );

        for entry in pending {
            let fetcher = Arc::clone(&self.fetcher);
            let item_id = self.item_id.clone();
            let category_key = entry.category_key.clone();
            fetches.spawn(async move {
                let result = fetcher
                    .fetch_category_analysis(&item_id, &category_key)
                    .await;
                (category_key, result)
            });
        }
    }

    fn record(&mut self, category_key: &str, result: ImpactResult<CategoryAnalysis>) {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.category_key == category_key)
        else {
            return;
        };

        // A slower, older response must not clobber a completed result
        if entry.ready {
            return;
        }

        match result {
            Ok(analysis) => {
                let complete = analysis.is_complete();
                self.cache
                    .put(&self.item_id, category_key, analysis.instruments);
                if complete {
                    entry.ready = true;
                    tracing::debug!("{}/{} ready", self.item_id, category_key);
                } else {
                    entry.attempts += 1;
                    tracing::debug!(
                        "{}/{} still processing (attempt {})",
                        self.item_id,
                        category_key,
                        entry.attempts
                    );
                }
            }
            Err(e) => {
                entry.attempts += 1;
                tracing::warn!(
                    "Analysis fetch for {}/{} failed (attempt {}): {}",
                    self.item_id,
                    category_key,
                    entry.attempts,
                    e
                );
            }
        }
    }

    fn all_ready(&self) -> bool {
        self.entries.iter().all(|e| e.ready)
    }

    fn publish_entries(&self) -> bool {
        let entries = self.entries.clone();
        self.publish(|status| status.entries = entries)
    }

    /// Apply `update` if this driver still owns the status; false once superseded
    fn publish(&self, update: impl FnOnce(&mut PollingStatus)) -> bool {
        let activation = self.activation;
        let mut current = true;
        self.status_tx.send_if_modified(|status| {
            if status.activation != activation {
                current = false;
                return false;
            }
            update(status);
            true
        });
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use async_trait::async_trait;
    use impact_core::{AffectedInstrument, CategoryRatings, ImpactError, RawCategoryRating, RawImpactRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted fetcher: `complete_after` calls per category before status 1
    struct ScriptedFetcher {
        calls: AtomicUsize,
        complete_after: Option<usize>,
        fail_first: usize,
        delay: Duration,
        only_item: Option<&'static str>,
    }

    impl ScriptedFetcher {
        fn new(complete_after: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                complete_after,
                fail_first: 0,
                delay: Duration::ZERO,
                only_item: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CategoryAnalysisFetcher for ScriptedFetcher {
        async fn fetch_category_analysis(
            &self,
            item_id: &str,
            category_key: &str,
        ) -> ImpactResult<CategoryAnalysis> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            if call < self.fail_first {
                return Err(ImpactError::Fetch("connection reset".to_string()));
            }
            let instruments = vec![AffectedInstrument::new(category_key, 0.5)];
            if self.only_item.is_some_and(|only| only != item_id) {
                return Ok(CategoryAnalysis::processing(instruments));
            }
            match self.complete_after {
                Some(n) if call >= n => Ok(CategoryAnalysis::complete(instruments)),
                _ => Ok(CategoryAnalysis::processing(instruments)),
            }
        }
    }

    fn rating(scores: &[(&str, f64)]) -> NormalizedRating {
        normalize(&RawImpactRecord {
            categories: scores
                .iter()
                .map(|(k, s)| (k.to_string(), RawCategoryRating::number(*s, "")))
                .collect::<CategoryRatings>(),
            ..Default::default()
        })
    }

    fn coordinator(fetcher: Arc<ScriptedFetcher>) -> PollingCoordinator {
        PollingCoordinator::new(fetcher, Arc::new(ResultCache::new()), PollingConfig::default())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_after_first_complete_round() {
        let fetcher = Arc::new(ScriptedFetcher::new(Some(0)));
        let coordinator = coordinator(Arc::clone(&fetcher));
        let started = Instant::now();

        coordinator.activate("news-1", &rating(&[("stocks", 1.0), ("bonds", -2.0), ("crypto", 0.5)]));
        assert!(coordinator.is_loading());

        let status = coordinator.wait_until_settled().await;
        assert!(started.elapsed() <= Duration::from_millis(2_500));
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(status.phase, PollingPhase::Settled);
        assert!(status.all_ready());
        assert!(!status.timed_out);
        assert!(coordinator.cache().contains("news-1", "bonds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_holds_through_grace_delay() {
        let fetcher = Arc::new(ScriptedFetcher::new(Some(0)));
        let coordinator = coordinator(fetcher);

        coordinator.activate("news-1", &rating(&[("stocks", 1.0)]));
        let mut rx = coordinator.subscribe();
        let settled_at = {
            let status = rx.wait_for(|s| s.phase == PollingPhase::Settled).await.unwrap();
            assert!(status.loading);
            Instant::now()
        };

        coordinator.wait_until_settled().await;
        assert!(settled_at.elapsed() >= DEFAULT_SETTLE_GRACE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_forces_settlement() {
        let fetcher = Arc::new(ScriptedFetcher::new(None));
        let coordinator = coordinator(Arc::clone(&fetcher));
        let started = Instant::now();

        coordinator.activate("news-1", &rating(&[("commodities", -3.0)]));
        let status = coordinator.wait_until_settled().await;

        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_POLL_DEADLINE);
        assert!(elapsed <= DEFAULT_POLL_DEADLINE + DEFAULT_SETTLE_GRACE);
        assert!(status.timed_out);
        assert!(!status.loading);

        // Unfinished categories are resolved with whatever was cached
        assert!(status.all_ready());
        let entry = status.entry("commodities").unwrap();
        assert!(entry.ready);
        assert!(entry.timed_out);
        assert!(entry.attempts >= 29);
        // Last partial result is still available for display
        assert_eq!(
            coordinator.cache().get("news-1", "commodities").unwrap()[0].ticker,
            "commodities"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_run_concurrently() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Duration::from_millis(1_500),
            ..ScriptedFetcher::new(Some(0))
        });
        let coordinator = coordinator(Arc::clone(&fetcher));
        let started = Instant::now();

        coordinator.activate("news-1", &rating(&[("stocks", 1.0), ("bonds", -2.0), ("crypto", 0.5)]));
        let mut rx = coordinator.subscribe();
        let status = rx
            .wait_for(|s| s.phase == PollingPhase::Settled)
            .await
            .unwrap()
            .clone();

        // Three 1.5s fetches in a row would take 4.5s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1_500));
        assert!(elapsed < Duration::from_millis(2_000));
        assert!(status.all_ready());
        assert!(status.entries.iter().all(|e| !e.timed_out));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_rejects_zero_timings() {
        let fetcher = Arc::new(ScriptedFetcher::new(Some(0)));
        let zero_tick = PollingConfig {
            tick_interval: Duration::ZERO,
            ..PollingConfig::default()
        };
        let zero_deadline = PollingConfig {
            deadline: Duration::ZERO,
            ..PollingConfig::default()
        };

        for config in [zero_tick, zero_deadline] {
            let result = PollingCoordinator::new(fetcher.clone(), Arc::new(ResultCache::new()), config);
            assert!(matches!(result, Err(ImpactError::InvalidConfig(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_retried_on_next_tick() {
        let fetcher = Arc::new(ScriptedFetcher {
            fail_first: 2,
            ..ScriptedFetcher::new(Some(0))
        });
        let coordinator = coordinator(Arc::clone(&fetcher));

        coordinator.activate("news-1", &rating(&[("stocks", 2.0)]));
        let status = coordinator.wait_until_settled().await;

        assert!(!status.timed_out);
        assert_eq!(status.entry("stocks").unwrap().attempts, 2);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_categories_settles_immediately() {
        let fetcher = Arc::new(ScriptedFetcher::new(Some(0)));
        let coordinator = coordinator(Arc::clone(&fetcher));

        coordinator.activate("news-1", &rating(&[("stocks", 0.0)]));

        let status = coordinator.status();
        assert_eq!(status.phase, PollingPhase::Settled);
        assert!(!status.loading);
        assert!(status.entries.is_empty());
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_items_isolates_late_responses() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Duration::from_secs(1),
            only_item: Some("news-a"),
            ..ScriptedFetcher::new(Some(0))
        });
        let coordinator = coordinator(Arc::clone(&fetcher));
        let categories = rating(&[("stocks", 1.0), ("bonds", -1.0)]);

        coordinator.activate("news-a", &categories);
        time::sleep(Duration::from_millis(500)).await;
        coordinator.activate("news-b", &categories);
        time::sleep(Duration::from_secs(3)).await;

        let status = coordinator.status();
        assert_eq!(status.item_id.as_deref(), Some("news-b"));
        assert!(status.loading);
        assert!(status.entries.iter().all(|e| !e.ready));
        assert!(status.entries.iter().all(|e| e.attempts >= 1));
        // The aborted item-a fetches never landed
        assert!(!coordinator.cache().contains("news-a", "stocks"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_stops_polling() {
        let fetcher = Arc::new(ScriptedFetcher::new(None));
        let coordinator = coordinator(Arc::clone(&fetcher));

        coordinator.activate("news-1", &rating(&[("stocks", 1.0)]));
        time::sleep(Duration::from_millis(100)).await;
        coordinator.deactivate();

        let calls = fetcher.calls();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fetcher.calls(), calls);
        assert_eq!(coordinator.status().phase, PollingPhase::Idle);
        assert!(!coordinator.is_loading());
    }
}
