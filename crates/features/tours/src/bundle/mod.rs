//! Named, strategy-tagged groups of tours.
//!
//! The manager owns the bundle registry (which may be split or promoted at runtime), the
//! per-bundle load statistics and the loaded flags. Member fetching is delegated to the
//! [`LazyLoader`], so a bundle load shares cache and in-flight state with single-tour loads.

mod recommend;

pub use recommend::{BundleRecommendations, LoadTiming, RULES, RecommendationRule, recommend};

use crate::error::TourError;
use crate::loader::LazyLoader;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tourline_domain::bundle::{BundleConfig, BundlePriority, LoadStrategy};
use tourline_domain::config::BundleTuning;
use tourline_domain::context::LoadContext;
use tourline_domain::tour::TourDefinition;
use tourline_kernel::clock::SharedClock;
use tracing::{debug, info, instrument, warn};

/// Recorded on every successful bundle load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleStats {
    /// Serialized size of the loaded members, in bytes.
    pub estimated_size: u64,
    pub last_load_time: Duration,
    pub load_count: u64,
    pub last_loaded: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BundleLoad {
    pub bundle_id: String,
    /// Members fetched by this call, in bundle order. Empty when `already_loaded`.
    pub tours: Vec<Arc<TourDefinition>>,
    pub load_time: Duration,
    pub already_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSplit {
    pub original: String,
    pub parts: [String; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOptimization {
    pub split: Vec<BundleSplit>,
    pub promoted: Vec<String>,
}

impl BundleOptimization {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.split.is_empty() && self.promoted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDetail {
    pub id: String,
    pub priority: BundlePriority,
    pub strategy: LoadStrategy,
    pub tours: usize,
    pub max_size: u64,
    pub loaded: bool,
    pub stats: Option<BundleStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleStatsReport {
    pub total_bundles: usize,
    pub loaded_bundles: usize,
    /// Mean of the last load time of every bundle loaded at least once.
    pub average_load_time: Duration,
    /// Sum of estimated sizes, in bytes.
    pub total_size: u64,
    pub bundles: Vec<BundleDetail>,
}

#[derive(Debug, Default)]
struct BundleState {
    /// Registration order.
    bundles: Vec<BundleConfig>,
    loaded: FxHashSet<String>,
    /// Bundles with a member fetch in progress; flips to `true` once marked loaded.
    loading: FxHashMap<String, watch::Receiver<bool>>,
    stats: FxHashMap<String, BundleStats>,
}

impl BundleState {
    fn find(&self, id: &str) -> Option<&BundleConfig> {
        self.bundles.iter().find(|bundle| bundle.id == id)
    }

    /// Bundles ordered high → low priority; the sort is stable so registration order
    /// breaks ties.
    fn by_priority(&self) -> Vec<&BundleConfig> {
        let mut ordered: Vec<&BundleConfig> = self.bundles.iter().collect();
        ordered.sort_by_key(|bundle| bundle.priority);
        ordered
    }
}

/// Clears the loading slot when the leading bundle load finishes or is dropped.
struct LoadingGuard<'a> {
    state: &'a Mutex<BundleState>,
    id: &'a str,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().loading.remove(self.id);
    }
}

#[derive(Debug)]
pub struct BundleManagerInner {
    loader: LazyLoader,
    tuning: BundleTuning,
    clock: SharedClock,
    state: Mutex<BundleState>,
}

#[derive(Debug, Clone)]
pub struct BundleManager {
    inner: Arc<BundleManagerInner>,
}

impl BundleManager {
    /// # Errors
    /// [`TourError::Validation`] when two bundles share an id.
    pub fn new(
        loader: LazyLoader,
        bundles: Vec<BundleConfig>,
        tuning: BundleTuning,
        clock: SharedClock,
    ) -> Result<Self, TourError> {
        let mut ids = FxHashSet::default();
        for bundle in &bundles {
            if !ids.insert(bundle.id.as_str()) {
                return Err(TourError::validation(format!("Duplicate bundle id '{}'", bundle.id)));
            }
            let unknown: Vec<&str> = bundle
                .tours
                .iter()
                .filter(|id| !loader.registry().contains(id))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                warn!(bundle = %bundle.id, ?unknown, "Bundle lists unregistered tours");
            }
        }

        debug!(bundles = bundles.len(), "Bundle registry ready");
        let state = BundleState { bundles, ..BundleState::default() };
        Ok(Self { inner: Arc::new(BundleManagerInner { loader, tuning, clock, state: Mutex::new(state) }) })
    }

    #[must_use]
    pub fn bundle(&self, id: &str) -> Option<BundleConfig> {
        self.inner.state.lock().find(id).cloned()
    }

    /// Every registered bundle, in registration order.
    #[must_use]
    pub fn bundles(&self) -> Vec<BundleConfig> {
        self.inner.state.lock().bundles.clone()
    }

    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.inner.state.lock().loaded.contains(id)
    }

    #[must_use]
    pub fn stats(&self, id: &str) -> Option<BundleStats> {
        self.inner.state.lock().stats.get(id).copied()
    }

    /// Bundles listing `tour_id`, high → low priority.
    #[must_use]
    pub fn bundles_containing(&self, tour_id: &str) -> Vec<BundleConfig> {
        self.inner
            .state
            .lock()
            .by_priority()
            .into_iter()
            .filter(|bundle| bundle.contains(tour_id))
            .cloned()
            .collect()
    }

    /// Fetches every member of bundle `id`.
    ///
    /// A bundle already marked loaded is not fetched again: its load count is bumped and an
    /// empty set is returned with `already_loaded` set. A call arriving while the same bundle
    /// is being fetched waits for that load and is then treated as a repeat. Members that fail
    /// to load are dropped.
    ///
    /// # Errors
    /// [`TourError::UnknownBundle`] when `id` is not registered.
    #[instrument(skip(self))]
    pub async fn load_bundle(&self, id: &str) -> Result<BundleLoad, TourError> {
        let (bundle, sender) = loop {
            let mut pending = {
                let mut state = self.inner.state.lock();
                let bundle = state.find(id).cloned().ok_or_else(|| TourError::UnknownBundle {
                    message: id.to_owned().into(),
                    context: None,
                })?;

                if state.loaded.contains(id) {
                    let now = self.inner.clock.now();
                    let stats = state.stats.entry(id.to_owned()).or_default();
                    stats.load_count += 1;
                    stats.last_loaded = Some(now);
                    debug!(load_count = stats.load_count, "Bundle already loaded");
                    return Ok(BundleLoad {
                        bundle_id: id.to_owned(),
                        tours: Vec::new(),
                        load_time: Duration::ZERO,
                        already_loaded: true,
                    });
                }

                if let Some(receiver) = state.loading.get(id) {
                    receiver.clone()
                } else {
                    let (sender, receiver) = watch::channel(false);
                    state.loading.insert(id.to_owned(), receiver);
                    break (bundle, sender);
                }
            };

            // Either outcome sends us round again: loaded, or the leading load was dropped.
            if pending.wait_for(|done| *done).await.is_err() {
                debug!("In-flight bundle load abandoned");
            }
        };

        let guard = LoadingGuard { state: &self.inner.state, id };
        let started = self.inner.clock.now();
        let mut loaded = self.inner.loader.load_many(&bundle.tours).await;
        let tours: Vec<Arc<TourDefinition>> =
            bundle.tours.iter().filter_map(|tour| loaded.remove(tour)).collect();
        let load_time = self.inner.clock.now().saturating_sub(started);
        let estimated_size: u64 = tours.iter().map(|tour| estimate_size(tour)).sum();

        if estimated_size > bundle.max_size.saturating_mul(1024) {
            warn!(estimated_size, max_size_kib = bundle.max_size, "Bundle exceeds its size budget");
        }

        {
            let mut state = self.inner.state.lock();
            let stats = state.stats.entry(id.to_owned()).or_default();
            stats.estimated_size = estimated_size;
            stats.last_load_time = load_time;
            stats.load_count += 1;
            stats.last_loaded = Some(self.inner.clock.now());
            state.loaded.insert(id.to_owned());
        }
        drop(guard);
        sender.send_replace(true);

        info!(
            tours = tours.len(),
            expected = bundle.tours.len(),
            load_time_ms = load_time.as_millis(),
            "Bundle loaded"
        );
        Ok(BundleLoad { bundle_id: id.to_owned(), tours, load_time, already_loaded: false })
    }

    /// Partitions every registered bundle by load timing for `ctx`.
    #[must_use]
    pub fn recommendations(&self, ctx: &LoadContext) -> BundleRecommendations {
        let state = self.inner.state.lock();
        let mut recommendations = BundleRecommendations::default();
        for bundle in state.by_priority() {
            let (timing, rule) = recommend(bundle, ctx);
            debug!(bundle = %bundle.id, %timing, rule, "Bundle recommendation");
            recommendations.push(timing, bundle.id.clone());
        }
        recommendations
    }

    /// Loads every bundle recommended for immediate loading, high priority first.
    ///
    /// Failures are logged and skipped.
    #[instrument(skip_all)]
    pub async fn load_bundles_for_context(&self, ctx: &LoadContext) -> Vec<BundleLoad> {
        let immediate = self.recommendations(ctx).immediate;
        let mut loads = Vec::with_capacity(immediate.len());
        for id in &immediate {
            match self.load_bundle(id).await {
                Ok(load) => loads.push(load),
                Err(e) => warn!(bundle = %id, error = %e, "Skipping bundle"),
            }
        }
        loads
    }

    /// Splits slow, large bundles in two and promotes frequently loaded ones to eager.
    pub fn optimize_bundle_loading(&self) -> BundleOptimization {
        let tuning = &self.inner.tuning;
        let mut state = self.inner.state.lock();
        let mut report = BundleOptimization::default();
        let mut optimized = Vec::with_capacity(state.bundles.len());

        for mut bundle in std::mem::take(&mut state.bundles) {
            let stats = state.stats.get(&bundle.id).copied().unwrap_or_default();

            if stats.last_load_time > tuning.slow_bundle() && bundle.tours.len() > tuning.split_min_members {
                let [first, second] = split(&bundle);
                info!(
                    bundle = %bundle.id,
                    load_time_ms = stats.last_load_time.as_millis(),
                    parts = ?[&first.id, &second.id],
                    "Splitting slow bundle"
                );
                state.stats.remove(&bundle.id);
                state.loaded.remove(&bundle.id);
                report.split.push(BundleSplit {
                    original: bundle.id,
                    parts: [first.id.clone(), second.id.clone()],
                });
                optimized.push(first);
                optimized.push(second);
                continue;
            }

            if stats.load_count > tuning.promote_after_loads && bundle.strategy != LoadStrategy::Eager {
                info!(bundle = %bundle.id, load_count = stats.load_count, "Promoting bundle to eager");
                bundle.strategy = LoadStrategy::Eager;
                report.promoted.push(bundle.id.clone());
            }
            optimized.push(bundle);
        }

        state.bundles = optimized;
        report
    }

    #[must_use]
    pub fn bundle_stats(&self) -> BundleStatsReport {
        let state = self.inner.state.lock();

        let bundles: Vec<BundleDetail> = state
            .bundles
            .iter()
            .map(|bundle| BundleDetail {
                id: bundle.id.clone(),
                priority: bundle.priority,
                strategy: bundle.strategy,
                tours: bundle.tours.len(),
                max_size: bundle.max_size,
                loaded: state.loaded.contains(&bundle.id),
                stats: state.stats.get(&bundle.id).copied(),
            })
            .collect();

        let measured: Vec<&BundleStats> = state.stats.values().filter(|s| s.last_loaded.is_some()).collect();
        let total_time: Duration = measured.iter().map(|s| s.last_load_time).sum();
        let average_load_time = u32::try_from(measured.len())
            .ok()
            .filter(|count| *count > 0)
            .map_or(Duration::ZERO, |count| total_time / count);

        BundleStatsReport {
            total_bundles: state.bundles.len(),
            loaded_bundles: state.loaded.len(),
            average_load_time,
            total_size: state.stats.values().map(|s| s.estimated_size).sum(),
            bundles,
        }
    }

    /// Forgets loaded flags and statistics. The registry itself is kept.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.loaded.clear();
        state.stats.clear();
    }
}

/// First half gets `ceil(n / 2)` members; both halves get half the size budget.
fn split(bundle: &BundleConfig) -> [BundleConfig; 2] {
    let (head, tail) = bundle.tours.split_at(bundle.tours.len().div_ceil(2));
    let part = |suffix: u8, tours: &[String]| BundleConfig {
        id: format!("{}-part-{suffix}", bundle.id),
        tours: tours.to_vec(),
        max_size: bundle.max_size / 2,
        ..bundle.clone()
    };
    [part(1, head), part(2, tail)]
}

pub(crate) fn estimate_size(tour: &TourDefinition) -> u64 {
    serde_json::to_vec(tour).map_or(0, |bytes| bytes.len() as u64)
}
