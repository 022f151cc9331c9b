//! Top-level facade over the loader and the bundle manager.
//!
//! Every request is routed down the cheapest available path (orchestrator cache, a matching
//! bundle, then the lazy loader) and the outcome is recorded in rolling metrics that drive the
//! preload strategy.

use crate::bundle::{BundleManager, BundleOptimization, BundleStatsReport, estimate_size};
use crate::cache::{CachePriority, CacheStore};
use crate::error::TourError;
use crate::loader::{CacheStats, LazyLoader};
use crate::maintenance::{MaintenanceTask, spawn_periodic};
use crate::metrics::{self, LoadEvent, LoadSource, MetricsSnapshot, PerformanceMetrics, RecentWindow};
use futures::future::join_all;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tourline_domain::bundle::{BundlePriority, LoadStrategy};
use tourline_domain::config::OrchestratorConfig;
use tourline_domain::context::LoadContext;
use tourline_domain::tour::TourDefinition;
use tourline_kernel::clock::SharedClock;
use tracing::{debug, info, instrument, warn};

/// How aggressively the orchestrator preloads.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PreloadStrategy {
    Aggressive,
    #[default]
    Balanced,
    Conservative,
}

/// The bundle a tour was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub id: String,
    pub priority: BundlePriority,
    pub strategy: LoadStrategy,
    pub tours: usize,
}

#[derive(Debug, Clone)]
pub struct TourLoad {
    pub definition: Arc<TourDefinition>,
    pub load_time: Duration,
    pub source: LoadSource,
    pub bundle: Option<BundleInfo>,
}

#[derive(Debug, Clone)]
pub struct InitializationReport {
    /// Definitions fetched by this call.
    pub preloaded: Vec<Arc<TourDefinition>>,
    /// Bundles recommended for immediate loading in the given context.
    pub recommended_bundles: Vec<String>,
    pub strategy: PreloadStrategy,
    pub estimated_time_saved: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    pub before: MetricsSnapshot,
    pub after: MetricsSnapshot,
    pub expired_swept: usize,
    pub bundles: BundleOptimization,
    pub strategy_before: PreloadStrategy,
    pub strategy_after: PreloadStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub metrics: MetricsSnapshot,
    pub recent: Vec<LoadEvent>,
    pub recommendations: Vec<String>,
    pub strategy: PreloadStrategy,
}

#[derive(Debug)]
pub struct OrchestratorInner {
    loader: LazyLoader,
    bundles: BundleManager,
    cache: CacheStore<Arc<TourDefinition>>,
    metrics: Mutex<PerformanceMetrics>,
    strategy: Mutex<PreloadStrategy>,
    config: OrchestratorConfig,
    clock: SharedClock,
}

impl OrchestratorInner {
    fn sweep(&self) -> usize {
        self.cache.sweep_expired() + self.loader.sweep_expired()
    }

    fn memory_usage(&self) -> u64 {
        self.cache.values().iter().map(|tour| estimate_size(tour)).sum()
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let memory_usage = self.memory_usage();
        self.metrics.lock().snapshot(memory_usage)
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl PerformanceOrchestrator {
    #[must_use]
    pub fn new(
        loader: LazyLoader,
        bundles: BundleManager,
        config: OrchestratorConfig,
        clock: SharedClock,
    ) -> Self {
        let cache = CacheStore::new(loader.config().cache_ttl(), config.cache_size, Arc::clone(&clock));
        let inner = OrchestratorInner {
            metrics: Mutex::new(PerformanceMetrics::new(config.history_size)),
            strategy: Mutex::new(PreloadStrategy::default()),
            loader,
            bundles,
            cache,
            config,
            clock,
        };
        Self { inner: Arc::new(inner) }
    }

    #[must_use]
    pub fn strategy(&self) -> PreloadStrategy {
        *self.inner.strategy.lock()
    }

    /// Serves one tour from the orchestrator cache, a context-recommended bundle, or the
    /// lazy loader, in that order.
    ///
    /// # Errors
    /// Whatever the lazy loader reports when neither the cache nor a bundle had the tour.
    #[instrument(skip(self, ctx))]
    pub async fn load_tour(&self, id: &str, ctx: Option<&LoadContext>) -> Result<TourLoad, TourError> {
        let started = self.inner.clock.now();

        if let Some(definition) = self.inner.cache.get(id) {
            let load_time = self.elapsed(started);
            self.record(id, LoadSource::Cache, load_time);
            return Ok(TourLoad { definition, load_time, source: LoadSource::Cache, bundle: None });
        }

        if let Some(ctx) = ctx {
            for candidate in self.bundle_candidates(id, ctx) {
                let Some((definition, bundle)) = self.load_via_bundle(id, &candidate).await else {
                    continue;
                };
                let load_time = self.elapsed(started);
                self.record(id, LoadSource::Bundle, load_time);
                return Ok(TourLoad { definition, load_time, source: LoadSource::Bundle, bundle: Some(bundle) });
            }
        }

        let loaded = self.inner.loader.load_one(id).await?;
        self.store(&loaded.definition, CachePriority::Medium);
        if !loaded.stats.from_cache {
            self.inner.metrics.lock().record_network_requests(1);
        }
        let load_time = self.elapsed(started);
        self.record(id, LoadSource::Lazy, load_time);
        Ok(TourLoad { definition: loaded.definition, load_time, source: LoadSource::Lazy, bundle: None })
    }

    /// Loads a set of tours, each through its cheapest path.
    ///
    /// Ids are partitioned into cached, bundle-matched and individual loads; the bundle and
    /// individual partitions run concurrently. Failures are logged and left out of the map.
    #[instrument(skip_all)]
    pub async fn load_tours<I, S>(
        &self,
        ids: I,
        ctx: Option<&LoadContext>,
    ) -> FxHashMap<String, Arc<TourDefinition>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = self.inner.clock.now();
        let mut results = FxHashMap::default();
        let mut by_bundle: Vec<(String, Vec<String>)> = Vec::new();
        let mut individual: Vec<String> = Vec::new();
        let mut seen = FxHashSet::default();

        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id.to_owned()) {
                continue;
            }
            if let Some(definition) = self.inner.cache.get(id) {
                self.record(id, LoadSource::Cache, self.elapsed(started));
                results.insert(id.to_owned(), definition);
                continue;
            }

            let bundle = ctx.and_then(|ctx| self.bundle_candidates(id, ctx).into_iter().next());
            match bundle {
                Some(bundle) => match by_bundle.iter_mut().find(|(candidate, _)| *candidate == bundle) {
                    Some((_, members)) => members.push(id.to_owned()),
                    None => by_bundle.push((bundle, vec![id.to_owned()])),
                },
                None => individual.push(id.to_owned()),
            }
        }

        debug!(
            cached = results.len(),
            bundles = by_bundle.len(),
            individual = individual.len(),
            "Partitioned tour batch"
        );

        let bundle_loads = join_all(by_bundle.iter().map(|(bundle, _)| self.inner.bundles.load_bundle(bundle)));
        let lazy_loads = join_all(individual.iter().map(|id| self.inner.loader.load_one(id)));
        let (bundle_loads, lazy_loads) = futures::join!(bundle_loads, lazy_loads);

        let mut leftovers = Vec::new();
        for ((bundle_id, requested), load) in by_bundle.into_iter().zip(bundle_loads) {
            let tours = match load {
                Ok(load) => {
                    self.absorb_bundle(&load.tours);
                    load.tours
                },
                Err(e) => {
                    warn!(bundle = %bundle_id, error = %e, "Bundle load failed, falling back");
                    Vec::new()
                },
            };
            for id in requested {
                match tours.iter().find(|tour| tour.id == id) {
                    Some(definition) => {
                        self.record(&id, LoadSource::Bundle, self.elapsed(started));
                        results.insert(id, Arc::clone(definition));
                    },
                    None => leftovers.push(id),
                }
            }
        }

        let leftover_loads = join_all(leftovers.iter().map(|id| self.inner.loader.load_one(id))).await;
        for (id, load) in individual.into_iter().zip(lazy_loads).chain(leftovers.into_iter().zip(leftover_loads)) {
            match load {
                Ok(loaded) => {
                    self.store(&loaded.definition, CachePriority::Medium);
                    if !loaded.stats.from_cache {
                        self.inner.metrics.lock().record_network_requests(1);
                    }
                    self.record(&id, LoadSource::Lazy, self.elapsed(started));
                    results.insert(id, loaded.definition);
                },
                Err(e) => warn!(tour = %id, error = %e, "Dropping tour from batch"),
            }
        }

        results
    }

    /// Loads every member of `category`, in registration order.
    ///
    /// # Errors
    /// [`TourError::UnknownCategory`] when no registered tour belongs to `category`.
    #[instrument(skip(self, _ctx))]
    pub async fn load_tour_category(
        &self,
        category: &str,
        _ctx: Option<&LoadContext>,
    ) -> Result<Vec<Arc<TourDefinition>>, TourError> {
        let started = self.inner.clock.now();

        let cached: Option<Vec<Arc<TourDefinition>>> = self
            .inner
            .loader
            .registry()
            .category_members(category)
            .and_then(|members| members.iter().map(|id| self.inner.cache.peek(id)).collect());
        if let Some(tours) = cached {
            for tour in &tours {
                // Touch entries so they count as accessed.
                self.inner.cache.get(&tour.id);
                self.record(&tour.id, LoadSource::Cache, self.elapsed(started));
            }
            return Ok(tours);
        }

        let loaded = self.inner.loader.load_category(category).await?;
        let source = if loaded.stats.from_cache { LoadSource::Cache } else { LoadSource::Lazy };
        let per_tour = u32::try_from(loaded.tours.len())
            .ok()
            .filter(|count| *count > 0)
            .map_or(Duration::ZERO, |count| loaded.stats.load_time / count);

        for tour in &loaded.tours {
            self.store(tour, CachePriority::Medium);
            self.record(&tour.id, source, per_tour);
        }
        Ok(loaded.tours)
    }

    /// Preloads what `ctx` calls for under the strategy the current metrics select.
    ///
    /// The strategy is chosen from the recent metrics window as it stands before anything is
    /// loaded here.
    #[instrument(skip_all)]
    pub async fn initialize_for_context(&self, ctx: &LoadContext) -> InitializationReport {
        let (recent, average) = {
            let metrics = self.inner.metrics.lock();
            (metrics.recent(self.inner.config.recent_window), metrics.average_load_time())
        };
        let strategy = self.select_strategy(&recent);
        self.switch_strategy(strategy, "context initialization");

        let recommendations = self.inner.bundles.recommendations(ctx);
        let targets: Vec<String> = match strategy {
            PreloadStrategy::Aggressive => {
                let mut targets = recommendations.immediate.clone();
                for bundle in self.inner.bundles.bundles() {
                    if bundle.priority == BundlePriority::High && !targets.contains(&bundle.id) {
                        targets.push(bundle.id);
                    }
                }
                targets
            },
            PreloadStrategy::Balanced => recommendations.immediate.clone(),
            PreloadStrategy::Conservative => recommendations.immediate.iter().take(1).cloned().collect(),
        };

        let mut preloaded: Vec<Arc<TourDefinition>> = Vec::new();
        let mut seen = FxHashSet::default();
        for bundle_id in &targets {
            match self.inner.bundles.load_bundle(bundle_id).await {
                Ok(load) => {
                    self.absorb_bundle(&load.tours);
                    preloaded.extend(load.tours.into_iter().filter(|tour| seen.insert(tour.id.clone())));
                },
                Err(e) => warn!(bundle = %bundle_id, error = %e, "Skipping bundle preload"),
            }
        }

        if strategy == PreloadStrategy::Aggressive {
            for id in self.inner.loader.preload_frequent_tours().await {
                if let Some(definition) = self.inner.loader.cached(&id) {
                    self.store(&definition, CachePriority::Medium);
                    if seen.insert(id) {
                        self.inner.metrics.lock().record_network_requests(1);
                        preloaded.push(definition);
                    }
                }
            }
        }

        let baseline = Duration::from_millis(self.inner.config.baseline_load_ms);
        let per_load = average.unwrap_or(baseline);
        let estimated_time_saved = per_load.saturating_mul(u32::try_from(preloaded.len()).unwrap_or(u32::MAX));

        info!(
            %strategy,
            bundles = targets.len(),
            preloaded = preloaded.len(),
            saved_ms = estimated_time_saved.as_millis(),
            "Initialized for context"
        );

        InitializationReport {
            preloaded,
            recommended_bundles: recommendations.immediate,
            strategy,
            estimated_time_saved,
        }
    }

    /// Sweeps expired entries, runs bundle optimization and re-evaluates the strategy.
    ///
    /// A slow recent window switches to conservative; otherwise a cold one switches to
    /// aggressive.
    #[instrument(skip(self))]
    pub fn optimize_performance(&self) -> OptimizationReport {
        let before = self.inner.snapshot();
        let strategy_before = self.strategy();

        let expired_swept = self.inner.sweep();
        let bundles = self.inner.bundles.optimize_bundle_loading();

        let recent = self.inner.metrics.lock().recent(self.inner.config.recent_window);
        let strategy_after = if recent.events == 0 {
            strategy_before
        } else if recent.average_load_time > Duration::from_millis(self.inner.config.slow_load_ms) {
            PreloadStrategy::Conservative
        } else if recent.hit_rate < self.inner.config.low_hit_rate {
            PreloadStrategy::Aggressive
        } else {
            strategy_before
        };
        self.switch_strategy(strategy_after, "performance optimization");

        OptimizationReport {
            before,
            after: self.inner.snapshot(),
            expired_swept,
            bundles,
            strategy_before,
            strategy_after,
        }
    }

    #[must_use]
    pub fn performance_metrics(&self) -> PerformanceReport {
        let metrics = self.inner.snapshot();
        let recent = self.inner.metrics.lock().recent_events(self.inner.config.recent_window);
        let recommendations = metrics::recommendations(
            &metrics,
            self.inner.config.low_hit_rate,
            Duration::from_millis(self.inner.config.conservative_load_ms),
        );
        PerformanceReport { metrics, recent, recommendations, strategy: self.strategy() }
    }

    #[must_use]
    pub fn recent_window(&self) -> RecentWindow {
        self.inner.metrics.lock().recent(self.inner.config.recent_window)
    }

    /// Statistics of the orchestrator cache.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.inner.cache.len(),
            hit_rate: self.inner.cache.hit_rate(),
            average_load_time: self.inner.metrics.lock().average_load_time().unwrap_or_default(),
            most_accessed: self.inner.cache.most_accessed(5),
        }
    }

    #[must_use]
    pub fn bundle_stats(&self) -> BundleStatsReport {
        self.inner.bundles.bundle_stats()
    }

    /// Evicts `ids` here and in the loader.
    pub fn invalidate<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_owned()).collect();
        for id in &ids {
            self.inner.cache.remove(id);
        }
        self.inner.loader.invalidate(&ids);
    }

    /// Empties every cache. Metrics are kept; see [`Self::reset_metrics`].
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.cache.reset_counters();
        self.inner.loader.clear_cache();
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.lock().reset();
        debug!("Performance metrics reset");
    }

    /// Starts the periodic sweep of every cache.
    pub fn spawn_maintenance(&self, period: Duration) -> MaintenanceTask {
        spawn_periodic("tour-orchestrator-sweep", Arc::downgrade(&self.inner), period, |inner| {
            let removed = inner.sweep();
            let snapshot = inner.snapshot();
            debug!(
                removed,
                total_loads = snapshot.total_loads,
                hit_rate = snapshot.cache_hit_rate,
                average_ms = snapshot.average_load_time.as_millis(),
                "Tour pipeline maintenance"
            );
        })
    }

    /// Bundles worth loading for `id` under `ctx`: immediate, then on-demand
    /// recommendations that list it and are not loaded yet.
    fn bundle_candidates(&self, id: &str, ctx: &LoadContext) -> Vec<String> {
        let recommendations = self.inner.bundles.recommendations(ctx);
        recommendations
            .immediate
            .into_iter()
            .chain(recommendations.on_demand)
            .filter(|bundle_id| {
                !self.inner.bundles.is_loaded(bundle_id)
                    && self.inner.bundles.bundle(bundle_id).is_some_and(|bundle| bundle.contains(id))
            })
            .collect()
    }

    async fn load_via_bundle(&self, id: &str, bundle_id: &str) -> Option<(Arc<TourDefinition>, BundleInfo)> {
        let load = match self.inner.bundles.load_bundle(bundle_id).await {
            Ok(load) => load,
            Err(e) => {
                warn!(bundle = %bundle_id, error = %e, "Bundle load failed, falling back");
                return None;
            },
        };
        self.absorb_bundle(&load.tours);

        let definition = load.tours.iter().find(|tour| tour.id == id).cloned()?;
        let config = self.inner.bundles.bundle(bundle_id)?;
        Some((definition, BundleInfo {
            id: config.id,
            priority: config.priority,
            strategy: config.strategy,
            tours: config.tours.len(),
        }))
    }

    fn absorb_bundle(&self, tours: &[Arc<TourDefinition>]) {
        for tour in tours {
            self.store(tour, CachePriority::High);
        }
        self.inner.metrics.lock().record_network_requests(tours.len() as u64);
    }

    fn store(&self, definition: &Arc<TourDefinition>, priority: CachePriority) {
        self.inner.cache.insert_with_priority(definition.id.as_str(), Arc::clone(definition), priority);
    }

    fn record(&self, id: &str, source: LoadSource, load_time: Duration) {
        let event = LoadEvent { tour_id: id.to_owned(), source, load_time, at: self.inner.clock.now() };
        self.inner.metrics.lock().record(event);
    }

    fn elapsed(&self, started: Duration) -> Duration {
        self.inner.clock.now().saturating_sub(started)
    }

    fn select_strategy(&self, recent: &RecentWindow) -> PreloadStrategy {
        let config = &self.inner.config;
        if recent.events > 0 && recent.hit_rate > config.aggressive_hit_rate {
            PreloadStrategy::Aggressive
        } else if recent.average_load_time > Duration::from_millis(config.conservative_load_ms) {
            PreloadStrategy::Conservative
        } else {
            PreloadStrategy::Balanced
        }
    }

    fn switch_strategy(&self, next: PreloadStrategy, reason: &'static str) {
        let previous = std::mem::replace(&mut *self.inner.strategy.lock(), next);
        if previous != next {
            info!(from = %previous, to = %next, reason, "Preload strategy switched");
        }
    }
}
