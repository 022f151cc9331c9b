//! Deduplicating lazy loader.
//!
//! Per id the loader walks `NotLoaded → Loading → Cached`. A cache hit returns at once; a
//! request for an id that is already `Loading` subscribes to the outcome of the fetch in
//! progress; anything else becomes the leader, calls the resolver, validates the payload and
//! publishes the result to every subscriber. A failed or abandoned fetch leaves no trace, so
//! the next request starts again from `NotLoaded`.

use crate::cache::CacheStore;
use crate::error::{TourError, TourErrorExt};
use crate::maintenance::{MaintenanceTask, spawn_periodic};
use crate::registry::TourRegistry;
use crate::validator::TourValidator;
use futures::future::join_all;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tourline_domain::config::LoaderConfig;
use tourline_domain::tour::TourDefinition;
use tourline_kernel::clock::SharedClock;
use tracing::{debug, instrument, trace, warn};

type SharedOutcome = Option<Result<Arc<TourDefinition>, TourError>>;

/// How a single `load_one` call was served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub load_time: Duration,
    /// No resolver call was needed for this request.
    pub from_cache: bool,
    /// Served straight from the item cache.
    pub cache_hit: bool,
    /// Joined a fetch another request had already started.
    pub shared: bool,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub definition: Arc<TourDefinition>,
    pub stats: LoadStats,
}

#[derive(Debug, Clone)]
pub struct CategoryLoad {
    pub category: String,
    /// Loaded members in registration order.
    pub tours: Vec<Arc<TourDefinition>>,
    pub stats: LoadStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub hit_rate: f64,
    /// Mean resolver round trip over every successful fetch.
    pub average_load_time: Duration,
    pub most_accessed: Vec<(String, u64)>,
}

#[derive(Debug, Default)]
struct LoadLedger {
    requests: FxHashMap<String, u64>,
    fetches: u64,
    fetch_time: Duration,
}

impl LoadLedger {
    fn record_request(&mut self, id: &str) -> u64 {
        let count = self.requests.entry(id.to_owned()).or_default();
        *count += 1;
        *count
    }

    fn forget(&mut self, ids: &FxHashSet<String>) {
        self.requests.retain(|id, _| !ids.contains(id));
    }

    fn record_fetch(&mut self, elapsed: Duration) {
        self.fetches += 1;
        self.fetch_time += elapsed;
    }

    fn average_fetch_time(&self) -> Duration {
        u32::try_from(self.fetches)
            .ok()
            .filter(|fetches| *fetches > 0)
            .map_or(Duration::ZERO, |fetches| self.fetch_time / fetches)
    }
}

enum Acquired {
    Cached(Arc<TourDefinition>),
    Shared(Arc<TourDefinition>),
    Fetched(Arc<TourDefinition>),
}

impl Acquired {
    fn into_result(self, load_time: Duration) -> (LoadResult, bool) {
        let (definition, stats, fetched) = match self {
            Self::Cached(definition) => (
                definition,
                LoadStats { load_time, from_cache: true, cache_hit: true, shared: false },
                false,
            ),
            Self::Shared(definition) => (
                definition,
                LoadStats { load_time, from_cache: true, cache_hit: false, shared: true },
                false,
            ),
            Self::Fetched(definition) => (
                definition,
                LoadStats { load_time, from_cache: false, cache_hit: false, shared: false },
                true,
            ),
        };
        (LoadResult { definition, stats }, fetched)
    }
}

enum Role {
    Leader(watch::Sender<SharedOutcome>),
    Follower(watch::Receiver<SharedOutcome>),
}

/// Clears the in-flight slot when the leading fetch finishes or is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<FxHashMap<String, watch::Receiver<SharedOutcome>>>,
    id: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.id);
    }
}

#[derive(Debug)]
pub struct LoaderInner {
    registry: Arc<TourRegistry>,
    validator: Arc<dyn TourValidator>,
    cache: CacheStore<Arc<TourDefinition>>,
    categories: CacheStore<Arc<[Arc<TourDefinition>]>>,
    in_flight: Mutex<FxHashMap<String, watch::Receiver<SharedOutcome>>>,
    ledger: Mutex<LoadLedger>,
    config: LoaderConfig,
    clock: SharedClock,
}

impl LoaderInner {
    fn sweep(&self) -> usize {
        let removed = self.cache.sweep_expired() + self.categories.sweep_expired();
        if removed > 0 {
            debug!(removed, "Swept expired tour cache entries");
        }
        removed
    }
}

/// Cheap-clone handle to the shared loader.
#[derive(Debug, Clone)]
pub struct LazyLoader {
    inner: Arc<LoaderInner>,
}

impl LazyLoader {
    #[must_use]
    pub fn new(
        registry: Arc<TourRegistry>,
        validator: Arc<dyn TourValidator>,
        config: LoaderConfig,
        clock: SharedClock,
    ) -> Self {
        let ttl = config.cache_ttl();
        let inner = LoaderInner {
            cache: CacheStore::new(ttl, config.max_cache_size, Arc::clone(&clock)),
            categories: CacheStore::new(ttl, config.max_cache_size, Arc::clone(&clock)),
            registry,
            validator,
            in_flight: Mutex::new(FxHashMap::default()),
            ledger: Mutex::new(LoadLedger::default()),
            config,
            clock,
        };
        Self { inner: Arc::new(inner) }
    }

    #[must_use]
    pub fn registry(&self) -> &TourRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_cached(&self, id: &str) -> bool {
        self.inner.cache.contains(id)
    }

    /// Cached definition for `id`, without counting an access.
    #[must_use]
    pub fn cached(&self, id: &str) -> Option<Arc<TourDefinition>> {
        self.inner.cache.peek(id)
    }

    #[must_use]
    pub fn is_loading(&self, id: &str) -> bool {
        self.inner.in_flight.lock().contains_key(id)
    }

    /// Resolves one tour.
    ///
    /// # Errors
    /// [`TourError::NotFound`] for an unmapped id, [`TourError::Fetch`] when the resolver
    /// rejects, [`TourError::Validation`] when the payload is malformed or carries another id.
    /// Concurrent requests for the same id share one outcome.
    #[instrument(skip(self))]
    pub async fn load_one(&self, id: &str) -> Result<LoadResult, TourError> {
        let started = self.inner.clock.now();
        if !self.inner.registry.contains(id) {
            debug!("Tour is not registered");
            return Err(TourError::not_found(id));
        }
        let requests = self.inner.ledger.lock().record_request(id);

        let acquired = self.acquire(id).await.inspect_err(|e| debug!(error = %e, "Tour load failed"))?;
        let load_time = self.inner.clock.now().saturating_sub(started);
        let (result, fetched) = acquired.into_result(load_time);

        debug!(
            from_cache = result.stats.from_cache,
            shared = result.stats.shared,
            load_time_ms = load_time.as_millis(),
            "Tour loaded"
        );

        if fetched && requests >= self.inner.config.frequent_threshold {
            self.preload_siblings(id);
        }
        Ok(result)
    }

    /// Loads every id, grouped by category, each group concurrently.
    ///
    /// Failing ids are logged and left out of the map; this never fails as a whole.
    #[instrument(skip_all)]
    pub async fn load_many<I, S>(&self, ids: I) -> FxHashMap<String, Arc<TourDefinition>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = FxHashSet::default();
        let mut groups: FxHashMap<&str, Vec<String>> = FxHashMap::default();
        for id in ids {
            let id = id.as_ref();
            if seen.insert(id.to_owned()) {
                let category = self.inner.registry.category_of(id).unwrap_or_default();
                groups.entry(category).or_default().push(id.to_owned());
            }
        }

        let batches = groups.into_iter().map(|(category, ids)| async move {
            let results = join_all(ids.iter().map(|id| self.load_one(id))).await;
            ids.into_iter()
                .zip(results)
                .filter_map(|(id, result)| match result {
                    Ok(loaded) => Some((id, loaded.definition)),
                    Err(e) => {
                        warn!(tour = %id, category, error = %e, "Dropping tour from batch");
                        None
                    },
                })
                .collect::<Vec<_>>()
        });

        join_all(batches).await.into_iter().flatten().collect()
    }

    /// Loads every member of `category`.
    ///
    /// A complete load is cached as one unit, so repeat calls skip the per-item path. A
    /// partial load is returned but not cached.
    ///
    /// # Errors
    /// [`TourError::UnknownCategory`] when no registered tour belongs to `category`.
    #[instrument(skip(self))]
    pub async fn load_category(&self, category: &str) -> Result<CategoryLoad, TourError> {
        let started = self.inner.clock.now();
        let members = self
            .inner
            .registry
            .category_members(category)
            .ok_or_else(|| TourError::UnknownCategory {
                message: category.to_owned().into(),
                context: None,
            })?
            .to_vec();

        if let Some(unit) = self.inner.categories.get(category) {
            let load_time = self.inner.clock.now().saturating_sub(started);
            debug!(members = unit.len(), "Category served from cache");
            return Ok(CategoryLoad {
                category: category.to_owned(),
                tours: unit.to_vec(),
                stats: LoadStats { load_time, from_cache: true, cache_hit: true, shared: false },
            });
        }

        let mut loaded = self.load_many(&members).await;
        let tours: Vec<Arc<TourDefinition>> =
            members.iter().filter_map(|id| loaded.remove(id)).collect();

        if tours.len() == members.len() {
            self.inner.categories.insert(category, Arc::from(tours.as_slice()));
        } else {
            warn!(
                loaded = tours.len(),
                expected = members.len(),
                "Category loaded partially, not caching"
            );
        }

        let load_time = self.inner.clock.now().saturating_sub(started);
        Ok(CategoryLoad {
            category: category.to_owned(),
            tours,
            stats: LoadStats { load_time, ..LoadStats::default() },
        })
    }

    /// Fetches uncached siblings of every cached tour whose access count reached the
    /// frequent threshold. Returns the ids that were newly fetched.
    #[instrument(skip(self))]
    pub async fn preload_frequent_tours(&self) -> Vec<String> {
        let frequent = self.inner.cache.frequent(self.inner.config.frequent_threshold);
        let mut related: Vec<String> = frequent
            .iter()
            .flat_map(|id| self.inner.registry.siblings(id))
            .filter(|id| !self.inner.cache.contains(id))
            .collect();
        related.sort();
        related.dedup();

        if related.is_empty() {
            return Vec::new();
        }
        debug!(frequent = frequent.len(), related = related.len(), "Preloading related tours");
        self.preload(related).await
    }

    /// Ids the cache has served at least `threshold` times.
    #[must_use]
    pub fn frequent_tours(&self, threshold: u64) -> Vec<String> {
        self.inner.cache.frequent(threshold)
    }

    /// Evicts `ids` and every cached category unit containing one of them.
    pub fn invalidate<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: FxHashSet<String> = ids.into_iter().map(|id| id.as_ref().to_owned()).collect();
        for id in &ids {
            self.inner.cache.remove(id);
        }
        self.inner.ledger.lock().forget(&ids);
        let units = self
            .inner
            .categories
            .remove_where(|_, tours| tours.iter().any(|tour| ids.contains(&tour.id)));
        debug!(tours = ids.len(), units, "Invalidated cached tours");
    }

    /// Drops every cached tour and category unit and resets hit and request counters.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.categories.clear();
        self.inner.cache.reset_counters();
        self.inner.categories.reset_counters();
        self.inner.ledger.lock().requests.clear();
        debug!("Tour cache cleared");
    }

    /// Removes expired entries from both caches; returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.inner.cache.len(),
            hit_rate: self.inner.cache.hit_rate(),
            average_load_time: self.average_load_time(),
            most_accessed: self.inner.cache.most_accessed(5),
        }
    }

    #[must_use]
    pub fn average_load_time(&self) -> Duration {
        self.inner.ledger.lock().average_fetch_time()
    }

    /// Starts the periodic TTL sweep.
    pub fn spawn_maintenance(&self, period: Duration) -> MaintenanceTask {
        spawn_periodic("tour-cache-sweep", Arc::downgrade(&self.inner), period, |inner| {
            inner.sweep();
        })
    }

    async fn acquire(&self, id: &str) -> Result<Acquired, TourError> {
        loop {
            if let Some(definition) = self.inner.cache.get(id) {
                return Ok(Acquired::Cached(definition));
            }

            let role = {
                let mut in_flight = self.inner.in_flight.lock();
                if let Some(receiver) = in_flight.get(id) {
                    Role::Follower(receiver.clone())
                } else {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(id.to_owned(), receiver);
                    Role::Leader(sender)
                }
            };

            match role {
                Role::Leader(sender) => return self.fetch(id, &sender).await.map(Acquired::Fetched),
                Role::Follower(mut receiver) => {
                    let outcome =
                        receiver.wait_for(Option::is_some).await.map(|outcome| outcome.clone());
                    match outcome {
                        Ok(Some(Ok(definition))) => return Ok(Acquired::Shared(definition)),
                        Ok(Some(Err(e))) => return Err(e),
                        // The leading request went away without an outcome; start over.
                        Ok(None) | Err(_) => trace!(tour = %id, "In-flight fetch abandoned"),
                    }
                },
            }
        }
    }

    async fn fetch(
        &self,
        id: &str,
        sender: &watch::Sender<SharedOutcome>,
    ) -> Result<Arc<TourDefinition>, TourError> {
        let _guard = InFlightGuard { in_flight: &self.inner.in_flight, id };
        let started = self.inner.clock.now();

        let outcome = self.resolve_and_validate(id).await;
        if let Ok(definition) = &outcome {
            let elapsed = self.inner.clock.now().saturating_sub(started);
            self.inner.ledger.lock().record_fetch(elapsed);
            if let Some(evicted) = self.inner.cache.insert(id, Arc::clone(definition)) {
                trace!(tour = %evicted, "Evicted to make room");
            }
        }

        sender.send_replace(Some(outcome.clone()));
        outcome
    }

    async fn resolve_and_validate(&self, id: &str) -> Result<Arc<TourDefinition>, TourError> {
        let resolver = self.inner.registry.resolver(id)?;
        let raw = resolver.resolve().await.map_err(|e| TourError::Fetch {
            message: e.to_string().into(),
            context: Some(format!("Resolving tour '{id}'").into()),
        })?;

        let definition = self.inner.validator.validate(raw).context(format!("Validating tour '{id}'"))?;
        if definition.id != id {
            return Err(TourError::Validation {
                message: format!("payload declares id '{}'", definition.id).into(),
                context: Some(format!("Validating tour '{id}'").into()),
            });
        }
        Ok(Arc::new(definition))
    }

    fn preload_siblings(&self, id: &str) {
        if !self.inner.config.preload_siblings {
            return;
        }
        let siblings: Vec<String> = self
            .inner
            .registry
            .siblings(id)
            .into_iter()
            .filter(|sibling| !self.is_cached(sibling) && !self.is_loading(sibling))
            .collect();
        if siblings.is_empty() {
            return;
        }

        debug!(tour = %id, siblings = siblings.len(), "Preloading category siblings");
        let loader = self.clone();
        tokio::spawn(async move {
            loader.preload(siblings).await;
        });
    }

    /// Fetches `ids` without request accounting; returns the ids this call fetched.
    async fn preload(&self, ids: Vec<String>) -> Vec<String> {
        let results = join_all(ids.iter().map(|id| self.acquire(id))).await;
        ids.into_iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(Acquired::Fetched(_)) => Some(id),
                Ok(_) => None,
                Err(e) => {
                    debug!(tour = %id, error = %e, "Preload skipped");
                    None
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResolveError;
    use crate::validator::SchemaValidator;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tourline_kernel::clock::TokioClock;

    fn tour(id: &str) -> Value {
        json!({
            "id": id,
            "name": id,
            "category": "onboarding",
            "steps": [{ "id": "intro", "title": "Intro" }]
        })
    }

    fn counting(
        id: &'static str,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> futures::future::BoxFuture<'static, Result<Value, ResolveError>> + Send + Sync {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok(tour(id))
            })
        }
    }

    fn loader(registry: TourRegistry) -> LazyLoader {
        let config = LoaderConfig { preload_siblings: false, ..LoaderConfig::default() };
        LazyLoader::new(Arc::new(registry), Arc::new(SchemaValidator), config, TokioClock::shared())
    }

    #[tokio::test(start_paused = true)]
    async fn guard_clears_slot_when_leader_is_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(TourRegistry::builder().tour("a", "onboarding", counting("a", Arc::clone(&calls))).build());

        let abandoned = tokio::time::timeout(Duration::from_millis(5), loader.load_one("a")).await;
        assert!(abandoned.is_err());
        assert!(!loader.is_loading("a"));

        let loaded = loader.load_one("a").await.expect("retry succeeds");
        assert!(!loaded.stats.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn followers_report_shared_outcome() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(TourRegistry::builder().tour("a", "onboarding", counting("a", Arc::clone(&calls))).build());

        let (first, second) = tokio::join!(loader.load_one("a"), loader.load_one("a"));
        let (first, second) = (first.expect("leader"), second.expect("follower"));

        assert!(!first.stats.from_cache);
        assert!(second.stats.shared && second.stats.from_cache && !second.stats.cache_hit);
        assert!(Arc::ptr_eq(&first.definition, &second.definition));
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_ids_leave_no_request_counts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(TourRegistry::builder().tour("a", "onboarding", counting("a", Arc::clone(&calls))).build());

        for i in 0..1_000 {
            let err = loader.load_one(&format!("missing-{i}")).await.unwrap_err();
            assert!(matches!(err, TourError::NotFound { .. }));
        }
        assert!(loader.inner.ledger.lock().requests.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_counts_follow_cache_eviction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(
            TourRegistry::builder()
                .tour("a", "onboarding", counting("a", Arc::clone(&calls)))
                .tour("b", "onboarding", counting("b", Arc::clone(&calls)))
                .build(),
        );

        for _ in 0..3 {
            loader.load_one("a").await.expect("a loads");
        }
        loader.load_one("b").await.expect("b loads");
        assert_eq!(loader.inner.ledger.lock().requests.get("a"), Some(&3));

        loader.invalidate(["a"]);
        {
            let ledger = loader.inner.ledger.lock();
            assert!(!ledger.requests.contains_key("a"));
            assert_eq!(ledger.requests.get("b"), Some(&1));
        }

        loader.clear_cache();
        assert!(loader.inner.ledger.lock().requests.is_empty());
        assert_eq!(loader.config().frequent_threshold, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_counts_do_not_trigger_sibling_preload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = TourRegistry::builder()
            .tour("a", "onboarding", counting("a", Arc::clone(&calls)))
            .tour("b", "onboarding", counting("b", Arc::clone(&calls)))
            .build();
        let config = LoaderConfig { frequent_threshold: 2, ..LoaderConfig::default() };
        let loader = LazyLoader::new(Arc::new(registry), Arc::new(SchemaValidator), config, TokioClock::shared());

        loader.load_one("a").await.expect("first load");
        loader.clear_cache();
        calls.store(0, Ordering::SeqCst);

        loader.load_one("a").await.expect("reload after clear");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!loader.is_cached("b"));
    }

    #[test]
    fn ledger_average_is_zero_without_fetches() {
        assert_eq!(LoadLedger::default().average_fetch_time(), Duration::ZERO);
    }
}
