mod fixtures;

use fixtures::{FETCH_DELAY, FakeSource, catalog, pipeline, quiet_config, with_sources};
use std::time::Duration;
use tourline_domain::bundle::{BundleConfig, BundlePriority, LoadStrategy};
use tourline_domain::context::LoadContext;
use tourline_kernel::state::AppState;
use tourline_tours::metrics::LoadSource;
use tourline_tours::orchestrator::PreloadStrategy;
use tourline_tours::{TourError, TourPipeline, Tours};

fn slow_catalog(delay: Duration) -> (tourline_tours::registry::TourRegistry, std::collections::HashMap<String, FakeSource>) {
    with_sources(vec![
        ("slow-tour".into(), "reports".into(), FakeSource::tour("slow-tour", "reports").delay(delay)),
        ("welcome-tour".into(), "onboarding".into(), FakeSource::tour("welcome-tour", "onboarding")),
        ("profile-tour".into(), "onboarding".into(), FakeSource::tour("profile-tour", "onboarding")),
        ("campaign-tour".into(), "campaigns".into(), FakeSource::tour("campaign-tour", "campaigns")),
    ])
}

#[tokio::test(start_paused = true)]
async fn test_lazy_then_cache_path() {
    let (registry, sources) = catalog(&[("welcome-tour", "onboarding")]);
    let tours = pipeline(registry, vec![], quiet_config());

    let first = tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    let second = tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();

    assert_eq!(first.source, LoadSource::Lazy);
    assert!(first.bundle.is_none());
    assert_eq!(second.source, LoadSource::Cache);
    assert!(second.load_time <= first.load_time);
    assert_eq!(sources["welcome-tour"].calls(), 1);

    let stats = tours.orchestrator.cache_stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.most_accessed, vec![("welcome-tour".to_owned(), 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_recommended_bundle_serves_and_warms_siblings() {
    let (registry, sources) = catalog(&[("campaign-tour", "campaigns"), ("scheduling-tour", "campaigns")]);
    let bundles = vec![
        BundleConfig::new("campaigns", ["campaign-tour", "scheduling-tour"])
            .priority(BundlePriority::High)
            .pages(["/campaigns"]),
    ];
    let tours = pipeline(registry, bundles, quiet_config());
    let ctx = LoadContext::new().page("/campaigns/42");

    let load = tours.orchestrator.load_tour("campaign-tour", Some(&ctx)).await.unwrap();
    assert_eq!(load.source, LoadSource::Bundle);
    let bundle = load.bundle.unwrap();
    assert_eq!(bundle.id, "campaigns");
    assert_eq!(bundle.tours, 2);
    assert_eq!(bundle.strategy, LoadStrategy::Lazy);

    let sibling = tours.orchestrator.load_tour("scheduling-tour", Some(&ctx)).await.unwrap();
    assert_eq!(sibling.source, LoadSource::Cache);
    assert_eq!(sources["scheduling-tour"].calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_load_tours_merges_every_partition() {
    let (registry, sources) = catalog(&[
        ("welcome-tour", "onboarding"),
        ("profile-tour", "onboarding"),
        ("campaign-tour", "campaigns"),
    ]);
    let bundles = vec![BundleConfig::new("campaigns", ["campaign-tour"]).pages(["/campaigns"])];
    let tours = pipeline(registry, bundles, quiet_config());
    let ctx = LoadContext::new().page("/campaigns");

    tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();

    let loaded = tours
        .orchestrator
        .load_tours(["welcome-tour", "campaign-tour", "profile-tour", "ghost-tour"], Some(&ctx))
        .await;

    assert_eq!(loaded.len(), 3);
    for id in ["welcome-tour", "campaign-tour", "profile-tour"] {
        assert_eq!(loaded[id].id, id);
    }
    assert!(tours.bundles.is_loaded("campaigns"));
    assert_eq!(sources["welcome-tour"].calls(), 1);

    let recent = tours.orchestrator.performance_metrics().recent;
    let source_of = |id: &str| recent.iter().rev().find(|e| e.tour_id == id).map(|e| e.source);
    assert_eq!(source_of("welcome-tour"), Some(LoadSource::Cache));
    assert_eq!(source_of("campaign-tour"), Some(LoadSource::Bundle));
    assert_eq!(source_of("profile-tour"), Some(LoadSource::Lazy));
}

#[tokio::test(start_paused = true)]
async fn test_category_twice_is_equal_and_faster() {
    let (registry, sources) = catalog(&[("welcome-tour", "onboarding"), ("profile-tour", "onboarding")]);
    let tours = pipeline(registry, vec![], quiet_config());

    let start = tokio::time::Instant::now();
    let first = tours.orchestrator.load_tour_category("onboarding", None).await.unwrap();
    let first_time = start.elapsed();

    let start = tokio::time::Instant::now();
    let second = tours.orchestrator.load_tour_category("onboarding", None).await.unwrap();
    let second_time = start.elapsed();

    assert_eq!(first, second);
    assert!(second_time < first_time);
    assert_eq!(sources["profile-tour"].calls(), 1);

    let err = tours.orchestrator.load_tour_category("missing", None).await.unwrap_err();
    assert!(matches!(err, TourError::UnknownCategory { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_high_hit_rate_selects_aggressive() {
    let (registry, sources) = slow_catalog(FETCH_DELAY);
    let bundles = vec![
        BundleConfig::new("core", ["profile-tour"]).priority(BundlePriority::High),
        BundleConfig::new("campaigns", ["campaign-tour"]).priority(BundlePriority::Low),
    ];
    let tours = pipeline(registry, bundles, quiet_config());

    for _ in 0..10 {
        tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    }
    let recent = tours.orchestrator.recent_window();
    assert!((recent.hit_rate - 0.9).abs() < 1e-9);

    let report = tours.orchestrator.initialize_for_context(&LoadContext::new()).await;

    assert_eq!(report.strategy, PreloadStrategy::Aggressive);
    assert_eq!(tours.orchestrator.strategy(), PreloadStrategy::Aggressive);
    assert!(report.recommended_bundles.is_empty());
    assert!(tours.bundles.is_loaded("core"), "every high-priority bundle is preloaded");
    assert!(!tours.bundles.is_loaded("campaigns"));
    assert_eq!(report.preloaded.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["profile-tour"]);
    assert_eq!(sources["campaign-tour"].calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_history_selects_conservative() {
    let (registry, _) = slow_catalog(Duration::from_millis(1500));
    let bundles = vec![
        BundleConfig::new("first", ["welcome-tour"]).priority(BundlePriority::High).strategy(LoadStrategy::Eager),
        BundleConfig::new("second", ["profile-tour"]).strategy(LoadStrategy::Eager),
    ];
    let tours = pipeline(registry, bundles, quiet_config());

    let slow = tours.orchestrator.load_tour("slow-tour", None).await.unwrap();
    assert!(slow.load_time >= Duration::from_millis(1500));

    let report = tours.orchestrator.initialize_for_context(&LoadContext::new()).await;

    assert_eq!(report.strategy, PreloadStrategy::Conservative);
    assert_eq!(report.recommended_bundles, ["first", "second"]);
    assert!(tours.bundles.is_loaded("first"));
    assert!(!tours.bundles.is_loaded("second"), "only the top immediate bundle is loaded");
    assert_eq!(report.preloaded.len(), 1);
    assert!(report.estimated_time_saved >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_no_history_is_balanced_with_baseline_estimate() {
    let (registry, _) = slow_catalog(FETCH_DELAY);
    let bundles = vec![
        BundleConfig::new("core", ["welcome-tour", "profile-tour"]).strategy(LoadStrategy::Eager),
        BundleConfig::new("later", ["campaign-tour"]).priority(BundlePriority::High),
    ];
    let tours = pipeline(registry, bundles, quiet_config());

    let report = tours.orchestrator.initialize_for_context(&LoadContext::new()).await;

    assert_eq!(report.strategy, PreloadStrategy::Balanced);
    assert_eq!(report.recommended_bundles, ["core"]);
    assert_eq!(report.preloaded.len(), 2);
    assert_eq!(report.estimated_time_saved, Duration::from_millis(200));
    assert!(!tours.bundles.is_loaded("later"));

    // Preloaded members are now served from the orchestrator cache.
    let load = tours.orchestrator.load_tour("profile-tour", None).await.unwrap();
    assert_eq!(load.source, LoadSource::Cache);
}

#[tokio::test(start_paused = true)]
async fn test_optimize_switches_to_conservative_on_slow_loads() {
    let (registry, _) = slow_catalog(Duration::from_millis(2500));
    let tours = pipeline(registry, vec![], quiet_config());

    tours.orchestrator.load_tour("slow-tour", None).await.unwrap();
    let report = tours.orchestrator.optimize_performance();

    assert_eq!(report.strategy_before, PreloadStrategy::Balanced);
    assert_eq!(report.strategy_after, PreloadStrategy::Conservative);
    assert_eq!(report.before.total_loads, 1);
    assert!(report.bundles.is_empty());

    let metrics = tours.orchestrator.performance_metrics();
    assert_eq!(metrics.strategy, PreloadStrategy::Conservative);
    assert!(metrics.recommendations.iter().any(|hint| hint.starts_with("Average load time is")));
}

#[tokio::test(start_paused = true)]
async fn test_optimize_switches_to_aggressive_on_cold_cache() {
    let (registry, _) = slow_catalog(FETCH_DELAY);
    let tours = pipeline(registry, vec![], quiet_config());

    tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    tours.orchestrator.load_tour("profile-tour", None).await.unwrap();

    let report = tours.orchestrator.optimize_performance();
    assert_eq!(report.strategy_after, PreloadStrategy::Aggressive);
    assert_eq!(report.after.network_requests, 2);
}

#[tokio::test(start_paused = true)]
async fn test_optimize_sweeps_expired_entries() {
    let (registry, _) = catalog(&[("welcome-tour", "onboarding")]);
    let mut config = quiet_config();
    config.loader.cache_ttl_seconds = 5;
    let tours = pipeline(registry, vec![], config);

    tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;

    let report = tours.orchestrator.optimize_performance();
    // One entry in the orchestrator cache, one in the loader cache.
    assert_eq!(report.expired_swept, 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_and_reset() {
    let (registry, sources) = catalog(&[("welcome-tour", "onboarding")]);
    let tours = pipeline(registry, vec![], quiet_config());

    tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    tours.orchestrator.invalidate(["welcome-tour"]);
    let reload = tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    assert_eq!(reload.source, LoadSource::Lazy);
    assert_eq!(sources["welcome-tour"].calls(), 2);

    tours.orchestrator.reset_metrics();
    assert_eq!(tours.orchestrator.performance_metrics().metrics.total_loads, 0);

    tours.orchestrator.clear_cache();
    assert_eq!(tours.orchestrator.cache_stats().size, 0);
    assert!(!tours.loader.is_cached("welcome-tour"));
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_stops_with_the_pipeline() {
    let (registry, _) = catalog(&[("welcome-tour", "onboarding")]);
    let tours = pipeline(registry, vec![], quiet_config());

    let task = tours.orchestrator.spawn_maintenance(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!task.is_finished());

    drop(tours);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(task.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_slice_is_served_from_app_state() {
    let (registry, _) = catalog(&[("welcome-tour", "onboarding")]);
    let slice = tourline_tours::init(TourPipeline::builder().registry(registry).config(quiet_config())).unwrap();
    let state = AppState::builder().register_slice(slice).build().unwrap();

    let tours = state.try_get_slice::<Tours>().unwrap();
    let load = tours.orchestrator.load_tour("welcome-tour", None).await.unwrap();
    assert_eq!(load.definition.name, "welcome-tour walkthrough");
    assert_eq!(state.slice_names().collect::<Vec<_>>(), [Tours::NAME]);
}
