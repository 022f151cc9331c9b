#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tourline_domain::bundle::BundleConfig;
use tourline_domain::config::PipelineConfig;
use tourline_tours::Tours;
use tourline_tours::TourPipeline;
use tourline_tours::registry::{ResolveFuture, TourRegistry, TourResolver};

pub const FETCH_DELAY: Duration = Duration::from_millis(50);

#[must_use]
pub fn tour_json(id: &str, category: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{id} walkthrough"),
        "category": category,
        "steps": [
            { "id": "intro", "title": "Welcome", "content": "Let's look around", "placement": "center" }
        ],
        "metadata": { "version": "1.0.0", "estimatedDurationSeconds": 60 }
    })
}

/// Resolver double: sleeps, counts invocations, optionally fails the first calls.
#[derive(Clone)]
pub struct FakeSource {
    payload: Value,
    delay: Duration,
    fail_times: usize,
    calls: Arc<AtomicUsize>,
}

impl FakeSource {
    #[must_use]
    pub fn tour(id: &str, category: &str) -> Self {
        Self::payload(tour_json(id, category))
    }

    #[must_use]
    pub fn payload(payload: Value) -> Self {
        Self { payload, delay: FETCH_DELAY, fail_times: 0, calls: Arc::new(AtomicUsize::new(0)) }
    }

    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn fail_times(mut self, times: usize) -> Self {
        self.fail_times = times;
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TourResolver for FakeSource {
    fn resolve(&self) -> ResolveFuture {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = self.payload.clone();
        let delay = self.delay;
        let fail = attempt < self.fail_times;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            if fail { Err("upstream unavailable".into()) } else { Ok(payload) }
        })
    }
}

/// Registry over `(id, category)` pairs, plus the sources for call counting.
#[must_use]
pub fn catalog(entries: &[(&str, &str)]) -> (TourRegistry, HashMap<String, FakeSource>) {
    let sources: Vec<(String, String, FakeSource)> = entries
        .iter()
        .map(|(id, category)| ((*id).to_owned(), (*category).to_owned(), FakeSource::tour(id, category)))
        .collect();
    with_sources(sources)
}

#[must_use]
pub fn with_sources(
    sources: Vec<(String, String, FakeSource)>,
) -> (TourRegistry, HashMap<String, FakeSource>) {
    let mut builder = TourRegistry::builder();
    let mut handles = HashMap::new();
    for (id, category, source) in sources {
        handles.insert(id.clone(), source.clone());
        builder = builder.tour(id, category, source);
    }
    (builder.build(), handles)
}

/// Config with background sibling preloading off, so call counts are exact.
#[must_use]
pub fn quiet_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.loader.preload_siblings = false;
    config
}

/// # Panics
/// If the pipeline rejects the bundle registry.
#[must_use]
pub fn pipeline(registry: TourRegistry, bundles: Vec<BundleConfig>, config: PipelineConfig) -> Tours {
    TourPipeline::builder()
        .registry(registry)
        .bundles(bundles)
        .config(config)
        .build()
        .expect("pipeline should build")
}
