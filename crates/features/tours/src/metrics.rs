//! Rolling load metrics for the orchestrator.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Path that satisfied a load request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoadSource {
    Cache,
    Bundle,
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadEvent {
    pub tour_id: String,
    pub source: LoadSource,
    pub load_time: Duration,
    /// Clock reading when the load completed.
    pub at: Duration,
}

/// Cumulative counters since the last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_loads: u64,
    pub average_load_time: Duration,
    pub cache_hit_rate: f64,
    /// Share of non-cache loads served by a bundle.
    pub bundle_efficiency: f64,
    /// Serialized size of the definitions held by the orchestrator cache, in bytes.
    pub memory_usage: u64,
    pub network_requests: u64,
}

/// Hit rate and mean load time over the most recent events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecentWindow {
    pub events: usize,
    pub hit_rate: f64,
    pub average_load_time: Duration,
}

#[derive(Debug)]
pub(crate) struct PerformanceMetrics {
    history: VecDeque<LoadEvent>,
    capacity: usize,
    total_loads: u64,
    total_time: Duration,
    cache_loads: u64,
    bundle_loads: u64,
    network_requests: u64,
}

impl PerformanceMetrics {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            total_loads: 0,
            total_time: Duration::ZERO,
            cache_loads: 0,
            bundle_loads: 0,
            network_requests: 0,
        }
    }

    pub(crate) fn record(&mut self, event: LoadEvent) {
        self.total_loads += 1;
        self.total_time += event.load_time;
        match event.source {
            LoadSource::Cache => self.cache_loads += 1,
            LoadSource::Bundle => self.bundle_loads += 1,
            LoadSource::Lazy => {},
        }

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    pub(crate) const fn record_network_requests(&mut self, count: u64) {
        self.network_requests += count;
    }

    pub(crate) fn average_load_time(&self) -> Option<Duration> {
        u32::try_from(self.total_loads).ok().filter(|loads| *loads > 0).map(|loads| self.total_time / loads)
    }

    pub(crate) fn snapshot(&self, memory_usage: u64) -> MetricsSnapshot {
        let non_cache = self.total_loads - self.cache_loads;
        MetricsSnapshot {
            total_loads: self.total_loads,
            average_load_time: self.average_load_time().unwrap_or_default(),
            cache_hit_rate: ratio(self.cache_loads, self.total_loads),
            bundle_efficiency: ratio(self.bundle_loads, non_cache),
            memory_usage,
            network_requests: self.network_requests,
        }
    }

    pub(crate) fn recent(&self, window: usize) -> RecentWindow {
        let skip = self.history.len().saturating_sub(window);
        let events: Vec<&LoadEvent> = self.history.iter().skip(skip).collect();
        let hits = events.iter().filter(|event| event.source == LoadSource::Cache).count();
        let total: Duration = events.iter().map(|event| event.load_time).sum();

        RecentWindow {
            events: events.len(),
            hit_rate: ratio(hits as u64, events.len() as u64),
            average_load_time: u32::try_from(events.len())
                .ok()
                .filter(|count| *count > 0)
                .map_or(Duration::ZERO, |count| total / count),
        }
    }

    pub(crate) fn recent_events(&self, window: usize) -> Vec<LoadEvent> {
        let skip = self.history.len().saturating_sub(window);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

/// Human-readable tuning hints for a metrics snapshot.
pub(crate) fn recommendations(snapshot: &MetricsSnapshot, low_hit_rate: f64, slow_load: Duration) -> Vec<String> {
    let mut hints = Vec::new();
    if snapshot.total_loads == 0 {
        return hints;
    }

    if snapshot.cache_hit_rate < low_hit_rate {
        hints.push(format!(
            "Cache hit rate is {:.0}%; preload frequently used tours or raise the cache size",
            snapshot.cache_hit_rate * 100.0
        ));
    }
    if snapshot.average_load_time > slow_load {
        hints.push(format!(
            "Average load time is {} ms; split slow bundles or move large tours to on-demand",
            snapshot.average_load_time.as_millis()
        ));
    }
    if snapshot.total_loads > snapshot.network_requests && snapshot.bundle_efficiency < 0.3 {
        hints.push("Few loads are served by bundles; review bundle membership".to_owned());
    }
    if snapshot.memory_usage > 5 * 1024 * 1024 {
        hints.push(format!(
            "Cached tours hold about {} KiB; lower the cache size or TTL",
            snapshot.memory_usage / 1024
        ));
    }
    hints
}
