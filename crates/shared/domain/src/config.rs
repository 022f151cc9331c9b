use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

/// Top-level pipeline configuration.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfigInner {
    pub loader: LoaderConfig,
    pub bundles: BundleTuning,
    pub orchestrator: OrchestratorConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(flatten, default)]
    inner: Arc<PipelineConfigInner>,
}

impl Deref for PipelineConfig {
    type Target = PipelineConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PipelineConfig {
    fn deref_mut(&mut self) -> &mut PipelineConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// Lazy loader cache discipline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub cache_ttl_seconds: u64,
    pub max_cache_size: usize,
    /// Access count at which a cached tour counts as "frequent".
    pub frequent_threshold: u64,
    pub sweep_interval_seconds: u64,
    pub preload_siblings: bool,
}

impl LoaderConfig {
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Thresholds for bundle splitting and promotion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BundleTuning {
    pub slow_bundle_ms: u64,
    /// A slow bundle is split only when it has more members than this.
    pub split_min_members: usize,
    /// A bundle is promoted to eager once its load count exceeds this.
    pub promote_after_loads: u64,
}

impl BundleTuning {
    #[must_use]
    pub const fn slow_bundle(&self) -> Duration {
        Duration::from_millis(self.slow_bundle_ms)
    }
}

/// Adaptive strategy thresholds for the orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub cache_size: usize,
    pub history_size: usize,
    pub recent_window: usize,
    pub aggressive_hit_rate: f64,
    pub conservative_load_ms: u64,
    pub low_hit_rate: f64,
    pub slow_load_ms: u64,
    /// Assumed cost of a load when no history exists yet.
    pub baseline_load_ms: u64,
}

// --- Default ---

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 30 * 60,
            max_cache_size: 50,
            frequent_threshold: 3,
            sweep_interval_seconds: 5 * 60,
            preload_siblings: true,
        }
    }
}

impl Default for BundleTuning {
    fn default() -> Self {
        Self { slow_bundle_ms: 1000, split_min_members: 3, promote_after_loads: 5 }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_size: 100,
            history_size: 100,
            recent_window: 20,
            aggressive_hit_rate: 0.8,
            conservative_load_ms: 1000,
            low_hit_rate: 0.5,
            slow_load_ms: 2000,
            baseline_load_ms: 100,
        }
    }
}
