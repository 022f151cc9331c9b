//! Tour-definition loading pipeline.
//!
//! Components, leaves first:
//!
//! * [`cache::CacheStore`]: bounded TTL + LRU store with access counters.
//! * [`loader::LazyLoader`]: id → validated definition through the [`registry::TourRegistry`],
//!   with one outstanding fetch per id no matter how many callers wait on it.
//! * [`bundle::BundleManager`]: named, strategy-tagged groups of tours and the context-driven
//!   recommendation chain.
//! * [`orchestrator::PerformanceOrchestrator`]: routes each request down the cheapest path and
//!   adapts its preload strategy to rolling metrics.
//!
//! [`TourPipeline`] wires the chain together and hands out the [`Tours`] slice.

pub mod bundle;
pub mod cache;
mod error;
pub mod loader;
pub mod maintenance;
pub mod metrics;
pub mod orchestrator;
mod pipeline;
pub mod registry;
pub mod validator;

pub use crate::error::{TourError, TourErrorExt};
pub use crate::pipeline::{NoRegistry, TourPipeline, TourPipelineBuilder, WithRegistry};
use tourline_domain::config::PipelineConfig;
use tourline_kernel::domain::registry::InitializedSlice;

/// Tour pipeline feature state.
#[tourline_derive::tourline_slice]
pub struct Tours {
    pub loader: loader::LazyLoader,
    pub bundles: bundle::BundleManager,
    pub orchestrator: orchestrator::PerformanceOrchestrator,
    pub config: PipelineConfig,
}

/// Initialize the tour feature from an assembled pipeline builder.
///
/// # Errors
/// Returns [`TourError::Validation`] when the bundle registry is inconsistent.
pub fn init(builder: TourPipelineBuilder<WithRegistry>) -> Result<InitializedSlice, TourError> {
    let slice = builder.build()?;

    tracing::info!(slice = Tours::NAME, "Tours feature slice initialized");

    Ok(InitializedSlice::new(slice))
}
