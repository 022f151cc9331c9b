use crate::Tours;
use crate::bundle::BundleManager;
use crate::error::TourError;
use crate::loader::LazyLoader;
use crate::orchestrator::PerformanceOrchestrator;
use crate::registry::TourRegistry;
use crate::validator::{SchemaValidator, TourValidator};
use private::Sealed;
use std::sync::Arc;
use tourline_domain::bundle::BundleConfig;
use tourline_domain::config::PipelineConfig;
use tourline_kernel::clock::{SharedClock, TokioClock};
use tracing::info;

#[derive(Debug, Default)]
pub struct NoRegistry;
#[derive(Debug)]
pub struct WithRegistry(Arc<TourRegistry>);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRegistry {}
impl Sealed for WithRegistry {}

/// Assembles the cache → loader → bundle manager → orchestrator chain.
///
/// A registry is mandatory; everything else falls back to defaults (`PipelineConfig::default()`,
/// [`TokioClock`], [`SchemaValidator`], no bundles).
#[allow(private_bounds)]
#[derive(Debug)]
pub struct TourPipelineBuilder<R: Sealed = NoRegistry> {
    registry: R,
    bundles: Vec<BundleConfig>,
    config: PipelineConfig,
    clock: Option<SharedClock>,
    validator: Option<Arc<dyn TourValidator>>,
}

/// Entry point for constructing the [`Tours`] slice.
#[derive(Debug, Clone, Copy)]
pub struct TourPipeline;

impl TourPipeline {
    #[must_use = "Builder must be given a registry before use"]
    pub fn builder() -> TourPipelineBuilder {
        TourPipelineBuilder {
            registry: NoRegistry,
            bundles: Vec::new(),
            config: PipelineConfig::default(),
            clock: None,
            validator: None,
        }
    }
}

impl TourPipelineBuilder<NoRegistry> {
    #[must_use]
    pub fn registry(self, registry: TourRegistry) -> TourPipelineBuilder<WithRegistry> {
        TourPipelineBuilder {
            registry: WithRegistry(Arc::new(registry)),
            bundles: self.bundles,
            config: self.config,
            clock: self.clock,
            validator: self.validator,
        }
    }
}

#[allow(private_bounds)]
impl<R: Sealed> TourPipelineBuilder<R> {
    #[must_use]
    pub fn bundle(mut self, bundle: BundleConfig) -> Self {
        self.bundles.push(bundle);
        self
    }

    #[must_use]
    pub fn bundles(mut self, bundles: impl IntoIterator<Item = BundleConfig>) -> Self {
        self.bundles.extend(bundles);
        self
    }

    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn TourValidator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl TourPipelineBuilder<WithRegistry> {
    /// # Errors
    /// [`TourError::Validation`] when the bundle registry repeats an id.
    pub fn build(self) -> Result<Tours, TourError> {
        let clock = self.clock.unwrap_or_else(TokioClock::shared);
        let validator = self.validator.unwrap_or_else(|| Arc::new(SchemaValidator));
        let registry = self.registry.0;
        let tours = registry.len();

        let loader = LazyLoader::new(registry, validator, self.config.loader.clone(), Arc::clone(&clock));
        let bundles =
            BundleManager::new(loader.clone(), self.bundles, self.config.bundles.clone(), Arc::clone(&clock))?;
        let orchestrator = PerformanceOrchestrator::new(
            loader.clone(),
            bundles.clone(),
            self.config.orchestrator.clone(),
            clock,
        );

        info!(tours, bundles = bundles.bundles().len(), "Tour pipeline assembled");

        Ok(Tours::new(crate::ToursInner { loader, bundles, orchestrator, config: self.config }))
    }
}
