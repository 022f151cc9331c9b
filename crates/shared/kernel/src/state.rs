use fxhash::FxHashMap;
use std::any::TypeId;
use std::borrow::Cow;
use std::ops::Deref;
use std::sync::Arc;
use tourline_domain::config::PipelineConfig;
use tourline_domain::registry::{FeatureSlice, InitializedSlice};
use tracing::info;

#[tourline_derive::tourline_error]
pub enum AppStateError {
    #[error("State validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    #[error("State missing feature slice{}: {message}", format_context(.context))]
    MissingSlice { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug)]
pub struct AppStateInner {
    pub config: PipelineConfig,
    slices: FxHashMap<TypeId, InitializedSlice>,
}

/// Composition root handed to request handlers and background jobs.
///
/// Owns one instance of every initialized feature slice for the lifetime of the process;
/// consumers look services up by type instead of reaching for a global accessor.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl AppState {
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    #[must_use]
    pub fn get_slice<T: FeatureSlice>(&self) -> Option<&T> {
        self.inner
            .slices
            .get(&TypeId::of::<T>())
            .and_then(|initialized| initialized.state.as_any().downcast_ref::<T>())
    }

    /// Returns a reference to the slice if it is registered.
    ///
    /// # Errors
    /// Returns an error if the slice is not registered.
    pub fn try_get_slice<T: FeatureSlice>(&self) -> Result<&T, AppStateError> {
        self.get_slice::<T>().ok_or_else(|| AppStateError::MissingSlice {
            message: std::any::type_name::<T>().into(),
            context: None,
        })
    }

    /// Names of registered slices (for diagnostics).
    pub fn slice_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.slices.values().map(|slice| slice.name)
    }
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Default)]
pub struct AppStateBuilder {
    config: Option<PipelineConfig>,
    slices: FxHashMap<TypeId, InitializedSlice>,
}

impl AppStateBuilder {
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn register_slice(mut self, slice: InitializedSlice) -> Self {
        self.slices.insert(slice.id, slice);
        self
    }

    /// Registers multiple slices at once.
    #[must_use]
    pub fn register_slices<I>(mut self, slices: I) -> Self
    where
        I: IntoIterator<Item = InitializedSlice>,
    {
        for slice in slices {
            self.slices.insert(slice.id, slice);
        }
        self
    }

    /// # Errors
    /// Returns [`AppStateError::Validation`] if no slice was registered.
    pub fn build(self) -> Result<AppState, AppStateError> {
        if self.slices.is_empty() {
            return Err(AppStateError::Validation {
                message: "No feature slices registered".into(),
                context: None,
            });
        }
        let config = self.config.unwrap_or_default();

        info!(slices = self.slices.len(), "Application state assembled");

        Ok(AppState { inner: Arc::new(AppStateInner { config, slices: self.slices }) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug)]
    struct Probe(u32);

    impl FeatureSlice for Probe {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn name(&self) -> &'static str {
            "probe"
        }
    }

    #[test]
    fn registered_slice_is_retrievable_by_type() {
        let state = AppState::builder()
            .register_slice(InitializedSlice::new(Probe(7)))
            .build()
            .expect("state should build");

        assert_eq!(state.try_get_slice::<Probe>().expect("probe registered").0, 7);
        assert_eq!(state.slice_names().collect::<Vec<_>>(), vec!["probe"]);
    }

    #[test]
    fn empty_state_is_rejected() {
        let err = AppState::builder().build().expect_err("no slices");
        assert!(matches!(err, AppStateError::Validation { .. }));
    }
}
