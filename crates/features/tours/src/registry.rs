//! Static id → resolver table.
//!
//! The host application registers one async, fallible resolver per tour id. The pipeline
//! never learns how a payload is produced (bundled asset, HTTP, database); it only awaits it.

use crate::error::TourError;
use fxhash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Error a resolver may reject with. Wrapped into [`TourError::Fetch`] by the loader.
pub type ResolveError = Box<dyn std::error::Error + Send + Sync>;

pub type ResolveFuture = Pin<Box<dyn Future<Output = Result<Value, ResolveError>> + Send>>;

/// Produces the raw payload for exactly one tour id.
pub trait TourResolver: Send + Sync {
    fn resolve(&self) -> ResolveFuture;
}

impl<F, Fut> TourResolver for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ResolveError>> + Send + 'static,
{
    fn resolve(&self) -> ResolveFuture {
        Box::pin(self())
    }
}

struct RegistryEntry {
    category: String,
    resolver: Arc<dyn TourResolver>,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry").field("category", &self.category).finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct TourRegistry {
    entries: FxHashMap<String, RegistryEntry>,
    /// Category → member ids in registration order.
    categories: FxHashMap<String, Vec<String>>,
}

impl TourRegistry {
    #[must_use]
    pub fn builder() -> TourRegistryBuilder {
        TourRegistryBuilder::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn category_of(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.category.as_str())
    }

    pub fn category_members(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Other ids in the same category as `id`, in registration order.
    pub fn siblings(&self, id: &str) -> Vec<String> {
        self.category_of(id)
            .and_then(|category| self.category_members(category))
            .map(|members| members.iter().filter(|member| *member != id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub(crate) fn resolver(&self, id: &str) -> Result<Arc<dyn TourResolver>, TourError> {
        self.entries
            .get(id)
            .map(|entry| Arc::clone(&entry.resolver))
            .ok_or_else(|| TourError::not_found(id))
    }
}

#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct TourRegistryBuilder {
    registry: TourRegistry,
}

impl TourRegistryBuilder {
    /// Registers `id` under `category`. A repeated id replaces the earlier resolver and
    /// moves the id to the new category.
    pub fn tour<R>(mut self, id: impl Into<String>, category: impl Into<String>, resolver: R) -> Self
    where
        R: TourResolver + 'static,
    {
        let id = id.into();
        let category = category.into();

        if let Some(previous) = self.registry.entries.get(&id) {
            if let Some(members) = self.registry.categories.get_mut(&previous.category) {
                members.retain(|member| *member != id);
            }
        }

        self.registry.categories.entry(category.clone()).or_default().push(id.clone());
        self.registry
            .entries
            .insert(id, RegistryEntry { category, resolver: Arc::new(resolver) });
        self
    }

    pub fn build(self) -> TourRegistry {
        let mut registry = self.registry;
        registry.categories.retain(|_, members| !members.is_empty());
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> impl Fn() -> std::future::Ready<Result<Value, ResolveError>> + Send + Sync {
        || std::future::ready(Ok(json!({})))
    }

    #[test]
    fn indexes_categories_in_registration_order() {
        let registry = TourRegistry::builder()
            .tour("welcome-tour", "onboarding", payload())
            .tour("profile-tour", "onboarding", payload())
            .tour("campaign-tour", "campaigns", payload())
            .build();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.category_of("campaign-tour"), Some("campaigns"));
        assert_eq!(
            registry.category_members("onboarding"),
            Some(["welcome-tour".to_owned(), "profile-tour".to_owned()].as_slice())
        );
        assert_eq!(registry.siblings("welcome-tour"), vec!["profile-tour".to_owned()]);
    }

    #[test]
    fn re_registration_moves_category() {
        let registry = TourRegistry::builder()
            .tour("welcome-tour", "onboarding", payload())
            .tour("welcome-tour", "getting-started", payload())
            .build();

        assert_eq!(registry.category_of("welcome-tour"), Some("getting-started"));
        assert!(registry.category_members("onboarding").is_none());
    }

    #[test]
    fn unmapped_id_is_not_found() {
        let registry = TourRegistry::builder().build();
        let err = registry.resolver("missing").err().expect("no resolver");
        assert_eq!(err.kind(), "NotFound");
    }
}
