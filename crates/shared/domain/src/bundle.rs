//! Static bundle registry entries.

use crate::roles::RoleSet;
use serde::{Deserialize, Serialize};

/// A statically configured group of tour ids sharing a load strategy and a size budget.
///
/// Registered at startup; the bundle manager may split an entry or promote its strategy
/// at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
    pub id: String,
    pub tours: Vec<String>,
    #[serde(default)]
    pub priority: BundlePriority,
    #[serde(default)]
    pub strategy: LoadStrategy,
    /// Size budget in KiB.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// Path prefixes on which the bundle is immediately relevant.
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub roles: RoleSet,
}

const fn default_max_size() -> u64 {
    100
}

impl BundleConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, tours: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            tours: tours.into_iter().map(Into::into).collect(),
            priority: BundlePriority::default(),
            strategy: LoadStrategy::default(),
            max_size: default_max_size(),
            pages: Vec::new(),
            roles: RoleSet::empty(),
        }
    }

    #[must_use]
    pub const fn priority(mut self, priority: BundlePriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn pages(mut self, pages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pages = pages.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn contains(&self, tour_id: &str) -> bool {
        self.tours.iter().any(|id| id == tour_id)
    }

    #[must_use]
    pub fn matches_page(&self, page: &str) -> bool {
        self.pages.iter().any(|prefix| page.starts_with(prefix.as_str()))
    }
}

/// Priority tier. Ordering is "most urgent first": `High < Medium < Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BundlePriority {
    High,
    #[default]
    Medium,
    Low,
}

impl BundlePriority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// When a bundle's members are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadStrategy {
    Eager,
    #[default]
    Lazy,
    OnDemand,
}

impl LoadStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Lazy => "lazy",
            Self::OnDemand => "on-demand",
        }
    }
}
