//! Tour definitions as they travel on the wire and sit in caches.

use serde::{Deserialize, Serialize};

/// An immutable, named sequence of guided-walkthrough steps.
///
/// Identity is the `id`; two definitions with the same id are the same tour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    pub steps: Vec<TourStep>,
    #[serde(default)]
    pub metadata: TourMetadata,
}

impl TourDefinition {
    #[must_use]
    pub const fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// A single step of a tour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourStep {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// CSS selector or anchor the UI attaches the step to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<StepPlacement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPlacement {
    Top,
    Bottom,
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TourMetadata {
    pub version: Option<String>,
    pub estimated_duration_seconds: Option<u32>,
    pub tags: Vec<String>,
    pub required_roles: Vec<String>,
}
