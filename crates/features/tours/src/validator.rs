//! Payload → [`TourDefinition`] contract.
//!
//! A validator either returns a normalized definition or a [`TourError::Validation`].
//! Checking that the definition's id matches the requested id is the loader's job, not
//! the validator's, so a validator stays usable for ad hoc payload checks.

use crate::error::TourError;
use fxhash::FxHashSet;
use serde_json::Value;
use std::fmt::Debug;
use tourline_domain::tour::TourDefinition;

pub trait TourValidator: Debug + Send + Sync {
    /// # Errors
    /// Returns [`TourError::Validation`] when the payload does not describe a usable tour.
    fn validate(&self, raw: Value) -> Result<TourDefinition, TourError>;
}

/// Schema check used when the host supplies no validator of its own.
///
/// Rules: the payload deserializes into [`TourDefinition`]; `id`, `name` and `category` are
/// non-blank; there is at least one step; step ids are non-blank and unique. Surrounding
/// whitespace in ids is trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl TourValidator for SchemaValidator {
    fn validate(&self, raw: Value) -> Result<TourDefinition, TourError> {
        let mut tour: TourDefinition = serde_json::from_value(raw)
            .map_err(|e| TourError::validation(format!("Malformed tour payload: {e}")))?;

        tour.id = tour.id.trim().to_owned();
        tour.category = tour.category.trim().to_owned();

        if tour.id.is_empty() {
            return Err(TourError::validation("Tour id is blank"));
        }
        if tour.name.trim().is_empty() {
            return Err(TourError::validation(format!("Tour '{}' has a blank name", tour.id)));
        }
        if tour.category.is_empty() {
            return Err(TourError::validation(format!("Tour '{}' has a blank category", tour.id)));
        }
        if tour.steps.is_empty() {
            return Err(TourError::validation(format!("Tour '{}' has no steps", tour.id)));
        }

        let mut seen = FxHashSet::default();
        for step in &mut tour.steps {
            step.id = step.id.trim().to_owned();
            if step.id.is_empty() {
                return Err(TourError::validation(format!(
                    "Tour '{}' has a step with a blank id",
                    tour.id
                )));
            }
            if !seen.insert(step.id.clone()) {
                return Err(TourError::validation(format!(
                    "Tour '{}' repeats step id '{}'",
                    tour.id, step.id
                )));
            }
        }

        Ok(tour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "id": " welcome-tour ",
            "name": "Welcome",
            "category": "onboarding",
            "steps": [
                { "id": "intro", "title": "Hello", "content": "Start here", "placement": "center" },
                { "id": "clients", "title": "Clients", "target": "#nav-clients" }
            ]
        })
    }

    #[test]
    fn accepts_and_normalizes_valid_payload() {
        let tour = SchemaValidator.validate(valid()).expect("payload is valid");
        assert_eq!(tour.id, "welcome-tour");
        assert_eq!(tour.step_count(), 2);
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = SchemaValidator.validate(json!({ "id": 42 })).expect_err("not a tour");
        assert!(matches!(err, TourError::Validation { .. }));
    }

    #[test]
    fn rejects_empty_steps() {
        let mut raw = valid();
        raw["steps"] = json!([]);
        let err = SchemaValidator.validate(raw).expect_err("no steps");
        assert!(err.to_string().contains("has no steps"));
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let mut raw = valid();
        raw["steps"][1]["id"] = json!("intro");
        let err = SchemaValidator.validate(raw).expect_err("duplicate step");
        assert!(err.to_string().contains("repeats step id 'intro'"));
    }

    #[test]
    fn rejects_blank_name() {
        let mut raw = valid();
        raw["name"] = json!("  ");
        assert!(SchemaValidator.validate(raw).is_err());
    }
}
