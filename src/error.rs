use thiserror::Error;

use crate::catalog::FoodGroup;

/// Errors surfaced by a plan generation call.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Too few foods survived filtering to build a varied week.
    #[error(
        "only {count} candidate foods survived filtering (minimum {minimum}); active filters: {filters}. \
         Relax the glycemic-index ceiling or the food-group exclusions"
    )]
    CatalogInsufficient {
        count: usize,
        minimum: usize,
        filters: String,
    },

    #[error("no exchange reference row for food group '{group}'")]
    ReferenceDataMissing { group: FoodGroup },

    #[error("collaborator '{collaborator}' unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("invalid patient profile '{patient_id}': {reason}")]
    InvalidProfile { patient_id: String, reason: String },

    #[error("reference data error: {0}")]
    Data(String),

    #[error("plan generation failed: {0}")]
    Generation(String),
}

impl PlanError {
    pub fn invalid_profile(patient_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            patient_id: patient_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of an advisory prediction collaborator.
///
/// Never fatal: callers substitute a heuristic default and log.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    #[error("no model available: {0}")]
    Unavailable(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CollaboratorError {
    /// Lifts into the engine's taxonomy for logging.
    pub fn into_plan_error(self, collaborator: &'static str) -> PlanError {
        PlanError::CollaboratorUnavailable {
            collaborator,
            reason: self.to_string(),
        }
    }
}
