pub mod connection;
pub mod endpoints;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::FoodCandidate;
use crate::error::CollaboratorError;
use crate::plan::{FoodItem, MealCode};
use crate::profile::PatientProfile;

pub use connection::{PredictionServiceClient, ServiceConnectionError};

/// Where in the day a prediction is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MealContext {
    pub meal: MealCode,
    pub date: NaiveDate,
    pub baseline_glucose: Option<f64>,
}

/// Predicted post-meal glucose curve for one food.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseResponse {
    pub increment: f64,
    pub peak: f64,
    pub time_to_peak_min: f64,
}

/// Probability (0-1) that the patient's glycemic control is poor.
pub trait ControlRiskClassifier {
    fn predict(&self, profile: &PatientProfile) -> Result<f64, CollaboratorError>;
}

pub trait GlucoseResponseRegressor {
    fn predict(
        &self,
        profile: &PatientProfile,
        food: &FoodCandidate,
        context: &MealContext,
    ) -> Result<GlucoseResponse, CollaboratorError>;
}

/// Probability (0-1) that a single food suits the patient.
pub trait SuitabilityScorer {
    fn score(&self, profile: &PatientProfile, food: &FoodCandidate) -> Result<f64, CollaboratorError>;
}

/// Quality (0-1) of a whole candidate meal.
pub trait CombinationScorer {
    fn score(
        &self,
        profile: &PatientProfile,
        combination: &[FoodItem],
        context: &MealContext,
    ) -> Result<f64, CollaboratorError>;
}

/// Stand-in for every collaborator when no model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModel;

const NO_MODEL: &str = "no prediction service configured";

impl ControlRiskClassifier for NoModel {
    fn predict(&self, _profile: &PatientProfile) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::Unavailable(NO_MODEL.to_string()))
    }
}

impl GlucoseResponseRegressor for NoModel {
    fn predict(
        &self,
        _profile: &PatientProfile,
        _food: &FoodCandidate,
        _context: &MealContext,
    ) -> Result<GlucoseResponse, CollaboratorError> {
        Err(CollaboratorError::Unavailable(NO_MODEL.to_string()))
    }
}

impl SuitabilityScorer for NoModel {
    fn score(&self, _profile: &PatientProfile, _food: &FoodCandidate) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::Unavailable(NO_MODEL.to_string()))
    }
}

impl CombinationScorer for NoModel {
    fn score(
        &self,
        _profile: &PatientProfile,
        _combination: &[FoodItem],
        _context: &MealContext,
    ) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::Unavailable(NO_MODEL.to_string()))
    }
}

/// The set of prediction collaborators one generator uses.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn ControlRiskClassifier + Send + Sync>,
    pub glucose: Arc<dyn GlucoseResponseRegressor + Send + Sync>,
    pub suitability: Arc<dyn SuitabilityScorer + Send + Sync>,
    pub combination: Arc<dyn CombinationScorer + Send + Sync>,
}

impl Collaborators {
    /// Every collaborator reports unavailable; the engine runs on heuristics.
    pub fn heuristic() -> Self {
        let none = Arc::new(NoModel);
        Self {
            classifier: none.clone(),
            glucose: none.clone(),
            suitability: none.clone(),
            combination: none,
        }
    }

    pub fn from_service(client: PredictionServiceClient) -> Self {
        let client = Arc::new(client);
        Self {
            classifier: client.clone(),
            glucose: client.clone(),
            suitability: client.clone(),
            combination: client,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
