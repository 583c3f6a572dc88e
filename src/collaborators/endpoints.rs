use serde::{Deserialize, Serialize};

use crate::catalog::{FoodCandidate, FoodGroup};
use crate::plan::{FoodItem, MealCode};
use crate::profile::{ActivityLevel, PatientProfile, Sex};

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PredictionEndpoint {
    pub name: &'static str,
    pub path: &'static str,
}

pub const CONTROL_RISK: PredictionEndpoint = PredictionEndpoint {
    name: "control_risk",
    path: "/v1/control-risk",
};
pub const GLUCOSE_RESPONSE: PredictionEndpoint = PredictionEndpoint {
    name: "glucose_response",
    path: "/v1/glucose-response",
};
pub const SUITABILITY: PredictionEndpoint = PredictionEndpoint {
    name: "suitability",
    path: "/v1/suitability",
};
pub const COMBINATION: PredictionEndpoint = PredictionEndpoint {
    name: "combination",
    path: "/v1/combination",
};

/// Patient features the prediction models were trained on.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PatientFeatures {
    pub age: u32,
    pub sex: Sex,
    pub bmi: f64,
    pub activity: ActivityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hba1c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fasting_glucose: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ldl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triglycerides: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systolic: Option<f64>,
}

impl From<&PatientProfile> for PatientFeatures {
    fn from(profile: &PatientProfile) -> Self {
        Self {
            age: profile.age,
            sex: profile.sex,
            bmi: (profile.bmi() * 10.0).round() / 10.0,
            activity: profile.activity,
            hba1c: profile.hba1c,
            fasting_glucose: profile.fasting_glucose,
            ldl: profile.ldl,
            triglycerides: profile.triglycerides,
            systolic: profile.systolic,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FoodFeatures {
    pub name: String,
    pub group: FoodGroup,
    pub kcal: f64,
    pub carbs_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glycemic_index: Option<u32>,
}

impl From<&FoodCandidate> for FoodFeatures {
    fn from(food: &FoodCandidate) -> Self {
        Self {
            name: food.name.clone(),
            group: food.group,
            kcal: food.per_100g.kcal,
            carbs_g: food.per_100g.carbs_g,
            protein_g: food.per_100g.protein_g,
            fat_g: food.per_100g.fat_g,
            fiber_g: food.per_100g.fiber_g,
            glycemic_index: food.glycemic_index,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ControlRiskRequest {
    pub patient: PatientFeatures,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControlRiskResponse {
    pub probability: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct GlucoseResponseRequest {
    pub patient: PatientFeatures,
    pub food: FoodFeatures,
    pub meal: MealCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_glucose: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GlucoseResponseResponse {
    pub increment: f64,
    pub peak: f64,
    pub time_to_peak_min: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct SuitabilityRequest {
    pub patient: PatientFeatures,
    pub food: FoodFeatures,
}

#[derive(Debug, Serialize, Clone)]
pub struct CombinationFood {
    pub name: String,
    pub group: FoodGroup,
    pub grams: f64,
}

impl From<&FoodItem> for CombinationFood {
    fn from(item: &FoodItem) -> Self {
        Self {
            name: item.food.name.clone(),
            group: item.group(),
            grams: item.quantity_g(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct CombinationRequest {
    pub patient: PatientFeatures,
    pub foods: Vec<CombinationFood>,
    pub meal: MealCode,
}

/// Shared response shape of the scoring endpoints.
#[derive(Debug, Deserialize, Clone)]
pub struct ScoreResponse {
    pub score: f64,
}
