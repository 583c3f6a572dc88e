use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" | "masculino" => Ok(Sex::Male),
            "f" | "female" | "femenino" => Ok(Sex::Female),
            other => Err(format!("unknown sex '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl FromStr for ActivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "baja" | "sedentary" => Ok(ActivityLevel::Low),
            "" | "moderate" | "media" | "moderada" => Ok(ActivityLevel::Moderate),
            "high" | "alta" | "active" => Ok(ActivityLevel::High),
            other => Err(format!("unknown activity level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodPreferences {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Clinical and anthropometric snapshot of one patient. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    pub age: u32,
    pub sex: Sex,
    pub weight_kg: f64,
    pub height_m: f64,
    #[serde(default)]
    pub activity: ActivityLevel,
    pub hba1c: Option<f64>,
    pub fasting_glucose: Option<f64>,
    pub ldl: Option<f64>,
    pub triglycerides: Option<f64>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub preferences: FoodPreferences,
}

// Clinical thresholds shared across the engine
pub const OBESITY_BMI: f64 = 30.0;
pub const SEVERE_OBESITY_BMI: f64 = 35.0;
pub const UNDERWEIGHT_BMI: f64 = 18.5;
/// HbA1c (%) from which a profile counts as diabetic range.
pub const DIABETIC_HBA1C: f64 = 6.5;
/// Fasting glucose (mg/dL) from which a profile counts as diabetic range.
pub const DIABETIC_GLUCOSE: f64 = 126.0;
pub const POOR_CONTROL_HBA1C: f64 = 6.9;
pub const POOR_CONTROL_GLUCOSE: f64 = 140.0;

impl PatientProfile {
    pub fn bmi(&self) -> f64 {
        if self.height_m <= 0.0 {
            return 0.0;
        }
        self.weight_kg / (self.height_m * self.height_m)
    }

    pub fn is_obese(&self) -> bool {
        self.bmi() >= OBESITY_BMI
    }

    pub fn is_severely_obese(&self) -> bool {
        self.bmi() >= SEVERE_OBESITY_BMI
    }

    pub fn is_diabetic_range(&self) -> bool {
        self.hba1c.is_some_and(|v| v >= DIABETIC_HBA1C)
            || self.fasting_glucose.is_some_and(|v| v >= DIABETIC_GLUCOSE)
    }

    pub fn is_poorly_controlled(&self) -> bool {
        self.hba1c.is_some_and(|v| v >= POOR_CONTROL_HBA1C)
            || self.fasting_glucose.is_some_and(|v| v >= POOR_CONTROL_GLUCOSE)
    }

    pub fn takes_medication(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.medications
            .iter()
            .any(|m| m.to_lowercase().contains(&needle))
    }

    /// Rejects snapshots the energy formulas cannot handle.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(18..=120).contains(&self.age) {
            return Err(PlanError::invalid_profile(&self.id, format!("age {} outside 18-120", self.age)));
        }
        if !(25.0..=350.0).contains(&self.weight_kg) {
            return Err(PlanError::invalid_profile(
                &self.id,
                format!("weight {} kg outside 25-350", self.weight_kg),
            ));
        }
        if !(1.0..=2.5).contains(&self.height_m) {
            return Err(PlanError::invalid_profile(
                &self.id,
                format!("height {} m outside 1.0-2.5", self.height_m),
            ));
        }
        Ok(())
    }

    /// Free-text advice derived from labs, BMI and medication.
    pub fn special_recommendations(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.hba1c.is_some_and(|v| v > 8.0) {
            notes.push("HbA1c above 8%: prioritise low glycemic index foods and spread carbohydrates evenly across meals.".to_string());
        }
        if self.systolic.is_some_and(|v| v > 140.0) {
            notes.push("High blood pressure: keep sodium under the daily ceiling and avoid processed foods.".to_string());
        }
        if self.ldl.is_some_and(|v| v > 100.0) {
            notes.push("Elevated LDL: favour unsaturated fats and limit saturated fat.".to_string());
        }
        let bmi = self.bmi();
        if bmi > OBESITY_BMI {
            notes.push("Obesity: the plan carries a calorie deficit; favour high-fibre, high-satiety foods.".to_string());
        } else if bmi < UNDERWEIGHT_BMI {
            notes.push("Low body weight: make sure every meal is eaten in full.".to_string());
        }
        if self.takes_medication("metformin") {
            notes.push("Metformin: take it with meals to reduce gastrointestinal discomfort.".to_string());
        }
        if self.takes_medication("insulin") {
            notes.push("Insulin: keep carbohydrate amounts consistent and watch for hypoglycaemia.".to_string());
        }
        notes
    }

    pub fn food_profile(&self) -> PatientFoodProfile {
        let mut vegetable_priority: f64 = 1.0;
        if self.hba1c.is_some_and(|v| v > 8.0) {
            vegetable_priority = vegetable_priority.max(1.5);
        }
        if self.fasting_glucose.is_some_and(|v| v > 140.0) {
            vegetable_priority = vegetable_priority.max(1.2);
        }
        let bmi = self.bmi();
        if bmi >= SEVERE_OBESITY_BMI {
            vegetable_priority = vegetable_priority.max(1.4);
        } else if bmi >= OBESITY_BMI {
            vegetable_priority = vegetable_priority.max(1.3);
        }

        let high_triglycerides = self.triglycerides.is_some_and(|v| v >= 150.0);
        let high_ldl = self.ldl.is_some_and(|v| v >= 130.0);

        PatientFoodProfile {
            vegetable_priority,
            prioritize_fish: high_triglycerides || high_ldl,
            avoid_red_meat: high_triglycerides,
        }
    }
}

/// Food-level preferences derived from the clinical picture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatientFoodProfile {
    pub vegetable_priority: f64,
    pub prioritize_fish: bool,
    pub avoid_red_meat: bool,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn profile(id: &str, weight_kg: f64, height_m: f64) -> PatientProfile {
        PatientProfile {
            id: id.to_string(),
            age: 55,
            sex: Sex::Female,
            weight_kg,
            height_m,
            activity: ActivityLevel::Moderate,
            hba1c: None,
            fasting_glucose: None,
            ldl: None,
            triglycerides: None,
            systolic: None,
            diastolic: None,
            allergies: Vec::new(),
            medications: Vec::new(),
            preferences: FoodPreferences::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::profile;
    use super::*;

    #[test]
    fn test_bmi_and_obesity_predicates() {
        let p = profile("p1", 100.0, 1.63);
        assert!((p.bmi() - 37.64).abs() < 0.01);
        assert!(p.is_obese());
        assert!(p.is_severely_obese());

        let lean = profile("p2", 60.0, 1.70);
        assert!(!lean.is_obese());
    }

    #[test]
    fn test_validate_rejects_out_of_range_height() {
        let mut p = profile("p1", 70.0, 1.70);
        assert!(p.validate().is_ok());
        p.height_m = 170.0;
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn test_special_recommendations() {
        let mut p = profile("p1", 100.0, 1.63);
        p.hba1c = Some(8.4);
        p.systolic = Some(150.0);
        p.medications = vec!["Metformina 850mg".to_string()];
        let notes = p.special_recommendations();
        assert_eq!(notes.len(), 4);
        assert!(notes.iter().any(|n| n.starts_with("Metformin")));
    }

    #[test]
    fn test_food_profile_prioritises_fish_on_high_triglycerides() {
        let mut p = profile("p1", 70.0, 1.70);
        p.triglycerides = Some(180.0);
        p.hba1c = Some(8.5);
        let fp = p.food_profile();
        assert!(fp.prioritize_fish);
        assert!(fp.avoid_red_meat);
        assert_eq!(fp.vegetable_priority, 1.5);
    }

    #[test]
    fn test_parse_sex_and_activity() {
        assert_eq!("F".parse::<Sex>(), Ok(Sex::Female));
        assert_eq!("masculino".parse::<Sex>(), Ok(Sex::Male));
        assert_eq!("alta".parse::<ActivityLevel>(), Ok(ActivityLevel::High));
        assert!("sometimes".parse::<ActivityLevel>().is_err());
    }
}
