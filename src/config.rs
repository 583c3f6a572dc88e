use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::catalog::FoodGroup;
use crate::plan::MealCode;

// Environment variables for the remote prediction service
pub const SERVICE_URL_ENV_VAR: &str = "PREDICTION_SERVICE_URL";
pub const SERVICE_API_KEY_ENV_VAR: &str = "PREDICTION_SERVICE_API_KEY";
pub const SERVICE_TIMEOUT_ENV_VAR: &str = "PREDICTION_SERVICE_TIMEOUT_MS";
const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 2_000;

/// Every tuned constant the engine uses. Missing sections in a JSON
/// override file fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub targets: TargetConstants,
    pub exchange: ExchangeConstants,
    pub ranker: RankerSettings,
    pub assembler: AssemblerRules,
    pub optimizer: OptimizerSettings,
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config at {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse engine config at {:?}", path))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetConstants {
    pub baseline_carb_pct: f64,
    pub baseline_protein_pct: f64,
    pub activity_low: f64,
    pub activity_moderate: f64,
    pub activity_high: f64,
    /// Gram ceiling on protein once BMI >= 30.
    pub protein_ceiling_g: f64,
    /// Fat ceiling for BMI >= 35.
    pub fat_ceiling_severe_obesity_g: f64,
    /// Fat ceiling for BMI >= 30 or elevated LDL.
    pub fat_ceiling_g: f64,
    pub ldl_fat_ceiling_threshold: f64,
    /// Calorie trim for very high risk without obesity.
    pub very_high_risk_kcal_factor: f64,
    pub fiber_min_g: f64,
    pub fiber_g_per_kg: f64,
    pub sodium_default_mg: f64,
    pub sodium_hypertension_mg: f64,
    pub hypertension_systolic: f64,
    pub dinner_carb_ceiling_severe_obesity_g: f64,
    pub dinner_carb_ceiling_obesity_g: f64,
    pub dinner_carb_ceiling_g: f64,
}

impl Default for TargetConstants {
    fn default() -> Self {
        Self {
            baseline_carb_pct: 45.0,
            baseline_protein_pct: 15.0,
            activity_low: 1.2,
            activity_moderate: 1.4,
            activity_high: 1.6,
            protein_ceiling_g: 130.0,
            fat_ceiling_severe_obesity_g: 75.0,
            fat_ceiling_g: 80.0,
            ldl_fat_ceiling_threshold: 100.0,
            very_high_risk_kcal_factor: 0.95,
            fiber_min_g: 25.0,
            fiber_g_per_kg: 0.4,
            sodium_default_mg: 2300.0,
            sodium_hypertension_mg: 1500.0,
            hypertension_systolic: 140.0,
            dinner_carb_ceiling_severe_obesity_g: 20.0,
            dinner_carb_ceiling_obesity_g: 30.0,
            dinner_carb_ceiling_g: 35.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeConstants {
    pub cereal_factor_poor: f64,
    pub cereal_factor_moderate: f64,
    pub cereal_factor_low_activity: f64,
    pub cereal_factor_high_activity: f64,
    pub cereal_range: (f64, f64),
    pub vegetable_portions: f64,
    pub fruit_factor_poor: f64,
    pub fruit_range: (f64, f64),
    pub dairy_portions: f64,
    pub dairy_portions_obesity: f64,
    pub protein_factor_obesity: f64,
    pub protein_range: (f64, f64),
    pub sugar_portions: f64,
    /// Compensates for the fat other groups deliver but the table under-reports.
    pub fat_amplification: f64,
    pub fat_factor_obesity: f64,
    pub fat_range: (f64, f64),
}

impl Default for ExchangeConstants {
    fn default() -> Self {
        Self {
            cereal_factor_poor: 0.85,
            cereal_factor_moderate: 0.92,
            cereal_factor_low_activity: 0.9,
            cereal_factor_high_activity: 1.1,
            cereal_range: (3.0, 14.0),
            vegetable_portions: 3.0,
            fruit_factor_poor: 0.85,
            fruit_range: (2.0, 4.5),
            dairy_portions: 2.0,
            dairy_portions_obesity: 1.5,
            protein_factor_obesity: 0.95,
            protein_range: (2.5, 4.5),
            sugar_portions: 2.0,
            fat_amplification: 2.0,
            fat_factor_obesity: 0.97,
            fat_range: (5.0, 10.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankerSettings {
    pub min_candidates: usize,
    pub warn_candidates: usize,
    pub gi_ceiling_poor: u32,
    pub gi_ceiling_moderate: u32,
    pub gi_ceiling_good: u32,
    /// Caller-supplied ceilings are clamped into this range.
    pub gi_ceiling_bounds: (u32, u32),
    /// Predicted post-meal peak (mg/dL) above which a food is dropped.
    pub glucose_peak_ceiling: f64,
    pub suitability_weight: f64,
    pub heuristic_weight: f64,
    pub neutral_suitability: f64,
    pub variety_weight: f64,
}

impl Default for RankerSettings {
    fn default() -> Self {
        Self {
            min_candidates: 5,
            warn_candidates: 10,
            gi_ceiling_poor: 50,
            gi_ceiling_moderate: 60,
            gi_ceiling_good: 70,
            gi_ceiling_bounds: (30, 100),
            glucose_peak_ceiling: 180.0,
            suitability_weight: 0.6,
            heuristic_weight: 0.4,
            neutral_suitability: 0.5,
            variety_weight: 0.15,
        }
    }
}

/// Hard per-food quantity caps in grams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupCaps {
    pub cereals: f64,
    pub vegetables: f64,
    pub fruits: f64,
    pub dairy: f64,
    pub protein: f64,
    pub sugars: f64,
    pub fats: f64,
    /// A single protein item may grow to this instead of pairing.
    pub protein_enlarged: f64,
}

impl Default for GroupCaps {
    fn default() -> Self {
        Self {
            cereals: 200.0,
            vegetables: 300.0,
            fruits: 150.0,
            dairy: 250.0,
            protein: 200.0,
            sugars: 200.0,
            fats: 50.0,
            protein_enlarged: 250.0,
        }
    }
}

impl GroupCaps {
    /// Cap used when sizing a single item during assembly.
    pub fn soft_cap(&self, group: FoodGroup) -> f64 {
        match group {
            FoodGroup::Cereals => self.cereals,
            FoodGroup::Vegetables => self.vegetables,
            FoodGroup::Fruits => self.fruits,
            FoodGroup::Dairy => self.dairy,
            FoodGroup::Protein => self.protein,
            FoodGroup::Sugars => self.sugars,
            FoodGroup::Fats => self.fats,
        }
    }

    /// Absolute ceiling no item of the group may exceed.
    pub fn hard_cap(&self, group: FoodGroup) -> f64 {
        match group {
            FoodGroup::Protein => self.protein_enlarged.max(self.protein),
            other => self.soft_cap(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblerRules {
    pub caps: GroupCaps,
    pub max_weekly_uses: usize,
    pub min_day_gap: usize,
    pub protein_max_weekly_uses: usize,
    pub protein_min_day_gap: usize,
    /// Avoided foods re-admitted when too few remain.
    pub fallback_candidates: usize,
    pub vegetable_meal_caps: VegetableMealCaps,
    /// Maximum distinct groups on a breakfast plate.
    pub breakfast_max_groups: usize,
    pub max_items_per_group: usize,
    /// Items lighter than this are removed from a meal.
    pub min_serving_g: f64,
}

impl Default for AssemblerRules {
    fn default() -> Self {
        Self {
            caps: GroupCaps::default(),
            max_weekly_uses: 3,
            min_day_gap: 2,
            protein_max_weekly_uses: 2,
            protein_min_day_gap: 3,
            fallback_candidates: 2,
            vegetable_meal_caps: VegetableMealCaps::default(),
            breakfast_max_groups: 5,
            max_items_per_group: 2,
            min_serving_g: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VegetableMealCaps {
    pub breakfast: f64,
    pub snack: f64,
    pub lunch: f64,
    pub dinner: f64,
}

impl Default for VegetableMealCaps {
    fn default() -> Self {
        Self {
            breakfast: 150.0,
            snack: 100.0,
            lunch: 300.0,
            dinner: 200.0,
        }
    }
}

impl VegetableMealCaps {
    pub fn for_meal(&self, meal: MealCode) -> f64 {
        match meal {
            MealCode::Breakfast => self.breakfast,
            MealCode::MidMorning | MealCode::Afternoon => self.snack,
            MealCode::Lunch => self.lunch,
            MealCode::Dinner => self.dinner,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerSettings {
    pub max_sweeps: usize,
    pub band_floor_pct: f64,
    pub display_floor_pct: f64,
    /// Below this calorie compliance, calories are corrected first.
    pub severe_kcal_pct: f64,
    pub enlarge_ratio: f64,
    pub enlarge_ratio_large_deficit: f64,
    pub large_deficit: f64,
    pub very_large_deficit: f64,
    pub new_food_max_g: f64,
    pub new_food_min_g: f64,
    pub combination_threshold: f64,
    /// Points a low macro must gain to count as an improvement.
    pub improvement_points: f64,
    /// A saturated macro is trimmed back to this share of target to make
    /// room for a low one.
    pub trim_to_pct: f64,
    /// Consecutive passes without improvement before a day is left as is.
    pub settle_after_stalls: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_sweeps: 20,
            band_floor_pct: 90.0,
            display_floor_pct: 83.0,
            severe_kcal_pct: 80.0,
            enlarge_ratio: 0.8,
            enlarge_ratio_large_deficit: 1.0,
            large_deficit: 50.0,
            very_large_deficit: 100.0,
            new_food_max_g: 200.0,
            new_food_min_g: 5.0,
            combination_threshold: 0.4,
            improvement_points: 1.0,
            trim_to_pct: 92.0,
            settle_after_stalls: 2,
        }
    }
}

/// Connection settings for the optional remote prediction service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ServiceSettings {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let timeout_ms = env::var(SERVICE_TIMEOUT_ENV_VAR)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SERVICE_TIMEOUT_MS);
        Self {
            base_url: env::var(SERVICE_URL_ENV_VAR).ok().filter(|url| !url.trim().is_empty()),
            api_key: env::var(SERVICE_API_KEY_ENV_VAR).ok(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}
