use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{ExchangeConstants, TargetConstants};
use crate::error::PlanError;
use crate::optim::exchange::{solve_daily_portions, ExchangeTable, GroupPortions, PortionContext};
use crate::plan::{round_grams, Macro, MealCode};
use crate::profile::{ActivityLevel, PatientProfile, Sex};
use crate::risk::{RiskEstimate, RiskTier, VERY_HIGH_RISK_ABOVE};

/// Lower and upper bound on the condition-adjustment factor.
pub const CONDITION_FACTOR_BOUNDS: (f64, f64) = (0.75, 1.20);

/// Baseline carbohydrate share per meal, in `MealCode::ALL` order.
const BASELINE_CARB_ALLOCATION: [f64; 5] = [0.20, 0.10, 0.35, 0.10, 0.25];
const LUNCH_CARB_SHARE_MAX: f64 = 0.40;
const BREAKFAST_CARB_SHARE_MAX: f64 = 0.25;
const DINNER_EXCESS_TO_LUNCH: f64 = 0.6;

/// Caller-supplied configuration that replaces the automatic targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetOverride {
    pub kcal: Option<f64>,
    pub carb_pct: Option<f64>,
    pub protein_pct: Option<f64>,
    pub fat_pct: Option<f64>,
}

impl TargetOverride {
    pub fn is_empty(&self) -> bool {
        self.kcal.is_none() && self.carb_pct.is_none() && self.protein_pct.is_none() && self.fat_pct.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Automatic,
    Override,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionalTargets {
    pub source: TargetSource,
    pub kcal: f64,
    pub carbs_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carb_pct: f64,
    pub protein_pct: f64,
    pub fat_pct: f64,
    pub fiber_g: f64,
    pub sodium_mg: f64,
    pub condition_factor: f64,
    pub tier: RiskTier,
    /// Share of daily carbohydrate per meal; sums to 1.0.
    pub meal_carb_allocation: BTreeMap<MealCode, f64>,
    pub dinner_carb_ceiling_g: Option<f64>,
    pub portions: GroupPortions,
}

impl NutritionalTargets {
    pub fn get(&self, nutrient: Macro) -> f64 {
        match nutrient {
            Macro::Kcal => self.kcal,
            Macro::Carbs => self.carbs_g,
            Macro::Protein => self.protein_g,
            Macro::Fat => self.fat_g,
        }
    }

    pub fn meal_carbs_g(&self, meal: MealCode) -> f64 {
        self.carbs_g * self.meal_carb_allocation.get(&meal).copied().unwrap_or(0.0)
    }

    pub fn meal_carb_ceiling(&self, meal: MealCode) -> Option<f64> {
        match meal {
            MealCode::Dinner => self.dinner_carb_ceiling_g,
            _ => None,
        }
    }
}

/// Resting energy by Mifflin-St Jeor, in kcal/day.
pub fn basal_energy(profile: &PatientProfile) -> f64 {
    let base = 10.0 * profile.weight_kg + 6.25 * (profile.height_m * 100.0) - 5.0 * profile.age as f64;
    match profile.sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

/// Condition-adjustment factor before clamping. Obesity decides first;
/// glycemic labs only modulate it for BMI under 30.
pub fn raw_condition_factor(profile: &PatientProfile) -> f64 {
    let bmi = profile.bmi();
    let mut factor = if bmi >= 35.0 {
        0.75
    } else if bmi >= 30.0 {
        0.80
    } else if bmi < 18.5 {
        1.10
    } else {
        1.0
    };

    if bmi < 30.0 {
        match profile.hba1c {
            Some(h) if h > 8.0 => factor -= 0.10,
            Some(h) if h < 6.5 => factor += 0.05,
            _ => {}
        }
        if profile.fasting_glucose.is_some_and(|g| g > 140.0) {
            factor -= 0.05;
        }
    }
    factor
}

pub fn condition_factor(profile: &PatientProfile) -> f64 {
    raw_condition_factor(profile).clamp(CONDITION_FACTOR_BOUNDS.0, CONDITION_FACTOR_BOUNDS.1)
}

fn floor_tenth(value: f64) -> f64 {
    (value * 10.0).floor() / 10.0
}

/// Derives daily energy, macro and portion targets for one patient.
#[derive(Debug, Clone)]
pub struct TargetCalculator<'a> {
    consts: &'a TargetConstants,
    exchange_consts: &'a ExchangeConstants,
    table: &'a ExchangeTable,
}

impl<'a> TargetCalculator<'a> {
    pub fn new(consts: &'a TargetConstants, exchange_consts: &'a ExchangeConstants, table: &'a ExchangeTable) -> Self {
        Self {
            consts,
            exchange_consts,
            table,
        }
    }

    fn activity_factor(&self, activity: ActivityLevel) -> f64 {
        match activity {
            ActivityLevel::Low => self.consts.activity_low,
            ActivityLevel::Moderate => self.consts.activity_moderate,
            ActivityLevel::High => self.consts.activity_high,
        }
    }

    /// Energy before any risk-based trim.
    pub fn energy_estimate(&self, profile: &PatientProfile) -> f64 {
        (basal_energy(profile) * self.activity_factor(profile.activity) * condition_factor(profile)).trunc()
    }

    /// Computes the daily nutritional targets for one patient.
    ///
    /// With an override, risk-based macro shifts and gram ceilings are
    /// skipped and the override percentages are normalized to sum to at
    /// most 100.
    ///
    /// # Arguments
    /// * `profile`: The patient snapshot; validated before anything else.
    /// * `risk`: The resolved poor-control estimate, which picks the tier.
    /// * `override_config`: Caller-supplied energy and macro percentages. An empty override is ignored.
    ///
    /// # Returns
    /// `NutritionalTargets` with grams, percentages, fiber, sodium, per-meal
    /// carbohydrate allocation and daily exchange portions, or
    /// `PlanError::InvalidProfile` when the profile is out of range.
    pub fn calculate(
        &self,
        profile: &PatientProfile,
        risk: &RiskEstimate,
        override_config: Option<&TargetOverride>,
    ) -> Result<NutritionalTargets, PlanError> {
        profile.validate()?;
        let tier = risk.tier();
        let factor = condition_factor(profile);

        let (source, kcal, carbs_g, protein_g, fat_g) = match override_config.filter(|o| !o.is_empty()) {
            Some(config) => {
                let (kcal, carb_pct, protein_pct, fat_pct) = self.normalize_override(profile, config);
                let (carbs, protein, fat) = grams_from_pct(kcal, carb_pct, protein_pct, fat_pct);
                info!(patient = %profile.id, kcal, carb_pct, protein_pct, fat_pct, "using override target configuration");
                (TargetSource::Override, kcal, carbs, protein, fat)
            }
            None => {
                let (kcal, carbs, protein, fat) = self.automatic_macros(profile, risk);
                (TargetSource::Automatic, kcal, carbs, protein, fat)
            }
        };

        let carbs_g = round_grams(carbs_g);
        let protein_g = round_grams(protein_g);
        let fat_g = round_grams(fat_g);
        let (carb_pct, protein_pct, fat_pct) = if kcal > 0.0 {
            (
                floor_tenth(carbs_g * 4.0 * 100.0 / kcal),
                floor_tenth(protein_g * 4.0 * 100.0 / kcal),
                floor_tenth(fat_g * 9.0 * 100.0 / kcal),
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        let fiber_g = self.consts.fiber_min_g.max((profile.weight_kg * self.consts.fiber_g_per_kg).trunc());
        let sodium_mg = if profile.systolic.is_some_and(|s| s > self.consts.hypertension_systolic) {
            self.consts.sodium_hypertension_mg
        } else {
            self.consts.sodium_default_mg
        };

        let dinner_carb_ceiling_g = self.dinner_carb_ceiling(profile);
        let meal_carb_allocation = carb_allocation(carbs_g, dinner_carb_ceiling_g);

        let portions = solve_daily_portions(
            carbs_g,
            protein_g,
            fat_g,
            &PortionContext {
                tier,
                risk_known: risk.probability().is_some(),
                activity: profile.activity,
                bmi: profile.bmi(),
            },
            self.table,
            self.exchange_consts,
        );

        let targets = NutritionalTargets {
            source,
            kcal,
            carbs_g,
            protein_g,
            fat_g,
            carb_pct,
            protein_pct,
            fat_pct,
            fiber_g,
            sodium_mg,
            condition_factor: factor,
            tier,
            meal_carb_allocation,
            dinner_carb_ceiling_g,
            portions,
        };
        debug!(patient = %profile.id, ?targets, "nutritional targets computed");
        Ok(targets)
    }

    fn normalize_override(&self, profile: &PatientProfile, config: &TargetOverride) -> (f64, f64, f64, f64) {
        let kcal = config
            .kcal
            .filter(|k| *k > 0.0)
            .unwrap_or_else(|| self.energy_estimate(profile));
        let carb = config.carb_pct.unwrap_or(self.consts.baseline_carb_pct).max(0.0);
        let protein = config.protein_pct.unwrap_or(self.consts.baseline_protein_pct).max(0.0);
        let fat = config
            .fat_pct
            .unwrap_or(100.0 - carb - protein)
            .max(0.0);

        let total = carb + protein + fat;
        if total > 100.0 {
            let scale = 100.0 / total;
            (kcal, carb * scale, protein * scale, fat * scale)
        } else {
            (kcal, carb, protein, fat)
        }
    }

    fn automatic_macros(&self, profile: &PatientProfile, risk: &RiskEstimate) -> (f64, f64, f64, f64) {
        let mut kcal = self.energy_estimate(profile);
        let base_carb = self.consts.baseline_carb_pct;
        let base_protein = self.consts.baseline_protein_pct;
        let obese = profile.is_obese();
        let poorly_controlled = profile.is_poorly_controlled();

        let (carb_pct, protein_pct) = match (risk.tier(), risk.probability()) {
            (RiskTier::Poor, Some(p)) => {
                if p > VERY_HIGH_RISK_ABOVE && !obese {
                    kcal = (kcal * self.consts.very_high_risk_kcal_factor).trunc();
                }
                if profile.is_severely_obese() && poorly_controlled {
                    ((base_carb - 10.0).clamp(25.0, 30.0), (base_protein + 2.0).min(20.0))
                } else if obese && poorly_controlled {
                    ((base_carb - 8.0).clamp(30.0, 35.0), (base_protein + 3.0).min(20.0))
                } else {
                    ((base_carb - 5.0).max(35.0), (base_protein + 4.0).min(22.0))
                }
            }
            (RiskTier::Moderate, Some(_)) => ((base_carb - 2.0).max(43.0), (base_protein + 2.0).min(20.0)),
            _ => (base_carb, base_protein),
        };
        let fat_pct = (100.0 - carb_pct - protein_pct).max(0.0);
        let (mut carbs, mut protein, mut fat) = grams_from_pct(kcal, carb_pct, protein_pct, fat_pct);

        // Gram ceilings; removed calories move to carbohydrate
        if obese && protein > self.consts.protein_ceiling_g {
            carbs += protein - self.consts.protein_ceiling_g;
            protein = self.consts.protein_ceiling_g;
        }
        let fat_ceiling = if profile.is_severely_obese() {
            Some(self.consts.fat_ceiling_severe_obesity_g)
        } else if obese || profile.ldl.is_some_and(|ldl| ldl > self.consts.ldl_fat_ceiling_threshold) {
            Some(self.consts.fat_ceiling_g)
        } else {
            None
        };
        if let Some(ceiling) = fat_ceiling {
            if fat > ceiling {
                carbs += (fat - ceiling) * 9.0 / 4.0;
                fat = ceiling;
            }
        }

        info!(
            patient = %profile.id,
            risk_path = risk.path_name(),
            tier = ?risk.tier(),
            kcal,
            carb_pct,
            protein_pct,
            "automatic targets derived"
        );
        (kcal, carbs, protein, fat)
    }

    fn dinner_carb_ceiling(&self, profile: &PatientProfile) -> Option<f64> {
        if !profile.is_diabetic_range() {
            return None;
        }
        let ceiling = if profile.is_severely_obese() {
            self.consts.dinner_carb_ceiling_severe_obesity_g
        } else if profile.is_obese() {
            self.consts.dinner_carb_ceiling_obesity_g
        } else {
            self.consts.dinner_carb_ceiling_g
        };
        Some(ceiling)
    }
}

fn grams_from_pct(kcal: f64, carb_pct: f64, protein_pct: f64, fat_pct: f64) -> (f64, f64, f64) {
    (
        kcal * carb_pct / 100.0 / 4.0,
        kcal * protein_pct / 100.0 / 4.0,
        kcal * fat_pct / 100.0 / 9.0,
    )
}

/// Per-meal carbohydrate shares. When a dinner ceiling binds, the excess
/// moves to lunch and breakfast up to their limits and the rest to snacks,
/// so the shares keep summing to one.
pub fn carb_allocation(carbs_g: f64, dinner_ceiling_g: Option<f64>) -> BTreeMap<MealCode, f64> {
    let mut shares = BASELINE_CARB_ALLOCATION;
    let dinner = MealCode::Dinner.index();

    if let Some(ceiling) = dinner_ceiling_g {
        if carbs_g > 0.0 && shares[dinner] * carbs_g > ceiling {
            let allowed = (ceiling / carbs_g).max(0.0);
            let excess = shares[dinner] - allowed;
            shares[dinner] = allowed;

            let lunch = MealCode::Lunch.index();
            let to_lunch = (excess * DINNER_EXCESS_TO_LUNCH).min((LUNCH_CARB_SHARE_MAX - shares[lunch]).max(0.0));
            shares[lunch] += to_lunch;

            let breakfast = MealCode::Breakfast.index();
            let to_breakfast =
                (excess * (1.0 - DINNER_EXCESS_TO_LUNCH)).min((BREAKFAST_CARB_SHARE_MAX - shares[breakfast]).max(0.0));
            shares[breakfast] += to_breakfast;

            let rest = excess - to_lunch - to_breakfast;
            shares[MealCode::MidMorning.index()] += rest / 2.0;
            shares[MealCode::Afternoon.index()] += rest / 2.0;
        }
    }

    MealCode::ALL.iter().map(|m| (*m, shares[m.index()])).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Flat targets with no meal allocation or portions.
    pub fn targets(kcal: f64, carbs: f64, protein: f64, fat: f64) -> NutritionalTargets {
        NutritionalTargets {
            source: TargetSource::Automatic,
            kcal,
            carbs_g: carbs,
            protein_g: protein,
            fat_g: fat,
            carb_pct: 0.0,
            protein_pct: 0.0,
            fat_pct: 0.0,
            fiber_g: 25.0,
            sodium_mg: 2300.0,
            condition_factor: 1.0,
            tier: RiskTier::Good,
            meal_carb_allocation: carb_allocation(carbs, None),
            dinner_carb_ceiling_g: None,
            portions: GroupPortions::default(),
        }
    }
}
