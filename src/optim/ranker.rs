use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogFilters, CatalogRepository, FoodCandidate, FoodGroup};
use crate::collaborators::{Collaborators, MealContext};
use crate::config::RankerSettings;
use crate::error::PlanError;
use crate::plan::MealCode;
use crate::profile::{PatientFoodProfile, PatientProfile};
use crate::risk::{RiskEstimate, RiskTier};

/// A filtered catalog food with its scores.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub food: FoodCandidate,
    pub suitability: f64,
    pub predicted_peak: Option<f64>,
    pub heuristic: f64,
    pub score: f64,
}

/// Deterministic jitter in [0, 1) from a SHA-256 of the key parts.
pub fn variety_factor(patient_id: &str, date: NaiveDate, meal: MealCode, food_name: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(patient_id.as_bytes());
    hasher.update(b"|");
    hasher.update(date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(meal.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(food_name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

fn by_score_then_ties(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.food.per_100g.fiber_g.total_cmp(&a.food.per_100g.fiber_g))
        .then_with(|| a.food.glycemic_index.unwrap_or(0).cmp(&b.food.glycemic_index.unwrap_or(0)))
        .then_with(|| a.food.group.priority().cmp(&b.food.group.priority()))
        .then_with(|| a.food.name.cmp(&b.food.name))
}

/// Scored candidates grouped by food group.
#[derive(Debug, Clone, Default)]
pub struct RankedCatalog {
    patient_id: String,
    variety_weight: f64,
    by_group: BTreeMap<FoodGroup, Vec<RankedCandidate>>,
}

impl RankedCatalog {
    pub fn new(patient_id: &str, variety_weight: f64, candidates: Vec<RankedCandidate>) -> Self {
        let mut by_group: BTreeMap<FoodGroup, Vec<RankedCandidate>> = BTreeMap::new();
        for candidate in candidates {
            by_group.entry(candidate.food.group).or_default().push(candidate);
        }
        for list in by_group.values_mut() {
            list.sort_by(by_score_then_ties);
        }
        Self {
            patient_id: patient_id.to_string(),
            variety_weight,
            by_group,
        }
    }

    pub fn len(&self) -> usize {
        self.by_group.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn group(&self, group: FoodGroup) -> &[RankedCandidate] {
        self.by_group.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, name: &str) -> Option<&RankedCandidate> {
        self.by_group
            .values()
            .flat_map(|list| list.iter())
            .find(|c| c.food.name == name)
    }

    /// Group candidates ordered for one meal on one date. The variety
    /// factor reshuffles near-ties from day to day, reproducibly.
    pub fn ordered_for(&self, group: FoodGroup, meal: MealCode, date: NaiveDate) -> Vec<&RankedCandidate> {
        if meal == MealCode::Breakfast && group == FoodGroup::Protein {
            return Vec::new();
        }
        let mut keyed: Vec<(f64, &RankedCandidate)> = self
            .group(group)
            .iter()
            .map(|c| {
                let jitter = variety_factor(&self.patient_id, date, meal, &c.food.name);
                (c.score + self.variety_weight * jitter, c)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.food.name.cmp(&b.1.food.name)));
        keyed.into_iter().map(|(_, c)| c).collect()
    }
}

/// Caller-side filters layered on top of the profile's own exclusions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankerFilters {
    pub gi_ceiling: Option<u32>,
    pub excluded_groups: Vec<FoodGroup>,
}

/// Filters and scores the catalog for one patient.
pub struct CandidateRanker<'a> {
    settings: &'a RankerSettings,
    collaborators: &'a Collaborators,
}

impl<'a> CandidateRanker<'a> {
    pub fn new(settings: &'a RankerSettings, collaborators: &'a Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    /// Caller ceilings win but are clamped; otherwise the tier decides.
    pub fn gi_ceiling(&self, tier: RiskTier, caller: Option<u32>) -> u32 {
        match caller {
            Some(gi) => gi.clamp(self.settings.gi_ceiling_bounds.0, self.settings.gi_ceiling_bounds.1),
            None => match tier {
                RiskTier::Poor => self.settings.gi_ceiling_poor,
                RiskTier::Moderate => self.settings.gi_ceiling_moderate,
                RiskTier::Good => self.settings.gi_ceiling_good,
            },
        }
    }

    pub fn rank(
        &self,
        catalog: &dyn CatalogRepository,
        profile: &PatientProfile,
        risk: &RiskEstimate,
        filters: &RankerFilters,
        start_date: NaiveDate,
    ) -> Result<RankedCatalog, PlanError> {
        let gi_ceiling = self.gi_ceiling(risk.tier(), filters.gi_ceiling);
        let catalog_filters = CatalogFilters::for_profile(profile, gi_ceiling, filters.excluded_groups.clone());
        let foods = catalog.query_candidates(&catalog_filters)?;
        debug!(patient = %profile.id, count = foods.len(), filters = %catalog_filters, "catalog candidates after filtering");

        let food_profile = profile.food_profile();
        let context = MealContext {
            meal: MealCode::Lunch,
            date: start_date,
            baseline_glucose: profile.fasting_glucose,
        };

        let mut suitability_failures = 0usize;
        let mut glucose_failures = 0usize;
        let mut last_failure = None;
        let mut dropped_for_peak = 0usize;
        let mut ranked = Vec::with_capacity(foods.len());

        for food in foods {
            let predicted_peak = match self.collaborators.glucose.predict(profile, &food, &context) {
                Ok(response) => Some(response.peak),
                Err(err) => {
                    glucose_failures += 1;
                    last_failure = Some(err.into_plan_error("glucose_response_regressor"));
                    None
                }
            };
            if predicted_peak.is_some_and(|peak| peak > self.settings.glucose_peak_ceiling) {
                dropped_for_peak += 1;
                debug!(food = %food.name, peak = ?predicted_peak, "dropped for predicted glucose peak");
                continue;
            }

            let suitability = match self.collaborators.suitability.score(profile, &food) {
                Ok(score) => score.clamp(0.0, 1.0),
                Err(err) => {
                    suitability_failures += 1;
                    last_failure = Some(err.into_plan_error("suitability_scorer"));
                    self.settings.neutral_suitability
                }
            };
            let heuristic = heuristic_score(&food, &food_profile);
            let score = self.settings.suitability_weight * suitability + self.settings.heuristic_weight * heuristic;
            ranked.push(RankedCandidate {
                food,
                suitability,
                predicted_peak,
                heuristic,
                score,
            });
        }

        if let Some(err) = &last_failure {
            debug!(error = %err, "last collaborator failure while ranking");
        }
        if suitability_failures > 0 {
            warn!(count = suitability_failures, "suitability scorer unavailable, using neutral score");
        }
        if glucose_failures > 0 {
            warn!(count = glucose_failures, "glucose-response regressor unavailable, no peak screening");
        }

        let count = ranked.len();
        if count < self.settings.min_candidates {
            return Err(PlanError::CatalogInsufficient {
                count,
                minimum: self.settings.min_candidates,
                filters: catalog_filters.to_string(),
            });
        }
        if count < self.settings.warn_candidates {
            warn!(count, "few candidate foods; the week will repeat foods often");
        }
        info!(patient = %profile.id, count, gi_ceiling, dropped_for_peak, "candidates ranked");

        Ok(RankedCatalog::new(&profile.id, self.settings.variety_weight, ranked))
    }
}

/// Clinical heuristic in roughly [0, 1]: fibre up, GI down, group order,
/// then the patient's own food priorities.
pub fn heuristic_score(food: &FoodCandidate, food_profile: &PatientFoodProfile) -> f64 {
    let fiber = (food.per_100g.fiber_g / 10.0).min(1.0) * 0.4;
    let gi = (1.0 - food.glycemic_index.unwrap_or(0).min(100) as f64 / 100.0) * 0.4;
    let group = (8 - food.group.priority()) as f64 / 7.0 * 0.2;
    let mut score = fiber + gi + group;

    if food.group == FoodGroup::Vegetables {
        score *= food_profile.vegetable_priority;
    }
    if food_profile.prioritize_fish && food.is_fish() {
        score *= 1.3;
    }
    if food_profile.avoid_red_meat && food.is_red_meat() {
        score *= 0.5;
    }
    score
}
