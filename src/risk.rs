use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CollaboratorError;
use crate::plan::MealCode;
use crate::profile::PatientProfile;

/// HbA1c (%) at which the strong rule floor applies.
pub const HBA1C_STRONG_FLOOR_AT: f64 = 7.0;
pub const HBA1C_STRONG_FLOOR: f64 = 0.70;
pub const HBA1C_MILD_FLOOR_AT: f64 = 6.5;
pub const HBA1C_MILD_FLOOR: f64 = 0.50;
/// Fasting glucose (mg/dL) at which the strong rule floor applies.
pub const GLUCOSE_STRONG_FLOOR_AT: f64 = 140.0;
pub const GLUCOSE_STRONG_FLOOR: f64 = 0.65;
pub const GLUCOSE_MILD_FLOOR_AT: f64 = 126.0;
pub const GLUCOSE_MILD_FLOOR: f64 = 0.45;

pub const POOR_TIER_ABOVE: f64 = 0.6;
pub const MODERATE_TIER_ABOVE: f64 = 0.4;
/// Probability above which non-obese patients get a small calorie trim.
pub const VERY_HIGH_RISK_ABOVE: f64 = 0.8;

/// Probability of poor glycemic control and which path produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum RiskEstimate {
    /// Classifier output, not raised by any clinical floor.
    Modeled { probability: f64 },
    /// A clinical floor won over (or stood in for) the classifier.
    RuleOverridden {
        probability: f64,
        model: Option<f64>,
        reason: String,
    },
    /// Neither the classifier nor any floor produced a value.
    Unavailable,
}

impl RiskEstimate {
    /// Combines a classifier result with the profile's rule floors,
    /// keeping the larger of the two.
    pub fn resolve(profile: &PatientProfile, model: Result<f64, CollaboratorError>) -> Self {
        let floor = rule_floor(profile);
        let estimate = match (model, floor) {
            (Ok(p), Some((floor_p, reason))) => {
                let p = p.clamp(0.0, 1.0);
                if floor_p > p {
                    RiskEstimate::RuleOverridden {
                        probability: floor_p,
                        model: Some(p),
                        reason,
                    }
                } else {
                    RiskEstimate::Modeled { probability: p }
                }
            }
            (Ok(p), None) => RiskEstimate::Modeled {
                probability: p.clamp(0.0, 1.0),
            },
            (Err(err), Some((floor_p, reason))) => {
                warn!(patient = %profile.id, error = %err, "control-risk classifier unavailable, using rule floor");
                RiskEstimate::RuleOverridden {
                    probability: floor_p,
                    model: None,
                    reason,
                }
            }
            (Err(err), None) => {
                warn!(patient = %profile.id, error = %err, "control-risk classifier unavailable and no rule floor applies");
                RiskEstimate::Unavailable
            }
        };
        debug!(patient = %profile.id, ?estimate, "risk estimate resolved");
        estimate
    }

    pub fn probability(&self) -> Option<f64> {
        match self {
            RiskEstimate::Modeled { probability } => Some(*probability),
            RiskEstimate::RuleOverridden { probability, .. } => Some(*probability),
            RiskEstimate::Unavailable => None,
        }
    }

    pub fn tier(&self) -> RiskTier {
        self.probability()
            .map(RiskTier::from_probability)
            .unwrap_or(RiskTier::Good)
    }

    pub fn path_name(&self) -> &'static str {
        match self {
            RiskEstimate::Modeled { .. } => "modeled",
            RiskEstimate::RuleOverridden { .. } => "rule_overridden",
            RiskEstimate::Unavailable => "unavailable",
        }
    }
}

/// Highest clinical floor the profile triggers, with a readable reason.
pub fn rule_floor(profile: &PatientProfile) -> Option<(f64, String)> {
    let mut floors: Vec<(f64, String)> = Vec::new();

    if let Some(hba1c) = profile.hba1c {
        if hba1c >= HBA1C_STRONG_FLOOR_AT {
            floors.push((HBA1C_STRONG_FLOOR, format!("HbA1c {:.1}% >= {:.1}%", hba1c, HBA1C_STRONG_FLOOR_AT)));
        } else if hba1c >= HBA1C_MILD_FLOOR_AT {
            floors.push((HBA1C_MILD_FLOOR, format!("HbA1c {:.1}% >= {:.1}%", hba1c, HBA1C_MILD_FLOOR_AT)));
        }
    }
    if let Some(glucose) = profile.fasting_glucose {
        if glucose >= GLUCOSE_STRONG_FLOOR_AT {
            floors.push((
                GLUCOSE_STRONG_FLOOR,
                format!("fasting glucose {:.0} >= {:.0} mg/dL", glucose, GLUCOSE_STRONG_FLOOR_AT),
            ));
        } else if glucose >= GLUCOSE_MILD_FLOOR_AT {
            floors.push((
                GLUCOSE_MILD_FLOOR,
                format!("fasting glucose {:.0} >= {:.0} mg/dL", glucose, GLUCOSE_MILD_FLOOR_AT),
            ));
        }
    }

    floors
        .into_iter()
        .max_by(|a, b| a.0.total_cmp(&b.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Good,
    Moderate,
    Poor,
}

/// Meal calorie shares per tier, in `MealCode::ALL` order.
const MEAL_CALORIE_SPLIT: [(RiskTier, [f64; 5]); 3] = [
    (RiskTier::Good, [0.25, 0.10, 0.35, 0.10, 0.20]),
    (RiskTier::Moderate, [0.23, 0.11, 0.36, 0.11, 0.19]),
    (RiskTier::Poor, [0.20, 0.12, 0.38, 0.12, 0.18]),
];

impl RiskTier {
    pub fn from_probability(p: f64) -> Self {
        if p > POOR_TIER_ABOVE {
            RiskTier::Poor
        } else if p > MODERATE_TIER_ABOVE {
            RiskTier::Moderate
        } else {
            RiskTier::Good
        }
    }

    /// Share of daily calories for one meal. Shifts away from breakfast
    /// toward lunch and dinner as control worsens.
    pub fn meal_calorie_share(&self, meal: MealCode) -> f64 {
        MEAL_CALORIE_SPLIT
            .iter()
            .find(|(tier, _)| tier == self)
            .map(|(_, shares)| shares[meal.index()])
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures::profile;

    #[test]
    fn test_rule_floor_wins_over_lower_model_estimate() {
        let mut p = profile("p1", 80.0, 1.70);
        p.hba1c = Some(7.2);
        let estimate = RiskEstimate::resolve(&p, Ok(0.3));
        match estimate {
            RiskEstimate::RuleOverridden { probability, model, .. } => {
                assert_eq!(probability, HBA1C_STRONG_FLOOR);
                assert_eq!(model, Some(0.3));
            }
            other => panic!("expected rule override, got {:?}", other),
        }
        assert_eq!(estimate_tier(&p, Ok(0.3)), RiskTier::Poor);
    }

    fn estimate_tier(p: &PatientProfile, model: Result<f64, CollaboratorError>) -> RiskTier {
        RiskEstimate::resolve(p, model).tier()
    }

    #[test]
    fn test_model_kept_when_above_floor() {
        let mut p = profile("p1", 80.0, 1.70);
        p.fasting_glucose = Some(130.0);
        let estimate = RiskEstimate::resolve(&p, Ok(0.9));
        assert_eq!(estimate, RiskEstimate::Modeled { probability: 0.9 });
    }

    #[test]
    fn test_unavailable_classifier_falls_back_to_floor() {
        let mut p = profile("p1", 80.0, 1.70);
        p.hba1c = Some(6.9);
        p.fasting_glucose = Some(140.0);
        let estimate = RiskEstimate::resolve(&p, Err(CollaboratorError::Timeout));
        assert_eq!(estimate.probability(), Some(GLUCOSE_STRONG_FLOOR));
        assert_eq!(estimate.path_name(), "rule_overridden");
    }

    #[test]
    fn test_unavailable_without_floor_is_good_tier() {
        let p = profile("p1", 80.0, 1.70);
        let estimate = RiskEstimate::resolve(&p, Err(CollaboratorError::Unavailable("none".into())));
        assert_eq!(estimate, RiskEstimate::Unavailable);
        assert_eq!(estimate.tier(), RiskTier::Good);
    }

    #[test]
    fn test_meal_calorie_split_sums_to_one_per_tier() {
        for tier in [RiskTier::Good, RiskTier::Moderate, RiskTier::Poor] {
            let total: f64 = MealCode::ALL.iter().map(|m| tier.meal_calorie_share(*m)).sum();
            assert!((total - 1.0).abs() < 1e-9, "{:?} sums to {}", tier, total);
        }
        assert_eq!(RiskTier::Poor.meal_calorie_share(MealCode::Lunch), 0.38);
    }
}
