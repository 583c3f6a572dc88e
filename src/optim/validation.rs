use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::FoodGroup;
use crate::collaborators::{CombinationScorer, MealContext};
use crate::error::CollaboratorError;
use crate::plan::{DayPlan, MealCode, WeekPlan};
use crate::profile::PatientProfile;

/// Combination score for one finished main meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealReview {
    pub day_index: usize,
    pub date: NaiveDate,
    pub meal: MealCode,
    /// None when no combination model answered.
    pub score: Option<f64>,
    pub low_quality: bool,
}

/// Scores every non-empty breakfast, lunch and dinner of the week. A low
/// score is reported, never corrected.
pub fn review_meals(
    week: &WeekPlan,
    profile: &PatientProfile,
    scorer: &dyn CombinationScorer,
    threshold: f64,
) -> Vec<MealReview> {
    let mut reviews = Vec::new();
    let mut failures = 0usize;
    for (day_index, day) in week.days.iter().enumerate() {
        for slot in day.meals.iter().filter(|m| m.meal.is_main() && !m.items.is_empty()) {
            let context = MealContext {
                meal: slot.meal,
                date: day.date,
                baseline_glucose: profile.fasting_glucose,
            };
            let score = match scorer.score(profile, &slot.items, &context) {
                Ok(score) => Some(score),
                Err(CollaboratorError::Unavailable(_)) => None,
                Err(err) => {
                    failures += 1;
                    debug!(error = %err.into_plan_error("combination_scorer"), meal = %slot.meal, "meal left unscored");
                    None
                }
            };
            let low_quality = score.is_some_and(|s| s < threshold);
            if low_quality {
                warn!(date = %day.date, meal = %slot.meal, score = ?score, threshold, "low combination score");
            }
            reviews.push(MealReview {
                day_index,
                date: day.date,
                meal: slot.meal,
                score,
                low_quality,
            });
        }
    }
    if failures > 0 {
        warn!(failures, "combination scorer failed on some meals");
    }
    reviews
}

/// Glycemic index and excluded-group check for one finished day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCheck {
    pub day_index: usize,
    pub date: NaiveDate,
    /// Highest glycemic index served that day, if any food carries one.
    pub max_gi: Option<u32>,
    pub gi_limit: u32,
    pub gi_ok: bool,
    pub excluded_groups_present: Vec<FoodGroup>,
    pub groups_ok: bool,
}

impl DayCheck {
    pub fn evaluate(day_index: usize, day: &DayPlan, gi_limit: u32, excluded_groups: &[FoodGroup]) -> Self {
        let max_gi = day.items().filter_map(|item| item.food.glycemic_index).max();
        let mut excluded_groups_present: Vec<FoodGroup> = day
            .items()
            .map(|item| item.group())
            .filter(|group| excluded_groups.contains(group))
            .collect();
        excluded_groups_present.sort();
        excluded_groups_present.dedup();

        Self {
            day_index,
            date: day.date,
            max_gi,
            gi_limit,
            gi_ok: max_gi.map_or(true, |gi| gi <= gi_limit),
            groups_ok: excluded_groups_present.is_empty(),
            excluded_groups_present,
        }
    }

    pub fn passed(&self) -> bool {
        self.gi_ok && self.groups_ok
    }
}

pub fn check_days(week: &WeekPlan, gi_limit: u32, excluded_groups: &[FoodGroup]) -> Vec<DayCheck> {
    let checks: Vec<DayCheck> = week
        .days
        .iter()
        .enumerate()
        .map(|(i, day)| DayCheck::evaluate(i, day, gi_limit, excluded_groups))
        .collect();
    for check in checks.iter().filter(|c| !c.passed()) {
        warn!(
            date = %check.date,
            max_gi = ?check.max_gi,
            gi_limit,
            excluded = ?check.excluded_groups_present,
            "day fails its glycemic or group check"
        );
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::food;
    use crate::collaborators::NoModel;
    use crate::plan::{FoodItem, MealSlot};
    use crate::profile::fixtures::profile;

    fn day() -> DayPlan {
        let mut day = DayPlan::new(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        for meal in MealCode::ALL {
            day.meals.push(MealSlot::new(meal, 0.0, 0.0, None));
        }
        let lunch = day.meal_mut(MealCode::Lunch).unwrap();
        let mut rice = food("c1", "White rice", FoodGroup::Cereals, 130.0, 28.0, 2.7, 0.3);
        rice.glycemic_index = Some(73);
        lunch.items.push(FoodItem::new(rice, 150.0));
        lunch.items.push(FoodItem::new(food("p1", "Chicken breast", FoodGroup::Protein, 165.0, 0.0, 31.0, 3.6), 120.0));
        let dinner = day.meal_mut(MealCode::Dinner).unwrap();
        dinner.items.push(FoodItem::new(food("f1", "Apple", FoodGroup::Fruits, 52.0, 14.0, 0.3, 0.2), 100.0));
        day
    }

    struct FixedScore(f64);

    impl CombinationScorer for FixedScore {
        fn score(&self, _: &PatientProfile, _: &[FoodItem], _: &MealContext) -> Result<f64, CollaboratorError> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl CombinationScorer for Broken {
        fn score(&self, _: &PatientProfile, _: &[FoodItem], _: &MealContext) -> Result<f64, CollaboratorError> {
            Err(CollaboratorError::Timeout)
        }
    }

    #[test]
    fn test_low_scores_are_flagged_on_main_meals_only() {
        let week = WeekPlan { days: vec![day()] };
        let p = profile("p1", 70.0, 1.70);

        let reviews = review_meals(&week, &p, &FixedScore(0.2), 0.4);
        let meals: Vec<MealCode> = reviews.iter().map(|r| r.meal).collect();
        assert_eq!(meals, vec![MealCode::Lunch, MealCode::Dinner]);
        assert!(reviews.iter().all(|r| r.low_quality && r.score == Some(0.2)));

        let reviews = review_meals(&week, &p, &FixedScore(0.4), 0.4);
        assert!(reviews.iter().all(|r| !r.low_quality));
    }

    #[test]
    fn test_meals_stay_unscored_without_a_model() {
        let week = WeekPlan { days: vec![day()] };
        let p = profile("p1", 70.0, 1.70);
        for reviews in [review_meals(&week, &p, &NoModel, 0.4), review_meals(&week, &p, &Broken, 0.4)] {
            assert_eq!(reviews.len(), 2);
            assert!(reviews.iter().all(|r| r.score.is_none() && !r.low_quality));
        }
    }

    #[test]
    fn test_day_check_reports_gi_above_limit() {
        let check = DayCheck::evaluate(0, &day(), 60, &[]);
        assert_eq!(check.max_gi, Some(73));
        assert!(!check.gi_ok);
        assert!(check.groups_ok);

        let check = DayCheck::evaluate(0, &day(), 75, &[]);
        assert!(check.passed());
    }

    #[test]
    fn test_day_check_lists_excluded_groups_served() {
        let check = DayCheck::evaluate(0, &day(), 100, &[FoodGroup::Fruits, FoodGroup::Sugars]);
        assert_eq!(check.excluded_groups_present, vec![FoodGroup::Fruits]);
        assert!(!check.groups_ok);
        assert!(!check.passed());
    }
}
