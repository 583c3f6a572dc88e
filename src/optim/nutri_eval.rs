use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::optim::targets::NutritionalTargets;
use crate::plan::{DayPlan, Macro, NutrientTotals};

/// Upper edge of both compliance bands.
pub const BAND_CEILING_PCT: f64 = 100.0;
/// Slack for float noise when comparing against band edges.
pub const PCT_TOLERANCE: f64 = 1e-6;

/// Per-macro percentage of target one day achieved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroCompliance {
    pub kcal: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
}

impl MacroCompliance {
    pub fn get(&self, nutrient: Macro) -> f64 {
        match nutrient {
            Macro::Kcal => self.kcal,
            Macro::Carbs => self.carbs,
            Macro::Protein => self.protein,
            Macro::Fat => self.fat,
        }
    }

    pub fn average(&self) -> f64 {
        (self.kcal + self.carbs + self.protein + self.fat) / 4.0
    }

    /// Macros above 100%.
    pub fn over(&self) -> Vec<Macro> {
        Macro::ALL
            .into_iter()
            .filter(|m| self.get(*m) > BAND_CEILING_PCT + PCT_TOLERANCE)
            .collect()
    }

    /// Macros under the given floor.
    pub fn under(&self, floor_pct: f64) -> Vec<Macro> {
        Macro::ALL
            .into_iter()
            .filter(|m| self.get(*m) < floor_pct - PCT_TOLERANCE)
            .collect()
    }

    pub fn within(&self, floor_pct: f64) -> bool {
        self.over().is_empty() && self.under(floor_pct).is_empty()
    }

    /// Macros with a zero target that the day still supplies.
    pub fn zero_target_exceeded(&self) -> Vec<Macro> {
        Macro::ALL.into_iter().filter(|m| self.get(*m).is_infinite()).collect()
    }
}

/// Percentage of `target` that `actual` represents. Anything eaten against
/// a zero target is infinitely over; nothing eaten against it is exact.
pub fn percent_of(actual: f64, target: f64) -> f64 {
    if target > 0.0 {
        actual / target * 100.0
    } else if actual > 0.0 {
        f64::INFINITY
    } else {
        BAND_CEILING_PCT
    }
}

pub fn macro_compliance(totals: &NutrientTotals, targets: &NutritionalTargets) -> MacroCompliance {
    MacroCompliance {
        kcal: percent_of(totals.kcal, targets.kcal),
        carbs: percent_of(totals.carbs_g, targets.carbs_g),
        protein: percent_of(totals.protein_g, targets.protein_g),
        fat: percent_of(totals.fat_g, targets.fat_g),
    }
}

/// One day's compliance against targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub day_index: usize,
    pub date: NaiveDate,
    /// Percent of target per macro. A macro listed in
    /// `zero_target_exceeded` has no finite percentage and serializes as null.
    pub percentages: MacroCompliance,
    pub average_pct: f64,
    pub zero_target_exceeded: Vec<Macro>,
    /// Every macro within the optimizer band.
    pub meets_band: bool,
    /// Every macro within the wider display band.
    pub meets_display_band: bool,
    pub fiber_g: f64,
    pub sodium_mg: f64,
}

impl ComplianceSnapshot {
    pub fn evaluate(
        day_index: usize,
        day: &DayPlan,
        targets: &NutritionalTargets,
        band_floor_pct: f64,
        display_floor_pct: f64,
    ) -> Self {
        let totals = day.totals();
        let percentages = macro_compliance(&totals, targets);
        Self {
            day_index,
            date: day.date,
            average_pct: round_pct(percentages.average()),
            zero_target_exceeded: percentages.zero_target_exceeded(),
            meets_band: percentages.within(band_floor_pct),
            meets_display_band: percentages.within(display_floor_pct),
            percentages: MacroCompliance {
                kcal: round_pct(percentages.kcal),
                carbs: round_pct(percentages.carbs),
                protein: round_pct(percentages.protein),
                fat: round_pct(percentages.fat),
            },
            fiber_g: round_pct(totals.fiber_g),
            sodium_mg: round_pct(totals.sodium_mg),
        }
    }
}

fn round_pct(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::food;
    use crate::catalog::FoodGroup;
    use crate::optim::targets::fixtures::targets;
    use crate::plan::{FoodItem, MealCode, MealSlot};

    fn day_with(items: Vec<FoodItem>) -> DayPlan {
        let mut day = DayPlan::new(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        let mut lunch = MealSlot::new(MealCode::Lunch, 0.0, 0.0, None);
        lunch.items = items;
        day.meals.push(lunch);
        day
    }

    #[test]
    fn test_perfect_day_meets_both_bands() {
        // 100g of a food that exactly matches the targets
        let exact = food("1", "Balanced bowl", FoodGroup::Cereals, 500.0, 50.0, 30.0, 20.0);
        let day = day_with(vec![FoodItem::new(exact, 100.0)]);
        let snap = ComplianceSnapshot::evaluate(0, &day, &targets(500.0, 50.0, 30.0, 20.0), 90.0, 83.0);
        assert_eq!(snap.percentages.kcal, 100.0);
        assert_eq!(snap.average_pct, 100.0);
        assert!(snap.meets_band);
        assert!(snap.meets_display_band);
    }

    #[test]
    fn test_display_band_is_wider_than_optimizer_band() {
        let bowl = food("1", "Bowl", FoodGroup::Cereals, 500.0, 50.0, 30.0, 20.0);
        let day = day_with(vec![FoodItem::new(bowl, 86.0)]);
        let snap = ComplianceSnapshot::evaluate(0, &day, &targets(500.0, 50.0, 30.0, 20.0), 90.0, 83.0);
        assert!(!snap.meets_band);
        assert!(snap.meets_display_band);
    }

    #[test]
    fn test_over_and_under_lists() {
        let c = MacroCompliance {
            kcal: 95.0,
            carbs: 104.0,
            protein: 70.0,
            fat: 100.0,
        };
        assert_eq!(c.over(), vec![Macro::Carbs]);
        assert_eq!(c.under(90.0), vec![Macro::Protein]);
        assert!(!c.within(90.0));
    }

    #[test]
    fn test_zero_target_is_over_unless_nothing_is_eaten() {
        assert_eq!(percent_of(10.0, 0.0), f64::INFINITY);
        assert_eq!(percent_of(0.0, 0.0), 100.0);
        assert_eq!(percent_of(45.0, 50.0), 90.0);
    }

    #[test]
    fn test_carbs_against_zero_target_are_reported_over() {
        let rice = food("1", "Brown rice", FoodGroup::Cereals, 110.0, 23.0, 2.6, 0.9);
        let day = day_with(vec![FoodItem::new(rice, 200.0)]);
        let t = targets(1800.0, 0.0, 135.0, 140.0);

        let compliance = macro_compliance(&day.totals(), &t);
        assert_eq!(compliance.over(), vec![Macro::Carbs]);
        assert_eq!(compliance.zero_target_exceeded(), vec![Macro::Carbs]);

        let snap = ComplianceSnapshot::evaluate(0, &day, &t, 90.0, 83.0);
        assert!(!snap.meets_band);
        assert!(!snap.meets_display_band);
        assert_eq!(snap.zero_target_exceeded, vec![Macro::Carbs]);
    }

    #[test]
    fn test_nothing_eaten_meets_a_zero_target() {
        let oil = food("2", "Olive oil", FoodGroup::Fats, 884.0, 0.0, 0.0, 100.0);
        let day = day_with(vec![FoodItem::new(oil, 10.0)]);
        let compliance = macro_compliance(&day.totals(), &targets(88.4, 0.0, 0.0, 10.0));
        assert_eq!(compliance.carbs, 100.0);
        assert_eq!(compliance.protein, 100.0);
        assert!(compliance.within(90.0));
    }
}
