use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::catalog::{FoodCandidate, FoodGroup};
use crate::config::ExchangeConstants;
use crate::error::PlanError;
use crate::plan::{Macro, MealCode};
use crate::profile::ActivityLevel;
use crate::risk::RiskTier;

/// What one exchange portion of a group delivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeUnit {
    pub kcal: f64,
    pub carbs_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
}

impl ExchangeUnit {
    pub fn get(&self, nutrient: Macro) -> f64 {
        match nutrient {
            Macro::Kcal => self.kcal,
            Macro::Carbs => self.carbs_g,
            Macro::Protein => self.protein_g,
            Macro::Fat => self.fat_g,
        }
    }
}

/// Reference table of exchange units per food group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeTable {
    units: BTreeMap<FoodGroup, ExchangeUnit>,
}

impl Default for ExchangeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExchangeTable {
    pub fn empty() -> Self {
        Self { units: BTreeMap::new() }
    }

    /// Built-in table used when no CSV is supplied.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        let rows = [
            (FoodGroup::Cereals, 70.0, 15.0, 2.0, 0.5),
            (FoodGroup::Vegetables, 25.0, 4.0, 2.0, 0.0),
            (FoodGroup::Fruits, 60.0, 15.0, 0.0, 0.0),
            (FoodGroup::Dairy, 95.0, 12.0, 9.0, 2.0),
            (FoodGroup::Protein, 40.0, 0.0, 7.0, 1.0),
            (FoodGroup::Sugars, 40.0, 10.0, 0.0, 0.0),
            (FoodGroup::Fats, 45.0, 0.0, 0.0, 5.0),
        ];
        for (group, kcal, carbs_g, protein_g, fat_g) in rows {
            table.insert(group, ExchangeUnit { kcal, carbs_g, protein_g, fat_g });
        }
        table
    }

    pub fn insert(&mut self, group: FoodGroup, unit: ExchangeUnit) {
        self.units.insert(group, unit);
    }

    pub fn get(&self, group: FoodGroup) -> Option<&ExchangeUnit> {
        self.units.get(&group)
    }

    pub fn lookup(&self, group: FoodGroup) -> Result<&ExchangeUnit, PlanError> {
        self.units
            .get(&group)
            .ok_or(PlanError::ReferenceDataMissing { group })
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Exchange portions per food group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupPortions(pub BTreeMap<FoodGroup, f64>);

impl GroupPortions {
    pub fn get(&self, group: FoodGroup) -> f64 {
        self.0.get(&group).copied().unwrap_or(0.0)
    }

    fn set(&mut self, group: FoodGroup, portions: f64) {
        self.0.insert(group, round_portions(portions));
    }

    pub fn iter(&self) -> impl Iterator<Item = (FoodGroup, f64)> + '_ {
        self.0.iter().map(|(g, p)| (*g, *p))
    }
}

fn round_portions(portions: f64) -> f64 {
    (portions.max(0.0) * 10.0).round() / 10.0
}

/// Inputs the daily solve depends on besides the gram budget.
#[derive(Debug, Clone, Copy)]
pub struct PortionContext {
    pub tier: RiskTier,
    /// Whether a risk probability (model or rule) exists at all.
    pub risk_known: bool,
    pub activity: ActivityLevel,
    pub bmi: f64,
}

/// Splits daily macro grams into exchange portions per group.
///
/// The groups are solved in a fixed order because each one consumes part
/// of a budget the next one sees: cereals and fruit share carbohydrate,
/// dairy and protein share protein, and fats take what the others left.
///
/// # Arguments
/// * `carbs_g`, `protein_g`, `fat_g`: The daily macro budget in grams.
/// * `ctx`: Risk tier, activity and BMI, which scale the portion counts.
/// * `table`: Reference exchange units. Groups without a usable row are skipped with a warning.
/// * `consts`: Tuned factors and the [min, max] range of each group.
///
/// # Returns
/// The portion count per group, rounded to a tenth.
pub fn solve_daily_portions(
    carbs_g: f64,
    protein_g: f64,
    fat_g: f64,
    ctx: &PortionContext,
    table: &ExchangeTable,
    consts: &ExchangeConstants,
) -> GroupPortions {
    let mut portions = GroupPortions::default();
    let obese = ctx.bmi > 30.0;

    // Cereals from the carbohydrate budget
    match table.lookup(FoodGroup::Cereals) {
        Ok(unit) if unit.carbs_g > 0.0 => {
            let mut n = carbs_g / unit.carbs_g;
            n *= match ctx.tier {
                RiskTier::Poor => consts.cereal_factor_poor,
                RiskTier::Moderate => consts.cereal_factor_moderate,
                RiskTier::Good => 1.0,
            };
            n *= match ctx.activity {
                ActivityLevel::Low => consts.cereal_factor_low_activity,
                ActivityLevel::High => consts.cereal_factor_high_activity,
                ActivityLevel::Moderate => 1.0,
            };
            portions.set(FoodGroup::Cereals, n.clamp(consts.cereal_range.0, consts.cereal_range.1));
        }
        other => fall_back(&mut portions, FoodGroup::Cereals, other.err(), obese, consts),
    }

    if table.get(FoodGroup::Vegetables).is_some() {
        portions.set(FoodGroup::Vegetables, consts.vegetable_portions);
    } else {
        fall_back(&mut portions, FoodGroup::Vegetables, None, obese, consts);
    }

    // Fruit from the carbohydrate left after cereals
    match table.lookup(FoodGroup::Fruits) {
        Ok(unit) if unit.carbs_g > 0.0 => {
            let cereal_carbs = portions.get(FoodGroup::Cereals) * table.get(FoodGroup::Cereals).map_or(0.0, |u| u.carbs_g);
            let mut n = ((carbs_g - cereal_carbs) / unit.carbs_g).max(0.0);
            if ctx.tier == RiskTier::Poor {
                n *= consts.fruit_factor_poor;
            }
            portions.set(FoodGroup::Fruits, n.clamp(consts.fruit_range.0, consts.fruit_range.1));
        }
        other => fall_back(&mut portions, FoodGroup::Fruits, other.err(), obese, consts),
    }

    if table.get(FoodGroup::Dairy).is_some() {
        let n = if obese { consts.dairy_portions_obesity } else { consts.dairy_portions };
        portions.set(FoodGroup::Dairy, n);
    } else {
        fall_back(&mut portions, FoodGroup::Dairy, None, obese, consts);
    }

    // Protein group from the protein left after dairy
    match table.lookup(FoodGroup::Protein) {
        Ok(unit) if unit.protein_g > 0.0 => {
            let dairy_protein = portions.get(FoodGroup::Dairy) * table.get(FoodGroup::Dairy).map_or(0.0, |u| u.protein_g);
            let mut n = ((protein_g - dairy_protein) / unit.protein_g).max(0.0);
            if obese {
                n *= consts.protein_factor_obesity;
            }
            portions.set(FoodGroup::Protein, n.clamp(consts.protein_range.0, consts.protein_range.1));
        }
        other => fall_back(&mut portions, FoodGroup::Protein, other.err(), obese, consts),
    }

    if table.get(FoodGroup::Sugars).is_some() {
        let n = if ctx.risk_known && ctx.tier == RiskTier::Good { consts.sugar_portions } else { 0.0 };
        portions.set(FoodGroup::Sugars, n);
    }

    // Fats take what the other groups have not delivered
    match table.lookup(FoodGroup::Fats) {
        Ok(unit) if unit.fat_g > 0.0 => {
            let other_fat: f64 = portions
                .iter()
                .filter(|(group, _)| *group != FoodGroup::Fats)
                .map(|(group, n)| n * table.get(group).map_or(0.0, |u| u.fat_g))
                .sum();
            let mut n = ((fat_g - other_fat) / unit.fat_g).max(0.0) * consts.fat_amplification;
            if obese {
                n *= consts.fat_factor_obesity;
            }
            portions.set(FoodGroup::Fats, n.clamp(consts.fat_range.0, consts.fat_range.1));
        }
        other => fall_back(&mut portions, FoodGroup::Fats, other.err(), obese, consts),
    }

    debug!(?portions, "daily exchange portions solved");
    portions
}

/// Without a usable reference row a group keeps the low end of its range;
/// grams are then estimated from each food's own composition.
fn fall_back(portions: &mut GroupPortions, group: FoodGroup, err: Option<PlanError>, obese: bool, consts: &ExchangeConstants) {
    let n = match group {
        FoodGroup::Cereals => consts.cereal_range.0,
        FoodGroup::Vegetables => consts.vegetable_portions,
        FoodGroup::Fruits => consts.fruit_range.0,
        FoodGroup::Dairy if obese => consts.dairy_portions_obesity,
        FoodGroup::Dairy => consts.dairy_portions,
        FoodGroup::Protein => consts.protein_range.0,
        FoodGroup::Fats => consts.fat_range.0,
        FoodGroup::Sugars => 0.0,
    };
    match err {
        Some(err) => warn!(%group, error = %err, portions = n, "no exchange reference, using minimum portions"),
        None => warn!(%group, portions = n, "no usable exchange reference, using minimum portions"),
    }
    portions.set(group, n);
}

/// Share of a meal's calories each group should supply.
fn meal_group_shares(meal: MealCode) -> &'static [(FoodGroup, f64)] {
    match meal {
        MealCode::Breakfast => &[
            (FoodGroup::Cereals, 0.30),
            (FoodGroup::Dairy, 0.30),
            (FoodGroup::Fruits, 0.20),
            (FoodGroup::Vegetables, 0.10),
            (FoodGroup::Fats, 0.10),
        ],
        MealCode::MidMorning | MealCode::Afternoon => &[
            (FoodGroup::Fruits, 0.50),
            (FoodGroup::Dairy, 0.30),
            (FoodGroup::Vegetables, 0.20),
        ],
        MealCode::Lunch => &[
            (FoodGroup::Cereals, 0.30),
            (FoodGroup::Protein, 0.30),
            (FoodGroup::Vegetables, 0.15),
            (FoodGroup::Fats, 0.25),
        ],
        MealCode::Dinner => &[
            (FoodGroup::Protein, 0.35),
            (FoodGroup::Vegetables, 0.25),
            (FoodGroup::Cereals, 0.15),
            (FoodGroup::Fats, 0.25),
        ],
    }
}

fn meal_fraction_limit(meal: MealCode) -> f64 {
    match meal {
        MealCode::Breakfast => 0.4,
        MealCode::MidMorning | MealCode::Afternoon => 0.6,
        MealCode::Lunch => 0.7,
        MealCode::Dinner => 0.5,
    }
}

/// Portions per group for one meal from its calorie target, bounded by a
/// fraction of the day's portions.
pub fn portions_for_meal(
    meal: MealCode,
    meal_kcal: f64,
    daily: &GroupPortions,
    table: &ExchangeTable,
) -> Vec<(FoodGroup, f64)> {
    let mut result = Vec::new();
    for &(group, share) in meal_group_shares(meal) {
        let daily_portions = daily.get(group);
        if daily_portions <= 0.0 {
            continue;
        }
        let is_fat = group == FoodGroup::Fats;
        let fraction = meal_fraction_limit(meal) * if is_fat { 2.0 } else { 1.0 };
        let overflow = if is_fat { 2.0 } else { 1.5 };
        let portions = match table.get(group) {
            Some(unit) if unit.kcal > 0.0 => (meal_kcal * share / unit.kcal).min(daily_portions * fraction * overflow),
            _ => {
                debug!(%meal, %group, "no calorie reference, sizing from the daily fraction");
                daily_portions * fraction
            }
        };
        let minimum = if is_fat { 0.5 } else { 0.1 };
        result.push((group, round_portions(portions.max(minimum))));
    }
    result
}

/// Grams of one concrete food that deliver `portions` exchanges of its group.
pub fn grams_for_portions(food: &FoodCandidate, portions: f64, table: &ExchangeTable) -> f64 {
    if portions <= 0.0 {
        return 0.0;
    }
    match food.exchange_units_per_100g {
        Some(units) if units > 0.0 && units.is_finite() => return 100.0 * portions / units,
        Some(units) => {
            warn!(food = %food.name, units, "unusable exchange units, estimating grams from the food's own composition");
            return 100.0 * portions;
        }
        None => {}
    }

    let unit = match table.lookup(food.group) {
        Ok(unit) => unit,
        Err(err) => {
            warn!(food = %food.name, error = %err, "estimating grams from the food's own composition");
            return 100.0 * portions;
        }
    };

    let nutrient = food.group.critical_nutrient();
    let reference = unit.get(nutrient);
    let per_100g = food.per_100g.get(nutrient);
    if reference > 0.0 && per_100g > 0.0 {
        return reference * portions * 100.0 / per_100g;
    }
    // Fall back to calorie equivalence
    if unit.kcal > 0.0 && food.per_100g.kcal > 0.0 {
        return unit.kcal * portions * 100.0 / food.per_100g.kcal;
    }
    100.0 * portions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::food;

    fn ctx(tier: RiskTier, activity: ActivityLevel, bmi: f64) -> PortionContext {
        PortionContext {
            tier,
            risk_known: true,
            activity,
            bmi,
        }
    }

    #[test]
    fn test_good_control_portions() {
        let table = ExchangeTable::standard();
        let consts = ExchangeConstants::default();
        let p = solve_daily_portions(225.0, 75.0, 67.0, &ctx(RiskTier::Good, ActivityLevel::Moderate, 24.0), &table, &consts);

        assert_eq!(p.get(FoodGroup::Cereals), 14.0); // 225/15 = 15, clamped
        assert_eq!(p.get(FoodGroup::Vegetables), 3.0);
        assert_eq!(p.get(FoodGroup::Fruits), 2.0); // 225 - 210 = 15 -> 1.0, floor 2
        assert_eq!(p.get(FoodGroup::Dairy), 2.0);
        assert_eq!(p.get(FoodGroup::Protein), 4.5); // (75-18)/7 = 8.1, capped
        assert_eq!(p.get(FoodGroup::Sugars), 2.0);
        assert_eq!(p.get(FoodGroup::Fats), 10.0);
    }

    #[test]
    fn test_poor_control_scales_down_cereals_and_skips_sugar() {
        let table = ExchangeTable::standard();
        let consts = ExchangeConstants::default();
        let p = solve_daily_portions(135.0, 67.5, 110.0, &ctx(RiskTier::Poor, ActivityLevel::Low, 37.6), &table, &consts);

        // 135/15 * 0.85 * 0.9 = 6.885
        assert_eq!(p.get(FoodGroup::Cereals), 6.9);
        assert_eq!(p.get(FoodGroup::Dairy), 1.5);
        assert_eq!(p.get(FoodGroup::Sugars), 0.0);
        assert!(p.get(FoodGroup::Fats) <= consts.fat_range.1);
    }

    #[test]
    fn test_missing_reference_row_keeps_minimum_portions() {
        let mut table = ExchangeTable::empty();
        table.insert(FoodGroup::Cereals, ExchangeUnit { kcal: 70.0, carbs_g: 15.0, protein_g: 2.0, fat_g: 0.5 });
        let consts = ExchangeConstants::default();
        let p = solve_daily_portions(150.0, 60.0, 50.0, &ctx(RiskTier::Good, ActivityLevel::Moderate, 22.0), &table, &consts);
        assert_eq!(p.get(FoodGroup::Cereals), 10.0);
        assert_eq!(p.get(FoodGroup::Fruits), consts.fruit_range.0);
        assert_eq!(p.get(FoodGroup::Fats), consts.fat_range.0);
        assert!(!p.0.contains_key(&FoodGroup::Sugars));

        // meal sizing falls back to the daily fraction
        let lunch = portions_for_meal(MealCode::Lunch, 700.0, &p, &table);
        let fats = lunch.iter().find(|(g, _)| *g == FoodGroup::Fats).map(|(_, n)| *n);
        assert_eq!(fats, Some(7.0));
    }

    #[test]
    fn test_zero_exchange_units_fall_back_to_weight() {
        let table = ExchangeTable::standard();
        let mut oats = food("1", "Oats", FoodGroup::Cereals, 380.0, 66.0, 13.0, 7.0);
        oats.exchange_units_per_100g = Some(0.0);
        assert_eq!(grams_for_portions(&oats, 1.5, &table), 150.0);
        oats.exchange_units_per_100g = Some(f64::NAN);
        assert_eq!(grams_for_portions(&oats, 1.5, &table), 150.0);
    }

    #[test]
    fn test_grams_from_exchange_units() {
        let mut oats = food("1", "Oats", FoodGroup::Cereals, 380.0, 66.0, 13.0, 7.0);
        oats.exchange_units_per_100g = Some(4.0);
        assert_eq!(grams_for_portions(&oats, 2.0, &ExchangeTable::standard()), 50.0);
    }

    #[test]
    fn test_grams_from_critical_nutrient() {
        let table = ExchangeTable::standard();
        let rice = food("1", "Brown rice", FoodGroup::Cereals, 110.0, 25.0, 2.6, 0.9);
        // 15g carbs per portion, 25g per 100g -> 60g per portion
        assert!((grams_for_portions(&rice, 2.0, &table) - 120.0).abs() < 1e-9);

        let chicken = food("2", "Chicken breast", FoodGroup::Protein, 165.0, 0.0, 31.0, 3.6);
        assert!((grams_for_portions(&chicken, 3.1, &table) - 70.0).abs() < 1e-9);

        let oil = food("3", "Olive oil", FoodGroup::Fats, 884.0, 0.0, 0.0, 100.0);
        assert!((grams_for_portions(&oil, 2.0, &table) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_grams_fall_back_to_calories_then_weight() {
        let table = ExchangeTable::standard();
        // A "fruit" with no carbohydrate listed uses calorie equivalence
        let odd = food("1", "Avocado pulp", FoodGroup::Fruits, 120.0, 0.0, 2.0, 15.0);
        assert!((grams_for_portions(&odd, 2.0, &table) - 100.0).abs() < 1e-9);

        let empty = ExchangeTable::empty();
        let apple = food("2", "Apple", FoodGroup::Fruits, 52.0, 14.0, 0.3, 0.2);
        assert_eq!(grams_for_portions(&apple, 1.5, &empty), 150.0);
    }

    #[test]
    fn test_meal_portions_respect_daily_fraction() {
        let table = ExchangeTable::standard();
        let mut daily = GroupPortions::default();
        daily.set(FoodGroup::Protein, 4.0);
        daily.set(FoodGroup::Cereals, 6.0);
        daily.set(FoodGroup::Vegetables, 3.0);
        daily.set(FoodGroup::Fats, 6.0);

        let lunch = portions_for_meal(MealCode::Lunch, 700.0, &daily, &table);
        let protein = lunch.iter().find(|(g, _)| *g == FoodGroup::Protein).map(|(_, n)| *n).unwrap();
        // 700*0.3/40 = 5.25, limited to 4*0.7*1.5 = 4.2
        assert_eq!(protein, 4.2);
        assert!(lunch.iter().all(|(g, _)| *g != FoodGroup::Dairy));
    }
}
