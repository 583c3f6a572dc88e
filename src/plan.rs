use chrono::NaiveDate;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};

use crate::catalog::{FoodCandidate, FoodGroup};

/// The five daily meal slots, in serving order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealCode {
    Breakfast,
    MidMorning,
    Lunch,
    Afternoon,
    Dinner,
}

impl MealCode {
    pub const ALL: [MealCode; 5] = [
        MealCode::Breakfast,
        MealCode::MidMorning,
        MealCode::Lunch,
        MealCode::Afternoon,
        MealCode::Dinner,
    ];

    pub fn index(&self) -> usize {
        match self {
            MealCode::Breakfast => 0,
            MealCode::MidMorning => 1,
            MealCode::Lunch => 2,
            MealCode::Afternoon => 3,
            MealCode::Dinner => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MealCode::Breakfast => "breakfast",
            MealCode::MidMorning => "mid_morning",
            MealCode::Lunch => "lunch",
            MealCode::Afternoon => "afternoon",
            MealCode::Dinner => "dinner",
        }
    }

    pub fn is_snack(&self) -> bool {
        matches!(self, MealCode::MidMorning | MealCode::Afternoon)
    }

    /// Meals that carry a full plate (cereal, protein or both).
    pub fn is_main(&self) -> bool {
        matches!(self, MealCode::Breakfast | MealCode::Lunch | MealCode::Dinner)
    }
}

impl fmt::Display for MealCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four macros compliance is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Macro {
    Kcal,
    Carbs,
    Protein,
    Fat,
}

impl Macro {
    pub const ALL: [Macro; 4] = [Macro::Kcal, Macro::Carbs, Macro::Protein, Macro::Fat];
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Macro::Kcal => "kcal",
            Macro::Carbs => "carbs",
            Macro::Protein => "protein",
            Macro::Fat => "fat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientTotals {
    pub kcal: f64,
    pub carbs_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sodium_mg: f64,
}

impl NutrientTotals {
    pub fn get(&self, nutrient: Macro) -> f64 {
        match nutrient {
            Macro::Kcal => self.kcal,
            Macro::Carbs => self.carbs_g,
            Macro::Protein => self.protein_g,
            Macro::Fat => self.fat_g,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            kcal: self.kcal * factor,
            carbs_g: self.carbs_g * factor,
            protein_g: self.protein_g * factor,
            fat_g: self.fat_g * factor,
            fiber_g: self.fiber_g * factor,
            sodium_mg: self.sodium_mg * factor,
        }
    }
}

impl Add for NutrientTotals {
    type Output = NutrientTotals;

    fn add(self, rhs: Self) -> Self::Output {
        NutrientTotals {
            kcal: self.kcal + rhs.kcal,
            carbs_g: self.carbs_g + rhs.carbs_g,
            protein_g: self.protein_g + rhs.protein_g,
            fat_g: self.fat_g + rhs.fat_g,
            fiber_g: self.fiber_g + rhs.fiber_g,
            sodium_mg: self.sodium_mg + rhs.sodium_mg,
        }
    }
}

impl AddAssign for NutrientTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for NutrientTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(NutrientTotals::default(), |acc, n| acc + n)
    }
}

/// One food at a concrete quantity. The contribution is recomputed on
/// every quantity change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodItem {
    pub food: FoodCandidate,
    quantity_g: f64,
    contribution: NutrientTotals,
}

impl FoodItem {
    pub fn new(food: FoodCandidate, quantity_g: f64) -> Self {
        let mut item = Self {
            food,
            quantity_g: 0.0,
            contribution: NutrientTotals::default(),
        };
        item.set_quantity(quantity_g);
        item
    }

    pub fn quantity_g(&self) -> f64 {
        self.quantity_g
    }

    pub fn contribution(&self) -> NutrientTotals {
        self.contribution
    }

    pub fn group(&self) -> FoodGroup {
        self.food.group
    }

    pub fn set_quantity(&mut self, grams: f64) {
        let grams = round_grams(grams.max(0.0));
        self.quantity_g = grams;
        self.contribution = self.food.per_100g.scaled(grams / 100.0);
    }
}

/// Quantities are kept to a tenth of a gram.
pub fn round_grams(grams: f64) -> f64 {
    (grams * 10.0).floor() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealSlot {
    pub meal: MealCode,
    pub target_kcal: f64,
    pub target_carbs_g: f64,
    /// Hard carbohydrate limit for the meal, when one applies.
    pub carb_ceiling_g: Option<f64>,
    pub items: Vec<FoodItem>,
}

impl MealSlot {
    pub fn new(meal: MealCode, target_kcal: f64, target_carbs_g: f64, carb_ceiling_g: Option<f64>) -> Self {
        Self {
            meal,
            target_kcal,
            target_carbs_g,
            carb_ceiling_g,
            items: Vec::new(),
        }
    }

    pub fn totals(&self) -> NutrientTotals {
        self.items.iter().map(|item| item.contribution()).sum()
    }

    pub fn has_group(&self, group: FoodGroup) -> bool {
        self.items.iter().any(|item| item.group() == group)
    }

    pub fn group_count(&self, group: FoodGroup) -> usize {
        self.items.iter().filter(|item| item.group() == group).count()
    }

    pub fn groups(&self) -> Vec<FoodGroup> {
        let mut groups: Vec<FoodGroup> = self.items.iter().map(|item| item.group()).collect();
        groups.sort();
        groups.dedup();
        groups
    }

    pub fn group_grams(&self, group: FoodGroup) -> f64 {
        self.items
            .iter()
            .filter(|item| item.group() == group)
            .map(|item| item.quantity_g())
            .sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.food.name == name)
    }

    /// Removes items lighter than `min_g`; returns how many went.
    pub fn drop_items_below(&mut self, min_g: f64) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.quantity_g() >= min_g);
        before - self.items.len()
    }

    /// Grams of carbohydrate still allowed under the ceiling.
    pub fn carb_headroom(&self) -> Option<f64> {
        self.carb_ceiling_g
            .map(|ceiling| (ceiling - self.totals().carbs_g).max(0.0))
    }
}

/// One day of meals. Totals are always derived from the items.
#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub meals: Vec<MealSlot>,
}

impl DayPlan {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            meals: Vec::with_capacity(MealCode::ALL.len()),
        }
    }

    pub fn totals(&self) -> NutrientTotals {
        self.meals.iter().map(|meal| meal.totals()).sum()
    }

    pub fn meal(&self, code: MealCode) -> Option<&MealSlot> {
        self.meals.iter().find(|m| m.meal == code)
    }

    pub fn meal_mut(&mut self, code: MealCode) -> Option<&mut MealSlot> {
        self.meals.iter_mut().find(|m| m.meal == code)
    }

    pub fn items(&self) -> impl Iterator<Item = &FoodItem> {
        self.meals.iter().flat_map(|meal| meal.items.iter())
    }

    pub fn uses_food(&self, name: &str) -> bool {
        self.items().any(|item| item.food.name == name)
    }

    pub fn drop_items_below(&mut self, min_g: f64) -> usize {
        self.meals.iter_mut().map(|meal| meal.drop_items_below(min_g)).sum()
    }
}

impl Serialize for DayPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DayPlan", 3)?;
        state.serialize_field("date", &self.date)?;
        state.serialize_field("meals", &self.meals)?;
        state.serialize_field("totals", &self.totals())?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub name: String,
    pub quantity_g: f64,
}

/// Whole-week totals and the calorie average per day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub days: usize,
    pub kcal: f64,
    pub carbs_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub average_daily_kcal: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekPlan {
    pub days: Vec<DayPlan>,
}

impl WeekPlan {
    /// Total grams per unique food name across all days, sorted by name.
    pub fn shopping_list(&self) -> Vec<ShoppingItem> {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for item in self.days.iter().flat_map(|day| day.items()) {
            *totals.entry(item.food.name.as_str()).or_insert(0.0) += item.quantity_g();
        }
        totals
            .into_iter()
            .map(|(name, grams)| ShoppingItem {
                name: name.to_string(),
                quantity_g: round_tenth(grams),
            })
            .collect()
    }

    pub fn summary(&self) -> WeeklySummary {
        let totals: NutrientTotals = self.days.iter().map(|day| day.totals()).sum();
        let days = self.days.len();
        let average_daily_kcal = if days == 0 { 0.0 } else { totals.kcal / days as f64 };
        WeeklySummary {
            days,
            kcal: round_tenth(totals.kcal),
            carbs_g: round_tenth(totals.carbs_g),
            protein_g: round_tenth(totals.protein_g),
            fat_g: round_tenth(totals.fat_g),
            average_daily_kcal: round_tenth(average_daily_kcal),
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::food;

    fn sample_day() -> DayPlan {
        let mut day = DayPlan::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let mut lunch = MealSlot::new(MealCode::Lunch, 600.0, 60.0, None);
        lunch.items.push(FoodItem::new(food("1", "Brown rice", FoodGroup::Cereals, 110.0, 23.0, 2.6, 0.9), 150.0));
        lunch.items.push(FoodItem::new(food("2", "Chicken breast", FoodGroup::Protein, 165.0, 0.0, 31.0, 3.6), 120.0));
        day.meals.push(lunch);
        let mut dinner = MealSlot::new(MealCode::Dinner, 400.0, 20.0, Some(20.0));
        dinner.items.push(FoodItem::new(food("1", "Brown rice", FoodGroup::Cereals, 110.0, 23.0, 2.6, 0.9), 50.0));
        day.meals.push(dinner);
        day
    }

    #[test]
    fn test_day_totals_follow_quantity_changes() {
        let mut day = sample_day();
        let before = day.totals();
        assert!((before.carbs_g - 46.0).abs() < 1e-9);

        let lunch = day.meal_mut(MealCode::Lunch).unwrap();
        lunch.items[0].set_quantity(100.0);
        let after = day.totals();
        assert!((after.carbs_g - 34.5).abs() < 1e-9);
        assert!((after.protein_g - (2.6 + 37.2 + 1.3)).abs() < 1e-9);
    }

    #[test]
    fn test_negative_quantity_becomes_zero() {
        let mut item = FoodItem::new(food("1", "Oats", FoodGroup::Cereals, 380.0, 66.0, 13.0, 7.0), 40.0);
        item.set_quantity(-5.0);
        assert_eq!(item.quantity_g(), 0.0);
        assert_eq!(item.contribution().kcal, 0.0);
    }

    #[test]
    fn test_carb_headroom_under_ceiling() {
        let day = sample_day();
        let dinner = day.meal(MealCode::Dinner).unwrap();
        assert!((dinner.carb_headroom().unwrap() - 8.5).abs() < 1e-9);
        assert_eq!(day.meal(MealCode::Lunch).unwrap().carb_headroom(), None);
    }

    #[test]
    fn test_shopping_list_sums_by_name() {
        let week = WeekPlan { days: vec![sample_day(), sample_day()] };
        let list = week.shopping_list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Brown rice");
        assert_eq!(list[0].quantity_g, 400.0);
        assert_eq!(list[1].name, "Chicken breast");
        assert_eq!(list[1].quantity_g, 240.0);
    }

    #[test]
    fn test_dropping_light_items_keeps_the_rest() {
        let mut day = sample_day();
        day.meal_mut(MealCode::Dinner).unwrap().items[0].set_quantity(3.0);
        assert_eq!(day.drop_items_below(5.0), 1);
        assert!(day.meal(MealCode::Dinner).unwrap().items.is_empty());
        assert_eq!(day.meal(MealCode::Lunch).unwrap().items.len(), 2);
    }

    #[test]
    fn test_weekly_summary_averages_calories_per_day() {
        let day = sample_day();
        let per_day = day.totals();
        let week = WeekPlan { days: vec![day.clone(), day] };
        let summary = week.summary();
        assert_eq!(summary.days, 2);
        assert!((summary.kcal - round_tenth(per_day.kcal * 2.0)).abs() < 1e-9);
        assert!((summary.average_daily_kcal - round_tenth(per_day.kcal)).abs() < 0.1);
        assert_eq!(WeekPlan::default().summary().average_daily_kcal, 0.0);
    }

    #[test]
    fn test_day_plan_serializes_derived_totals() -> anyhow::Result<()> {
        let json = serde_json::to_value(sample_day())?;
        assert_eq!(json["date"], "2024-03-04");
        assert!(json["totals"]["kcal"].as_f64().unwrap() > 0.0);
        Ok(())
    }
}
