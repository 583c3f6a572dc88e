use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::catalog::{starches_combinable, FoodCandidate, FoodGroup};
use crate::config::AssemblerRules;
use crate::optim::exchange::{grams_for_portions, portions_for_meal, ExchangeTable};
use crate::optim::ranker::{RankedCandidate, RankedCatalog};
use crate::optim::targets::NutritionalTargets;
use crate::plan::{DayPlan, FoodItem, MealCode, MealSlot, WeekPlan};

/// Carb totals may sit this far above a ceiling before rescaling kicks in.
const CEILING_TOLERANCE_G: f64 = 1e-6;

/// Day indices each food has been served on during one generation run.
/// Entries are only ever added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageTracker {
    uses: BTreeMap<String, Vec<usize>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, day: usize) {
        let days = self.uses.entry(name.to_string()).or_default();
        if !days.contains(&day) {
            days.push(day);
            days.sort_unstable();
        }
    }

    pub fn days_used(&self, name: &str) -> &[usize] {
        self.uses.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last_use(&self, name: &str) -> Option<usize> {
        self.days_used(name).last().copied()
    }

    /// Whether `name` may be served on `day` under the repetition rules.
    pub fn is_allowed(&self, name: &str, group: FoodGroup, day: usize, rules: &AssemblerRules) -> bool {
        let used = self.days_used(name);
        let (max_uses, min_gap) = if group == FoodGroup::Protein {
            if used.contains(&day) {
                return false;
            }
            (rules.protein_max_weekly_uses, rules.protein_min_day_gap)
        } else {
            (rules.max_weekly_uses, rules.min_day_gap)
        };

        let others: Vec<usize> = used.iter().copied().filter(|d| *d != day).collect();
        if others.len() >= max_uses {
            return false;
        }
        others.iter().all(|d| d.abs_diff(day) >= min_gap)
    }

    /// Protein foods served the day before, the day after or the same day
    /// can never be reused, not even as a fallback.
    pub fn forbids(&self, name: &str, group: FoodGroup, day: usize) -> bool {
        group == FoodGroup::Protein && self.days_used(name).iter().any(|d| d.abs_diff(day) <= 1)
    }
}

/// Builds the raw week: meals, groups and first-pass quantities.
pub struct PlanAssembler<'a> {
    rules: &'a AssemblerRules,
    table: &'a ExchangeTable,
}

impl<'a> PlanAssembler<'a> {
    pub fn new(rules: &'a AssemblerRules, table: &'a ExchangeTable) -> Self {
        Self { rules, table }
    }

    pub fn assemble(
        &self,
        targets: &NutritionalTargets,
        ranked: &RankedCatalog,
        start_date: NaiveDate,
        days: usize,
        tracker: &mut UsageTracker,
    ) -> WeekPlan {
        let mut week = WeekPlan::default();
        for day_index in 0..days {
            let date = start_date + Days::new(day_index as u64);
            let day = self.assemble_day(day_index, date, targets, ranked, tracker);
            debug!(%date, kcal = day.totals().kcal, "day assembled");
            week.days.push(day);
        }
        info!(days, foods = week.shopping_list().len(), "week assembled");
        week
    }

    fn assemble_day(
        &self,
        day_index: usize,
        date: NaiveDate,
        targets: &NutritionalTargets,
        ranked: &RankedCatalog,
        tracker: &mut UsageTracker,
    ) -> DayPlan {
        let mut day = DayPlan::new(date);
        for meal in MealCode::ALL {
            let slot = self.assemble_meal(meal, day_index, date, targets, ranked, tracker);
            for item in &slot.items {
                tracker.record(&item.food.name, day_index);
            }
            day.meals.push(slot);
        }
        day
    }

    fn assemble_meal(
        &self,
        meal: MealCode,
        day_index: usize,
        date: NaiveDate,
        targets: &NutritionalTargets,
        ranked: &RankedCatalog,
        tracker: &UsageTracker,
    ) -> MealSlot {
        let meal_kcal = targets.kcal * targets.tier.meal_calorie_share(meal);
        let mut slot = MealSlot::new(
            meal,
            meal_kcal,
            targets.meal_carbs_g(meal),
            targets.meal_carb_ceiling(meal),
        );

        for (group, portions) in portions_for_meal(meal, meal_kcal, &targets.portions, self.table) {
            if meal == MealCode::Breakfast && slot.groups().len() >= self.rules.breakfast_max_groups {
                break;
            }
            let ordered = ranked.ordered_for(group, meal, date);
            let candidates = self.available(&ordered, group, day_index, tracker, &slot);
            let Some(first) = candidates.first() else {
                debug!(%meal, %group, "no candidate available, group skipped");
                continue;
            };
            let grams = grams_for_portions(first, portions, self.table);
            let items = self.place_group(meal, group, grams, &candidates, &slot);
            slot.items.extend(items);
        }

        fit_carb_ceiling(&mut slot);
        let dropped = slot.drop_items_below(self.rules.min_serving_g);
        if dropped > 0 {
            debug!(%meal, dropped, "removed items below the minimum serving");
        }
        slot
    }

    /// Candidates for a group that pass the repetition rules, topped up with
    /// the least recently used avoided foods when too few remain.
    fn available<'c>(
        &self,
        ordered: &[&'c RankedCandidate],
        group: FoodGroup,
        day_index: usize,
        tracker: &UsageTracker,
        slot: &MealSlot,
    ) -> Vec<&'c FoodCandidate> {
        let fresh: Vec<&FoodCandidate> = ordered
            .iter()
            .copied()
            .map(|c| &c.food)
            .filter(|f| !slot.contains(&f.name))
            .collect();

        let mut allowed: Vec<&FoodCandidate> = fresh
            .iter()
            .copied()
            .filter(|f| tracker.is_allowed(&f.name, group, day_index, self.rules))
            .collect();
        if allowed.len() >= self.rules.fallback_candidates {
            return allowed;
        }

        let mut avoided: Vec<&FoodCandidate> = fresh
            .iter()
            .copied()
            .filter(|f| !tracker.is_allowed(&f.name, group, day_index, self.rules))
            .filter(|f| !tracker.forbids(&f.name, group, day_index))
            .collect();
        avoided.sort_by_key(|f| (tracker.last_use(&f.name), tracker.days_used(&f.name).len()));
        let needed = self.rules.fallback_candidates - allowed.len();
        allowed.extend(avoided.into_iter().take(needed));
        allowed
    }

    /// Sizes one group's share of a meal. Amounts above the per-food cap go
    /// to a second compatible food; protein instead grows up to its hard cap.
    pub fn place_group(
        &self,
        meal: MealCode,
        group: FoodGroup,
        grams: f64,
        candidates: &[&FoodCandidate],
        slot: &MealSlot,
    ) -> Vec<FoodItem> {
        let Some(first) = candidates.first() else {
            return Vec::new();
        };
        let mut grams = grams.max(0.0);
        if group == FoodGroup::Vegetables {
            let room = self.rules.vegetable_meal_caps.for_meal(meal) - slot.group_grams(group);
            grams = grams.min(room.max(0.0));
        }

        let soft_cap = self.rules.caps.soft_cap(group);
        if grams <= soft_cap {
            return vec![FoodItem::new((*first).clone(), grams)];
        }
        if group == FoodGroup::Protein {
            let hard_cap = self.rules.caps.hard_cap(group);
            return vec![FoodItem::new((*first).clone(), grams.min(hard_cap))];
        }

        let second = candidates[1..]
            .iter()
            .find(|c| combinable(first, c));
        let mut items = vec![FoodItem::new((*first).clone(), soft_cap)];
        let rest = (grams - soft_cap).min(soft_cap);
        match second {
            Some(_) if rest < self.rules.min_serving_g => {
                debug!(%meal, %group, rest, "remainder below the minimum serving, not paired");
            }
            Some(second) => items.push(FoodItem::new((*second).clone(), rest)),
            None => debug!(%meal, %group, grams, "no compatible second food, capping single item"),
        }
        items
    }
}

/// Whether `second` may share a meal with `first` from the same group.
pub fn combinable(first: &FoodCandidate, second: &FoodCandidate) -> bool {
    if first.group == FoodGroup::Cereals {
        starches_combinable(first, second)
    } else {
        first.id != second.id && first.name != second.name
    }
}

/// Scales the carbohydrate-bearing items of a meal down until it fits its
/// carbohydrate ceiling, if it has one.
pub fn fit_carb_ceiling(slot: &mut MealSlot) {
    let Some(ceiling) = slot.carb_ceiling_g else {
        return;
    };
    for _ in 0..3 {
        let carbs = slot.totals().carbs_g;
        if carbs <= ceiling + CEILING_TOLERANCE_G {
            return;
        }
        let factor = if carbs > 0.0 { (ceiling / carbs).max(0.0) } else { 0.0 };
        for item in slot.items.iter_mut().filter(|i| i.food.per_100g.carbs_g > 0.0) {
            let scaled = item.quantity_g() * factor;
            item.set_quantity(scaled);
        }
        debug!(meal = %slot.meal, before = carbs, ceiling, "scaled meal to carbohydrate ceiling");
    }
}
