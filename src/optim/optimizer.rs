use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{FoodCandidate, FoodGroup};
use crate::collaborators::{Collaborators, MealContext};
use crate::config::{AssemblerRules, OptimizerSettings};
use crate::optim::assembler::{combinable, UsageTracker};
use crate::optim::nutri_eval::{macro_compliance, ComplianceSnapshot, MacroCompliance, BAND_CEILING_PCT, PCT_TOLERANCE};
use crate::optim::ranker::RankedCatalog;
use crate::optim::targets::NutritionalTargets;
use crate::optim::validation::{review_meals, MealReview};
use crate::plan::{DayPlan, FoodItem, Macro, MealCode, MealSlot, WeekPlan};
use crate::profile::PatientProfile;

/// Smallest quantity change worth applying.
const MIN_STEP_G: f64 = 0.1;
/// Clamping passes per day; the second and later passes widen the set of
/// foods that get scaled.
const MAX_CLAMP_PASSES: usize = 4;
/// Share of an item that one trim may take away.
const MAX_TRIM_SHARE: f64 = 0.5;

/// What the convergence loop did to the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub sweeps: usize,
    pub converged: bool,
    pub snapshots: Vec<ComplianceSnapshot>,
    pub out_of_band_days: Vec<usize>,
    pub meal_reviews: Vec<MealReview>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptimizerState {
    Evaluating(usize),
    Clamping(usize),
    Correcting(usize),
    Done,
}

/// Read-only inputs shared by every correction in one run.
pub struct OptimizationInput<'a> {
    pub profile: &'a PatientProfile,
    pub targets: &'a NutritionalTargets,
    pub ranked: &'a RankedCatalog,
}

/// Group that normally fixes a macro, and the one tried after it.
pub fn correction_groups(nutrient: Macro) -> (FoodGroup, FoodGroup) {
    match nutrient {
        Macro::Fat => (FoodGroup::Fats, FoodGroup::Protein),
        Macro::Protein => (FoodGroup::Protein, FoodGroup::Dairy),
        Macro::Carbs => (FoodGroup::Cereals, FoodGroup::Fruits),
        Macro::Kcal => (FoodGroup::Fats, FoodGroup::Protein),
    }
}

/// Fat, protein, carbohydrate, calories; calories first when severely low.
pub fn correction_order(compliance: &MacroCompliance, severe_kcal_pct: f64) -> Vec<Macro> {
    if compliance.kcal < severe_kcal_pct {
        vec![Macro::Kcal, Macro::Fat, Macro::Protein, Macro::Carbs]
    } else {
        vec![Macro::Fat, Macro::Protein, Macro::Carbs, Macro::Kcal]
    }
}

/// Whether an item is scaled when `over` macros exceed 100%. The strict
/// form matches on the group's primary macro only.
fn clamp_applies(item: &FoodItem, over: &[Macro], broad: bool) -> bool {
    if over.contains(&Macro::Kcal) {
        return true;
    }
    if broad {
        return over.iter().any(|m| item.food.per_100g.get(*m) > 0.0);
    }
    item.group().primary_macro().is_some_and(|m| over.contains(&m))
}

/// Scales foods down until no macro is above 100% of target. A macro whose
/// target is zero takes every food carrying it down to 0 g. Returns whether
/// anything changed.
pub fn clamp_day(day: &mut DayPlan, targets: &NutritionalTargets) -> bool {
    let mut changed = false;
    let zeroed = macro_compliance(&day.totals(), targets).zero_target_exceeded();
    if !zeroed.is_empty() {
        debug!(date = %day.date, ?zeroed, "removing foods that carry a zero-target macro");
        for item in day.meals.iter_mut().flat_map(|meal| meal.items.iter_mut()) {
            if zeroed.iter().any(|m| item.food.per_100g.get(*m) > 0.0) {
                item.set_quantity(0.0);
                changed = true;
            }
        }
    }

    for pass in 0..MAX_CLAMP_PASSES {
        let compliance = macro_compliance(&day.totals(), targets);
        let over = compliance.over();
        if over.is_empty() {
            break;
        }
        let factor = over
            .iter()
            .map(|m| BAND_CEILING_PCT / compliance.get(*m))
            .fold(1.0_f64, f64::min);
        let broad = pass > 0;
        debug!(date = %day.date, ?over, factor, broad, "clamping day");
        for item in day.meals.iter_mut().flat_map(|meal| meal.items.iter_mut()) {
            if clamp_applies(item, &over, broad) {
                let scaled = item.quantity_g() * factor;
                item.set_quantity(scaled);
                changed = true;
            }
        }
    }
    changed
}

/// Grams of `food` that can join `meal` on `day` without any macro going
/// past 100% or the meal past its carbohydrate ceiling.
fn headroom_grams(day: &DayPlan, meal: &MealSlot, food: &FoodCandidate, targets: &NutritionalTargets) -> f64 {
    let totals = day.totals();
    let mut room = f64::INFINITY;
    for nutrient in Macro::ALL {
        let density = food.density(nutrient);
        if density > 0.0 {
            room = room.min((targets.get(nutrient) - totals.get(nutrient)).max(0.0) / density);
        }
    }
    if let Some(carb_room) = meal.carb_headroom() {
        let density = food.density(Macro::Carbs);
        if density > 0.0 {
            room = room.min(carb_room / density);
        }
    }
    room
}

/// One under-target macro being worked on for one day.
struct Correction<'j> {
    input: &'j OptimizationInput<'j>,
    day: &'j mut DayPlan,
    day_index: usize,
    tracker: &'j mut UsageTracker,
    nutrient: Macro,
    /// Amount of the macro still wanted, in grams (kcal for calories).
    wanted: f64,
    meals: Vec<MealCode>,
}

impl Correction<'_> {
    fn meal_context(&self, meal: MealCode) -> MealContext {
        MealContext {
            meal,
            date: self.day.date,
            baseline_glucose: self.input.profile.fasting_glucose,
        }
    }

    fn compliance(&self) -> MacroCompliance {
        macro_compliance(&self.day.totals(), self.input.targets)
    }
}

trait CorrectionStrategy {
    fn name(&self) -> &'static str;
    fn apply(&self, optimizer: &PlanOptimizer<'_>, job: &mut Correction<'_>) -> bool;
}

/// Grows the densest existing food of the group in each eligible meal.
struct EnlargeExisting {
    secondary: bool,
}

impl CorrectionStrategy for EnlargeExisting {
    fn name(&self) -> &'static str {
        if self.secondary {
            "enlarge_secondary"
        } else {
            "enlarge_existing"
        }
    }

    fn apply(&self, optimizer: &PlanOptimizer<'_>, job: &mut Correction<'_>) -> bool {
        let (primary, secondary) = correction_groups(job.nutrient);
        let group = if self.secondary { secondary } else { primary };
        let settings = optimizer.settings;
        let ratio = if job.wanted > settings.large_deficit {
            settings.enlarge_ratio_large_deficit
        } else {
            settings.enlarge_ratio
        };
        let hard_cap = optimizer.rules.caps.hard_cap(group);

        let mut applied = false;
        for meal in job.meals.clone() {
            if job.wanted <= 0.0 {
                break;
            }
            let Some(slot) = job.day.meal(meal) else {
                continue;
            };
            let best = slot
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.group() == group && item.food.density(job.nutrient) > 0.0)
                .max_by(|a, b| {
                    a.1.food
                        .density(job.nutrient)
                        .total_cmp(&b.1.food.density(job.nutrient))
                        .then_with(|| b.1.food.name.cmp(&a.1.food.name))
                });
            let Some((index, item)) = best else {
                continue;
            };

            let density = item.food.density(job.nutrient);
            let quantity = item.quantity_g();
            let add = (job.wanted / density)
                .min(quantity * ratio)
                .min(hard_cap - quantity)
                .min(headroom_grams(job.day, slot, &item.food, job.input.targets));
            if add < MIN_STEP_G {
                continue;
            }

            if let Some(slot) = job.day.meal_mut(meal) {
                let item = &mut slot.items[index];
                item.set_quantity(quantity + add);
                let gained = (item.quantity_g() - quantity) * density;
                job.wanted -= gained;
                applied = gained > 0.0 || applied;
                debug!(%meal, food = %item.food.name, from = quantity, to = item.quantity_g(), "enlarged");
            }
        }
        applied
    }
}

/// Adds one new food of the group to the first meal that takes it. The
/// food that delivers the most of the macro within headroom goes first.
struct AddNewFood {
    secondary: bool,
}

impl AddNewFood {
    /// Whether `food` may join `slot` next to what is already served there.
    fn fits_meal(rules: &AssemblerRules, slot: &MealSlot, food: &FoodCandidate) -> bool {
        let group = food.group;
        let same_group: Vec<&FoodCandidate> = slot
            .items
            .iter()
            .filter(|item| item.group() == group)
            .map(|item| &item.food)
            .collect();
        if !same_group.is_empty() {
            // protein is enlarged, never paired
            if group == FoodGroup::Protein || same_group.len() >= rules.max_items_per_group {
                return false;
            }
            if !same_group.iter().all(|present| combinable(present, food)) {
                return false;
            }
        }

        match slot.meal {
            MealCode::Breakfast => {
                let legume_on_plate = slot.items.iter().any(|i| i.food.is_legume());
                let new_group = same_group.is_empty();
                !(new_group && slot.groups().len() >= rules.breakfast_max_groups)
                    && !(group == FoodGroup::Protein && legume_on_plate)
                    && !(food.is_legume() && slot.has_group(FoodGroup::Protein))
            }
            MealCode::MidMorning | MealCode::Afternoon => !(group == FoodGroup::Fats && slot.has_group(FoodGroup::Fats)),
            MealCode::Lunch | MealCode::Dinner => true,
        }
    }
}

impl CorrectionStrategy for AddNewFood {
    fn name(&self) -> &'static str {
        if self.secondary {
            "add_secondary"
        } else {
            "add_new_food"
        }
    }

    fn apply(&self, optimizer: &PlanOptimizer<'_>, job: &mut Correction<'_>) -> bool {
        let (primary, secondary) = correction_groups(job.nutrient);
        let group = if self.secondary { secondary } else { primary };
        let settings = optimizer.settings;
        let hard_cap = optimizer.rules.caps.hard_cap(group);

        for meal in job.meals.clone() {
            let Some(slot) = job.day.meal(meal) else {
                continue;
            };

            let context = job.meal_context(meal);
            let mut options: Vec<(FoodItem, f64)> = job
                .input
                .ranked
                .ordered_for(group, meal, job.day.date)
                .into_iter()
                .map(|c| &c.food)
                .filter(|food| !job.day.uses_food(&food.name))
                .filter(|food| Self::fits_meal(optimizer.rules, slot, food))
                .filter(|food| job.tracker.is_allowed(&food.name, group, job.day_index, optimizer.rules))
                .filter_map(|food| {
                    let density = food.density(job.nutrient);
                    if density <= 0.0 {
                        return None;
                    }
                    let grams = (job.wanted / density)
                        .min(settings.new_food_max_g)
                        .min(hard_cap)
                        .min(headroom_grams(job.day, slot, food, job.input.targets));
                    if grams < settings.new_food_min_g {
                        return None;
                    }
                    let item = FoodItem::new(food.clone(), grams);
                    let gained = item.contribution().get(job.nutrient);
                    Some((item, gained))
                })
                .collect();
            // stable: equal gains keep rank order
            options.sort_by(|a, b| tenths(b.1).total_cmp(&tenths(a.1)));
            let chosen = options
                .into_iter()
                .map(|(item, _)| item)
                .find(|item| optimizer.combination_accepts(job.input.profile, slot, item, &context));

            if let Some(item) = chosen {
                let gained = item.contribution().get(job.nutrient);
                debug!(%meal, food = %item.food.name, grams = item.quantity_g(), "added food");
                job.tracker.record(&item.food.name, job.day_index);
                if let Some(slot) = job.day.meal_mut(meal) {
                    slot.items.push(item);
                }
                job.wanted -= gained;
                return true;
            }
        }
        false
    }
}

fn tenths(value: f64) -> f64 {
    (value * 10.0).round()
}

/// Retries the first two steps with the macro's secondary group.
struct SecondaryGroup;

impl CorrectionStrategy for SecondaryGroup {
    fn name(&self) -> &'static str {
        "secondary_group"
    }

    fn apply(&self, optimizer: &PlanOptimizer<'_>, job: &mut Correction<'_>) -> bool {
        EnlargeExisting { secondary: true }.apply(optimizer, job) || AddNewFood { secondary: true }.apply(optimizer, job)
    }
}

/// Trims a macro that already sits near its target so the low one has room
/// to grow, then reruns the enlarge and add steps. Undone unless the day's
/// average compliance rises.
struct MakeRoom;

impl MakeRoom {
    /// Item mainly supplying `saturated` that carries the least of `wanted`
    /// per gram of it.
    fn trim_candidate(day: &DayPlan, saturated: Macro, wanted: Macro) -> Option<(MealCode, usize)> {
        let cost = |item: &FoodItem| item.food.density(wanted) / item.food.density(saturated);
        day.meals
            .iter()
            .flat_map(|slot| slot.items.iter().enumerate().map(move |(i, item)| (slot.meal, i, item)))
            .filter(|(_, _, item)| {
                item.group().primary_macro() == Some(saturated) && item.food.density(saturated) > 0.0
            })
            .min_by(|a, b| {
                cost(a.2)
                    .total_cmp(&cost(b.2))
                    .then_with(|| b.2.contribution().get(saturated).total_cmp(&a.2.contribution().get(saturated)))
            })
            .map(|(meal, index, _)| (meal, index))
    }

    fn trim(optimizer: &PlanOptimizer<'_>, job: &mut Correction<'_>, saturated: Macro) -> bool {
        let Some((meal, index)) = Self::trim_candidate(job.day, saturated, job.nutrient) else {
            return false;
        };
        let targets = job.input.targets;
        let release = job.day.totals().get(saturated) - targets.get(saturated) * optimizer.settings.trim_to_pct / 100.0;
        let min_serving = optimizer.rules.min_serving_g;
        let Some(item) = job.day.meal_mut(meal).and_then(|slot| slot.items.get_mut(index)) else {
            return false;
        };
        let quantity = item.quantity_g();
        let cut = (release / item.food.density(saturated))
            .min(quantity * MAX_TRIM_SHARE)
            .min(quantity - min_serving);
        if cut < MIN_STEP_G {
            return false;
        }
        item.set_quantity(quantity - cut);
        debug!(%meal, food = %item.food.name, %saturated, from = quantity, to = item.quantity_g(), "trimmed to make room");
        true
    }
}

impl CorrectionStrategy for MakeRoom {
    fn name(&self) -> &'static str {
        "make_room"
    }

    fn apply(&self, optimizer: &PlanOptimizer<'_>, job: &mut Correction<'_>) -> bool {
        let before = job.compliance();
        let trim_to = optimizer.settings.trim_to_pct;
        let mut saturated: Vec<Macro> = [Macro::Carbs, Macro::Protein, Macro::Fat]
            .into_iter()
            .filter(|m| *m != job.nutrient && before.get(*m) > trim_to + PCT_TOLERANCE)
            .collect();
        saturated.sort_by(|a, b| before.get(*b).total_cmp(&before.get(*a)));

        let refill: [&dyn CorrectionStrategy; 3] = [
            &EnlargeExisting { secondary: false },
            &AddNewFood { secondary: false },
            &SecondaryGroup,
        ];
        for traded in saturated {
            let day_before = job.day.clone();
            let tracker_before = job.tracker.clone();
            let wanted_before = job.wanted;
            if !Self::trim(optimizer, job, traded) {
                continue;
            }
            let refilled = refill.iter().any(|s| s.apply(optimizer, job));
            if refilled && job.compliance().average() > before.average() + PCT_TOLERANCE {
                debug!(nutrient = %job.nutrient, %traded, "made room");
                return true;
            }
            *job.day = day_before;
            *job.tracker = tracker_before;
            job.wanted = wanted_before;
        }
        false
    }
}

/// Drives every day of a week into the compliance band, or as close as
/// the sweep budget allows.
pub struct PlanOptimizer<'a> {
    settings: &'a OptimizerSettings,
    rules: &'a AssemblerRules,
    collaborators: &'a Collaborators,
}

impl<'a> PlanOptimizer<'a> {
    pub fn new(settings: &'a OptimizerSettings, rules: &'a AssemblerRules, collaborators: &'a Collaborators) -> Self {
        Self {
            settings,
            rules,
            collaborators,
        }
    }

    fn combination_accepts(&self, profile: &PatientProfile, slot: &MealSlot, item: &FoodItem, context: &MealContext) -> bool {
        if !slot.meal.is_main() {
            return true;
        }
        let mut trial = slot.items.clone();
        trial.push(item.clone());
        match self.collaborators.combination.score(profile, &trial, context) {
            Ok(score) if score < self.settings.combination_threshold => {
                debug!(meal = %slot.meal, food = %item.food.name, score, "combination rejected");
                false
            }
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err.into_plan_error("combination_scorer"), "accepting without a combination score");
                true
            }
        }
    }

    /// Meals a deficit of this size may be corrected in.
    fn meals_for_deficit(&self, deficit: f64) -> Vec<MealCode> {
        let mut meals = vec![MealCode::Lunch, MealCode::Dinner];
        if deficit > self.settings.large_deficit {
            meals.push(MealCode::Breakfast);
        }
        if deficit > self.settings.very_large_deficit {
            meals.push(MealCode::MidMorning);
            meals.push(MealCode::Afternoon);
        }
        meals
    }

    fn compliance(&self, day: &DayPlan, targets: &NutritionalTargets) -> MacroCompliance {
        macro_compliance(&day.totals(), targets)
    }

    /// Runs the strategy chain for every under-target macro. The meals the
    /// deficit allows go first, the remaining meals after them, and a trade
    /// against a saturated macro last. Keeps the result only when it is a
    /// measurable improvement.
    fn correct_day(
        &self,
        week: &mut WeekPlan,
        day_index: usize,
        input: &OptimizationInput<'_>,
        tracker: &mut UsageTracker,
    ) -> bool {
        let floor = self.settings.band_floor_pct;
        let aim = (floor + BAND_CEILING_PCT) / 2.0;
        let original = week.days[day_index].clone();
        let before = self.compliance(&original, input.targets);
        let mut trial_tracker = tracker.clone();
        let strategies: [&dyn CorrectionStrategy; 3] = [
            &EnlargeExisting { secondary: false },
            &AddNewFood { secondary: false },
            &SecondaryGroup,
        ];

        let day = &mut week.days[day_index];
        for nutrient in correction_order(&before, self.settings.severe_kcal_pct) {
            let current = self.compliance(day, input.targets);
            let pct = current.get(nutrient);
            if pct >= floor - PCT_TOLERANCE {
                continue;
            }
            let target = input.targets.get(nutrient);
            let deficit = target * (floor - pct) / 100.0;
            let preferred = self.meals_for_deficit(deficit);
            let remaining: Vec<MealCode> = MealCode::ALL.into_iter().filter(|m| !preferred.contains(m)).collect();
            let mut job = Correction {
                input,
                day: &mut *day,
                day_index,
                tracker: &mut trial_tracker,
                nutrient,
                wanted: target * (aim - pct) / 100.0,
                meals: preferred.clone(),
            };

            let mut applied = strategies.iter().find(|s| s.apply(self, &mut job)).map(|s| s.name());
            if applied.is_none() && !remaining.is_empty() {
                job.meals = remaining.clone();
                applied = strategies.iter().find(|s| s.apply(self, &mut job)).map(|s| s.name());
            }
            if applied.is_none() {
                job.meals = preferred.into_iter().chain(remaining).collect();
                if MakeRoom.apply(self, &mut job) {
                    applied = Some(MakeRoom.name());
                }
            }
            match applied {
                Some(strategy) => debug!(%nutrient, deficit, strategy, "correction applied"),
                None => debug!(%nutrient, deficit, "no correction available"),
            }
        }

        let after = self.compliance(day, input.targets);
        let average_rose = after.average() > before.average() + PCT_TOLERANCE;
        let macro_rose = before
            .under(floor)
            .iter()
            .any(|m| after.get(*m) - before.get(*m) > self.settings.improvement_points);
        if average_rose || macro_rose {
            *tracker = trial_tracker;
            true
        } else {
            *day = original;
            false
        }
    }

    /// Clamps and corrects every day of `week` in place until each one sits
    /// in the compliance band, nothing changes for a whole sweep, or the
    /// sweep budget runs out. The finished main meals are then scored by
    /// the combination model.
    ///
    /// # Arguments
    ///
    /// * `week` - The assembled week; quantities are rewritten in place.
    /// * `input` - Patient, targets and ranked catalog the corrections draw on.
    /// * `tracker` - Repetition record from assembly; foods added here are
    ///   recorded in it.
    /// * `progress_updater` - Receives one message per sweep and per day left
    ///   as is.
    ///
    /// # Returns
    ///
    /// The per-day compliance snapshots, the days still out of band, the
    /// number of sweeps run and the meal reviews.
    pub fn optimize(
        &self,
        week: &mut WeekPlan,
        input: &OptimizationInput<'_>,
        tracker: &mut UsageTracker,
        progress_updater: impl Fn(String),
    ) -> OptimizationReport {
        let floor = self.settings.band_floor_pct;
        let settle_after = self.settings.settle_after_stalls.max(1);
        let day_count = week.days.len();
        let mut stalls = vec![0usize; day_count];
        let mut sweeps = 0;
        let mut changed = false;
        let mut state = if day_count == 0 {
            OptimizerState::Done
        } else {
            OptimizerState::Evaluating(0)
        };

        progress_updater(format!(
            "Optimizing {} days, max sweeps: {}",
            day_count, self.settings.max_sweeps
        ));

        loop {
            state = match state {
                OptimizerState::Evaluating(d) if d >= day_count => {
                    sweeps += 1;
                    let in_band = week
                        .days
                        .iter()
                        .filter(|day| self.compliance(day, input.targets).within(floor))
                        .count();
                    progress_updater(format!("Sweep {}/{}: {}/{} days in band", sweeps, self.settings.max_sweeps, in_band, day_count));
                    if !changed || sweeps >= self.settings.max_sweeps {
                        OptimizerState::Done
                    } else {
                        changed = false;
                        OptimizerState::Evaluating(0)
                    }
                }
                OptimizerState::Evaluating(d) => {
                    let compliance = self.compliance(&week.days[d], input.targets);
                    if !compliance.over().is_empty() {
                        OptimizerState::Clamping(d)
                    } else if stalls[d] < settle_after && !compliance.under(floor).is_empty() {
                        OptimizerState::Correcting(d)
                    } else {
                        OptimizerState::Evaluating(d + 1)
                    }
                }
                OptimizerState::Clamping(d) => {
                    if clamp_day(&mut week.days[d], input.targets) {
                        changed = true;
                        stalls[d] = 0;
                    }
                    let dropped = week.days[d].drop_items_below(self.rules.min_serving_g);
                    if dropped > 0 {
                        debug!(day = d + 1, dropped, "removed items below the minimum serving");
                    }
                    let compliance = self.compliance(&week.days[d], input.targets);
                    if stalls[d] < settle_after && !compliance.under(floor).is_empty() {
                        OptimizerState::Correcting(d)
                    } else {
                        OptimizerState::Evaluating(d + 1)
                    }
                }
                OptimizerState::Correcting(d) => {
                    if self.correct_day(week, d, input, tracker) {
                        changed = true;
                        stalls[d] = 0;
                    } else {
                        stalls[d] += 1;
                        if stalls[d] >= settle_after {
                            progress_updater(format!("  Day {}: no measurable improvement, left as is", d + 1));
                        }
                    }
                    OptimizerState::Evaluating(d + 1)
                }
                OptimizerState::Done => break,
            };
        }

        let snapshots: Vec<ComplianceSnapshot> = week
            .days
            .iter()
            .enumerate()
            .map(|(i, day)| {
                ComplianceSnapshot::evaluate(i, day, input.targets, floor, self.settings.display_floor_pct)
            })
            .collect();
        let out_of_band_days: Vec<usize> = snapshots
            .iter()
            .filter(|s| !s.meets_band)
            .map(|s| s.day_index)
            .collect();
        let converged = out_of_band_days.is_empty();
        if converged {
            info!(sweeps, "every day within the compliance band");
        } else {
            warn!(sweeps, days = ?out_of_band_days, "optimizer stopped with days out of band");
        }

        let meal_reviews = review_meals(
            week,
            input.profile,
            self.collaborators.combination.as_ref(),
            self.settings.combination_threshold,
        );

        OptimizationReport {
            sweeps,
            converged,
            snapshots,
            out_of_band_days,
            meal_reviews,
        }
    }
}
