pub mod data_loader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::PlanError;
use crate::plan::{Macro, NutrientTotals};
use crate::profile::PatientProfile;

pub use data_loader::{load_exchange_table, load_food_catalog, load_patient_profiles};

/// Exchange-system food groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodGroup {
    Cereals,
    Vegetables,
    Fruits,
    Dairy,
    Protein,
    Sugars,
    Fats,
}

impl FoodGroup {
    pub const ALL: [FoodGroup; 7] = [
        FoodGroup::Cereals,
        FoodGroup::Vegetables,
        FoodGroup::Fruits,
        FoodGroup::Dairy,
        FoodGroup::Protein,
        FoodGroup::Sugars,
        FoodGroup::Fats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FoodGroup::Cereals => "cereals",
            FoodGroup::Vegetables => "vegetables",
            FoodGroup::Fruits => "fruits",
            FoodGroup::Dairy => "dairy",
            FoodGroup::Protein => "protein",
            FoodGroup::Sugars => "sugars",
            FoodGroup::Fats => "fats",
        }
    }

    /// Fixed tie-break order used when ranking candidates.
    pub fn priority(&self) -> u8 {
        match self {
            FoodGroup::Vegetables => 1,
            FoodGroup::Protein => 2,
            FoodGroup::Cereals => 3,
            FoodGroup::Fruits => 4,
            FoodGroup::Dairy => 5,
            FoodGroup::Fats => 6,
            FoodGroup::Sugars => 7,
        }
    }

    /// Macro a food of this group is mainly eaten for.
    pub fn primary_macro(&self) -> Option<Macro> {
        match self {
            FoodGroup::Cereals | FoodGroup::Fruits | FoodGroup::Sugars => Some(Macro::Carbs),
            FoodGroup::Protein | FoodGroup::Dairy => Some(Macro::Protein),
            FoodGroup::Fats => Some(Macro::Fat),
            FoodGroup::Vegetables => None,
        }
    }

    /// Nutrient used for exchange equivalence when a food lacks unit data.
    pub fn critical_nutrient(&self) -> Macro {
        match self {
            FoodGroup::Cereals | FoodGroup::Vegetables | FoodGroup::Fruits | FoodGroup::Sugars => Macro::Carbs,
            FoodGroup::Protein => Macro::Protein,
            FoodGroup::Fats => Macro::Fat,
            FoodGroup::Dairy => Macro::Kcal,
        }
    }
}

impl fmt::Display for FoodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FoodGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let group = match key.as_str() {
            "cereals" | "cereal" | "starches" | "grupo1_cereales" => FoodGroup::Cereals,
            "vegetables" | "vegetable" | "grupo2_verduras" => FoodGroup::Vegetables,
            "fruits" | "fruit" | "grupo3_frutas" => FoodGroup::Fruits,
            "dairy" | "grupo4_lacteos" => FoodGroup::Dairy,
            "protein" | "meat" | "grupo5_carnes" => FoodGroup::Protein,
            "sugars" | "sugar" | "grupo6_azucares" => FoodGroup::Sugars,
            "fats" | "fat" | "grupo7_grasas" => FoodGroup::Fats,
            _ => return Err(format!("unknown food group '{}'", s.trim())),
        };
        Ok(group)
    }
}

/// Sub-classification of the starch group governing which pairs can share a plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StarchKind {
    Cereal,
    Tuber,
    Legume,
}

const TUBER_WORDS: &[&str] = &[
    "papa", "papas", "potato", "potatoes", "camote", "batata", "yuca", "cassava", "ñame", "yam", "oca",
];
const LEGUME_WORDS: &[&str] = &[
    "lenteja", "lentejas", "lentil", "lentils", "frijol", "frijoles", "fréjol", "bean", "beans", "garbanzo",
    "garbanzos", "chickpea", "chickpeas", "alubia", "alubias", "haba", "habas", "pallar", "tarwi", "judía",
    "judías",
];
const FISH_WORDS: &[&str] = &[
    "fish", "pescado", "salmon", "salmón", "tuna", "atún", "trout", "trucha", "sardine", "sardina", "mackerel",
    "caballa", "bonito", "cod", "merluza",
];
const RED_MEAT_WORDS: &[&str] = &["beef", "pork", "res", "cerdo", "lamb", "cordero"];

/// Lowercased alphanumeric tokens of a food name.
pub fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn has_any_word(name: &str, words: &[&str]) -> bool {
    name_tokens(name).iter().any(|t| words.contains(&t.as_str()))
}

/// Case-insensitive containment used for allergy and preference lists.
pub fn name_matches(name: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    !needle.is_empty() && name.to_lowercase().contains(&needle)
}

/// A catalog food with its per-100g composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodCandidate {
    pub id: String,
    pub name: String,
    pub group: FoodGroup,
    pub subgroup: Option<String>,
    pub per_100g: NutrientTotals,
    pub glycemic_index: Option<u32>,
    pub exchange_units_per_100g: Option<f64>,
    pub active: bool,
}

impl FoodCandidate {
    pub fn starch_kind(&self) -> StarchKind {
        if let Some(sub) = self.subgroup.as_deref() {
            match sub.trim().to_lowercase().as_str() {
                "tuber" | "tuberculo" | "tubérculo" => return StarchKind::Tuber,
                "legume" | "legumbre" | "menestra" => return StarchKind::Legume,
                "cereal" => return StarchKind::Cereal,
                _ => {}
            }
        }
        if has_any_word(&self.name, TUBER_WORDS) {
            StarchKind::Tuber
        } else if has_any_word(&self.name, LEGUME_WORDS) {
            StarchKind::Legume
        } else {
            StarchKind::Cereal
        }
    }

    pub fn is_fish(&self) -> bool {
        has_any_word(&self.name, FISH_WORDS)
    }

    pub fn is_red_meat(&self) -> bool {
        self.group == FoodGroup::Protein && has_any_word(&self.name, RED_MEAT_WORDS)
    }

    pub fn is_legume(&self) -> bool {
        self.group == FoodGroup::Cereals && self.starch_kind() == StarchKind::Legume
    }

    /// Grams of a macro per gram of food.
    pub fn density(&self, nutrient: Macro) -> f64 {
        self.per_100g.get(nutrient) / 100.0
    }
}

/// Share of tokens two names have in common, relative to the longer name.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<String> = name_tokens(a).into_iter().collect();
    let tb: BTreeSet<String> = name_tokens(b).into_iter().collect();
    let longest = ta.len().max(tb.len());
    if longest == 0 {
        return 1.0;
    }
    ta.intersection(&tb).count() as f64 / longest as f64
}

/// Below this overlap two legumes count as different dishes.
pub const LEGUME_PAIR_MAX_OVERLAP: f64 = 0.5;

/// Whether two starch foods may share a plate.
pub fn starches_combinable(first: &FoodCandidate, second: &FoodCandidate) -> bool {
    if first.id == second.id || first.name == second.name {
        return false;
    }
    match (first.starch_kind(), second.starch_kind()) {
        (StarchKind::Legume, StarchKind::Legume) => token_overlap(&first.name, &second.name) < LEGUME_PAIR_MAX_OVERLAP,
        (StarchKind::Tuber, StarchKind::Legume) | (StarchKind::Legume, StarchKind::Tuber) => false,
        _ => true,
    }
}

/// Filters a catalog query applies before any scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFilters {
    pub gi_ceiling: Option<u32>,
    pub excluded_groups: Vec<FoodGroup>,
    /// Allergies plus preference excludes, matched by name containment.
    pub excluded_names: Vec<String>,
    /// Foods unioned back in after the GI and group filters.
    pub included_names: Vec<String>,
}

impl CatalogFilters {
    pub fn for_profile(profile: &PatientProfile, gi_ceiling: u32, excluded_groups: Vec<FoodGroup>) -> Self {
        let mut excluded_names = profile.allergies.clone();
        excluded_names.extend(profile.preferences.exclude.iter().cloned());
        Self {
            gi_ceiling: Some(gi_ceiling),
            excluded_groups,
            excluded_names,
            included_names: profile.preferences.include.clone(),
        }
    }

    fn is_name_excluded(&self, name: &str) -> bool {
        self.excluded_names.iter().any(|needle| name_matches(name, needle))
    }

    fn passes_gi(&self, food: &FoodCandidate) -> bool {
        match (self.gi_ceiling, food.glycemic_index) {
            (Some(ceiling), Some(gi)) => gi <= ceiling,
            _ => true,
        }
    }
}

impl fmt::Display for CatalogFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gi_ceiling {
            Some(gi) => write!(f, "gi<={}", gi)?,
            None => write!(f, "gi<=any")?,
        }
        let groups: Vec<&str> = self.excluded_groups.iter().map(|g| g.as_str()).collect();
        write!(f, ", excluded groups: [{}]", groups.join(", "))?;
        write!(f, ", excluded names: {}", self.excluded_names.len())?;
        write!(f, ", included names: {}", self.included_names.len())
    }
}

/// Read access to the food catalog.
pub trait CatalogRepository {
    fn query_candidates(&self, filters: &CatalogFilters) -> Result<Vec<FoodCandidate>, PlanError>;
}

/// Read access to patient snapshots.
pub trait ProfileRepository {
    fn get_profile(&self, patient_id: &str) -> Result<PatientProfile, PlanError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    foods: Vec<FoodCandidate>,
}

impl InMemoryCatalog {
    pub fn new(foods: Vec<FoodCandidate>) -> Self {
        Self { foods }
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }
}

impl CatalogRepository for InMemoryCatalog {
    fn query_candidates(&self, filters: &CatalogFilters) -> Result<Vec<FoodCandidate>, PlanError> {
        let mut selected: Vec<FoodCandidate> = self
            .foods
            .iter()
            .filter(|food| food.active)
            .filter(|food| filters.passes_gi(food))
            .filter(|food| !filters.excluded_groups.contains(&food.group))
            .filter(|food| !filters.is_name_excluded(&food.name))
            .cloned()
            .collect();

        // Include-list union; allergies still win
        for food in self.foods.iter().filter(|food| food.active) {
            let wanted = filters
                .included_names
                .iter()
                .any(|needle| name_matches(&food.name, needle));
            if wanted && !filters.is_name_excluded(&food.name) && !selected.iter().any(|f| f.id == food.id) {
                selected.push(food.clone());
            }
        }

        selected.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(selected)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProfiles {
    profiles: HashMap<String, PatientProfile>,
}

impl InMemoryProfiles {
    pub fn new(profiles: Vec<PatientProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

impl ProfileRepository for InMemoryProfiles {
    fn get_profile(&self, patient_id: &str) -> Result<PatientProfile, PlanError> {
        self.profiles
            .get(patient_id)
            .cloned()
            .ok_or_else(|| PlanError::Data(format!("no profile stored for patient '{}'", patient_id)))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn food(id: &str, name: &str, group: FoodGroup, kcal: f64, carbs: f64, protein: f64, fat: f64) -> FoodCandidate {
        FoodCandidate {
            id: id.to_string(),
            name: name.to_string(),
            group,
            subgroup: None,
            per_100g: NutrientTotals {
                kcal,
                carbs_g: carbs,
                protein_g: protein,
                fat_g: fat,
                fiber_g: 2.0,
                sodium_mg: 10.0,
            },
            glycemic_index: Some(40),
            exchange_units_per_100g: None,
            active: true,
        }
    }
}
