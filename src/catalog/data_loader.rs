use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use std::path::Path;

use super::{FoodCandidate, FoodGroup};
use crate::optim::exchange::{ExchangeTable, ExchangeUnit};
use crate::plan::NutrientTotals;
use crate::profile::{ActivityLevel, FoodPreferences, PatientProfile, Sex};

// Catalog column headers
const ID_COL: &str = "id";
const NAME_COL: &str = "name";
const GROUP_COL: &str = "group";
const SUBGROUP_COL: &str = "subgroup";
const KCAL_COL: &str = "kcal";
const CARBS_COL: &str = "carbs_g";
const PROTEIN_COL: &str = "protein_g";
const FAT_COL: &str = "fat_g";
const FIBER_COL: &str = "fiber_g";
const SODIUM_COL: &str = "sodium_mg";
const GI_COL: &str = "glycemic_index";
const UNITS_COL: &str = "exchange_units";
const ACTIVE_COL: &str = "active";

fn parse_optional_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name))
}

fn open_reader(csv_path: &Path, what: &str) -> Result<csv::Reader<std::fs::File>> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!("{} CSV file not found at: {:?}", what, csv_path));
    }
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open {} CSV file at {:?}", what, csv_path))?;
    Ok(ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(file))
}

/// Loads the food catalog. Rows with an empty name or an unknown group are skipped.
pub fn load_food_catalog(csv_path: &Path) -> Result<Vec<FoodCandidate>> {
    let mut rdr = open_reader(csv_path, "Catalog")?;
    let headers = rdr.headers()?.clone();

    let id_idx = column_index(&headers, ID_COL)?;
    let name_idx = column_index(&headers, NAME_COL)?;
    let group_idx = column_index(&headers, GROUP_COL)?;
    let kcal_idx = column_index(&headers, KCAL_COL)?;
    let carbs_idx = column_index(&headers, CARBS_COL)?;
    let protein_idx = column_index(&headers, PROTEIN_COL)?;
    let fat_idx = column_index(&headers, FAT_COL)?;
    // Optional columns
    let subgroup_idx = column_index(&headers, SUBGROUP_COL).ok();
    let fiber_idx = column_index(&headers, FIBER_COL).ok();
    let sodium_idx = column_index(&headers, SODIUM_COL).ok();
    let gi_idx = column_index(&headers, GI_COL).ok();
    let units_idx = column_index(&headers, UNITS_COL).ok();
    let active_idx = column_index(&headers, ACTIVE_COL).ok();

    let optional = |record: &StringRecord, idx: Option<usize>| -> Option<f64> {
        idx.and_then(|i| record.get(i)).and_then(parse_optional_f64)
    };
    let required = |record: &StringRecord, idx: usize| -> f64 {
        record.get(idx).and_then(parse_optional_f64).unwrap_or(0.0)
    };

    let mut foods = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read catalog record at row index {}", row_index))?;

        let name = record.get(name_idx).unwrap_or("").trim().to_string();
        if name.is_empty() {
            continue;
        }
        let group = match record.get(group_idx).unwrap_or("").parse::<FoodGroup>() {
            Ok(group) => group,
            Err(reason) => {
                tracing::warn!(row = row_index + 1, %reason, "skipping catalog row");
                continue;
            }
        };
        let id = record
            .get(id_idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{}", row_index + 1));

        let active = active_idx
            .and_then(|i| record.get(i))
            .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        foods.push(FoodCandidate {
            id,
            name,
            group,
            subgroup: subgroup_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            per_100g: NutrientTotals {
                kcal: required(&record, kcal_idx),
                carbs_g: required(&record, carbs_idx),
                protein_g: required(&record, protein_idx),
                fat_g: required(&record, fat_idx),
                fiber_g: optional(&record, fiber_idx).unwrap_or(0.0),
                sodium_mg: optional(&record, sodium_idx).unwrap_or(0.0),
            },
            glycemic_index: optional(&record, gi_idx).map(|gi| gi.round().max(0.0) as u32),
            exchange_units_per_100g: optional(&record, units_idx).filter(|u| *u > 0.0),
            active,
        });
    }

    if foods.is_empty() {
        return Err(anyhow::anyhow!("No valid catalog data loaded from {:?}", csv_path));
    }
    Ok(foods)
}

/// Loads an exchange reference table (one row per food group).
pub fn load_exchange_table(csv_path: &Path) -> Result<ExchangeTable> {
    let mut rdr = open_reader(csv_path, "Exchange table")?;
    let headers = rdr.headers()?.clone();

    let group_idx = column_index(&headers, GROUP_COL)?;
    let kcal_idx = column_index(&headers, KCAL_COL)?;
    let carbs_idx = column_index(&headers, CARBS_COL)?;
    let protein_idx = column_index(&headers, PROTEIN_COL)?;
    let fat_idx = column_index(&headers, FAT_COL)?;

    let mut table = ExchangeTable::empty();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read exchange record at row index {}", row_index))?;
        let group = record
            .get(group_idx)
            .unwrap_or("")
            .parse::<FoodGroup>()
            .map_err(|e| anyhow::anyhow!("Row {}: {}", row_index + 1, e))?;
        let field = |idx: usize| record.get(idx).and_then(parse_optional_f64).unwrap_or(0.0);
        table.insert(
            group,
            ExchangeUnit {
                kcal: field(kcal_idx),
                carbs_g: field(carbs_idx),
                protein_g: field(protein_idx),
                fat_g: field(fat_idx),
            },
        );
    }

    if table.is_empty() {
        return Err(anyhow::anyhow!("No exchange rows loaded from {:?}", csv_path));
    }
    Ok(table)
}

#[derive(Debug, Deserialize)]
struct ProfileRecord {
    id: String,
    age: u32,
    sex: String,
    weight_kg: f64,
    height_m: f64,
    #[serde(default)]
    activity: String,
    hba1c: Option<f64>,
    fasting_glucose: Option<f64>,
    ldl: Option<f64>,
    triglycerides: Option<f64>,
    systolic: Option<f64>,
    diastolic: Option<f64>,
    #[serde(default)]
    allergies: String,
    #[serde(default)]
    medications: String,
    #[serde(default)]
    include: String,
    #[serde(default)]
    exclude: String,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ProfileRecord {
    fn into_profile(self) -> Result<PatientProfile> {
        let sex: Sex = self
            .sex
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Patient '{}': {}", self.id, e))?;
        let activity: ActivityLevel = self
            .activity
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Patient '{}': {}", self.id, e))?;
        Ok(PatientProfile {
            id: self.id,
            age: self.age,
            sex,
            weight_kg: self.weight_kg,
            height_m: self.height_m,
            activity,
            hba1c: self.hba1c,
            fasting_glucose: self.fasting_glucose,
            ldl: self.ldl,
            triglycerides: self.triglycerides,
            systolic: self.systolic,
            diastolic: self.diastolic,
            allergies: split_list(&self.allergies),
            medications: split_list(&self.medications),
            preferences: FoodPreferences {
                include: split_list(&self.include),
                exclude: split_list(&self.exclude),
            },
        })
    }
}

/// Loads patient snapshots. List columns are `;`-separated.
pub fn load_patient_profiles(csv_path: &Path) -> Result<Vec<PatientProfile>> {
    let mut rdr = open_reader(csv_path, "Profiles")?;
    let mut profiles = Vec::new();
    for (row_index, result) in rdr.deserialize::<ProfileRecord>().enumerate() {
        let record = result.with_context(|| format!("Failed to read profile record at row index {}", row_index))?;
        profiles.push(record.into_profile()?);
    }
    if profiles.is_empty() {
        return Err(anyhow::anyhow!("No patient profiles loaded from {:?}", csv_path));
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_catalog_csv() -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "id,name,group,subgroup,kcal,carbs_g,protein_g,fat_g,fiber_g,sodium_mg,glycemic_index,exchange_units,active")?;
        writeln!(file, "c1,Quinoa,cereals,cereal,120,21.3,4.4,1.9,2.8,7,53,1.4,1")?;
        writeln!(file, "v1,Broccoli,vegetables,,34,6.6,2.8,0.4,2.6,33,15,,1")?;
        writeln!(file, "x1,Mystery,snacks,,100,10,1,1,0,0,50,,1")?; // Unknown group
        writeln!(file, ",,cereals,,100,10,1,1,0,0,50,,1")?; // Empty name
        writeln!(file, "p1,Tuna,GRUPO5_CARNES,,130,,28,1,,50,,,false")?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_load_food_catalog_success() -> Result<()> {
        let file = create_catalog_csv()?;
        let foods = load_food_catalog(file.path())?;
        assert_eq!(foods.len(), 3);

        let quinoa = foods.iter().find(|f| f.name == "Quinoa").unwrap();
        assert_eq!(quinoa.group, FoodGroup::Cereals);
        assert_eq!(quinoa.glycemic_index, Some(53));
        assert_eq!(quinoa.exchange_units_per_100g, Some(1.4));

        let broccoli = foods.iter().find(|f| f.name == "Broccoli").unwrap();
        assert_eq!(broccoli.subgroup, None);
        assert_eq!(broccoli.exchange_units_per_100g, None);

        let tuna = foods.iter().find(|f| f.name == "Tuna").unwrap();
        assert_eq!(tuna.group, FoodGroup::Protein);
        assert_eq!(tuna.per_100g.carbs_g, 0.0);
        assert!(!tuna.active);
        Ok(())
    }

    #[test]
    fn test_load_food_catalog_missing_column() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "id,name,group,kcal,carbs_g,fat_g")?;
        writeln!(file, "c1,Quinoa,cereals,120,21.3,1.9")?;
        file.flush()?;

        let result = load_food_catalog(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains(&format!("Column '{}' not found", PROTEIN_COL)));
        Ok(())
    }

    #[test]
    fn test_load_food_catalog_file_not_found() {
        let result = load_food_catalog(Path::new("this_catalog_does_not_exist.csv"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Catalog CSV file not found"));
    }

    #[test]
    fn test_load_exchange_table() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "group,kcal,carbs_g,protein_g,fat_g")?;
        writeln!(file, "cereals,70,15,2,0.5")?;
        writeln!(file, "fats,45,0,0,5")?;
        file.flush()?;

        let table = load_exchange_table(file.path())?;
        assert_eq!(table.get(FoodGroup::Cereals).map(|u| u.carbs_g), Some(15.0));
        assert!(table.get(FoodGroup::Fruits).is_none());
        Ok(())
    }

    #[test]
    fn test_load_patient_profiles_splits_lists() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "id,age,sex,weight_kg,height_m,activity,hba1c,fasting_glucose,ldl,triglycerides,systolic,diastolic,allergies,medications,include,exclude")?;
        writeln!(file, "P001,58,F,100,1.63,low,6.9,140,,160,135,85,peanut;shrimp,metformin,,liver")?;
        file.flush()?;

        let profiles = load_patient_profiles(file.path())?;
        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.sex, Sex::Female);
        assert_eq!(p.activity, ActivityLevel::Low);
        assert_eq!(p.ldl, None);
        assert_eq!(p.allergies, vec!["peanut".to_string(), "shrimp".to_string()]);
        assert_eq!(p.preferences.exclude, vec!["liver".to_string()]);
        assert!(p.preferences.include.is_empty());
        Ok(())
    }
}
