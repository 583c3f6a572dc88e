use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use crate::catalog::FoodGroup;
use crate::optim::targets::TargetOverride;

#[derive(Parser, Debug)]
#[command(author, version, about = "Weekly meal plans for adults with type 2 diabetes", long_about = None)]
pub struct Cli {
    /// Path to the patient profiles CSV file
    #[arg(short, long)]
    pub profiles: PathBuf,

    /// Patient to plan for
    #[arg(long)]
    pub patient_id: String,

    /// Path to the food catalog CSV file
    #[arg(short, long)]
    pub catalog: PathBuf,

    /// Exchange reference table CSV; the built-in table is used when omitted
    #[arg(long)]
    pub exchange_table: Option<PathBuf>,

    #[arg(short, long, default_value_t = 7)]
    pub days: usize,

    /// First day of the plan (YYYY-MM-DD), today when omitted
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Override: daily calories
    #[arg(long)]
    pub kcal: Option<f64>,

    /// Override: carbohydrate share of calories, in percent
    #[arg(long)]
    pub carb_pct: Option<f64>,

    #[arg(long)]
    pub protein_pct: Option<f64>,

    #[arg(long)]
    pub fat_pct: Option<f64>,

    /// Glycemic-index ceiling, clamped to [30, 100]
    #[arg(long)]
    pub gi_max: Option<u32>,

    /// Food group to leave out (repeatable), e.g. `fruits` or `GRUPO3_FRUTAS`
    #[arg(long = "exclude-group")]
    pub exclude_groups: Vec<FoodGroup>,

    /// JSON file overriding engine constants
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the plan JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Override built from the target flags, if any were given.
    pub fn target_override(&self) -> Option<TargetOverride> {
        let config = TargetOverride {
            kcal: self.kcal,
            carb_pct: self.carb_pct,
            protein_pct: self.protein_pct,
            fat_pct: self.fat_pct,
        };
        (!config.is_empty()).then_some(config)
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_override_and_repeated_exclusions() {
        let cli = Cli::try_parse_from([
            "meal_plan_optim",
            "--profiles",
            "data/profiles.csv",
            "--patient-id",
            "P001",
            "--catalog",
            "data/catalog.csv",
            "--kcal",
            "1800",
            "--carb-pct",
            "30",
            "--exclude-group",
            "sugars",
            "--exclude-group",
            "GRUPO3_FRUTAS",
            "--start-date",
            "2024-06-03",
        ])
        .unwrap();
        assert_eq!(cli.days, 7);
        assert_eq!(cli.exclude_groups, vec![FoodGroup::Sugars, FoodGroup::Fruits]);
        assert_eq!(cli.start_date, NaiveDate::from_ymd_opt(2024, 6, 3));
        let config = cli.target_override().unwrap();
        assert_eq!(config.kcal, Some(1800.0));
        assert_eq!(config.protein_pct, None);
    }

    #[test]
    fn test_no_target_flags_means_no_override() {
        let cli = Cli::try_parse_from([
            "meal_plan_optim",
            "--profiles",
            "p.csv",
            "--patient-id",
            "P002",
            "--catalog",
            "c.csv",
        ])
        .unwrap();
        assert!(cli.target_override().is_none());
    }
}
