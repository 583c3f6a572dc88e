use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meal_plan_optim::catalog::data_loader::{load_exchange_table, load_food_catalog, load_patient_profiles};
use meal_plan_optim::catalog::{InMemoryCatalog, InMemoryProfiles, ProfileRepository};
use meal_plan_optim::cli::parse_args;
use meal_plan_optim::collaborators::{Collaborators, PredictionServiceClient};
use meal_plan_optim::config::{EngineConfig, ServiceSettings};
use meal_plan_optim::generator::{GenerationRequest, MealPlanGenerator};
use meal_plan_optim::optim::exchange::ExchangeTable;

fn collaborators_from_env() -> Collaborators {
    let settings = ServiceSettings::from_env();
    if settings.base_url.is_none() {
        info!("No prediction service configured, running on heuristics");
        return Collaborators::heuristic();
    }
    match PredictionServiceClient::new(&settings) {
        Ok(client) => {
            info!(url = client.base_url(), "Using remote prediction service");
            Collaborators::from_service(client)
        }
        Err(e) => {
            warn!(error = %e, "Prediction service client could not be built, running on heuristics");
            Collaborators::heuristic()
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli_args = parse_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli_args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli_args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let table = match &cli_args.exchange_table {
        Some(path) => load_exchange_table(path)
            .with_context(|| format!("Failed to load exchange table from {:?}", path))?,
        None => ExchangeTable::standard(),
    };
    let foods = load_food_catalog(&cli_args.catalog)
        .with_context(|| format!("Failed to load food catalog from {:?}", cli_args.catalog))?;
    info!(count = foods.len(), "Food catalog loaded");

    let profiles = InMemoryProfiles::new(
        load_patient_profiles(&cli_args.profiles)
            .with_context(|| format!("Failed to load patient profiles from {:?}", cli_args.profiles))?,
    );
    let profile = profiles
        .get_profile(&cli_args.patient_id)
        .with_context(|| format!("Patient '{}' not available", cli_args.patient_id))?;

    let generator = MealPlanGenerator::new(config, table, Arc::new(InMemoryCatalog::new(foods)))
        .with_collaborators(collaborators_from_env());

    let request = GenerationRequest {
        profile,
        start_date: cli_args.start_date.unwrap_or_else(|| Local::now().date_naive()),
        days: cli_args.days,
        target_override: cli_args.target_override(),
        gi_ceiling: cli_args.gi_max,
        excluded_groups: cli_args.exclude_groups.clone(),
    };

    let progress_callback = |message: String| {
        info!("{}", message);
    };
    let result = generator
        .generate_with_progress(&request, progress_callback)
        .context("Meal plan generation failed")?;

    if !result.optimization.converged {
        warn!(
            days = ?result.optimization.out_of_band_days,
            "Some days are outside the compliance band"
        );
    }

    let json = serde_json::to_string_pretty(&result).context("Failed to serialize meal plan")?;
    match &cli_args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write plan to {:?}", path))?;
            info!(path = ?path, "Plan written");
        }
        None => println!("{}", json),
    }

    Ok(())
}
