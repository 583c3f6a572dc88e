use chrono::NaiveDate;
use dotenv::dotenv;
use meal_plan_optim::catalog::data_loader::{load_food_catalog, load_patient_profiles};
use meal_plan_optim::catalog::InMemoryCatalog;
use meal_plan_optim::collaborators::{
    Collaborators, ControlRiskClassifier, PredictionServiceClient, ServiceConnectionError, SuitabilityScorer,
};
use meal_plan_optim::config::{EngineConfig, ServiceSettings, SERVICE_URL_ENV_VAR};
use meal_plan_optim::error::CollaboratorError;
use meal_plan_optim::generator::{GenerationRequest, MealPlanGenerator};
use meal_plan_optim::optim::exchange::ExchangeTable;
use meal_plan_optim::profile::PatientProfile;
use meal_plan_optim::risk::RiskEstimate;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// Nothing listens on the discard port locally, so connections are refused fast
const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

fn setup_test_environment() {
    dotenv().ok();
}

fn data_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(file)
}

fn first_profile() -> PatientProfile {
    load_patient_profiles(&data_path("profiles.csv"))
        .expect("profiles load")
        .remove(0)
}

fn unreachable_settings() -> ServiceSettings {
    ServiceSettings {
        base_url: Some(UNREACHABLE_URL.to_string()),
        api_key: None,
        timeout: Duration::from_millis(300),
    }
}

#[test]
fn test_missing_service_url_error() {
    let settings = ServiceSettings {
        base_url: None,
        api_key: None,
        timeout: Duration::from_millis(300),
    };
    let result = PredictionServiceClient::new(&settings);
    assert!(matches!(result, Err(ServiceConnectionError::MissingServiceUrl(_))));
    if let Err(ServiceConnectionError::MissingServiceUrl(var_name)) = result {
        assert_eq!(var_name, SERVICE_URL_ENV_VAR);
    }
}

#[test]
fn test_trailing_slash_is_trimmed() {
    let mut settings = unreachable_settings();
    settings.base_url = Some(format!("{}/", UNREACHABLE_URL));
    let client = PredictionServiceClient::new(&settings).unwrap();
    assert_eq!(client.base_url(), UNREACHABLE_URL);
}

#[test]
fn test_unreachable_service_reports_unavailable() {
    let client = PredictionServiceClient::new(&unreachable_settings()).unwrap();
    let profile = first_profile();

    let result = ControlRiskClassifier::predict(&client, &profile);
    assert!(
        matches!(result, Err(CollaboratorError::Unavailable(_)) | Err(CollaboratorError::Timeout)),
        "{:?}",
        result
    );

    let food = load_food_catalog(&data_path("catalog.csv")).unwrap().remove(0);
    assert!(SuitabilityScorer::score(&client, &profile, &food).is_err());
}

#[test]
fn test_generation_survives_unreachable_service() {
    let client = PredictionServiceClient::new(&unreachable_settings()).unwrap();
    let foods = load_food_catalog(&data_path("catalog.csv")).unwrap();
    let generator = MealPlanGenerator::new(
        EngineConfig::default(),
        ExchangeTable::standard(),
        Arc::new(InMemoryCatalog::new(foods)),
    )
    .with_collaborators(Collaborators::from_service(client));

    let mut request = GenerationRequest::week(first_profile(), NaiveDate::from_ymd_opt(2024, 9, 2).unwrap());
    request.days = 2;
    let result = generator.generate(&request).unwrap();

    // P001 triggers the HbA1c and glucose floors, so the rule path stands in
    assert!(matches!(result.risk, RiskEstimate::RuleOverridden { model: None, .. }));
    assert_eq!(result.week.days.len(), 2);
}

#[test]
#[ignore]
fn test_live_control_risk_prediction() {
    setup_test_environment();
    let settings = ServiceSettings::from_env();
    if settings.base_url.is_none() {
        println!(
            "Skipping test_live_control_risk_prediction: {} not set.",
            SERVICE_URL_ENV_VAR
        );
        return;
    }

    let client = PredictionServiceClient::new(&settings).unwrap();
    let probability = ControlRiskClassifier::predict(&client, &first_profile()).unwrap();
    assert!((0.0..=1.0).contains(&probability));
}

#[test]
#[ignore]
fn test_live_suitability_scores_whole_catalog() {
    setup_test_environment();
    let settings = ServiceSettings::from_env();
    if settings.base_url.is_none() {
        println!(
            "Skipping test_live_suitability_scores_whole_catalog: {} not set.",
            SERVICE_URL_ENV_VAR
        );
        return;
    }

    let client = PredictionServiceClient::new(&settings).unwrap();
    let profile = first_profile();
    for food in load_food_catalog(&data_path("catalog.csv")).unwrap() {
        let score = SuitabilityScorer::score(&client, &profile, &food).unwrap();
        assert!((0.0..=1.0).contains(&score), "{} scored {}", food.name, score);
    }
}
