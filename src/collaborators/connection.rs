use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt;

use super::endpoints::{
    CombinationFood, CombinationRequest, ControlRiskRequest, ControlRiskResponse, FoodFeatures,
    GlucoseResponseRequest, GlucoseResponseResponse, PatientFeatures, PredictionEndpoint, ScoreResponse,
    SuitabilityRequest, COMBINATION, CONTROL_RISK, GLUCOSE_RESPONSE, SUITABILITY,
};
use super::{
    CombinationScorer, ControlRiskClassifier, GlucoseResponse, GlucoseResponseRegressor, MealContext,
    SuitabilityScorer,
};
use crate::catalog::FoodCandidate;
use crate::config::{ServiceSettings, SERVICE_URL_ENV_VAR};
use crate::error::CollaboratorError;
use crate::plan::FoodItem;
use crate::profile::PatientProfile;

#[derive(Debug)]
pub enum ServiceConnectionError {
    MissingServiceUrl(String),
    NetworkError(reqwest::Error),
    SerializationError(serde_json::Error),
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    OutOfRange {
        endpoint: &'static str,
        value: f64,
    },
}

impl fmt::Display for ServiceConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceConnectionError::MissingServiceUrl(var_name) => {
                write!(f, "prediction service URL not found in environment: {}", var_name)
            }
            ServiceConnectionError::NetworkError(err) => write!(f, "Network error: {}", err),
            ServiceConnectionError::SerializationError(err) => {
                write!(f, "Serialization error: {}", err)
            }
            ServiceConnectionError::ApiError { status, error_body } => {
                write!(f, "API error {}: {}", status, error_body)
            }
            ServiceConnectionError::OutOfRange { endpoint, value } => {
                write!(f, "{} returned {} outside [0, 1]", endpoint, value)
            }
        }
    }
}

impl Error for ServiceConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServiceConnectionError::NetworkError(err) => Some(err),
            ServiceConnectionError::SerializationError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceConnectionError {
    fn from(err: reqwest::Error) -> Self {
        ServiceConnectionError::NetworkError(err)
    }
}

impl From<serde_json::Error> for ServiceConnectionError {
    fn from(err: serde_json::Error) -> Self {
        ServiceConnectionError::SerializationError(err)
    }
}

impl From<ServiceConnectionError> for CollaboratorError {
    fn from(err: ServiceConnectionError) -> Self {
        match err {
            ServiceConnectionError::NetworkError(ref inner) if inner.is_timeout() => CollaboratorError::Timeout,
            ServiceConnectionError::NetworkError(_) | ServiceConnectionError::MissingServiceUrl(_) => {
                CollaboratorError::Unavailable(err.to_string())
            }
            other => CollaboratorError::InvalidResponse(other.to_string()),
        }
    }
}

/// Blocking client for a remote prediction service exposing the four
/// collaborator endpoints.
#[derive(Debug, Clone)]
pub struct PredictionServiceClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl PredictionServiceClient {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ServiceConnectionError> {
        let base_url = settings
            .base_url
            .clone()
            .ok_or_else(|| ServiceConnectionError::MissingServiceUrl(SERVICE_URL_ENV_VAR.to_string()))?;
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        endpoint: &PredictionEndpoint,
        request: &Req,
    ) -> Result<Resp, ServiceConnectionError> {
        let url = format!("{}{}", self.base_url, endpoint.path);
        let payload = serde_json::to_value(request)?;

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send()?;

        if response.status().is_success() {
            let body = response.text()?;
            Ok(serde_json::from_str::<Resp>(&body)?)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ServiceConnectionError::ApiError { status, error_body })
        }
    }

    fn unit_interval(endpoint: &PredictionEndpoint, value: f64) -> Result<f64, ServiceConnectionError> {
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(ServiceConnectionError::OutOfRange {
                endpoint: endpoint.name,
                value,
            })
        }
    }
}

impl ControlRiskClassifier for PredictionServiceClient {
    fn predict(&self, profile: &PatientProfile) -> Result<f64, CollaboratorError> {
        let request = ControlRiskRequest {
            patient: PatientFeatures::from(profile),
        };
        let response: ControlRiskResponse = self.post(&CONTROL_RISK, &request)?;
        Ok(Self::unit_interval(&CONTROL_RISK, response.probability)?)
    }
}

impl GlucoseResponseRegressor for PredictionServiceClient {
    fn predict(
        &self,
        profile: &PatientProfile,
        food: &FoodCandidate,
        context: &MealContext,
    ) -> Result<GlucoseResponse, CollaboratorError> {
        let request = GlucoseResponseRequest {
            patient: PatientFeatures::from(profile),
            food: FoodFeatures::from(food),
            meal: context.meal,
            baseline_glucose: context.baseline_glucose,
        };
        let response: GlucoseResponseResponse = self.post(&GLUCOSE_RESPONSE, &request)?;
        Ok(GlucoseResponse {
            increment: response.increment,
            peak: response.peak,
            time_to_peak_min: response.time_to_peak_min,
        })
    }
}

impl SuitabilityScorer for PredictionServiceClient {
    fn score(&self, profile: &PatientProfile, food: &FoodCandidate) -> Result<f64, CollaboratorError> {
        let request = SuitabilityRequest {
            patient: PatientFeatures::from(profile),
            food: FoodFeatures::from(food),
        };
        let response: ScoreResponse = self.post(&SUITABILITY, &request)?;
        Ok(Self::unit_interval(&SUITABILITY, response.score)?)
    }
}

impl CombinationScorer for PredictionServiceClient {
    fn score(
        &self,
        profile: &PatientProfile,
        combination: &[FoodItem],
        context: &MealContext,
    ) -> Result<f64, CollaboratorError> {
        let request = CombinationRequest {
            patient: PatientFeatures::from(profile),
            foods: combination.iter().map(CombinationFood::from).collect(),
            meal: context.meal,
        };
        let response: ScoreResponse = self.post(&COMBINATION, &request)?;
        Ok(Self::unit_interval(&COMBINATION, response.score)?)
    }
}
