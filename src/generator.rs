use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogRepository, FoodGroup};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::error::PlanError;
use crate::optim::assembler::{PlanAssembler, UsageTracker};
use crate::optim::exchange::ExchangeTable;
use crate::optim::nutri_eval::ComplianceSnapshot;
use crate::optim::optimizer::{OptimizationInput, PlanOptimizer};
use crate::optim::ranker::{CandidateRanker, RankerFilters};
use crate::optim::targets::{NutritionalTargets, TargetCalculator, TargetOverride, TargetSource};
use crate::optim::validation::{check_days, DayCheck, MealReview};
use crate::plan::{ShoppingItem, WeekPlan, WeeklySummary};
use crate::profile::PatientProfile;
use crate::risk::RiskEstimate;

/// Everything one generation call needs from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub profile: PatientProfile,
    pub start_date: NaiveDate,
    pub days: usize,
    pub target_override: Option<TargetOverride>,
    pub gi_ceiling: Option<u32>,
    pub excluded_groups: Vec<FoodGroup>,
}

impl GenerationRequest {
    pub fn week(profile: PatientProfile, start_date: NaiveDate) -> Self {
        Self {
            profile,
            start_date,
            days: 7,
            target_override: None,
            gi_ceiling: None,
            excluded_groups: Vec::new(),
        }
    }
}

/// The system-proposed targets and the caller's override, kept apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetConfigurationRecord {
    pub proposed: NutritionalTargets,
    pub override_input: Option<TargetOverride>,
    pub overridden: Option<NutritionalTargets>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub sweeps: usize,
    pub converged: bool,
    pub out_of_band_days: Vec<usize>,
    pub meal_reviews: Vec<MealReview>,
    pub low_quality_meals: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub patient_id: String,
    pub risk: RiskEstimate,
    pub week: WeekPlan,
    pub compliance: Vec<ComplianceSnapshot>,
    pub day_checks: Vec<DayCheck>,
    pub weekly_summary: WeeklySummary,
    pub shopping_list: Vec<ShoppingItem>,
    pub targets: NutritionalTargets,
    pub target_record: TargetConfigurationRecord,
    pub special_recommendations: Vec<String>,
    pub optimization: OptimizationSummary,
}

/// Outcome data handed to telemetry after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanOutcomeRecord {
    pub patient_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub risk_path: String,
    pub risk_probability: Option<f64>,
    pub target_source: TargetSource,
    pub average_compliance_pct: f64,
    pub days_in_band: usize,
    pub days: usize,
}

/// Write-only sink for plan outcomes.
pub trait PlanTelemetrySink {
    fn record(&self, outcome: &PlanOutcomeRecord);
}

/// Default sink: logs the outcome at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

impl PlanTelemetrySink for LogTelemetry {
    fn record(&self, outcome: &PlanOutcomeRecord) {
        debug!(
            patient = %outcome.patient_id,
            risk_path = %outcome.risk_path,
            average = outcome.average_compliance_pct,
            in_band = outcome.days_in_band,
            days = outcome.days,
            "plan outcome"
        );
    }
}

/// Runs targets, ranking, assembly and optimization for one request.
pub struct MealPlanGenerator {
    config: EngineConfig,
    table: ExchangeTable,
    catalog: Arc<dyn CatalogRepository + Send + Sync>,
    collaborators: Collaborators,
    telemetry: Arc<dyn PlanTelemetrySink + Send + Sync>,
}

impl MealPlanGenerator {
    pub fn new(config: EngineConfig, table: ExchangeTable, catalog: Arc<dyn CatalogRepository + Send + Sync>) -> Self {
        Self {
            config,
            table,
            catalog,
            collaborators: Collaborators::heuristic(),
            telemetry: Arc::new(LogTelemetry),
        }
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn PlanTelemetrySink + Send + Sync>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, PlanError> {
        self.generate_with_progress(request, |message| debug!("{}", message))
    }

    pub fn generate_with_progress(
        &self,
        request: &GenerationRequest,
        progress_updater: impl Fn(String),
    ) -> Result<GenerationResult, PlanError> {
        let profile = &request.profile;
        profile.validate()?;
        if request.days == 0 {
            return Err(PlanError::Generation("at least one day must be requested".to_string()));
        }
        progress_updater(format!(
            "Generating {} days for patient {} from {}",
            request.days, profile.id, request.start_date
        ));

        let risk = RiskEstimate::resolve(profile, self.collaborators.classifier.predict(profile));
        progress_updater(format!("Risk estimate: {} ({:?})", risk.path_name(), risk.probability()));

        let calculator = TargetCalculator::new(&self.config.targets, &self.config.exchange, &self.table);
        let proposed = calculator.calculate(profile, &risk, None)?;
        let override_input = request.target_override.clone().filter(|o| !o.is_empty());
        let overridden = match &override_input {
            Some(config) => Some(calculator.calculate(profile, &risk, Some(config))?),
            None => None,
        };
        let targets = overridden.clone().unwrap_or_else(|| proposed.clone());
        progress_updater(format!(
            "Targets ({:?}): {} kcal, {}g carbs, {}g protein, {}g fat",
            targets.source, targets.kcal, targets.carbs_g, targets.protein_g, targets.fat_g
        ));

        let ranker = CandidateRanker::new(&self.config.ranker, &self.collaborators);
        let filters = RankerFilters {
            gi_ceiling: request.gi_ceiling,
            excluded_groups: request.excluded_groups.clone(),
        };
        let ranked = ranker.rank(self.catalog.as_ref(), profile, &risk, &filters, request.start_date)?;
        let gi_limit = ranker.gi_ceiling(risk.tier(), request.gi_ceiling);
        progress_updater(format!("{} candidate foods ranked", ranked.len()));

        let mut tracker = UsageTracker::new();
        let assembler = PlanAssembler::new(&self.config.assembler, &self.table);
        let mut week = assembler.assemble(&targets, &ranked, request.start_date, request.days, &mut tracker);

        let optimizer = PlanOptimizer::new(&self.config.optimizer, &self.config.assembler, &self.collaborators);
        let input = OptimizationInput {
            profile,
            targets: &targets,
            ranked: &ranked,
        };
        let report = optimizer.optimize(&mut week, &input, &mut tracker, &progress_updater);

        let shopping_list = week.shopping_list();
        let weekly_summary = week.summary();
        let day_checks = check_days(&week, gi_limit, &request.excluded_groups);
        let low_quality_meals = report.meal_reviews.iter().filter(|r| r.low_quality).count();
        if low_quality_meals > 0 {
            warn!(patient = %profile.id, low_quality_meals, "some meals scored below the combination threshold");
        }
        let days_in_band = report.snapshots.iter().filter(|s| s.meets_band).count();
        // a zero target leaves an infinite percentage out of the average
        let finite: Vec<f64> = report
            .snapshots
            .iter()
            .map(|s| s.average_pct)
            .filter(|pct| pct.is_finite())
            .collect();
        let average_compliance_pct = if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        info!(
            patient = %profile.id,
            days = request.days,
            days_in_band,
            average_compliance_pct,
            average_daily_kcal = weekly_summary.average_daily_kcal,
            "plan generated"
        );

        self.telemetry.record(&PlanOutcomeRecord {
            patient_id: profile.id.clone(),
            start_date: request.start_date,
            end_date: request.start_date + Days::new(request.days.saturating_sub(1) as u64),
            risk_path: risk.path_name().to_string(),
            risk_probability: risk.probability(),
            target_source: targets.source,
            average_compliance_pct,
            days_in_band,
            days: request.days,
        });

        Ok(GenerationResult {
            patient_id: profile.id.clone(),
            risk,
            week,
            compliance: report.snapshots,
            day_checks,
            weekly_summary,
            shopping_list,
            target_record: TargetConfigurationRecord {
                proposed,
                override_input,
                overridden,
            },
            targets,
            special_recommendations: profile.special_recommendations(),
            optimization: OptimizationSummary {
                sweeps: report.sweeps,
                converged: report.converged,
                out_of_band_days: report.out_of_band_days,
                meal_reviews: report.meal_reviews,
                low_quality_meals,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::food;
    use crate::catalog::InMemoryCatalog;
    use crate::profile::fixtures::profile;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<PlanOutcomeRecord>>);

    impl PlanTelemetrySink for Recorder {
        fn record(&self, outcome: &PlanOutcomeRecord) {
            if let Ok(mut records) = self.0.lock() {
                records.push(outcome.clone());
            }
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            food("c1", "Quinoa", FoodGroup::Cereals, 120.0, 21.0, 4.4, 1.9),
            food("c2", "Lentils", FoodGroup::Cereals, 116.0, 20.0, 9.0, 0.4),
            food("v1", "Broccoli", FoodGroup::Vegetables, 34.0, 6.6, 2.8, 0.4),
            food("v2", "Spinach", FoodGroup::Vegetables, 23.0, 3.6, 2.9, 0.4),
            food("f1", "Apple", FoodGroup::Fruits, 52.0, 14.0, 0.3, 0.2),
            food("d1", "Plain yogurt", FoodGroup::Dairy, 61.0, 4.7, 3.5, 3.3),
            food("p1", "Chicken breast", FoodGroup::Protein, 165.0, 0.0, 31.0, 3.6),
            food("p2", "Hake", FoodGroup::Protein, 90.0, 0.0, 18.0, 1.5),
            food("p3", "Turkey", FoodGroup::Protein, 135.0, 0.0, 30.0, 1.0),
            food("o1", "Olive oil", FoodGroup::Fats, 884.0, 0.0, 0.0, 100.0),
        ])
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    #[test]
    fn test_generate_records_both_target_configurations() -> Result<(), PlanError> {
        let recorder = Arc::new(Recorder::default());
        let generator = MealPlanGenerator::new(EngineConfig::default(), ExchangeTable::standard(), Arc::new(catalog()))
            .with_telemetry(recorder.clone());
        let mut request = GenerationRequest::week(profile("p1", 80.0, 1.70), start());
        request.days = 3;
        request.target_override = Some(TargetOverride {
            kcal: Some(1800.0),
            carb_pct: Some(30.0),
            ..TargetOverride::default()
        });

        let result = generator.generate(&request)?;
        assert_eq!(result.week.days.len(), 3);
        assert_eq!(result.compliance.len(), 3);
        assert_eq!(result.target_record.proposed.source, TargetSource::Automatic);
        assert_eq!(result.targets.source, TargetSource::Override);
        assert!(result.target_record.overridden.is_some());

        let records = recorder.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].end_date, NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
        assert_eq!(records[0].target_source, TargetSource::Override);
        Ok(())
    }

    #[test]
    fn test_empty_override_is_ignored() -> Result<(), PlanError> {
        let generator = MealPlanGenerator::new(EngineConfig::default(), ExchangeTable::standard(), Arc::new(catalog()));
        let mut request = GenerationRequest::week(profile("p1", 80.0, 1.70), start());
        request.days = 1;
        request.target_override = Some(TargetOverride::default());
        let result = generator.generate(&request)?;
        assert_eq!(result.targets.source, TargetSource::Automatic);
        assert!(result.target_record.override_input.is_none());
        Ok(())
    }

    #[test]
    fn test_result_carries_summary_and_day_checks() -> Result<(), PlanError> {
        let generator = MealPlanGenerator::new(EngineConfig::default(), ExchangeTable::standard(), Arc::new(catalog()));
        let mut request = GenerationRequest::week(profile("p1", 80.0, 1.70), start());
        request.days = 2;
        request.excluded_groups = vec![FoodGroup::Fruits];
        let result = generator.generate(&request)?;

        let totals: f64 = result.week.days.iter().map(|d| d.totals().kcal).sum();
        assert_eq!(result.weekly_summary.days, 2);
        assert!((result.weekly_summary.kcal - totals).abs() < 0.1);
        assert!((result.weekly_summary.average_daily_kcal - totals / 2.0).abs() < 0.1);

        assert_eq!(result.day_checks.len(), 2);
        assert!(result.day_checks.iter().all(|c| c.groups_ok && c.gi_ok));
        // no combination model in the heuristic setup
        assert!(result.optimization.meal_reviews.iter().all(|r| r.score.is_none()));
        assert_eq!(result.optimization.low_quality_meals, 0);

        let json = serde_json::to_value(&result).map_err(|e| PlanError::Generation(e.to_string()))?;
        assert!(json["weekly_summary"]["average_daily_kcal"].is_number());
        assert!(json["day_checks"][0]["gi_limit"].is_number());
        Ok(())
    }

    #[test]
    fn test_zero_days_is_rejected() {
        let generator = MealPlanGenerator::new(EngineConfig::default(), ExchangeTable::standard(), Arc::new(catalog()));
        let mut request = GenerationRequest::week(profile("p1", 80.0, 1.70), start());
        request.days = 0;
        assert!(matches!(generator.generate(&request), Err(PlanError::Generation(_))));
    }
}
