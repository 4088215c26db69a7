//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Readiness.
//! It runs each day from a raw JSON record through to a `DailyReport`.

use crate::context::CausalInputs;
use crate::cpt::{CptStore, EmissionCpt};
use crate::day::DayCycle;
use crate::error::ComputeError;
use crate::evidence::EvidenceSet;
use crate::history::TrainingHistoryLog;
use crate::mapper::{EvidenceMapper, RawMeasurements};
use crate::personalization::PersonalizedCpt;
use crate::report::{DailyReport, ReportEncoder};
use crate::types::Distribution;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One day of input: causal context, discretized evidence and/or raw
/// measurements.
///
/// Explicit evidence and causal fields take precedence over values mapped
/// from `measurements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub causal: CausalInputs,
    #[serde(default)]
    pub evidence: EvidenceSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<RawMeasurements>,
}

impl DailyRecord {
    /// Merge explicit fields with mapped measurements
    pub fn resolve(&self, mapper: &EvidenceMapper) -> (EvidenceSet, CausalInputs) {
        let mut evidence = self.evidence.clone();
        let mut causal = self.causal.clone();
        if let Some(raw) = &self.measurements {
            let (mapped_evidence, mapped_causal) = mapper.map(raw);
            evidence.merge_missing(&mapped_evidence);
            causal.training_load = causal.training_load.or(mapped_causal.training_load);
            causal.cumulative_fatigue_14day_state = causal
                .cumulative_fatigue_14day_state
                .or(mapped_causal.cumulative_fatigue_14day_state);
            causal.subjective_sleep_state = causal
                .subjective_sleep_state
                .or(mapped_causal.subjective_sleep_state);
            causal.stress_decay_factor = causal
                .stress_decay_factor
                .or(mapped_causal.stress_decay_factor);
            causal.menstrual_cycle = causal.menstrual_cycle.or(mapped_causal.menstrual_cycle);
        }
        (evidence, causal)
    }
}

/// Training history day number for a calendar date
fn day_number(date: NaiveDate) -> Option<u32> {
    u32::try_from(date.num_days_from_ce()).ok()
}

/// Everything carried from one day to the next for a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorState {
    /// Most recent posterior; `None` before the first day
    pub posterior: Option<Distribution>,
    pub history: TrainingHistoryLog,
    pub last_date: Option<NaiveDate>,
}

/// Personalized emission table in use, with its precomputed blend
#[derive(Debug, Clone)]
struct ActivePersonalization {
    cpt: Arc<PersonalizedCpt>,
    effective: Arc<EmissionCpt>,
}

/// Stateful per-user processor.
///
/// Days must be fed in strictly increasing date order. Use `save_state` and
/// `load_state` to carry the posterior and training history across sessions.
pub struct ReadinessProcessor {
    store: Arc<CptStore>,
    mapper: EvidenceMapper,
    personalized: Option<ActivePersonalization>,
    state: ProcessorState,
    encoder: ReportEncoder,
}

impl Default for ReadinessProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessProcessor {
    /// Create a new processor with the built-in model
    pub fn new() -> Self {
        Self {
            store: Arc::new(CptStore::default()),
            mapper: EvidenceMapper::default(),
            personalized: None,
            state: ProcessorState::default(),
            encoder: ReportEncoder::new(),
        }
    }

    /// Create a processor sharing an existing model
    pub fn with_store(store: Arc<CptStore>) -> Result<Self, ComputeError> {
        store.validate()?;
        Ok(Self {
            store,
            ..Self::new()
        })
    }

    pub fn with_mapper(mut self, mapper: EvidenceMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn store(&self) -> &Arc<CptStore> {
        &self.store
    }

    pub fn state(&self) -> &ProcessorState {
        &self.state
    }

    pub fn personalized(&self) -> Option<&PersonalizedCpt> {
        self.personalized.as_ref().map(|p| p.cpt.as_ref())
    }

    /// Replace the emission tables used by the update stage.
    ///
    /// The blend with the defaults is computed up front and swapped in whole.
    pub fn install_personalized(&mut self, cpt: Arc<PersonalizedCpt>) -> Result<(), ComputeError> {
        cpt.emission.validate()?;
        let effective = Arc::new(cpt.effective_emission(&self.store));
        info!(
            learning_days = cpt.learning_days,
            alpha = cpt.alpha,
            "installed personalized emission table"
        );
        self.personalized = Some(ActivePersonalization { cpt, effective });
        Ok(())
    }

    pub fn clear_personalized(&mut self) {
        self.personalized = None;
    }

    /// Process one day and return its report
    pub fn process_day(&mut self, record: &DailyRecord) -> Result<DailyReport, ComputeError> {
        if let Some(last) = self.state.last_date {
            if record.date <= last {
                return Err(ComputeError::OutOfOrderDay {
                    date: record.date,
                    last,
                });
            }
        }

        let (evidence, causal) = record.resolve(&self.mapper);

        // Today's load is part of the accumulation windows
        let mut history = self.state.history.clone();
        if let Some(load) = causal.training_load {
            history.add_training_day(load, day_number(record.date))?;
        }

        let emission = match &self.personalized {
            Some(active) => active.effective.as_ref(),
            None => &self.store.emission,
        };
        let day = DayCycle::start(&self.store, self.state.posterior.as_ref())
            .transition(&causal)
            .update_with(emission, &evidence, &history);

        debug!(
            date = %record.date,
            score = day.assessment.score,
            diagnosis = %day.assessment.diagnosis,
            "processed day"
        );

        self.state = ProcessorState {
            posterior: Some(day.posterior),
            history,
            last_date: Some(record.date),
        };
        let alpha = self.personalized.as_ref().map(|p| p.cpt.alpha);
        Ok(self.encoder.encode(record.date, &day, alpha))
    }

    /// Process one JSON `DailyRecord` and return the report as JSON
    pub fn process_day_json(&mut self, record_json: &str) -> Result<String, ComputeError> {
        let record: DailyRecord = serde_json::from_str(record_json)?;
        let report = self.process_day(&record)?;
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }

    /// Load carried-over state from JSON
    pub fn load_state(&mut self, json: &str) -> Result<(), ComputeError> {
        self.state =
            serde_json::from_str(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        Ok(())
    }

    /// Save carried-over state to JSON
    pub fn save_state(&self) -> Result<String, ComputeError> {
        serde_json::to_string(&self.state).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}

/// Process a JSON array of daily records with a fresh processor.
///
/// # Returns
/// One report JSON per record, in input order
///
/// # Example
/// ```ignore
/// let reports = readiness_daily(r#"[{"date": "2024-01-15", "evidence": {"fatigue": "high"}}]"#)?;
/// ```
pub fn readiness_daily(records_json: &str) -> Result<Vec<String>, ComputeError> {
    let records: Vec<DailyRecord> = serde_json::from_str(records_json)?;
    let mut processor = ReadinessProcessor::new();
    records
        .iter()
        .map(|record| {
            let report = processor.process_day(record)?;
            serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TrainingLoad;
    use crate::evidence::{HooperLevel, SleepMetric, SleepPerformance};
    use crate::types::State;
    use crate::update::OverrideRule;
    use pretty_assertions::assert_eq;

    fn record(date: &str, load: &str, fatigue: &str) -> DailyRecord {
        serde_json::from_str(&format!(
            r#"{{
                "date": "{date}",
                "causal": {{ "training_load": "{load}" }},
                "evidence": {{ "fatigue": "{fatigue}", "soreness": "medium" }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_process_days_in_order() {
        let mut processor = ReadinessProcessor::new();
        let report = processor.process_day(&record("2024-01-15", "low", "low")).unwrap();
        assert_eq!(report.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(report.producer.name, "synheart-readiness");

        let err = processor.process_day(&record("2024-01-15", "low", "low"));
        assert!(matches!(err, Err(ComputeError::OutOfOrderDay { .. })));
        assert_eq!(processor.state().history.len(), 1);
    }

    #[test]
    fn test_today_counts_toward_accumulation() {
        let mut processor = ReadinessProcessor::new();
        let loads = ["high", "high", "medium", "高"];
        let mut last = None;
        for (i, load) in loads.iter().enumerate() {
            last = Some(
                processor
                    .process_day(&record(&format!("2024-02-0{}", i + 1), load, "medium"))
                    .unwrap(),
            );
        }
        let last = last.unwrap();
        assert!(last.fired_rules.contains(&OverrideRule::FourDayAccumulation));
    }

    #[test]
    fn test_state_round_trip() {
        let days = [
            record("2024-03-01", "high", "high"),
            record("2024-03-02", "very_high", "high"),
            record("2024-03-03", "rest", "medium"),
        ];

        let mut continuous = ReadinessProcessor::new();
        continuous.process_day(&days[0]).unwrap();
        continuous.process_day(&days[1]).unwrap();
        let saved = continuous.save_state().unwrap();
        let expected = continuous.process_day(&days[2]).unwrap();

        let mut resumed = ReadinessProcessor::new();
        resumed.load_state(&saved).unwrap();
        let report = resumed.process_day(&days[2]).unwrap();

        assert_eq!(report.posterior, expected.posterior);
        assert_eq!(report.score, expected.score);
        assert_eq!(resumed.state(), continuous.state());
    }

    #[test]
    fn test_load_state_rejects_garbage() {
        let mut processor = ReadinessProcessor::new();
        assert!(matches!(
            processor.load_state("{\"posterior\": 3}"),
            Err(ComputeError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_state_rejects_unordered_history() {
        let mut processor = ReadinessProcessor::new();
        let state = r#"{"history":{"days":[{"day":900000,"load":"high"},{"day":5,"load":"low"}]}}"#;
        assert!(matches!(
            processor.load_state(state),
            Err(ComputeError::ParseError(_))
        ));
        assert!(processor.state().history.is_empty());
    }

    #[test]
    fn test_untrusted_personalization_matches_defaults() {
        let store = Arc::new(CptStore::default());
        let day = record("2024-04-01", "high", "high");

        let mut plain = ReadinessProcessor::with_store(store.clone()).unwrap();
        let expected = plain.process_day(&day).unwrap();

        let mut personalized = ReadinessProcessor::with_store(store.clone()).unwrap();
        let mut learned = store.emission.clone();
        learned.set_table(
            crate::evidence::EvidenceType::SubjectiveFatigue,
            [("high".to_string(), crate::types::StateVector::splat(0.9))]
                .into_iter()
                .collect(),
        );
        personalized
            .install_personalized(Arc::new(PersonalizedCpt {
                emission: learned,
                learning_days: 10,
                alpha: 0.0,
            }))
            .unwrap();
        let report = personalized.process_day(&day).unwrap();

        assert_eq!(report.posterior, expected.posterior);
        assert_eq!(report.quality.personalization_alpha, Some(0.0));

        personalized.clear_personalized();
        assert!(personalized.personalized().is_none());
    }

    #[test]
    fn test_measurements_fill_missing_fields() {
        let record: DailyRecord = serde_json::from_str(
            r#"{
                "date": "2024-05-01",
                "evidence": { "fatigue": "low" },
                "measurements": { "hooper_fatigue": 7, "sleep_hours": 6.5, "training_load": "极高" }
            }"#,
        )
        .unwrap();

        let (evidence, causal) = record.resolve(&EvidenceMapper::default());
        assert_eq!(evidence.subjective_fatigue, Some(HooperLevel::Low));
        assert_eq!(
            evidence.sleep_metric,
            Some(SleepMetric::SleepPerformance(SleepPerformance::Medium))
        );
        assert_eq!(causal.training_load, Some(TrainingLoad::VeryHigh));
    }

    #[test]
    fn test_readiness_daily() {
        let reports = readiness_daily(
            r#"[
                {"date": "2024-01-15", "evidence": {"fatigue": "high", "soreness": "high"}},
                {"date": "2024-01-16", "evidence": {"fatigue": "high", "fatigue_3day": "high"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(reports.len(), 2);

        let second: DailyReport = serde_json::from_str(&reports[1]).unwrap();
        assert_ne!(second.diagnosis, State::Peak);
        assert!(second.fired_rules.contains(&OverrideRule::ThreeDayFatigue));
    }

    #[test]
    fn test_readiness_daily_rejects_unknown_evidence() {
        let result = readiness_daily(r#"[{"date": "2024-01-15", "evidence": {"mood": "great"}}]"#);
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
        assert!(readiness_daily("not valid json").is_err());
    }
}
