//! Daily report encoding
//!
//! Wraps a finalized day in the JSON record handed to callers, stamped with
//! producer metadata and the computation time.

use crate::day::FinalizedDay;
use crate::error::ComputeError;
use crate::types::{Distribution, State};
use crate::update::OverrideRule;
use crate::{PRODUCER_NAME, READINESS_VERSION};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// How much the day's result can be trusted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportQuality {
    /// Evidence items fused into the posterior
    pub evidence_used: usize,
    /// Evidence items with no matching likelihood
    pub fallback_count: usize,
    /// Posterior collapsed and was reset to uniform
    pub degenerate_reset: bool,
    /// Trust in the personalized emission table, if one was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personalization_alpha: Option<f64>,
}

/// Output record for one processed day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub report_version: String,
    pub producer: Producer,
    pub date: NaiveDate,
    pub computed_at_utc: String,
    pub score: u8,
    pub diagnosis: State,
    pub prior: Distribution,
    pub posterior: Distribution,
    pub fired_rules: Vec<OverrideRule>,
    pub quality: ReportQuality,
}

/// Encoder for producing daily reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(
        &self,
        date: NaiveDate,
        day: &FinalizedDay,
        personalization_alpha: Option<f64>,
    ) -> DailyReport {
        DailyReport {
            report_version: REPORT_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: READINESS_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            date,
            computed_at_utc: Utc::now().to_rfc3339(),
            score: day.assessment.score,
            diagnosis: day.assessment.diagnosis,
            prior: day.prior,
            posterior: day.posterior,
            fired_rules: day.fired_rules.clone(),
            quality: ReportQuality {
                evidence_used: day.evidence_used,
                fallback_count: day.fallback_count,
                degenerate_reset: day.degenerate_reset,
                personalization_alpha,
            },
        }
    }

    pub fn encode_to_json(
        &self,
        date: NaiveDate,
        day: &FinalizedDay,
        personalization_alpha: Option<f64>,
    ) -> Result<String, ComputeError> {
        let report = self.encode(date, day, personalization_alpha);
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CausalInputs;
    use crate::cpt::CptStore;
    use crate::day::DayCycle;
    use crate::evidence::{EvidenceSet, HooperLevel};
    use crate::history::TrainingHistoryLog;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_fields() {
        let store = CptStore::default();
        let evidence = EvidenceSet {
            fatigue_3day: Some(HooperLevel::High),
            ..Default::default()
        };
        let day = DayCycle::start(&store, None)
            .transition(&CausalInputs::default())
            .update(&evidence, &TrainingHistoryLog::new());
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let json = encoder.encode_to_json(date, &day, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["report_version"], "1.0.0");
        assert_eq!(value["producer"]["name"], "synheart-readiness");
        assert_eq!(value["producer"]["instance_id"], "test-instance");
        assert_eq!(value["date"], "2024-05-02");
        assert_eq!(value["fired_rules"][0], "three_day_fatigue");
        assert!(value["posterior"]["NFOR"].as_f64().is_some());
        assert!(value["quality"].get("personalization_alpha").is_none());

        let parsed: DailyReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.score, day.assessment.score);
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(ReportEncoder::new().instance_id(), ReportEncoder::new().instance_id());
    }
}
