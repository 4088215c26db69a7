//! Conditional probability tables
//!
//! The `CptStore` bundles every tunable piece of the model: the Markov
//! transition table, the emission tables, the per-state readiness weights and
//! the shift/override constants. Stores are immutable once validated and are
//! shared by reference (`Arc<CptStore>`); per-user emission overrides are
//! separate snapshots that replace the defaults wholesale.

mod defaults;

use crate::error::ConfigurationError;
use crate::evidence::EvidenceType;
use crate::types::{Distribution, State, StateVector, STATE_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allowed deviation of a transition row sum from one
const ROW_SUM_TOLERANCE: f64 = 1e-3;

/// Markov transition table: row = yesterday's state, column = today's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<State, StateVector>",
    into = "BTreeMap<State, StateVector>"
)]
pub struct TransitionCpt {
    rows: [StateVector; STATE_COUNT],
}

impl TransitionCpt {
    pub fn new(rows: [StateVector; STATE_COUNT]) -> Self {
        Self { rows }
    }

    /// Transition probabilities out of `from`
    pub fn row(&self, from: State) -> &StateVector {
        &self.rows[from.index()]
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for from in State::ALL {
            let row = self.row(from);
            check_values(&format!("transition[{}]", from), row)?;
            let sum = row.total();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(ConfigurationError::NotStochastic { state: from, sum });
            }
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<State, StateVector>> for TransitionCpt {
    type Error = ConfigurationError;

    fn try_from(map: BTreeMap<State, StateVector>) -> Result<Self, Self::Error> {
        let mut rows = [StateVector::default(); STATE_COUNT];
        for state in State::ALL {
            rows[state.index()] = *map
                .get(&state)
                .ok_or(ConfigurationError::MissingState { state })?;
        }
        Ok(Self { rows })
    }
}

impl From<TransitionCpt> for BTreeMap<State, StateVector> {
    fn from(cpt: TransitionCpt) -> Self {
        State::ALL.iter().map(|s| (*s, cpt.rows[s.index()])).collect()
    }
}

/// Emission likelihoods: evidence type → level → per-state likelihood.
///
/// Rows need not be normalized. Every likelihood is kept strictly positive so
/// no single observation can make a state unreachable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmissionCpt {
    tables: BTreeMap<EvidenceType, BTreeMap<String, StateVector>>,
}

impl EmissionCpt {
    pub fn new(tables: BTreeMap<EvidenceType, BTreeMap<String, StateVector>>) -> Self {
        Self { tables }
    }

    /// Likelihood row for an observed (type, level), if the table knows it
    pub fn likelihood(&self, evidence: EvidenceType, level: &str) -> Option<&StateVector> {
        self.tables.get(&evidence).and_then(|t| t.get(level))
    }

    pub fn table(&self, evidence: EvidenceType) -> Option<&BTreeMap<String, StateVector>> {
        self.tables.get(&evidence)
    }

    pub fn tables(&self) -> &BTreeMap<EvidenceType, BTreeMap<String, StateVector>> {
        &self.tables
    }

    pub fn set_table(&mut self, evidence: EvidenceType, table: BTreeMap<String, StateVector>) {
        self.tables.insert(evidence, table);
    }

    /// Raise every likelihood to at least `floor`
    pub fn floored(&self, floor: f64) -> EmissionCpt {
        let mut out = self.clone();
        for table in out.tables.values_mut() {
            for row in table.values_mut() {
                for state in State::ALL {
                    row[state] = row[state].max(floor);
                }
            }
        }
        out
    }

    /// Cell-wise `alpha * self + (1 - alpha) * fallback`.
    ///
    /// Cells missing from either side are taken from the side that has them.
    pub fn blend(&self, fallback: &EmissionCpt, alpha: f64) -> EmissionCpt {
        let alpha = alpha.clamp(0.0, 1.0);
        let mut out = fallback.clone();
        for (evidence, table) in &self.tables {
            let target = out.tables.entry(*evidence).or_default();
            for (level, row) in table {
                let blended = match target.get(level) {
                    Some(base) => {
                        let mut mixed = StateVector::default();
                        for state in State::ALL {
                            mixed[state] = alpha * row[state] + (1.0 - alpha) * base[state];
                        }
                        mixed
                    }
                    None => *row,
                };
                target.insert(level.clone(), blended);
            }
        }
        out
    }

    /// Every evidence type must have a non-empty table of valid rows
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for evidence in EvidenceType::ALL {
            let table = self
                .tables
                .get(&evidence)
                .ok_or(ConfigurationError::MissingEvidenceTable(evidence))?;
            if table.is_empty() {
                return Err(ConfigurationError::EmptyEvidenceTable { evidence });
            }
            for (level, row) in table {
                check_values(&format!("emission[{}][{}]", evidence, level), row)?;
            }
        }
        Ok(())
    }
}

/// Shift fractions, override factors and numeric guards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Floor applied to every transition output value
    pub epsilon: f64,
    /// Floor applied to every emission likelihood
    pub likelihood_floor: f64,
    /// Likelihood used for unrecognized (type, level) observations
    pub fallback_likelihood: f64,

    pub training_load_high_shift: f64,
    pub training_load_very_high_shift: f64,
    pub cumulative_fatigue_shift: f64,
    pub poor_sleep_shift: f64,
    pub menstrual_shift: f64,

    /// Peak multiplier when three-day fatigue is high
    pub fatigue_3day_peak_factor: f64,
    pub nfor_boost_factor: f64,
    pub for_dampen_factor: f64,
    /// Minimum healthy share (Peak + Well-adapted) before nutrition applies
    pub nutrition_gate: f64,
    pub nutrition_mild_shift: f64,
    pub nutrition_moderate_shift: f64,
    pub nutrition_severe_shift: f64,
    pub four_day_shift: f64,
    pub eight_day_shift: f64,
    pub nfor_persistence_threshold: f64,
    pub nfor_persistence_shift: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            likelihood_floor: 1e-3,
            fallback_likelihood: 0.001,
            training_load_high_shift: 0.60,
            training_load_very_high_shift: 0.85,
            cumulative_fatigue_shift: 0.10,
            poor_sleep_shift: 0.40,
            menstrual_shift: 0.10,
            fatigue_3day_peak_factor: 0.01,
            nfor_boost_factor: 2.0,
            for_dampen_factor: 0.5,
            nutrition_gate: 0.80,
            nutrition_mild_shift: 0.15,
            nutrition_moderate_shift: 0.25,
            nutrition_severe_shift: 0.35,
            four_day_shift: 0.50,
            eight_day_shift: 0.60,
            nfor_persistence_threshold: 0.30,
            nfor_persistence_shift: 0.30,
        }
    }
}

impl ModelParams {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let fractions = [
            ("training_load_high_shift", self.training_load_high_shift),
            ("training_load_very_high_shift", self.training_load_very_high_shift),
            ("cumulative_fatigue_shift", self.cumulative_fatigue_shift),
            ("poor_sleep_shift", self.poor_sleep_shift),
            ("menstrual_shift", self.menstrual_shift),
            ("nutrition_gate", self.nutrition_gate),
            ("nutrition_mild_shift", self.nutrition_mild_shift),
            ("nutrition_moderate_shift", self.nutrition_moderate_shift),
            ("nutrition_severe_shift", self.nutrition_severe_shift),
            ("four_day_shift", self.four_day_shift),
            ("eight_day_shift", self.eight_day_shift),
            ("nfor_persistence_threshold", self.nfor_persistence_threshold),
            ("nfor_persistence_shift", self.nfor_persistence_shift),
        ];
        for (name, value) in fractions {
            check_range(name, value, 0.0, 1.0)?;
        }

        let positives = [
            ("likelihood_floor", self.likelihood_floor),
            ("fallback_likelihood", self.fallback_likelihood),
            ("fatigue_3day_peak_factor", self.fatigue_3day_peak_factor),
            ("nfor_boost_factor", self.nfor_boost_factor),
            ("for_dampen_factor", self.for_dampen_factor),
        ];
        for (name, value) in positives {
            check_range(name, value, f64::MIN_POSITIVE, 1e3)?;
        }
        check_range("epsilon", self.epsilon, f64::MIN_POSITIVE, 0.01)
    }
}

/// The complete, validated model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CptStore {
    pub transition: TransitionCpt,
    pub emission: EmissionCpt,
    /// Readiness weight per state, used by the score stage
    pub readiness_weights: StateVector,
    /// Distribution assumed before the first processed day
    #[serde(default = "defaults::initial_distribution")]
    pub initial_distribution: Distribution,
    #[serde(default)]
    pub params: ModelParams,
}

impl Default for CptStore {
    fn default() -> Self {
        let store = CptStore {
            transition: defaults::transition_cpt(),
            emission: defaults::emission_cpt(),
            readiness_weights: defaults::readiness_weights(),
            initial_distribution: defaults::initial_distribution(),
            params: ModelParams::default(),
        };
        let floor = store.params.likelihood_floor;
        CptStore {
            emission: store.emission.floored(floor),
            ..store
        }
    }
}

impl CptStore {
    /// Parse and validate a store from JSON. Emission likelihoods are floored.
    pub fn from_json(json: &str) -> Result<Self, crate::error::ComputeError> {
        let mut store: CptStore = serde_json::from_str(json)?;
        store.validate()?;
        store.emission = store.emission.floored(store.params.likelihood_floor);
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check every table for completeness and sane values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.params.validate()?;
        self.transition.validate()?;
        self.emission.validate()?;
        check_values("readiness_weights", &self.readiness_weights)?;
        for pair in State::ALL.windows(2) {
            let (higher, lower) = (pair[0], pair[1]);
            if self.readiness_weights[higher] < self.readiness_weights[lower] {
                return Err(ConfigurationError::NonMonotonicWeights { higher, lower });
            }
        }
        Ok(())
    }
}

fn check_values(table: &str, row: &StateVector) -> Result<(), ConfigurationError> {
    for (state, value) in row.iter() {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigurationError::InvalidValue {
                table: table.to_string(),
                state,
                value,
            });
        }
    }
    Ok(())
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigurationError::ParameterOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComputeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_store_is_valid() {
        let store = CptStore::default();
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_default_emission_covers_every_level() {
        let store = CptStore::default();
        for evidence in EvidenceType::ALL {
            for level in evidence.levels() {
                assert!(
                    store.emission.likelihood(evidence, level).is_some(),
                    "missing default likelihood for {}={}",
                    evidence,
                    level
                );
            }
        }
    }

    #[test]
    fn test_json_round_trip() {
        let store = CptStore::default();
        let json = store.to_json().unwrap();
        let loaded = CptStore::from_json(&json).unwrap();
        assert_eq!(store, loaded);
    }

    #[test]
    fn test_missing_transition_row_is_fatal() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value["transition"].as_object_mut().unwrap().remove("OTS");

        let result = CptStore::from_json(&value.to_string());
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
    }

    #[test]
    fn test_missing_state_entry_is_fatal() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value["emission"]["hrv_trend"]["stable"]
            .as_object_mut()
            .unwrap()
            .remove("NFOR");

        assert!(CptStore::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_missing_evidence_table_is_fatal() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value["emission"].as_object_mut().unwrap().remove("nutrition");

        let result = CptStore::from_json(&value.to_string());
        assert!(matches!(
            result,
            Err(ComputeError::Configuration(ConfigurationError::MissingEvidenceTable(
                EvidenceType::Nutrition
            )))
        ));
    }

    #[test]
    fn test_non_stochastic_row_is_fatal() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value["transition"]["Peak"]["Peak"] = serde_json::json!(0.9);

        let result = CptStore::from_json(&value.to_string());
        assert!(matches!(
            result,
            Err(ComputeError::Configuration(ConfigurationError::NotStochastic {
                state: State::Peak,
                ..
            }))
        ));
    }

    #[test]
    fn test_non_monotonic_weights_are_fatal() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value["readiness_weights"]["OTS"] = serde_json::json!(95.0);

        assert!(CptStore::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_params_default_when_omitted() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value.as_object_mut().unwrap().remove("params");
        value["params"] = serde_json::json!({ "poor_sleep_shift": 0.3 });

        let store = CptStore::from_json(&value.to_string()).unwrap();
        assert_eq!(store.params.poor_sleep_shift, 0.3);
        assert_eq!(store.params.four_day_shift, 0.50);
    }

    #[test]
    fn test_zero_likelihood_is_floored() {
        let mut value = serde_json::to_value(CptStore::default()).unwrap();
        value["emission"]["gi_symptoms"]["severe"]["Peak"] = serde_json::json!(0.0);

        let store = CptStore::from_json(&value.to_string()).unwrap();
        let row = store.emission.likelihood(EvidenceType::GiSymptoms, "severe").unwrap();
        assert_eq!(row[State::Peak], store.params.likelihood_floor);
    }

    #[test]
    fn test_blend() {
        let store = CptStore::default();
        let mut learned = store.emission.clone();
        let mut table = BTreeMap::new();
        table.insert("stable".to_string(), StateVector::splat(1.0));
        learned.set_table(EvidenceType::HrvTrend, table);

        let blended = learned.blend(&store.emission, 0.5);
        let base = store.emission.likelihood(EvidenceType::HrvTrend, "stable").unwrap();
        let mixed = blended.likelihood(EvidenceType::HrvTrend, "stable").unwrap();
        assert!((mixed[State::Peak] - (0.5 + 0.5 * base[State::Peak])).abs() < 1e-12);

        // Levels absent from the learned table keep the defaults
        assert_eq!(
            blended.likelihood(EvidenceType::HrvTrend, "rising"),
            store.emission.likelihood(EvidenceType::HrvTrend, "rising")
        );
    }
}
