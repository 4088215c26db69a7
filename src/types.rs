//! Core types for the readiness estimator
//!
//! This module defines the readiness states, the state-indexed vectors that
//! carry likelihoods and probabilities through each stage, and the single
//! mass-shift primitive every causal shift and override rule is built on.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of readiness states
pub const STATE_COUNT: usize = 6;

/// Tolerance used when checking that a vector sums to one
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Readiness state along the recovery continuum, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
    #[serde(alias = "peak")]
    Peak,
    #[serde(rename = "Well-adapted", alias = "well_adapted")]
    WellAdapted,
    /// Functional overreaching
    #[serde(rename = "FOR", alias = "for")]
    For,
    #[serde(rename = "Acute Fatigue", alias = "acute_fatigue")]
    AcuteFatigue,
    /// Non-functional overreaching
    #[serde(rename = "NFOR", alias = "nfor")]
    Nfor,
    /// Overtraining syndrome
    #[serde(rename = "OTS", alias = "ots")]
    Ots,
}

impl State {
    /// All states in continuum order
    pub const ALL: [State; STATE_COUNT] = [
        State::Peak,
        State::WellAdapted,
        State::For,
        State::AcuteFatigue,
        State::Nfor,
        State::Ots,
    ];

    /// Position of this state in `State::ALL`
    pub fn index(&self) -> usize {
        match self {
            State::Peak => 0,
            State::WellAdapted => 1,
            State::For => 2,
            State::AcuteFatigue => 3,
            State::Nfor => 4,
            State::Ots => 5,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        State::ALL.get(idx).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Peak => "Peak",
            State::WellAdapted => "Well-adapted",
            State::For => "FOR",
            State::AcuteFatigue => "Acute Fatigue",
            State::Nfor => "NFOR",
            State::Ots => "OTS",
        }
    }

    /// Tie-break rank for diagnosis: higher rank wins equal probabilities.
    ///
    /// More severe states outrank less severe ones.
    pub fn severity(&self) -> usize {
        self.index()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value for every readiness state.
///
/// Serialized as a JSON object keyed by state name. Deserialization fails if
/// any state is missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<State, f64>",
    into = "BTreeMap<State, f64>"
)]
pub struct StateVector {
    values: [f64; STATE_COUNT],
}

impl StateVector {
    pub const fn new(values: [f64; STATE_COUNT]) -> Self {
        Self { values }
    }

    /// Same value for every state
    pub const fn splat(value: f64) -> Self {
        Self {
            values: [value; STATE_COUNT],
        }
    }

    pub fn values(&self) -> &[f64; STATE_COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (State, f64)> + '_ {
        State::ALL.iter().map(move |s| (*s, self.values[s.index()]))
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Combined value of a subset of states
    pub fn mass_of(&self, states: &[State]) -> f64 {
        states.iter().map(|s| self.values[s.index()]).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Element-wise product
    pub fn multiply(&self, other: &StateVector) -> StateVector {
        let mut out = *self;
        for (v, o) in out.values.iter_mut().zip(other.values.iter()) {
            *v *= o;
        }
        out
    }

    /// Rescale to sum to one. Returns `None` when the total is zero,
    /// negative, or not finite.
    pub fn normalized(&self) -> Option<StateVector> {
        let total = self.total();
        if !total.is_finite() || total <= 0.0 || self.values.iter().any(|v| *v < 0.0) {
            return None;
        }
        let mut out = *self;
        for v in out.values.iter_mut() {
            *v /= total;
        }
        Some(out)
    }
}

impl Index<State> for StateVector {
    type Output = f64;

    fn index(&self, state: State) -> &f64 {
        &self.values[state.index()]
    }
}

impl IndexMut<State> for StateVector {
    fn index_mut(&mut self, state: State) -> &mut f64 {
        &mut self.values[state.index()]
    }
}

impl TryFrom<BTreeMap<State, f64>> for StateVector {
    type Error = ConfigurationError;

    fn try_from(map: BTreeMap<State, f64>) -> Result<Self, Self::Error> {
        let mut values = [0.0; STATE_COUNT];
        for state in State::ALL {
            values[state.index()] = *map
                .get(&state)
                .ok_or(ConfigurationError::MissingState { state })?;
        }
        Ok(Self { values })
    }
}

impl From<StateVector> for BTreeMap<State, f64> {
    fn from(vector: StateVector) -> Self {
        vector.iter().collect()
    }
}

/// Move mass between groups of states.
///
/// Removes `fraction` of the combined source mass, pro-rated by each source's
/// own share, and adds it split evenly across the destinations. Total mass is
/// preserved. No-op when either group is empty or the fraction is not positive.
pub fn shift_mass(
    vector: &StateVector,
    sources: &[State],
    destinations: &[State],
    fraction: f64,
) -> StateVector {
    if sources.is_empty() || destinations.is_empty() || !(fraction > 0.0) {
        return *vector;
    }
    let fraction = fraction.min(1.0);
    let mut out = *vector;

    let mut moved = 0.0;
    for source in sources {
        let taken = out[*source] * fraction;
        out[*source] -= taken;
        moved += taken;
    }

    let share = moved / destinations.len() as f64;
    for destination in destinations {
        out[*destination] += share;
    }
    out
}

/// Probability distribution over readiness states.
///
/// Every value is non-negative and the values sum to one. Construction from
/// untrusted data goes through validation; internal stages recover degenerate
/// vectors by falling back to uniform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateVector", into = "StateVector")]
pub struct Distribution(StateVector);

impl Distribution {
    pub fn uniform() -> Self {
        Distribution(StateVector::splat(1.0 / STATE_COUNT as f64))
    }

    /// Build from raw probabilities, rescaling to sum to one.
    pub fn from_probabilities(values: [f64; STATE_COUNT]) -> Result<Self, ConfigurationError> {
        Self::try_from(StateVector::new(values))
    }

    /// Normalize a working vector, resetting to uniform if it has collapsed.
    ///
    /// The flag is `true` when the reset happened.
    pub fn normalize_or_uniform(vector: &StateVector) -> (Self, bool) {
        match vector.normalized() {
            Some(normalized) if normalized.is_finite() => (Distribution(normalized), false),
            _ => (Self::uniform(), true),
        }
    }

    pub fn get(&self, state: State) -> f64 {
        self.0[state]
    }

    pub fn vector(&self) -> &StateVector {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (State, f64)> + '_ {
        self.0.iter()
    }

    pub fn mass_of(&self, states: &[State]) -> f64 {
        self.0.mass_of(states)
    }
}

impl Default for Distribution {
    fn default() -> Self {
        Self::uniform()
    }
}

impl Index<State> for Distribution {
    type Output = f64;

    fn index(&self, state: State) -> &f64 {
        &self.0[state]
    }
}

impl TryFrom<StateVector> for Distribution {
    type Error = ConfigurationError;

    fn try_from(vector: StateVector) -> Result<Self, Self::Error> {
        if !vector.is_finite() || vector.values().iter().any(|v| *v < 0.0) {
            return Err(ConfigurationError::InvalidDistribution(
                "probabilities must be finite and non-negative".to_string(),
            ));
        }
        // Already normalized input is kept bit-for-bit
        if (vector.total() - 1.0).abs() <= 1e-12 {
            return Ok(Distribution(vector));
        }
        vector
            .normalized()
            .map(Distribution)
            .ok_or_else(|| ConfigurationError::InvalidDistribution("total mass is zero".to_string()))
    }
}

impl From<Distribution> for StateVector {
    fn from(distribution: Distribution) -> Self {
        distribution.0
    }
}
