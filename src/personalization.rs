//! Personalization
//!
//! Learns a per-user emission table from the user's own history and decides
//! how far to trust it.
//!
//! Fitting replays the history through the default model to get a posterior
//! for every day, then re-estimates P(level | state) from posterior-weighted
//! counts. Each cell is shrunk toward the population default in proportion
//! to how much data supports it.
//!
//! Deployment blends the whole learned table with the defaults again using
//! a trust factor α that depends only on how many days were learned from:
//! zero during a warm-up period, rising to 0.5 at 100 days and leveling off
//! below 0.8.

use crate::cpt::{CptStore, EmissionCpt};
use crate::day::DayCycle;
use crate::error::{ComputeError, ConfigurationError};
use crate::evidence::EvidenceType;
use crate::history::TrainingHistoryLog;
use crate::mapper::EvidenceMapper;
use crate::pipeline::DailyRecord;
use crate::types::{Distribution, State, StateVector};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Days of history needed before anything is learned
pub const MIN_LEARNING_DAYS: usize = 30;

/// Posterior-weighted observations needed before a table is re-estimated
pub const MIN_TABLE_SAMPLES: f64 = 10.0;

/// Default per-cell shrinkage strength, in weighted samples
pub const DEFAULT_SHRINK_K: f64 = 10.0;

/// Deployment trust schedule for learned tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkageParams {
    /// α is zero below this many learning days
    pub warmup_days: u32,
    /// Asymptotic upper bound on α
    pub max_alpha: f64,
    /// α reaches `target_alpha` at `target_days`
    pub target_days: u32,
    pub target_alpha: f64,
    /// Per-cell shrinkage strength used while fitting
    pub shrink_k: f64,
}

impl Default for ShrinkageParams {
    fn default() -> Self {
        Self {
            warmup_days: MIN_LEARNING_DAYS as u32,
            max_alpha: 0.8,
            target_days: 100,
            target_alpha: 0.5,
            shrink_k: DEFAULT_SHRINK_K,
        }
    }
}

impl ShrinkageParams {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.max_alpha > 0.0 && self.max_alpha < 1.0) {
            return Err(ConfigurationError::ParameterOutOfRange {
                name: "max_alpha",
                value: self.max_alpha,
                min: 0.0,
                max: 1.0,
            });
        }
        if !(self.target_alpha > 0.0 && self.target_alpha < self.max_alpha) {
            return Err(ConfigurationError::ParameterOutOfRange {
                name: "target_alpha",
                value: self.target_alpha,
                min: 0.0,
                max: self.max_alpha,
            });
        }
        if self.target_days <= self.warmup_days {
            return Err(ConfigurationError::ParameterOutOfRange {
                name: "target_days",
                value: self.target_days as f64,
                min: self.warmup_days as f64 + 1.0,
                max: f64::INFINITY,
            });
        }
        if !(self.shrink_k.is_finite() && self.shrink_k >= 0.0) {
            return Err(ConfigurationError::ParameterOutOfRange {
                name: "shrink_k",
                value: self.shrink_k,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }

    /// Time constant of the exponential ramp
    fn tau(&self) -> f64 {
        let span = f64::from(self.target_days.saturating_sub(self.warmup_days)).max(1.0);
        let ratio = self.max_alpha / (self.max_alpha - self.target_alpha);
        span / ratio.ln()
    }

    /// Trust in a table learned from `learning_days` days.
    ///
    /// `max_alpha · (1 − exp(−(d − warmup) / τ))` past the warm-up, zero before.
    pub fn alpha(&self, learning_days: u32) -> f64 {
        if learning_days < self.warmup_days {
            return 0.0;
        }
        let elapsed = f64::from(learning_days - self.warmup_days);
        let alpha = self.max_alpha * (1.0 - (-elapsed / self.tau()).exp());
        // The ramp saturates to max_alpha in f64; keep it strictly below
        let ceiling = self.max_alpha * (1.0 - f64::EPSILON);
        if alpha.is_finite() {
            alpha.clamp(0.0, ceiling)
        } else {
            0.0
        }
    }
}

/// Learn a personalized emission table from daily records.
///
/// Records are taken in order; raw measurements are discretized with the
/// default mapper. Fewer than 30 days returns the default table unchanged.
pub fn learn_personalized_cpt(store: &CptStore, history: &[DailyRecord], shrink_k: f64) -> EmissionCpt {
    learn_with_mapper(store, history, &EvidenceMapper::default(), shrink_k)
}

/// Posterior-weighted counts gathered while replaying history
#[derive(Debug, Default)]
struct EvidenceCounts {
    /// type → level → Σ posterior over days that level was observed
    by_level: BTreeMap<EvidenceType, BTreeMap<&'static str, StateVector>>,
    /// type → Σ posterior over days the type was observed at any level
    by_type: BTreeMap<EvidenceType, StateVector>,
    /// Records replayed; out-of-order records are not counted
    days: u32,
}

impl EvidenceCounts {
    fn record(&mut self, evidence: EvidenceType, level: &'static str, posterior: &Distribution) {
        let cell = self
            .by_level
            .entry(evidence)
            .or_default()
            .entry(level)
            .or_default();
        let total = self.by_type.entry(evidence).or_default();
        for (state, p) in posterior.iter() {
            cell[state] += p;
            total[state] += p;
        }
    }
}

pub fn learn_with_mapper(
    store: &CptStore,
    history: &[DailyRecord],
    mapper: &EvidenceMapper,
    shrink_k: f64,
) -> EmissionCpt {
    learn(store, history, mapper, shrink_k).0
}

/// Learned table plus the number of records actually replayed
fn learn(
    store: &CptStore,
    history: &[DailyRecord],
    mapper: &EvidenceMapper,
    shrink_k: f64,
) -> (EmissionCpt, u32) {
    let counts = replay(store, history, mapper);
    if (counts.days as usize) < MIN_LEARNING_DAYS {
        debug!(
            days = counts.days,
            required = MIN_LEARNING_DAYS,
            "not enough history to personalize"
        );
        return (store.emission.clone(), counts.days);
    }
    let shrink_k = if shrink_k.is_finite() && shrink_k >= 0.0 {
        shrink_k
    } else {
        warn!(shrink_k, "invalid shrinkage strength; using default");
        DEFAULT_SHRINK_K
    };

    let mut learned = store.emission.clone();
    let mut tables_learned = 0;
    for (evidence, per_level) in &counts.by_level {
        let Some(totals) = counts.by_type.get(evidence) else {
            continue;
        };
        let samples = totals.total();
        if samples < MIN_TABLE_SAMPLES {
            debug!(evidence = %evidence, samples, "too few samples; keeping default table");
            continue;
        }
        let Some(defaults) = store.emission.table(*evidence) else {
            continue;
        };

        let mut table = BTreeMap::new();
        for (level, default_row) in defaults {
            let counts_row = per_level.get(level.as_str()).copied().unwrap_or_default();
            table.insert(level.clone(), shrink_row(&counts_row, totals, default_row, shrink_k));
        }
        learned.set_table(*evidence, table);
        tables_learned += 1;
    }

    info!(
        days = counts.days,
        tables_learned,
        "learned personalized emission table"
    );
    (learned.floored(store.params.likelihood_floor), counts.days)
}

/// Replay records through the default model, collecting weighted counts
fn replay(store: &CptStore, history: &[DailyRecord], mapper: &EvidenceMapper) -> EvidenceCounts {
    let mut counts = EvidenceCounts::default();
    let mut log = TrainingHistoryLog::new();
    let mut previous: Option<Distribution> = None;
    let mut last_date: Option<NaiveDate> = None;

    for record in history {
        if let Some(last) = last_date {
            if record.date <= last {
                warn!(date = %record.date, last = %last, "skipping out-of-order record");
                continue;
            }
        }
        last_date = Some(record.date);
        counts.days = counts.days.saturating_add(1);

        let (evidence, causal) = record.resolve(mapper);
        if let Some(load) = causal.training_load {
            if let Err(e) = log.add_training_day(load, None) {
                warn!("{}", e);
            }
        }

        let day = DayCycle::start(store, previous.as_ref())
            .transition(&causal)
            .update(&evidence, &log);
        for (evidence_type, level) in evidence.observations() {
            counts.record(evidence_type, level, &day.posterior);
        }
        previous = Some(day.posterior);
    }
    counts
}

/// `α·empirical + (1 − α)·default` per state, with `α = total / (total + k)`
fn shrink_row(counts: &StateVector, totals: &StateVector, default: &StateVector, k: f64) -> StateVector {
    let mut row = *default;
    for state in State::ALL {
        let total = totals[state];
        if total <= 0.0 {
            continue;
        }
        let empirical = counts[state] / total;
        let alpha = total / (total + k);
        row[state] = alpha * empirical + (1.0 - alpha) * default[state];
    }
    row
}

/// A learned emission table plus how much to trust it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedCpt {
    pub emission: EmissionCpt,
    pub learning_days: u32,
    pub alpha: f64,
}

impl PersonalizedCpt {
    /// Learn from `history` and attach the deployment trust for the days
    /// actually learned from
    pub fn fit(
        store: &CptStore,
        history: &[DailyRecord],
        mapper: &EvidenceMapper,
        shrinkage: &ShrinkageParams,
    ) -> Self {
        let (emission, learning_days) = learn(store, history, mapper, shrinkage.shrink_k);
        Self {
            emission,
            learning_days,
            alpha: shrinkage.alpha(learning_days),
        }
    }

    /// Parse and validate a saved personalized table
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let cpt: PersonalizedCpt = serde_json::from_str(json)?;
        cpt.emission.validate()?;
        if !(cpt.alpha.is_finite() && (0.0..1.0).contains(&cpt.alpha)) {
            return Err(ConfigurationError::ParameterOutOfRange {
                name: "alpha",
                value: cpt.alpha,
                min: 0.0,
                max: 1.0,
            }
            .into());
        }
        Ok(cpt)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Emission table to use at inference time: `α·learned + (1 − α)·default`
    pub fn effective_emission(&self, store: &CptStore) -> EmissionCpt {
        self.emission
            .blend(&store.emission, self.alpha)
            .floored(store.params.likelihood_floor)
    }
}
