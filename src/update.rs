//! Update stage
//!
//! Fuses today's evidence into the prior and applies the hand-tuned override
//! rules. Likelihoods are combined in log space so that many weakly
//! informative observations cannot underflow the posterior.
//!
//! Override rules run in a fixed order; later rules read the results of
//! earlier ones:
//!
//! a. high three-day fatigue suppresses Peak
//! b. low soreness with high stress favours NFOR over FOR
//! c. inadequate nutrition erodes an otherwise healthy posterior
//! d. 4-day then 8-day training load accumulation
//! e. NFOR persistence from yesterday's posterior

use crate::cpt::{CptStore, EmissionCpt, ModelParams};
use crate::evidence::{EvidenceSet, HooperLevel, Nutrition};
use crate::history::TrainingHistoryLog;
use crate::types::{shift_mass, Distribution, State, StateVector, STATE_COUNT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use State::{AcuteFatigue, For, Nfor, Peak, WellAdapted};

/// Override rules, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRule {
    ThreeDayFatigue,
    LowSorenessHighStress,
    NutritionDeficit,
    FourDayAccumulation,
    EightDayAccumulation,
    NforPersistence,
}

/// Posterior plus a record of what shaped it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub posterior: Distribution,
    pub fired_rules: Vec<OverrideRule>,
    /// Observations fused into the posterior
    pub evidence_used: usize,
    /// Observations that fell back to the conservative likelihood
    pub fallback_count: usize,
    /// True if the posterior collapsed and was reset to uniform
    pub degenerate_reset: bool,
}

/// Compute today's posterior.
///
/// `emission` is normally `store.emission`, or a personalized override.
/// `yesterday` is the previous day's posterior, if any.
pub fn update(
    store: &CptStore,
    emission: &EmissionCpt,
    prior: &Distribution,
    evidence: &EvidenceSet,
    history: &TrainingHistoryLog,
    yesterday: Option<&Distribution>,
) -> UpdateOutcome {
    let params = &store.params;
    let fused = fuse_evidence(emission, params, prior, evidence);

    let mut fired_rules = Vec::new();
    let mut posterior = fused.vector;
    if !fused.collapsed {
        posterior = apply_overrides(&posterior, evidence, history, yesterday, params, &mut fired_rules);
    }

    let (posterior, reset) = Distribution::normalize_or_uniform(&posterior);
    let degenerate_reset = fused.collapsed || reset;
    if degenerate_reset {
        warn!("posterior collapsed to zero mass; resetting to uniform");
    }

    UpdateOutcome {
        posterior,
        fired_rules,
        evidence_used: fused.evidence_used,
        fallback_count: fused.fallback_count,
        degenerate_reset,
    }
}

struct Fused {
    vector: StateVector,
    evidence_used: usize,
    fallback_count: usize,
    collapsed: bool,
}

/// Multiply the prior by every present likelihood, in log space
fn fuse_evidence(
    emission: &EmissionCpt,
    params: &ModelParams,
    prior: &Distribution,
    evidence: &EvidenceSet,
) -> Fused {
    let mut log_mass = [0.0; STATE_COUNT];
    for (state, p) in prior.iter() {
        log_mass[state.index()] = p.ln();
    }

    let observations = evidence.observations();
    let mut fallback_count = 0;
    for (evidence_type, level) in &observations {
        match emission.likelihood(*evidence_type, level) {
            Some(row) => {
                for (state, likelihood) in row.iter() {
                    log_mass[state.index()] += likelihood.ln();
                }
            }
            None => {
                debug!(
                    evidence = %evidence_type,
                    value = *level,
                    "no likelihood for observation; using fallback"
                );
                fallback_count += 1;
                let ln_fallback = params.fallback_likelihood.ln();
                for value in log_mass.iter_mut() {
                    *value += ln_fallback;
                }
            }
        }
    }

    let max = log_mass.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || log_mass.iter().any(|v| v.is_nan()) {
        return Fused {
            vector: StateVector::splat(0.0),
            evidence_used: observations.len(),
            fallback_count,
            collapsed: true,
        };
    }

    let mut vector = StateVector::default();
    for state in State::ALL {
        vector[state] = (log_mass[state.index()] - max).exp();
    }
    Fused {
        vector,
        evidence_used: observations.len(),
        fallback_count,
        collapsed: false,
    }
}

fn apply_overrides(
    posterior: &StateVector,
    evidence: &EvidenceSet,
    history: &TrainingHistoryLog,
    yesterday: Option<&Distribution>,
    params: &ModelParams,
    fired: &mut Vec<OverrideRule>,
) -> StateVector {
    let mut p = *posterior;

    // a. three-day fatigue
    if evidence.fatigue_3day == Some(HooperLevel::High) {
        p[Peak] *= params.fatigue_3day_peak_factor;
        fired.push(OverrideRule::ThreeDayFatigue);
    }

    // b. low soreness with high stress
    if evidence.muscle_soreness == Some(HooperLevel::Low)
        && evidence.subjective_stress == Some(HooperLevel::High)
    {
        p[Nfor] *= params.nfor_boost_factor;
        p[For] *= params.for_dampen_factor;
        fired.push(OverrideRule::LowSorenessHighStress);
    }

    // c. nutrition deficit on a healthy-looking posterior
    if let Some(nutrition) = evidence.nutrition {
        let next = apply_nutrition_rule(&p, nutrition, params);
        if next != p {
            fired.push(OverrideRule::NutritionDeficit);
            p = next;
        }
    }

    // d. training load accumulation, 4-day before 8-day
    let accumulation =
        history.check_nfor_accumulation_rules(params.four_day_shift, params.eight_day_shift);
    let sources = [Peak, WellAdapted, For, AcuteFatigue];
    if accumulation.four_day_fired {
        p = shift_mass(&p, &sources, &[Nfor], accumulation.four_day_transfer);
        fired.push(OverrideRule::FourDayAccumulation);
    }
    if accumulation.eight_day_fired {
        p = shift_mass(&p, &sources, &[Nfor], accumulation.eight_day_transfer);
        fired.push(OverrideRule::EightDayAccumulation);
    }

    // e. NFOR persistence
    if let Some(yesterday) = yesterday {
        if yesterday[Nfor] > params.nfor_persistence_threshold {
            p = shift_mass(
                &p,
                &[Peak, WellAdapted],
                &[Nfor, For],
                params.nfor_persistence_shift,
            );
            fired.push(OverrideRule::NforPersistence);
        }
    }

    if !fired.is_empty() {
        debug!(rules = ?fired, "override rules applied");
    }
    p
}

/// Shift healthy mass into NFOR when nutrition is inadequate and the
/// posterior is at least `nutrition_gate` healthy
pub(crate) fn apply_nutrition_rule(
    posterior: &StateVector,
    nutrition: Nutrition,
    params: &ModelParams,
) -> StateVector {
    let fraction = match nutrition {
        Nutrition::Adequate => return *posterior,
        Nutrition::InadequateMild => params.nutrition_mild_shift,
        Nutrition::InadequateModerate => params.nutrition_moderate_shift,
        Nutrition::InadequateSevere => params.nutrition_severe_shift,
    };
    let total = posterior.total();
    if total <= 0.0 {
        return *posterior;
    }
    let healthy = posterior.mass_of(&[Peak, WellAdapted]) / total;
    if healthy < params.nutrition_gate {
        return *posterior;
    }
    shift_mass(posterior, &[Peak, WellAdapted], &[Nfor], fraction)
}
