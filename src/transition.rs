//! Transition stage
//!
//! Turns yesterday's posterior into today's prior: a Markov step through the
//! transition table, followed by causal shifts applied in a fixed order where
//! each shift sees the result of the previous one:
//!
//! 1. training load (Peak, Well-adapted → FOR, Acute Fatigue)
//! 2. 14-day cumulative fatigue (Peak, Well-adapted, FOR → NFOR, OTS)
//! 3. poor sleep, scaled by perceived-stress decay (Peak, Well-adapted → NFOR)
//! 4. menstrual phase (Peak, Well-adapted → Acute Fatigue)
//!
//! The result is floored at epsilon and renormalized.

use crate::context::{CausalInputs, CumulativeFatigue, CyclePhase, SleepCategory, TrainingLoad};
use crate::cpt::{CptStore, ModelParams, TransitionCpt};
use crate::types::{shift_mass, Distribution, State, StateVector};
use tracing::{debug, warn};

use State::{AcuteFatigue, For, Nfor, Ots, Peak, WellAdapted};

/// Compute today's prior from yesterday's posterior and causal inputs
pub fn transition(store: &CptStore, previous: &Distribution, causal: &CausalInputs) -> Distribution {
    let params = &store.params;
    let mut prior = markov_step(&store.transition, previous);
    prior = apply_training_load_shift(&prior, causal.training_load, params);
    prior = apply_cumulative_fatigue_shift(&prior, causal.cumulative_fatigue_14day_state, params);
    prior = apply_poor_sleep_shift(
        &prior,
        causal.subjective_sleep_state,
        causal.effective_stress_decay(),
        params,
    );
    prior = apply_menstrual_shift(&prior, causal, params);
    finalize(&prior, params.epsilon)
}

/// prior[s] = Σ_prev posterior[prev] · T[prev][s]
pub(crate) fn markov_step(cpt: &TransitionCpt, previous: &Distribution) -> StateVector {
    let mut out = StateVector::default();
    for (from, p) in previous.iter() {
        let row = cpt.row(from);
        for to in State::ALL {
            out[to] += p * row[to];
        }
    }
    out
}

pub(crate) fn apply_training_load_shift(
    prior: &StateVector,
    load: Option<TrainingLoad>,
    params: &ModelParams,
) -> StateVector {
    let fraction = match load {
        Some(TrainingLoad::High) => params.training_load_high_shift,
        Some(TrainingLoad::VeryHigh) => params.training_load_very_high_shift,
        _ => return *prior,
    };
    debug!(fraction, "training load shift");
    shift_mass(prior, &[Peak, WellAdapted], &[For, AcuteFatigue], fraction)
}

pub(crate) fn apply_cumulative_fatigue_shift(
    prior: &StateVector,
    fatigue: Option<CumulativeFatigue>,
    params: &ModelParams,
) -> StateVector {
    if fatigue != Some(CumulativeFatigue::High) {
        return *prior;
    }
    debug!(fraction = params.cumulative_fatigue_shift, "cumulative fatigue shift");
    shift_mass(
        prior,
        &[Peak, WellAdapted, For],
        &[Nfor, Ots],
        params.cumulative_fatigue_shift,
    )
}

pub(crate) fn apply_poor_sleep_shift(
    prior: &StateVector,
    sleep: Option<SleepCategory>,
    stress_decay: f64,
    params: &ModelParams,
) -> StateVector {
    if sleep != Some(SleepCategory::Poor) {
        return *prior;
    }
    let fraction = params.poor_sleep_shift * stress_decay;
    debug!(fraction, "poor sleep shift");
    shift_mass(prior, &[Peak, WellAdapted], &[Nfor], fraction)
}

pub(crate) fn apply_menstrual_shift(
    prior: &StateVector,
    causal: &CausalInputs,
    params: &ModelParams,
) -> StateVector {
    let Some(cycle) = causal.menstrual_cycle else {
        return *prior;
    };
    match cycle.phase() {
        Some(CyclePhase::Menstruation) | Some(CyclePhase::LateLuteal) => {
            shift_mass(prior, &[Peak, WellAdapted], &[AcuteFatigue], params.menstrual_shift)
        }
        Some(CyclePhase::Neutral) => *prior,
        None => {
            debug!(day = cycle.day, length = cycle.length, "ignoring implausible cycle data");
            *prior
        }
    }
}

/// Renormalize, floor every state at epsilon, renormalize again
fn finalize(prior: &StateVector, epsilon: f64) -> Distribution {
    let (normalized, reset) = Distribution::normalize_or_uniform(prior);
    if reset {
        warn!("transition produced a degenerate prior; resetting to uniform");
        return normalized;
    }
    let mut floored = *normalized.vector();
    for state in State::ALL {
        floored[state] = floored[state].max(epsilon);
    }
    Distribution::normalize_or_uniform(&floored).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MenstrualCycle;
    use proptest::prelude::*;

    fn scenario_prior() -> Distribution {
        Distribution::from_probabilities([0.0, 0.0, 0.3, 0.1, 0.6, 0.0]).unwrap()
    }

    fn scenario_causal() -> CausalInputs {
        serde_json::from_str(
            r#"{
                "training_load": "高",
                "subjective_sleep_state": "poor",
                "cumulative_fatigue_14day_state": "high"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_poor_sleep_raises_nfor_share() {
        let store = CptStore::default();
        let causal = scenario_causal();
        let params = &store.params;

        let markov = markov_step(&store.transition, &scenario_prior());
        let after_load = apply_training_load_shift(&markov, causal.training_load, params);
        let before_sleep =
            apply_cumulative_fatigue_shift(&after_load, causal.cumulative_fatigue_14day_state, params);

        let prior = transition(&store, &scenario_prior(), &causal);

        let total: f64 = prior.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-6);
        let before_share = before_sleep[Nfor] / before_sleep.total();
        assert!(prior[Nfor] > before_share);
    }

    #[test]
    fn test_no_causal_inputs_is_pure_markov_step() {
        let store = CptStore::default();
        let previous = Distribution::uniform();
        let prior = transition(&store, &previous, &CausalInputs::default());
        let markov = markov_step(&store.transition, &previous);

        for state in State::ALL {
            assert!((prior[state] - markov[state] / markov.total()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_training_load_shift_fractions() {
        let params = ModelParams::default();
        let v = StateVector::new([0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);

        let high = apply_training_load_shift(&v, Some(TrainingLoad::High), &params);
        assert!((high.mass_of(&[For, AcuteFatigue]) - 0.60).abs() < 1e-12);

        let very_high = apply_training_load_shift(&v, Some(TrainingLoad::VeryHigh), &params);
        assert!((very_high.mass_of(&[For, AcuteFatigue]) - 0.85).abs() < 1e-12);

        let medium = apply_training_load_shift(&v, Some(TrainingLoad::Medium), &params);
        assert_eq!(medium, v);
    }

    #[test]
    fn test_stress_decay_scales_sleep_shift() {
        let params = ModelParams::default();
        let v = StateVector::new([0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);

        let full = apply_poor_sleep_shift(&v, Some(SleepCategory::Poor), 1.0, &params);
        let half = apply_poor_sleep_shift(&v, Some(SleepCategory::Poor), 0.5, &params);
        assert!((full[Nfor] - 0.40).abs() < 1e-12);
        assert!((half[Nfor] - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_menstrual_shift() {
        let params = ModelParams::default();
        let v = StateVector::new([0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        let mut causal = CausalInputs {
            menstrual_cycle: Some(MenstrualCycle { day: 2, length: 28 }),
            ..Default::default()
        };

        let shifted = apply_menstrual_shift(&v, &causal, &params);
        assert!((shifted[AcuteFatigue] - 0.10).abs() < 1e-12);

        causal.menstrual_cycle = Some(MenstrualCycle { day: 40, length: 28 });
        assert_eq!(apply_menstrual_shift(&v, &causal, &params), v);
    }

    #[test]
    fn test_output_never_exactly_zero() {
        let store = CptStore::default();
        let previous = Distribution::from_probabilities([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let mut ots_free = store.clone();
        ots_free.transition = TransitionCpt::new([StateVector::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]); 6]);

        let prior = transition(&ots_free, &previous, &CausalInputs::default());
        for (_, p) in prior.iter() {
            assert!(p > 0.0);
        }
    }

    proptest! {
        #[test]
        fn prop_transition_yields_distribution(
            raw in prop::array::uniform6(0.0f64..1.0),
            load in 0usize..5,
            sleep in 0usize..3,
            fatigue in 0usize..3,
            decay in 0.0f64..1.0,
        ) {
            prop_assume!(raw.iter().sum::<f64>() > 1e-9);
            let store = CptStore::default();
            let previous = Distribution::from_probabilities(raw).unwrap();
            let loads = [TrainingLoad::Rest, TrainingLoad::Low, TrainingLoad::Medium, TrainingLoad::High, TrainingLoad::VeryHigh];
            let sleeps = [SleepCategory::Good, SleepCategory::Medium, SleepCategory::Poor];
            let fatigues = [CumulativeFatigue::Low, CumulativeFatigue::Medium, CumulativeFatigue::High];
            let causal = CausalInputs {
                training_load: Some(loads[load]),
                subjective_sleep_state: Some(sleeps[sleep]),
                cumulative_fatigue_14day_state: Some(fatigues[fatigue]),
                stress_decay_factor: Some(decay),
                menstrual_cycle: None,
            };

            let prior = transition(&store, &previous, &causal);
            let total: f64 = prior.iter().map(|(_, p)| p).sum();
            prop_assert!((total - 1.0).abs() < 1e-6);
            for (_, p) in prior.iter() {
                prop_assert!(p > 0.0);
            }
        }
    }
}
