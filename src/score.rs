//! Readiness score and diagnosis

use crate::cpt::CptStore;
use crate::types::{Distribution, State};
use serde::{Deserialize, Serialize};

/// Scalar summary of a posterior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Expected readiness weight, rounded to an integer in [0, 100]
    pub score: u8,
    /// Most probable state
    pub diagnosis: State,
}

/// Compute the readiness score and the most probable state.
///
/// Ties on probability go to the more severe state. Half-points round away
/// from zero, so 92.5 scores 93.
pub fn score(store: &CptStore, posterior: &Distribution) -> Assessment {
    let score = expected_readiness(store, posterior).round().clamp(0.0, 100.0) as u8;

    Assessment {
        score,
        diagnosis: diagnose(posterior),
    }
}

/// Σ P(state) · weight(state), unrounded
pub fn expected_readiness(store: &CptStore, posterior: &Distribution) -> f64 {
    posterior
        .iter()
        .map(|(state, p)| p * store.readiness_weights[state])
        .sum()
}

/// Argmax over the posterior, preferring severity on ties
pub fn diagnose(posterior: &Distribution) -> State {
    let mut best = State::Peak;
    let mut best_p = f64::NEG_INFINITY;
    for (state, p) in posterior.iter() {
        if p > best_p || (p == best_p && state.severity() > best.severity()) {
            best = state;
            best_p = p;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_point_mass_scores_its_weight() {
        let store = CptStore::default();
        let expected = [100, 85, 60, 50, 30, 10];
        for (i, state) in State::ALL.iter().enumerate() {
            let mut raw = [0.0; 6];
            raw[i] = 1.0;
            let assessment = score(&store, &Distribution::from_probabilities(raw).unwrap());
            assert_eq!(assessment.score, expected[i]);
            assert_eq!(assessment.diagnosis, *state);
        }
    }

    #[test]
    fn test_score_rounds() {
        let store = CptStore::default();
        let posterior = Distribution::from_probabilities([0.5, 0.5, 0.0, 0.0, 0.0, 0.0]).unwrap();
        // 92.5 rounds away from zero
        assert_eq!(score(&store, &posterior).score, 93);
    }

    #[test]
    fn test_tie_goes_to_more_severe_state() {
        let posterior = Distribution::from_probabilities([0.4, 0.4, 0.1, 0.1, 0.0, 0.0]).unwrap();
        assert_eq!(diagnose(&posterior), State::WellAdapted);

        let posterior = Distribution::from_probabilities([0.0, 0.0, 0.0, 0.0, 0.5, 0.5]).unwrap();
        assert_eq!(diagnose(&posterior), State::Ots);

        assert_eq!(diagnose(&Distribution::uniform()), State::Ots);
    }

    proptest! {
        #[test]
        fn prop_moving_mass_to_healthier_state_never_lowers_score(
            raw in prop::array::uniform6(0.0f64..1.0),
            from in 1usize..6,
            amount in 0.0f64..1.0,
        ) {
            prop_assume!(raw.iter().sum::<f64>() > 1e-9);
            let store = CptStore::default();
            let before = Distribution::from_probabilities(raw).unwrap();

            let mut shifted = *before.vector().values();
            let moved = shifted[from] * amount;
            shifted[from] -= moved;
            shifted[from - 1] += moved;
            let after = Distribution::from_probabilities(shifted).unwrap();

            prop_assert!(
                expected_readiness(&store, &after) >= expected_readiness(&store, &before) - 1e-9
            );
        }

        #[test]
        fn prop_score_in_range(raw in prop::array::uniform6(0.0f64..1.0)) {
            prop_assume!(raw.iter().sum::<f64>() > 1e-9);
            let store = CptStore::default();
            let assessment = score(&store, &Distribution::from_probabilities(raw).unwrap());
            prop_assert!(assessment.score <= 100);
            prop_assert!(assessment.score >= 10);
        }
    }
}
