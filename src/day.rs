//! Per-day processing cycle
//!
//! One day moves through three phases, each a distinct type consumed by the
//! next step, so the update stage cannot run before the transition stage:
//!
//! `DayCycle` (awaiting causal inputs) → `AwaitingEvidence` → `FinalizedDay`

use crate::context::CausalInputs;
use crate::cpt::{CptStore, EmissionCpt};
use crate::evidence::EvidenceSet;
use crate::history::TrainingHistoryLog;
use crate::score::{score, Assessment};
use crate::transition::transition;
use crate::types::Distribution;
use crate::update::{update, OverrideRule, UpdateOutcome};
use serde::{Deserialize, Serialize};

/// A day that has not yet seen its causal inputs
#[derive(Debug, Clone)]
pub struct DayCycle<'a> {
    store: &'a CptStore,
    previous: Distribution,
    yesterday: Option<Distribution>,
}

/// A day with a prior, waiting for evidence
#[derive(Debug, Clone)]
pub struct AwaitingEvidence<'a> {
    store: &'a CptStore,
    prior: Distribution,
    yesterday: Option<Distribution>,
}

/// A fully processed day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedDay {
    pub prior: Distribution,
    pub posterior: Distribution,
    pub assessment: Assessment,
    pub fired_rules: Vec<OverrideRule>,
    pub evidence_used: usize,
    pub fallback_count: usize,
    pub degenerate_reset: bool,
}

impl<'a> DayCycle<'a> {
    /// Begin a day from yesterday's posterior.
    ///
    /// Without one, the store's initial distribution seeds the chain and the
    /// NFOR persistence rule has nothing to look back on.
    pub fn start(store: &'a CptStore, previous: Option<&Distribution>) -> Self {
        Self {
            store,
            previous: previous.copied().unwrap_or(store.initial_distribution),
            yesterday: previous.copied(),
        }
    }

    pub fn transition(self, causal: &CausalInputs) -> AwaitingEvidence<'a> {
        AwaitingEvidence {
            store: self.store,
            prior: transition(self.store, &self.previous, causal),
            yesterday: self.yesterday,
        }
    }
}

impl<'a> AwaitingEvidence<'a> {
    pub fn prior(&self) -> &Distribution {
        &self.prior
    }

    /// Fuse evidence using the store's default emission tables
    pub fn update(self, evidence: &EvidenceSet, history: &TrainingHistoryLog) -> FinalizedDay {
        let store = self.store;
        self.update_with(&store.emission, evidence, history)
    }

    /// Fuse evidence using the given emission tables
    pub fn update_with(
        self,
        emission: &EmissionCpt,
        evidence: &EvidenceSet,
        history: &TrainingHistoryLog,
    ) -> FinalizedDay {
        let UpdateOutcome {
            posterior,
            fired_rules,
            evidence_used,
            fallback_count,
            degenerate_reset,
        } = update(
            self.store,
            emission,
            &self.prior,
            evidence,
            history,
            self.yesterday.as_ref(),
        );

        FinalizedDay {
            prior: self.prior,
            assessment: score(self.store, &posterior),
            posterior,
            fired_rules,
            evidence_used,
            fallback_count,
            degenerate_reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TrainingLoad;
    use crate::evidence::HooperLevel;
    use crate::types::State;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_day_starts_from_initial_distribution() {
        let store = CptStore::default();
        let day = DayCycle::start(&store, None).transition(&CausalInputs::default());
        let expected = transition(&store, &store.initial_distribution, &CausalInputs::default());
        assert_eq!(day.prior(), &expected);

        let finalized = day.update(&EvidenceSet::default(), &TrainingHistoryLog::new());
        for state in State::ALL {
            assert!((finalized.posterior[state] - expected[state]).abs() < 1e-12);
        }
        assert!(finalized.fired_rules.is_empty());
    }

    #[test]
    fn test_chained_days() {
        let store = CptStore::default();
        let mut history = TrainingHistoryLog::new();
        let causal = CausalInputs {
            training_load: Some(TrainingLoad::VeryHigh),
            ..Default::default()
        };
        let evidence = EvidenceSet {
            subjective_fatigue: Some(HooperLevel::High),
            muscle_soreness: Some(HooperLevel::High),
            ..Default::default()
        };

        let mut previous: Option<Distribution> = None;
        let mut scores = Vec::new();
        for _ in 0..5 {
            history.add_training_day(TrainingLoad::VeryHigh, None).unwrap();
            let day = DayCycle::start(&store, previous.as_ref())
                .transition(&causal)
                .update(&evidence, &history);
            scores.push(day.assessment.score);
            previous = Some(day.posterior);
        }

        assert!(scores[4] <= scores[0]);
        assert!(scores.iter().all(|s| *s < 60));
        assert_ne!(previous.map(|p| crate::score::diagnose(&p)), Some(State::Peak));
    }
}
