//! Population default tables
//!
//! Column order everywhere: Peak, Well-adapted, FOR, Acute Fatigue, NFOR, OTS.

use super::{EmissionCpt, TransitionCpt};
use crate::evidence::EvidenceType;
use crate::types::{Distribution, StateVector};
use std::collections::BTreeMap;

const TRANSITION: [[f64; 6]; 6] = [
    [0.60, 0.25, 0.08, 0.05, 0.015, 0.005],
    [0.20, 0.55, 0.13, 0.09, 0.025, 0.005],
    [0.08, 0.25, 0.45, 0.12, 0.08, 0.02],
    [0.10, 0.30, 0.15, 0.38, 0.05, 0.02],
    [0.02, 0.05, 0.13, 0.10, 0.65, 0.05],
    [0.01, 0.02, 0.04, 0.03, 0.15, 0.75],
];

const READINESS_WEIGHTS: [f64; 6] = [100.0, 85.0, 60.0, 50.0, 30.0, 10.0];

const INITIAL: [f64; 6] = [0.20, 0.40, 0.15, 0.15, 0.07, 0.03];

const HOOPER_FATIGUE: &[(&str, [f64; 6])] = &[
    ("low", [0.70, 0.55, 0.20, 0.10, 0.10, 0.05]),
    ("medium", [0.25, 0.35, 0.45, 0.30, 0.35, 0.25]),
    ("high", [0.05, 0.10, 0.35, 0.60, 0.55, 0.70]),
];

const HOOPER_SORENESS: &[(&str, [f64; 6])] = &[
    ("low", [0.70, 0.55, 0.25, 0.10, 0.30, 0.20]),
    ("medium", [0.25, 0.35, 0.45, 0.35, 0.40, 0.35]),
    ("high", [0.05, 0.10, 0.30, 0.55, 0.30, 0.45]),
];

const HOOPER_STRESS: &[(&str, [f64; 6])] = &[
    ("low", [0.65, 0.55, 0.35, 0.35, 0.10, 0.05]),
    ("medium", [0.30, 0.35, 0.45, 0.40, 0.35, 0.25]),
    ("high", [0.05, 0.10, 0.20, 0.25, 0.55, 0.70]),
];

const SUBJECTIVE_SLEEP: &[(&str, [f64; 6])] = &[
    ("good", [0.70, 0.55, 0.35, 0.30, 0.15, 0.05]),
    ("medium", [0.25, 0.35, 0.40, 0.40, 0.35, 0.30]),
    ("poor", [0.05, 0.10, 0.25, 0.30, 0.50, 0.65]),
];

const SLEEP_PERFORMANCE: &[(&str, [f64; 6])] = &[
    ("excellent", [0.45, 0.30, 0.15, 0.10, 0.05, 0.03]),
    ("good", [0.35, 0.40, 0.35, 0.30, 0.20, 0.12]),
    ("medium", [0.15, 0.22, 0.35, 0.35, 0.35, 0.30]),
    ("poor", [0.05, 0.08, 0.15, 0.25, 0.40, 0.55]),
];

const APPLE_SLEEP_SCORE: &[(&str, [f64; 6])] = &[
    ("excellent", [0.50, 0.32, 0.15, 0.10, 0.05, 0.03]),
    ("good", [0.32, 0.40, 0.35, 0.28, 0.20, 0.12]),
    ("fair", [0.13, 0.20, 0.35, 0.37, 0.35, 0.30]),
    ("poor", [0.05, 0.08, 0.15, 0.25, 0.40, 0.55]),
];

const HRV_TREND: &[(&str, [f64; 6])] = &[
    ("rising", [0.40, 0.30, 0.10, 0.05, 0.05, 0.05]),
    ("stable", [0.45, 0.50, 0.35, 0.25, 0.20, 0.15]),
    ("slight_decline", [0.10, 0.15, 0.40, 0.40, 0.35, 0.25]),
    ("significant_decline", [0.05, 0.05, 0.15, 0.30, 0.40, 0.55]),
];

const NUTRITION: &[(&str, [f64; 6])] = &[
    ("adequate", [0.75, 0.70, 0.55, 0.55, 0.40, 0.30]),
    ("inadequate_mild", [0.15, 0.18, 0.25, 0.25, 0.30, 0.30]),
    ("inadequate_moderate", [0.07, 0.08, 0.13, 0.13, 0.18, 0.22]),
    ("inadequate_severe", [0.03, 0.04, 0.07, 0.07, 0.12, 0.18]),
];

const RESTORATIVE_SLEEP: &[(&str, [f64; 6])] = &[
    ("high", [0.50, 0.40, 0.25, 0.20, 0.10, 0.05]),
    ("medium", [0.35, 0.40, 0.45, 0.40, 0.35, 0.30]),
    ("low", [0.15, 0.20, 0.30, 0.40, 0.55, 0.65]),
];

const GI_SYMPTOMS: &[(&str, [f64; 6])] = &[
    ("none", [0.85, 0.80, 0.70, 0.65, 0.55, 0.45]),
    ("mild", [0.12, 0.15, 0.22, 0.25, 0.30, 0.33]),
    ("severe", [0.03, 0.05, 0.08, 0.10, 0.15, 0.22]),
];

// Journal flags list P(flag = true | state); false is the complement.
const ALCOHOL: [f64; 6] = [0.10, 0.15, 0.20, 0.25, 0.25, 0.25];
const LATE_CAFFEINE: [f64; 6] = [0.15, 0.20, 0.25, 0.25, 0.30, 0.30];
const SCREEN_BEFORE_BED: [f64; 6] = [0.30, 0.35, 0.40, 0.40, 0.45, 0.45];
const IS_SICK: [f64; 6] = [0.02, 0.05, 0.10, 0.25, 0.30, 0.40];

pub(super) fn transition_cpt() -> TransitionCpt {
    TransitionCpt::new(TRANSITION.map(StateVector::new))
}

pub(super) fn readiness_weights() -> StateVector {
    StateVector::new(READINESS_WEIGHTS)
}

pub(super) fn initial_distribution() -> Distribution {
    Distribution::from_probabilities(INITIAL).unwrap_or_default()
}

pub(super) fn emission_cpt() -> EmissionCpt {
    let mut cpt = EmissionCpt::default();
    let leveled: [(EvidenceType, &[(&str, [f64; 6])]); 10] = [
        (EvidenceType::SubjectiveFatigue, HOOPER_FATIGUE),
        (EvidenceType::MuscleSoreness, HOOPER_SORENESS),
        (EvidenceType::SubjectiveStress, HOOPER_STRESS),
        (EvidenceType::SubjectiveSleep, SUBJECTIVE_SLEEP),
        (EvidenceType::SleepPerformance, SLEEP_PERFORMANCE),
        (EvidenceType::AppleSleepScore, APPLE_SLEEP_SCORE),
        (EvidenceType::HrvTrend, HRV_TREND),
        (EvidenceType::Nutrition, NUTRITION),
        (EvidenceType::RestorativeSleep, RESTORATIVE_SLEEP),
        (EvidenceType::GiSymptoms, GI_SYMPTOMS),
    ];
    for (evidence, rows) in leveled {
        let table = rows
            .iter()
            .map(|(level, values)| (level.to_string(), StateVector::new(*values)))
            .collect();
        cpt.set_table(evidence, table);
    }

    let flags = [
        (EvidenceType::Alcohol, ALCOHOL),
        (EvidenceType::LateCaffeine, LATE_CAFFEINE),
        (EvidenceType::ScreenBeforeBed, SCREEN_BEFORE_BED),
        (EvidenceType::IsSick, IS_SICK),
    ];
    for (evidence, when_true) in flags {
        let mut table = BTreeMap::new();
        table.insert("true".to_string(), StateVector::new(when_true));
        table.insert("false".to_string(), StateVector::new(when_true.map(|p| 1.0 - p)));
        cpt.set_table(evidence, table);
    }
    cpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::State;

    #[test]
    fn test_leveled_tables_are_proper_conditionals() {
        // Each state's likelihoods across levels sum to one
        let cpt = emission_cpt();
        for (evidence, table) in cpt.tables() {
            for state in State::ALL {
                let sum: f64 = table.values().map(|row| row[state]).sum();
                assert!(
                    (sum - 1.0).abs() < 1e-9,
                    "{} column {} sums to {}",
                    evidence,
                    state,
                    sum
                );
            }
        }
    }

    #[test]
    fn test_transition_rows_sum_to_one() {
        for row in TRANSITION {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }
}
