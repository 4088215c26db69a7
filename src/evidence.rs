//! Discretized daily evidence
//!
//! Every recognized evidence field is explicit and optional, each with its own
//! closed vocabulary. Unknown keys are rejected when an `EvidenceSet` is parsed,
//! so nothing unrecognized reaches the update stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines a closed evidence vocabulary with its wire names.
macro_rules! evidence_levels {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

evidence_levels!(
    /// Three-level Hooper-derived rating (fatigue, soreness, stress)
    HooperLevel { Low => "low", Medium => "medium", High => "high" }
);

evidence_levels!(
    /// Subjective sleep quality
    SleepQuality { Good => "good", Medium => "medium", Poor => "poor" }
);

evidence_levels!(
    /// Sleep performance derived from sleep duration
    SleepPerformance { Excellent => "excellent", Good => "good", Medium => "medium", Poor => "poor" }
);

evidence_levels!(
    /// Apple Watch sleep score band
    AppleSleepScore { Excellent => "excellent", Good => "good", Fair => "fair", Poor => "poor" }
);

evidence_levels!(
    /// HRV trend relative to personal baseline
    HrvTrend {
        Rising => "rising",
        Stable => "stable",
        SlightDecline => "slight_decline",
        SignificantDecline => "significant_decline",
    }
);

evidence_levels!(
    /// Nutrition adequacy
    Nutrition {
        Adequate => "adequate",
        InadequateMild => "inadequate_mild",
        InadequateModerate => "inadequate_moderate",
        InadequateSevere => "inadequate_severe",
    }
);

evidence_levels!(
    /// Share of restorative (deep + REM) sleep
    RestorativeSleep { High => "high", Medium => "medium", Low => "low" }
);

evidence_levels!(
    /// Gastrointestinal symptoms
    GiSymptoms { Absent => "none", Mild => "mild", Severe => "severe" }
);

/// Evidence types that carry an emission table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    SubjectiveFatigue,
    MuscleSoreness,
    SubjectiveStress,
    SubjectiveSleep,
    SleepPerformance,
    AppleSleepScore,
    HrvTrend,
    Nutrition,
    RestorativeSleep,
    GiSymptoms,
    Alcohol,
    LateCaffeine,
    ScreenBeforeBed,
    IsSick,
}

const BOOLEAN_LEVELS: &[&str] = &["true", "false"];

impl EvidenceType {
    pub const ALL: [EvidenceType; 14] = [
        EvidenceType::SubjectiveFatigue,
        EvidenceType::MuscleSoreness,
        EvidenceType::SubjectiveStress,
        EvidenceType::SubjectiveSleep,
        EvidenceType::SleepPerformance,
        EvidenceType::AppleSleepScore,
        EvidenceType::HrvTrend,
        EvidenceType::Nutrition,
        EvidenceType::RestorativeSleep,
        EvidenceType::GiSymptoms,
        EvidenceType::Alcohol,
        EvidenceType::LateCaffeine,
        EvidenceType::ScreenBeforeBed,
        EvidenceType::IsSick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::SubjectiveFatigue => "subjective_fatigue",
            EvidenceType::MuscleSoreness => "muscle_soreness",
            EvidenceType::SubjectiveStress => "subjective_stress",
            EvidenceType::SubjectiveSleep => "subjective_sleep",
            EvidenceType::SleepPerformance => "sleep_performance",
            EvidenceType::AppleSleepScore => "apple_sleep_score",
            EvidenceType::HrvTrend => "hrv_trend",
            EvidenceType::Nutrition => "nutrition",
            EvidenceType::RestorativeSleep => "restorative_sleep",
            EvidenceType::GiSymptoms => "gi_symptoms",
            EvidenceType::Alcohol => "alcohol",
            EvidenceType::LateCaffeine => "late_caffeine",
            EvidenceType::ScreenBeforeBed => "screen_before_bed",
            EvidenceType::IsSick => "is_sick",
        }
    }

    /// Recognized level names for this evidence type
    pub fn levels(&self) -> Vec<&'static str> {
        fn names<T: Copy>(all: &[T], f: fn(&T) -> &'static str) -> Vec<&'static str> {
            all.iter().map(f).collect()
        }
        match self {
            EvidenceType::SubjectiveFatigue
            | EvidenceType::MuscleSoreness
            | EvidenceType::SubjectiveStress => names(HooperLevel::ALL, HooperLevel::as_str),
            EvidenceType::SubjectiveSleep => names(SleepQuality::ALL, SleepQuality::as_str),
            EvidenceType::SleepPerformance => names(SleepPerformance::ALL, SleepPerformance::as_str),
            EvidenceType::AppleSleepScore => names(AppleSleepScore::ALL, AppleSleepScore::as_str),
            EvidenceType::HrvTrend => names(HrvTrend::ALL, HrvTrend::as_str),
            EvidenceType::Nutrition => names(Nutrition::ALL, Nutrition::as_str),
            EvidenceType::RestorativeSleep => names(RestorativeSleep::ALL, RestorativeSleep::as_str),
            EvidenceType::GiSymptoms => names(GiSymptoms::ALL, GiSymptoms::as_str),
            EvidenceType::Alcohol
            | EvidenceType::LateCaffeine
            | EvidenceType::ScreenBeforeBed
            | EvidenceType::IsSick => BOOLEAN_LEVELS.to_vec(),
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Objective sleep metric for the day.
///
/// Devices that report an Apple sleep score use it instead of the
/// duration-based sleep performance; never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepMetric {
    SleepPerformance(SleepPerformance),
    AppleSleepScore(AppleSleepScore),
}

/// Boolean journal entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alcohol: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_caffeine: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_before_bed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sick: Option<bool>,
}

impl JournalFlags {
    fn observations(&self) -> impl Iterator<Item = (EvidenceType, &'static str)> {
        [
            (EvidenceType::Alcohol, self.alcohol),
            (EvidenceType::LateCaffeine, self.late_caffeine),
            (EvidenceType::ScreenBeforeBed, self.screen_before_bed),
            (EvidenceType::IsSick, self.is_sick),
        ]
        .into_iter()
        .filter_map(|(t, flag)| flag.map(|f| (t, if f { "true" } else { "false" })))
    }
}

/// All evidence observed for one day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceSet {
    #[serde(default, alias = "fatigue", skip_serializing_if = "Option::is_none")]
    pub subjective_fatigue: Option<HooperLevel>,
    #[serde(default, alias = "soreness", skip_serializing_if = "Option::is_none")]
    pub muscle_soreness: Option<HooperLevel>,
    #[serde(default, alias = "stress", skip_serializing_if = "Option::is_none")]
    pub subjective_stress: Option<HooperLevel>,
    #[serde(default, alias = "sleep", skip_serializing_if = "Option::is_none")]
    pub subjective_sleep: Option<SleepQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_metric: Option<SleepMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_trend: Option<HrvTrend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<Nutrition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restorative_sleep: Option<RestorativeSleep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gi_symptoms: Option<GiSymptoms>,
    /// Three-day fatigue trend; drives an override rule only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_3day: Option<HooperLevel>,
    #[serde(default)]
    pub journal: JournalFlags,
}

impl EvidenceSet {
    /// Present evidence items that have an emission table, as (type, level)
    pub fn observations(&self) -> Vec<(EvidenceType, &'static str)> {
        let mut out = Vec::new();
        let mut push = |t: EvidenceType, level: Option<&'static str>| {
            if let Some(level) = level {
                out.push((t, level));
            }
        };

        push(EvidenceType::SubjectiveFatigue, self.subjective_fatigue.map(|l| l.as_str()));
        push(EvidenceType::MuscleSoreness, self.muscle_soreness.map(|l| l.as_str()));
        push(EvidenceType::SubjectiveStress, self.subjective_stress.map(|l| l.as_str()));
        push(EvidenceType::SubjectiveSleep, self.subjective_sleep.map(|l| l.as_str()));
        match self.sleep_metric {
            Some(SleepMetric::SleepPerformance(l)) => {
                push(EvidenceType::SleepPerformance, Some(l.as_str()))
            }
            Some(SleepMetric::AppleSleepScore(l)) => {
                push(EvidenceType::AppleSleepScore, Some(l.as_str()))
            }
            None => {}
        }
        push(EvidenceType::HrvTrend, self.hrv_trend.map(|l| l.as_str()));
        push(EvidenceType::Nutrition, self.nutrition.map(|l| l.as_str()));
        push(EvidenceType::RestorativeSleep, self.restorative_sleep.map(|l| l.as_str()));
        push(EvidenceType::GiSymptoms, self.gi_symptoms.map(|l| l.as_str()));

        out.extend(self.journal.observations());
        out
    }

    /// True when no evidence of any kind is present
    pub fn is_empty(&self) -> bool {
        self.observations().is_empty() && self.fatigue_3day.is_none()
    }

    /// Fill fields that are absent here from `other`
    pub fn merge_missing(&mut self, other: &EvidenceSet) {
        fn fill<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.subjective_fatigue, other.subjective_fatigue);
        fill(&mut self.muscle_soreness, other.muscle_soreness);
        fill(&mut self.subjective_stress, other.subjective_stress);
        fill(&mut self.subjective_sleep, other.subjective_sleep);
        fill(&mut self.sleep_metric, other.sleep_metric);
        fill(&mut self.hrv_trend, other.hrv_trend);
        fill(&mut self.nutrition, other.nutrition);
        fill(&mut self.restorative_sleep, other.restorative_sleep);
        fill(&mut self.gi_symptoms, other.gi_symptoms);
        fill(&mut self.fatigue_3day, other.fatigue_3day);
        fill(&mut self.journal.alcohol, other.journal.alcohol);
        fill(&mut self.journal.late_caffeine, other.journal.late_caffeine);
        fill(&mut self.journal.screen_before_bed, other.journal.screen_before_bed);
        fill(&mut self.journal.is_sick, other.journal.is_sick);
    }
}
