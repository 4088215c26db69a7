//! Causal daily context
//!
//! Inputs consumed only by the transition stage: yesterday's training load,
//! the 14-day cumulative fatigue state, last night's sleep category, an
//! optional perceived-stress decay factor and optional menstrual-cycle position.
//!
//! Labels are parsed leniently. A malformed label is logged and treated as
//! absent so the corresponding shift simply does not apply.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Default half-life for perceived-stress decay, in days
pub const DEFAULT_STRESS_HALF_LIFE_DAYS: f64 = 3.0;

/// Valid menstrual cycle lengths in days
pub const CYCLE_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 21..=45;

/// Days at the end of the cycle counted as late luteal phase
const LATE_LUTEAL_DAYS: u32 = 5;

/// Days at the start of the cycle counted as menstruation
const MENSTRUATION_DAYS: u32 = 3;

/// Training load label for a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingLoad {
    #[serde(alias = "休息")]
    Rest,
    #[serde(alias = "低")]
    Low,
    #[serde(alias = "中")]
    Medium,
    #[serde(alias = "高")]
    High,
    #[serde(alias = "极高")]
    VeryHigh,
}

impl TrainingLoad {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingLoad::Rest => "rest",
            TrainingLoad::Low => "low",
            TrainingLoad::Medium => "medium",
            TrainingLoad::High => "high",
            TrainingLoad::VeryHigh => "very_high",
        }
    }

    /// High or very high
    pub fn is_high_intensity(&self) -> bool {
        matches!(self, TrainingLoad::High | TrainingLoad::VeryHigh)
    }
}

impl FromStr for TrainingLoad {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rest" | "none" | "休息" => Ok(TrainingLoad::Rest),
            "low" | "低" => Ok(TrainingLoad::Low),
            "medium" | "moderate" | "中" => Ok(TrainingLoad::Medium),
            "high" | "高" => Ok(TrainingLoad::High),
            "very_high" | "very-high" | "veryhigh" | "极高" => Ok(TrainingLoad::VeryHigh),
            _ => Err(format!("Invalid training load: {}", s)),
        }
    }
}

impl fmt::Display for TrainingLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 14-day cumulative fatigue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CumulativeFatigue {
    Low,
    Medium,
    High,
}

impl FromStr for CumulativeFatigue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "低" => Ok(CumulativeFatigue::Low),
            "medium" | "中" => Ok(CumulativeFatigue::Medium),
            "high" | "高" => Ok(CumulativeFatigue::High),
            _ => Err(format!("Invalid cumulative fatigue state: {}", s)),
        }
    }
}

/// Night sleep category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepCategory {
    Good,
    Medium,
    Poor,
}

impl FromStr for SleepCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "good" | "好" => Ok(SleepCategory::Good),
            "medium" | "fair" | "中" => Ok(SleepCategory::Medium),
            "poor" | "bad" | "差" => Ok(SleepCategory::Poor),
            _ => Err(format!("Invalid sleep category: {}", s)),
        }
    }
}

/// Menstrual cycle position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenstrualCycle {
    /// Day within the cycle, starting at 1
    pub day: u32,
    /// Cycle length in days
    pub length: u32,
}

/// Cycle phases that carry a readiness cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Menstruation,
    LateLuteal,
    Neutral,
}

impl MenstrualCycle {
    /// Phase for this position, or `None` if the cycle data is implausible
    pub fn phase(&self) -> Option<CyclePhase> {
        if !CYCLE_LENGTH_RANGE.contains(&self.length) || self.day == 0 || self.day > self.length {
            return None;
        }
        if self.day <= MENSTRUATION_DAYS {
            Some(CyclePhase::Menstruation)
        } else if self.day > self.length - LATE_LUTEAL_DAYS {
            Some(CyclePhase::LateLuteal)
        } else {
            Some(CyclePhase::Neutral)
        }
    }
}

/// Daily causal inputs for the transition stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CausalInputs {
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub training_load: Option<TrainingLoad>,
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub cumulative_fatigue_14day_state: Option<CumulativeFatigue>,
    #[serde(default, deserialize_with = "lenient_label", skip_serializing_if = "Option::is_none")]
    pub subjective_sleep_state: Option<SleepCategory>,
    /// Multiplier in [0, 1] on the poor-sleep shift
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_decay_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menstrual_cycle: Option<MenstrualCycle>,
}

impl CausalInputs {
    /// Stress decay factor clamped to [0, 1]; 1 when absent or not finite
    pub fn effective_stress_decay(&self) -> f64 {
        match self.stress_decay_factor {
            Some(f) if f.is_finite() => f.clamp(0.0, 1.0),
            Some(f) => {
                warn!(value = f, "ignoring non-finite stress decay factor");
                1.0
            }
            None => 1.0,
        }
    }
}

/// Exponential perceived-stress decay: `0.5^(days_since / half_life)`.
pub fn stress_decay_factor(days_since_stress: f64, half_life_days: f64) -> f64 {
    if !days_since_stress.is_finite() || days_since_stress < 0.0 || half_life_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(days_since_stress / half_life_days).clamp(0.0, 1.0)
}

fn lenient_label<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => match s.parse() {
            Ok(label) => Some(label),
            Err(e) => {
                warn!("{}; treating as absent", e);
                None
            }
        },
        Some(serde_json::Value::Null) | None => None,
        Some(other) => {
            warn!(value = %other, "non-string causal label; treating as absent");
            None
        }
    })
}
