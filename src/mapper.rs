//! Evidence mapping
//!
//! Discretizes raw daily measurements into the closed vocabularies the model
//! understands:
//! - Sleep hours → sleep performance (or Apple sleep score band, when the device reports one)
//! - HRV z-score against personal baseline → HRV trend
//! - Hooper 1-7 items → low/medium/high (sleep item: good/medium/poor)
//! - Training and cumulative-fatigue labels → causal inputs
//!
//! Values outside their valid range are dropped with a warning rather than
//! clamped.

use crate::context::{
    stress_decay_factor, CausalInputs, CumulativeFatigue, MenstrualCycle, SleepCategory,
    TrainingLoad, DEFAULT_STRESS_HALF_LIFE_DAYS,
};
use crate::evidence::{
    AppleSleepScore, EvidenceSet, HooperLevel, HrvTrend, SleepMetric, SleepPerformance,
    SleepQuality,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hooper items are rated 1 (best) to 7 (worst)
const HOOPER_RANGE: std::ops::RangeInclusive<f64> = 1.0..=7.0;

/// Raw, undiscretized measurements for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMeasurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f64>,
    /// Apple Watch sleep score, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apple_sleep_score: Option<f64>,
    /// HRV deviation from personal baseline, in standard deviations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_z_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooper_fatigue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooper_soreness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooper_stress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooper_sleep: Option<f64>,
    /// Mean Hooper fatigue over the last three days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooper_fatigue_3day: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_load: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_fatigue_14day: Option<String>,
    /// Days since the last reported stressful event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_since_stressor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menstrual_cycle: Option<MenstrualCycle>,
}

/// Maps raw measurements into evidence and causal inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMapper {
    /// Device reports an Apple sleep score; use it instead of sleep hours
    pub apple_sleep_score_capable: bool,
    pub stress_half_life_days: f64,
}

impl Default for EvidenceMapper {
    fn default() -> Self {
        Self {
            apple_sleep_score_capable: false,
            stress_half_life_days: DEFAULT_STRESS_HALF_LIFE_DAYS,
        }
    }
}

impl EvidenceMapper {
    pub fn new(apple_sleep_score_capable: bool) -> Self {
        Self {
            apple_sleep_score_capable,
            ..Self::default()
        }
    }

    /// Discretize one day of raw measurements
    pub fn map(&self, raw: &RawMeasurements) -> (EvidenceSet, CausalInputs) {
        let sleep_metric = if self.apple_sleep_score_capable {
            raw.apple_sleep_score
                .and_then(map_apple_sleep_score)
                .map(SleepMetric::AppleSleepScore)
        } else {
            raw.sleep_hours
                .and_then(map_sleep_hours)
                .map(SleepMetric::SleepPerformance)
        };

        let sleep_quality = raw.hooper_sleep.and_then(|v| hooper_band(v, "hooper_sleep"));
        let evidence = EvidenceSet {
            subjective_fatigue: raw.hooper_fatigue.and_then(|v| hooper_band(v, "hooper_fatigue")),
            muscle_soreness: raw.hooper_soreness.and_then(|v| hooper_band(v, "hooper_soreness")),
            subjective_stress: raw.hooper_stress.and_then(|v| hooper_band(v, "hooper_stress")),
            subjective_sleep: sleep_quality.map(|band| match band {
                HooperLevel::Low => SleepQuality::Good,
                HooperLevel::Medium => SleepQuality::Medium,
                HooperLevel::High => SleepQuality::Poor,
            }),
            sleep_metric,
            hrv_trend: raw.hrv_z_score.and_then(map_hrv_z_score),
            fatigue_3day: raw
                .hooper_fatigue_3day
                .and_then(|v| hooper_band(v, "hooper_fatigue_3day")),
            ..Default::default()
        };

        let causal = CausalInputs {
            training_load: parse_label::<TrainingLoad>(raw.training_load.as_deref()),
            cumulative_fatigue_14day_state: parse_label::<CumulativeFatigue>(
                raw.cumulative_fatigue_14day.as_deref(),
            ),
            subjective_sleep_state: sleep_quality.map(|band| match band {
                HooperLevel::Low => SleepCategory::Good,
                HooperLevel::Medium => SleepCategory::Medium,
                HooperLevel::High => SleepCategory::Poor,
            }),
            stress_decay_factor: raw
                .days_since_stressor
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| stress_decay_factor(d, self.stress_half_life_days)),
            menstrual_cycle: raw.menstrual_cycle,
        };

        (evidence, causal)
    }
}

/// Sleep duration bands: ≥8h excellent, ≥7h good, ≥6h medium, else poor
pub fn map_sleep_hours(hours: f64) -> Option<SleepPerformance> {
    if !hours.is_finite() || !(0.0..=24.0).contains(&hours) {
        warn!(hours, "sleep hours out of range; dropping");
        return None;
    }
    Some(if hours >= 8.0 {
        SleepPerformance::Excellent
    } else if hours >= 7.0 {
        SleepPerformance::Good
    } else if hours >= 6.0 {
        SleepPerformance::Medium
    } else {
        SleepPerformance::Poor
    })
}

pub fn map_apple_sleep_score(score: f64) -> Option<AppleSleepScore> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        warn!(score, "apple sleep score out of range; dropping");
        return None;
    }
    Some(if score >= 85.0 {
        AppleSleepScore::Excellent
    } else if score >= 70.0 {
        AppleSleepScore::Good
    } else if score >= 50.0 {
        AppleSleepScore::Fair
    } else {
        AppleSleepScore::Poor
    })
}

pub fn map_hrv_z_score(z: f64) -> Option<HrvTrend> {
    if !z.is_finite() {
        warn!("non-finite HRV z-score; dropping");
        return None;
    }
    Some(if z >= 0.5 {
        HrvTrend::Rising
    } else if z > -0.5 {
        HrvTrend::Stable
    } else if z > -1.5 {
        HrvTrend::SlightDecline
    } else {
        HrvTrend::SignificantDecline
    })
}

/// 1-2 low, 3-4 medium, 5-7 high
fn hooper_band(value: f64, item: &'static str) -> Option<HooperLevel> {
    if !value.is_finite() || !HOOPER_RANGE.contains(&value) {
        warn!(item, value, "hooper rating outside 1-7; dropping");
        return None;
    }
    let rating = value.round();
    Some(if rating <= 2.0 {
        HooperLevel::Low
    } else if rating <= 4.0 {
        HooperLevel::Medium
    } else {
        HooperLevel::High
    })
}

fn parse_label<T>(label: Option<&str>) -> Option<T>
where
    T: std::str::FromStr<Err = String>,
{
    let label = label?;
    match label.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("{}; treating as absent", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sleep_hour_bands() {
        assert_eq!(map_sleep_hours(8.0), Some(SleepPerformance::Excellent));
        assert_eq!(map_sleep_hours(7.5), Some(SleepPerformance::Good));
        assert_eq!(map_sleep_hours(6.0), Some(SleepPerformance::Medium));
        assert_eq!(map_sleep_hours(4.2), Some(SleepPerformance::Poor));
        assert_eq!(map_sleep_hours(-1.0), None);
        assert_eq!(map_sleep_hours(f64::NAN), None);
    }

    #[test]
    fn test_hrv_bands() {
        assert_eq!(map_hrv_z_score(0.5), Some(HrvTrend::Rising));
        assert_eq!(map_hrv_z_score(-0.4), Some(HrvTrend::Stable));
        assert_eq!(map_hrv_z_score(-0.5), Some(HrvTrend::SlightDecline));
        assert_eq!(map_hrv_z_score(-1.5), Some(HrvTrend::SignificantDecline));
    }

    #[test]
    fn test_apple_score_bands() {
        assert_eq!(map_apple_sleep_score(90.0), Some(AppleSleepScore::Excellent));
        assert_eq!(map_apple_sleep_score(70.0), Some(AppleSleepScore::Good));
        assert_eq!(map_apple_sleep_score(55.0), Some(AppleSleepScore::Fair));
        assert_eq!(map_apple_sleep_score(10.0), Some(AppleSleepScore::Poor));
        assert_eq!(map_apple_sleep_score(120.0), None);
    }

    #[test]
    fn test_hooper_bands() {
        assert_eq!(hooper_band(1.0, "t"), Some(HooperLevel::Low));
        assert_eq!(hooper_band(2.0, "t"), Some(HooperLevel::Low));
        assert_eq!(hooper_band(4.0, "t"), Some(HooperLevel::Medium));
        assert_eq!(hooper_band(5.0, "t"), Some(HooperLevel::High));
        assert_eq!(hooper_band(7.0, "t"), Some(HooperLevel::High));
        assert_eq!(hooper_band(0.0, "t"), None);
        assert_eq!(hooper_band(8.0, "t"), None);
    }

    #[test]
    fn test_map_full_day() {
        let raw: RawMeasurements = serde_json::from_str(
            r#"{
                "sleep_hours": 5.5,
                "apple_sleep_score": 88,
                "hrv_z_score": -1.0,
                "hooper_fatigue": 6,
                "hooper_soreness": 2,
                "hooper_stress": 3,
                "hooper_sleep": 5,
                "training_load": "极高",
                "cumulative_fatigue_14day": "high",
                "days_since_stressor": 3.0
            }"#,
        )
        .unwrap();

        let (evidence, causal) = EvidenceMapper::default().map(&raw);
        assert_eq!(
            evidence.sleep_metric,
            Some(SleepMetric::SleepPerformance(SleepPerformance::Poor))
        );
        assert_eq!(evidence.subjective_fatigue, Some(HooperLevel::High));
        assert_eq!(evidence.muscle_soreness, Some(HooperLevel::Low));
        assert_eq!(evidence.subjective_stress, Some(HooperLevel::Medium));
        assert_eq!(evidence.subjective_sleep, Some(SleepQuality::Poor));
        assert_eq!(evidence.hrv_trend, Some(HrvTrend::SlightDecline));

        assert_eq!(causal.training_load, Some(TrainingLoad::VeryHigh));
        assert_eq!(causal.cumulative_fatigue_14day_state, Some(CumulativeFatigue::High));
        assert_eq!(causal.subjective_sleep_state, Some(SleepCategory::Poor));
        assert!((causal.stress_decay_factor.unwrap() - 0.5).abs() < 1e-12);

        let (evidence, _) = EvidenceMapper::new(true).map(&raw);
        assert_eq!(
            evidence.sleep_metric,
            Some(SleepMetric::AppleSleepScore(AppleSleepScore::Excellent))
        );
    }

    #[test]
    fn test_bad_values_become_absent() {
        let raw = RawMeasurements {
            hooper_fatigue: Some(9.0),
            training_load: Some("extreme".to_string()),
            sleep_hours: Some(f64::INFINITY),
            days_since_stressor: Some(-2.0),
            ..Default::default()
        };
        let (evidence, causal) = EvidenceMapper::default().map(&raw);
        assert!(evidence.is_empty());
        assert_eq!(causal, CausalInputs::default());
    }

    #[test]
    fn test_unknown_raw_field_rejected() {
        let parsed: Result<RawMeasurements, _> =
            serde_json::from_str(r#"{ "sleep_hours": 7, "resting_hr": 52 }"#);
        assert!(parsed.is_err());
    }
}
