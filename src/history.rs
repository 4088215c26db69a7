//! Training load history
//!
//! An append-only, chronologically ordered log of daily training loads. The
//! update stage inspects only the most recent 4 and 8 entries to detect load
//! accumulation patterns that push athletes toward non-functional overreaching.

use crate::context::TrainingLoad;
use crate::error::HistoryError;
use serde::{Deserialize, Serialize};

/// Entries inspected by the short accumulation rule
pub const SHORT_WINDOW: usize = 4;

/// Entries inspected by the long accumulation rule
pub const LONG_WINDOW: usize = 8;

/// High-intensity days needed within the short window
const SHORT_WINDOW_HIGH_DAYS: usize = 3;

/// Medium days needed within the short window
const SHORT_WINDOW_MEDIUM_DAYS: usize = 1;

/// High-intensity days needed within the long window
const LONG_WINDOW_HIGH_DAYS: usize = 6;

/// One logged training day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingDay {
    pub day: u32,
    pub load: TrainingLoad,
}

/// Result of evaluating the accumulation rules
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccumulationCheck {
    pub four_day_fired: bool,
    /// Fraction to move into NFOR for the 4-day rule (0 when not fired)
    pub four_day_transfer: f64,
    pub eight_day_fired: bool,
    /// Fraction to move into NFOR for the 8-day rule (0 when not fired)
    pub eight_day_transfer: f64,
}

/// Per-user training load log
///
/// Deserialization enforces the same strictly increasing day numbers as
/// `add_training_day`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTrainingHistory")]
pub struct TrainingHistoryLog {
    days: Vec<TrainingDay>,
}

/// Unchecked wire form of `TrainingHistoryLog`
#[derive(Deserialize)]
struct RawTrainingHistory {
    #[serde(default)]
    days: Vec<TrainingDay>,
}

impl TryFrom<RawTrainingHistory> for TrainingHistoryLog {
    type Error = HistoryError;

    fn try_from(raw: RawTrainingHistory) -> Result<Self, Self::Error> {
        let mut log = TrainingHistoryLog::new();
        for entry in raw.days {
            log.add_training_day(entry.load, Some(entry.day))?;
        }
        Ok(log)
    }
}

impl TrainingHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a day. Without an explicit day number the entry follows the
    /// last logged day. Explicit day numbers must keep the log chronological.
    pub fn add_training_day(
        &mut self,
        load: TrainingLoad,
        day: Option<u32>,
    ) -> Result<u32, HistoryError> {
        let last = self.days.last().map(|d| d.day);
        let day = match (day, last) {
            (Some(day), Some(last)) if day <= last => {
                return Err(HistoryError::OutOfOrder { day, last });
            }
            (Some(day), _) => day,
            (None, Some(last)) => last + 1,
            (None, None) => 1,
        };
        self.days.push(TrainingDay { day, load });
        Ok(day)
    }

    pub fn clear_training_history(&mut self) {
        self.days.clear();
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn days(&self) -> &[TrainingDay] {
        &self.days
    }

    fn recent(&self, window: usize) -> Option<&[TrainingDay]> {
        if self.days.len() < window {
            return None;
        }
        Some(&self.days[self.days.len() - window..])
    }

    /// Evaluate the 4-day and 8-day accumulation rules.
    ///
    /// Only the most recent entries are inspected; a log shorter than a
    /// window never fires that window's rule.
    pub fn check_nfor_accumulation_rules(
        &self,
        four_day_shift: f64,
        eight_day_shift: f64,
    ) -> AccumulationCheck {
        let mut check = AccumulationCheck::default();

        if let Some(window) = self.recent(SHORT_WINDOW) {
            let high = window.iter().filter(|d| d.load.is_high_intensity()).count();
            let medium = window
                .iter()
                .filter(|d| d.load == TrainingLoad::Medium)
                .count();
            if high >= SHORT_WINDOW_HIGH_DAYS && medium >= SHORT_WINDOW_MEDIUM_DAYS {
                check.four_day_fired = true;
                check.four_day_transfer = four_day_shift;
            }
        }

        if let Some(window) = self.recent(LONG_WINDOW) {
            let high = window.iter().filter(|d| d.load.is_high_intensity()).count();
            if high >= LONG_WINDOW_HIGH_DAYS {
                check.eight_day_fired = true;
                check.eight_day_transfer = eight_day_shift;
            }
        }

        check
    }
}
