//! Error types for Synheart Readiness

use crate::evidence::EvidenceType;
use crate::types::State;
use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while processing days
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid model configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Training history error: {0}")]
    History(#[from] HistoryError),

    #[error("Day {date} is not after the last processed day {last}")]
    OutOfOrderDay { date: NaiveDate, last: NaiveDate },

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Malformed or incomplete model tables, detected at load time
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing entry for state {state}")]
    MissingState { state: State },

    #[error("missing emission table for evidence type {0}")]
    MissingEvidenceTable(EvidenceType),

    #[error("emission table {evidence} has no levels")]
    EmptyEvidenceTable { evidence: EvidenceType },

    #[error("{table}: value for {state} must be finite and non-negative, got {value}")]
    InvalidValue {
        table: String,
        state: State,
        value: f64,
    },

    #[error("transition row for {state} sums to {sum}, expected 1")]
    NotStochastic { state: State, sum: f64 },

    #[error("readiness weights must not increase along the recovery continuum ({higher} < {lower})")]
    NonMonotonicWeights { higher: State, lower: State },

    #[error("parameter {name} must be within [{min}, {max}], got {value}")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
}

/// Training history log violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("day {day} is not after the last logged day {last}")]
    OutOfOrder { day: u32, last: u32 },
}
