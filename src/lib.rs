//! Synheart Readiness - On-device estimator for daily athlete readiness
//!
//! Readiness tracks a probability distribution over six recovery states and
//! advances it once per day through a deterministic pipeline: causal
//! transition → evidence fusion → override rules → score and diagnosis.
//!
//! ## Modules
//!
//! - **Daily Pipeline**: Process daily records into readiness reports
//! - **Personalization**: Learn per-user emission tables from history

pub mod context;
pub mod cpt;
pub mod day;
pub mod error;
pub mod evidence;
pub mod history;
pub mod mapper;
pub mod personalization;
pub mod pipeline;
pub mod report;
pub mod score;
pub mod transition;
pub mod types;
pub mod update;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use context::CausalInputs;
pub use cpt::CptStore;
pub use day::{DayCycle, FinalizedDay};
pub use error::{ComputeError, ConfigurationError, HistoryError};
pub use evidence::EvidenceSet;
pub use history::TrainingHistoryLog;
pub use pipeline::{readiness_daily, DailyRecord, ReadinessProcessor};
pub use types::{Distribution, State, StateVector};

// Personalization exports
pub use personalization::{learn_personalized_cpt, PersonalizedCpt, ShrinkageParams};

/// Readiness version embedded in all reports
pub const READINESS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "synheart-readiness";
