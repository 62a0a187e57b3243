//! Note Scoring Engine
//!
//! Deterministic, dependency-ordered rule engine assigning a final rating
//! status to every note, given pre-computed model signals and per-tag
//! aggregates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      apply_scoring_rules                        │
//! │  (drives rules in list order, owns all mutable accumulators)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        ▼                       ▼                       ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │ NoteStats   │        │ Rule list   │        │ LockedStatus│
//! │ Frame       │        │ (catalog)   │        │ (optional)  │
//! └─────────────┘        └─────────────┘        └─────────────┘
//!                                │
//!                                ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ thresholds  │───▶│ filters     │───▶│ stabilizers │
//! │ (coarse     │    │ (tag/factor │    │ (hysteresis,│
//! │  CRH/CRNH)  │    │  outliers)  │    │  drift lock)│
//! └─────────────┘    └─────────────┘    └──────┬──────┘
//!                                              │
//!                                              ▼
//!                                       ┌─────────────┐
//!                                       │ ScoredNotes │
//!                                       │ (status +   │
//!                                       │ attribution)│
//!                                       └─────────────┘
//! ```
//!
//! # Determinism Guarantees
//!
//! - **Ordering**: rules run strictly in list order; for any note touched
//!   by several rules, the last one wins and is its decided-by rule
//! - **Iteration**: all row iteration follows input frame order
//! - **Time**: the scoring epoch is injected; the engine never reads the
//!   system clock
//! - **Parallelism**: only row-independent predicate evaluation runs in
//!   parallel, collected back in frame order

pub mod catalog;
pub mod engine;
pub mod filters;
pub mod model_rules;
pub mod note_stats;
pub mod rule_id;
pub mod rules;
pub mod stabilization;
pub mod status;
pub mod synthetic;
pub mod tags;

#[cfg(test)]
mod filters_tests;
#[cfg(test)]
mod tags_tests;

// Re-exports for convenience
pub use catalog::{meta_scoring_rules, mf_scorer_rules, GroupModelConfig, ScoringConfig};
pub use engine::{
    apply_scoring_rules, ExportColumns, ScoredNote, ScoredNotes, ScoringError,
};
pub use note_stats::{
    CurrentLabels, ExtraColumns, ExtrasFrame, LockedStatusFrame, Millis, NoteId, NoteStats,
    NoteStatsFrame, SignalColumn, StatusColumn, StatusUpdates,
};
pub use rule_id::{RuleAndVersion, RuleId};
pub use rules::ScoringRule;
pub use status::{Classification, NoteTopic, Status};
