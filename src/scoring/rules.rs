//! Scoring Rule Contract and Core Rules
//!
//! A scoring rule inspects the per-note statistics together with the
//! labels assigned by prior rules and returns (1) the set of notes it
//! wants to (re)label and (2) optionally, extra output columns for those
//! notes. Rules never mutate shared state; the engine owns the label and
//! column accumulators and applies rule outputs in list order.

use crate::scoring::engine::ScoringError;
use crate::scoring::note_stats::{
    CurrentLabels, ExtrasFrame, IntColumn, NoteStats, NoteStatsFrame, SignalColumn, StatusColumn,
    StatusUpdates,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::status::{Classification, Status};
use rayon::prelude::*;
use std::collections::HashSet;

/// Output of one rule invocation.
pub type RuleOutput = (StatusUpdates, Option<ExtrasFrame>);

/// Contract every scoring rule implements.
///
/// `score_notes` must list each note at most once in its updates, and when
/// extras are returned their note-id set must equal the update set (the
/// stable-CRH hysteresis rule is the single sanctioned exception, enforced
/// by the engine).
pub trait ScoringRule: Send + Sync {
    /// Identity used for dependency tracking and attribution.
    fn rule_id(&self) -> RuleId;

    /// Rules which must have run strictly earlier.
    fn dependencies(&self) -> &HashSet<RuleId>;

    /// Signal column families this rule reads. The engine refuses to run
    /// the rule against a frame that never declared them.
    fn required_columns(&self) -> Vec<SignalColumn> {
        Vec::new()
    }

    /// Compute status updates and extra columns for this rule.
    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError>;

    /// Display identifier, e.g. `"GeneralCRH (v1.0)"`.
    fn name(&self) -> String {
        self.rule_id().display_name()
    }

    /// Fail loudly if any declared dependency has not run yet.
    fn check_dependencies(&self, prior_rules: &HashSet<RuleId>) -> Result<(), ScoringError> {
        let mut missing: Vec<RuleId> = self
            .dependencies()
            .iter()
            .filter(|d| !prior_rules.contains(d))
            .copied()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ScoringError::DependencyViolation {
            rule: self.rule_id(),
            missing,
        })
    }
}

// =============================================================================
// DEFAULT RULE
// =============================================================================

/// Initializes every note to a default status. Must run first so that
/// every note has a label and an attribution entry.
pub struct DefaultRule {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
}

impl DefaultRule {
    pub fn new(rule_id: RuleId, dependencies: &[RuleId], status: Status) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
        }
    }
}

impl ScoringRule for DefaultRule {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        _current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            updates.push(row.note_id, self.status);
        }
        Ok((updates, None))
    }
}

// =============================================================================
// PREDICATE RULE
// =============================================================================

/// Wraps a boolean predicate over the note statistics and assigns a fixed
/// status to every matching note.
pub struct RuleFromFunction {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    predicate: Box<dyn Fn(&NoteStats) -> bool + Send + Sync>,
    /// When set, additionally require that the note does not claim the post
    /// is "not misleading". Notes with a missing classification (deleted
    /// notes) pass the check.
    only_misleading: bool,
    required_columns: Vec<SignalColumn>,
}

impl RuleFromFunction {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        required_columns: &[SignalColumn],
        only_misleading: bool,
        predicate: impl Fn(&NoteStats) -> bool + Send + Sync + 'static,
    ) -> Self {
        let mut required: Vec<SignalColumn> = required_columns.to_vec();
        if only_misleading && !required.contains(&SignalColumn::Classification) {
            required.push(SignalColumn::Classification);
        }
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            predicate: Box::new(predicate),
            only_misleading,
            required_columns: required,
        }
    }
}

impl ScoringRule for RuleFromFunction {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        self.required_columns.clone()
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        _current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        // Predicates are pure and row-independent; evaluate in parallel and
        // collect in frame order so output ordering stays deterministic.
        let mask: Vec<bool> = note_stats
            .rows()
            .par_iter()
            .map(|row| {
                (self.predicate)(row)
                    && (!self.only_misleading
                        || row.classification != Some(Classification::NotMisleading))
            })
            .collect();

        let mut updates = StatusUpdates::new();
        for (row, selected) in note_stats.rows().iter().zip(mask) {
            if selected {
                updates.push(row.note_id, self.status);
            }
        }
        Ok((updates, None))
    }
}

// =============================================================================
// NM-TO-CRNH RULE
// =============================================================================

/// Sets low-scoring notes on posts the author called "not misleading" to
/// the configured status. Requires classification equality, so deleted
/// notes (missing classification) are excluded.
pub struct NMtoCRNH {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    crnh_threshold_nm_intercept: f64,
}

impl NMtoCRNH {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        crnh_threshold_nm_intercept: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            crnh_threshold_nm_intercept,
        }
    }
}

impl ScoringRule for NMtoCRNH {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::InternalIntercept, SignalColumn::Classification]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        _current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            let low = matches!(
                row.internal_note_intercept,
                Some(i) if i < self.crnh_threshold_nm_intercept
            );
            if low && row.classification == Some(Classification::NotMisleading) {
                updates.push(row.note_id, self.status);
            }
        }
        Ok((updates, None))
    }
}

// =============================================================================
// MODEL RESULT PROPAGATION
// =============================================================================

/// True when the note is barred from CRH promotion by a firm reject or
/// CRNH outcome in the core model, falling back to the expansion model
/// when the core model never scored the note.
pub(crate) fn blocked_by_core_or_expansion(row: &NoteStats) -> bool {
    let rejects = |status: Option<Status>| {
        matches!(
            status,
            Some(Status::FirmReject) | Some(Status::CurrentlyRatedNotHelpful)
        )
    };
    rejects(row.core_rating_status)
        || (row.core_rating_status.is_none() && rejects(row.expansion_rating_status))
}

/// Propagates a per-model status column into the shared label set.
///
/// The internal `FirmReject` status is rewritten to `NeedsMoreRatings` on
/// the way out: propagation is the boundary where per-model statuses
/// become candidate final statuses.
pub struct ApplyModelResult {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    source_column: StatusColumn,
    check_firm_reject: bool,
    filter_column_pairs: Vec<(IntColumn, i64)>,
}

impl ApplyModelResult {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        source_column: StatusColumn,
        check_firm_reject: bool,
        filter_column_pairs: Vec<(IntColumn, i64)>,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            source_column,
            check_firm_reject,
            filter_column_pairs,
        }
    }
}

impl ScoringRule for ApplyModelResult {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        let mut required = vec![self.source_column.required_column()];
        if self.check_firm_reject {
            required.push(SignalColumn::CoreStatus);
            required.push(SignalColumn::ExpansionStatus);
        }
        for (column, _) in &self.filter_column_pairs {
            required.push(column.required_column());
        }
        required.dedup();
        required
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        _current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        'rows: for row in note_stats.rows() {
            let source = self.source_column.get(row);
            // Prune notes whose CRH promotion is barred by a prior firm
            // reject in the core or expansion model.
            if self.check_firm_reject
                && source == Some(Status::CurrentlyRatedHelpful)
                && blocked_by_core_or_expansion(row)
            {
                continue;
            }
            for (column, value) in &self.filter_column_pairs {
                if column.get(row) != Some(*value) {
                    continue 'rows;
                }
            }
            if let Some(status) = source {
                let status = status.exportable();
                debug_assert!(status.is_exportable(), "status must be CRH, CRNH or NMR");
                updates.push(row.note_id, status);
            }
        }
        Ok((updates, None))
    }
}
