//! Group and Topic Model Rules
//!
//! Per-group models may only *expand* coverage: they promote notes that
//! every stronger model left at NMR, and only under safeguards from the
//! core and expansion models. Topic models go the other way and retract
//! CRH status for notes that score poorly within their topic.

use crate::scoring::engine::ScoringError;
use crate::scoring::note_stats::{
    CurrentLabels, NoteStatsFrame, SignalColumn, StatusUpdates,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::rules::{blocked_by_core_or_expansion, RuleOutput, ScoringRule};
use crate::scoring::status::{NoteTopic, Status};
use std::collections::HashSet;

// =============================================================================
// GROUP MODEL
// =============================================================================

/// Promotes notes rated CRH by a single group model, subject to core and
/// expansion model safeguards.
///
/// Promotion requires all of:
/// - the note is not blocked by a firm reject / CRNH from core (or, when
///   core never scored it, expansion),
/// - the group model rated the note CRH and the note belongs to this
///   rule's modeling group,
/// - the note is currently NMR, so stronger models are never overridden
///   and never lose their decided-by attribution,
/// - the most confident of the core/expansion intercepts (core preferred)
///   lies inside the allowed band. A note with neither intercept is not
///   actionable.
pub struct ApplyGroupModelResult {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    group_number: i64,
    /// Maximum core intercept allowed for group-model promotion.
    core_crh_threshold: Option<f64>,
    /// Maximum expansion intercept allowed for group-model promotion.
    expansion_crh_threshold: Option<f64>,
    /// Minimum intercept on the most confident model.
    min_safeguard_threshold: f64,
}

impl ApplyGroupModelResult {
    pub const DEFAULT_MIN_SAFEGUARD_THRESHOLD: f64 = 0.3;

    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        group_number: i64,
        core_crh_threshold: Option<f64>,
        expansion_crh_threshold: Option<f64>,
        min_safeguard_threshold: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            group_number,
            core_crh_threshold,
            expansion_crh_threshold,
            min_safeguard_threshold,
        }
    }

    /// Tri-state safeguard check: `None` when the model has no intercept
    /// for the note, otherwise whether the intercept is inside the band.
    fn in_band(&self, intercept: Option<f64>, ceiling: Option<f64>) -> Option<bool> {
        intercept.map(|i| {
            i > self.min_safeguard_threshold && ceiling.map_or(true, |c| i < c)
        })
    }
}

impl ScoringRule for ApplyGroupModelResult {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![
            SignalColumn::CoreIntercept,
            SignalColumn::CoreStatus,
            SignalColumn::ExpansionIntercept,
            SignalColumn::ExpansionStatus,
            SignalColumn::GroupStatus,
            SignalColumn::ModelingGroup,
        ]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            if blocked_by_core_or_expansion(row) {
                continue;
            }
            let probationary = row.group_rating_status == Some(Status::CurrentlyRatedHelpful)
                && row.modeling_group == Some(self.group_number);
            if !probationary || !current_labels.labeled(row.note_id, Status::NeedsMoreRatings) {
                continue;
            }
            let core = self.in_band(row.core_note_intercept, self.core_crh_threshold);
            let expansion =
                self.in_band(row.expansion_note_intercept, self.expansion_crh_threshold);
            // Prefer the core verdict whenever a core intercept exists.
            let actionable = core.or(expansion).unwrap_or(false);
            if actionable {
                updates.push(row.note_id, Status::CurrentlyRatedHelpful);
            }
        }
        tracing::info!(
            group = self.group_number,
            impacted = updates.len(),
            "group model results"
        );
        Ok((updates, None))
    }
}

// =============================================================================
// TOPIC MODEL
// =============================================================================

/// Retracts CRH status for notes that a topic model confidently scores
/// below its intercept threshold or outside its factor band.
pub struct ApplyTopicModelResult {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    topic: NoteTopic,
    topic_nmr_intercept_threshold: f64,
    topic_nmr_factor_threshold: f64,
}

impl ApplyTopicModelResult {
    pub const DEFAULT_NMR_INTERCEPT_THRESHOLD: f64 = 0.24;
    pub const DEFAULT_NMR_FACTOR_THRESHOLD: f64 = 0.51;

    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        topic: NoteTopic,
        topic_nmr_intercept_threshold: f64,
        topic_nmr_factor_threshold: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            topic,
            topic_nmr_intercept_threshold,
            topic_nmr_factor_threshold,
        }
    }
}

impl ScoringRule for ApplyTopicModelResult {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::TopicSignals]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            if !current_labels.labeled(row.note_id, Status::CurrentlyRatedHelpful) {
                continue;
            }
            if row.note_topic != Some(self.topic) || row.topic_note_confident != Some(true) {
                continue;
            }
            let low_intercept = matches!(
                row.topic_note_intercept,
                Some(v) if v < self.topic_nmr_intercept_threshold
            );
            let large_factor = matches!(
                row.topic_note_factor1,
                Some(v) if v.abs() > self.topic_nmr_factor_threshold
            );
            if low_intercept || large_factor {
                updates.push(row.note_id, Status::NeedsMoreRatings);
            }
        }
        tracing::info!(
            topic = %self.topic,
            impacted = updates.len(),
            "topic model results"
        );
        Ok((updates, None))
    }
}
