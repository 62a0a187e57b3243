//! Status Filters
//!
//! Rules that demote notes already on track for CRH (or CRNH) when a
//! secondary signal disqualifies them: tag outliers, incorrect-tag
//! consensus, low rater diligence, extreme factors, firm rejection of low
//! intercepts, and insufficient explanation tags.
//!
//! All filters except `FilterLargeFactor` restrict themselves to notes not
//! currently CRNH: CRNH has stronger downstream effects and must not be
//! overwritten by a demotion to NMR.

use crate::scoring::engine::ScoringError;
use crate::scoring::note_stats::{
    CurrentLabels, ExtraColumns, ExtrasFrame, NoteStats, NoteStatsFrame, SignalColumn,
    StatusUpdates,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::rules::{RuleOutput, ScoringRule};
use crate::scoring::status::Status;
use crate::scoring::tags::{
    top_two_tags, NotHelpfulTag, RatingTag, HELPFUL_TAGS_TIEBREAK_ORDER,
    NOT_HELPFUL_TAGS_TIEBREAK_ORDER, NOT_HELPFUL_TAGS_TSV_ORDER,
};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref HELPFUL_TIEBREAK_RATING_TAGS: Vec<RatingTag> = HELPFUL_TAGS_TIEBREAK_ORDER
        .iter()
        .copied()
        .map(RatingTag::Helpful)
        .collect();
    static ref NOT_HELPFUL_TIEBREAK_RATING_TAGS: Vec<RatingTag> = NOT_HELPFUL_TAGS_TIEBREAK_ORDER
        .iter()
        .copied()
        .map(RatingTag::NotHelpful)
        .collect();
}

// =============================================================================
// TAG OUTLIER FILTER
// =============================================================================

/// Demotes notes with outlier levels of any single not-helpful tag.
///
/// A note is impacted by a tag when the rater-weight-adjusted total for
/// that tag exceeds `min_adjusted_total` and the adjusted ratio exceeds the
/// per-tag threshold (computed upstream as a percentile over CRH notes).
/// Tags are evaluated in TSV order, which fixes the order of the joined
/// `activeFilterTags` output.
pub struct FilterTagOutliers {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    tag_filter_thresholds: HashMap<NotHelpfulTag, f64>,
    min_adjusted_total: f64,
}

impl FilterTagOutliers {
    /// Adjusted-total floor shared by every tag.
    pub const DEFAULT_MIN_ADJUSTED_TOTAL: f64 = 2.5;

    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        tag_filter_thresholds: HashMap<NotHelpfulTag, f64>,
        min_adjusted_total: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            tag_filter_thresholds,
            min_adjusted_total,
        }
    }

    /// Outlier filtering is disabled for this tag.
    fn tag_disabled(tag: NotHelpfulTag) -> bool {
        tag == NotHelpfulTag::HardToUnderstand
    }
}

impl ScoringRule for FilterTagOutliers {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::TagAggregates]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let candidates: Vec<&NoteStats> = note_stats
            .rows()
            .iter()
            .filter(|row| {
                current_labels.labeled_other_than(row.note_id, Status::CurrentlyRatedNotHelpful)
            })
            .collect();
        tracing::info!(
            candidates = candidates.len(),
            "candidate notes prior to tag filtering"
        );

        let mut updates = StatusUpdates::new();
        let mut extras = ExtrasFrame::new();
        let mut pair_count = 0usize;
        for row in candidates {
            let mut active_tags: Vec<&'static str> = Vec::new();
            for tag in NOT_HELPFUL_TAGS_TSV_ORDER {
                if Self::tag_disabled(tag) {
                    continue;
                }
                let threshold = *self.tag_filter_thresholds.get(&tag).ok_or_else(|| {
                    ScoringError::SchemaMismatch {
                        rule: self.rule_id,
                        detail: format!("no tag filter threshold configured for {tag}"),
                    }
                })?;
                let adjusted_high =
                    matches!(row.adjusted(tag), Some(v) if v > self.min_adjusted_total);
                let ratio_high = matches!(row.adjusted_ratio(tag), Some(v) if v > threshold);
                if adjusted_high && ratio_high {
                    active_tags.push(tag.key());
                }
            }
            if active_tags.is_empty() {
                continue;
            }
            pair_count += active_tags.len();
            updates.push(row.note_id, self.status);
            extras.push(
                row.note_id,
                ExtraColumns {
                    active_filter_tags: Some(active_tags.join(",")),
                    ..ExtraColumns::default()
                },
            );
        }
        tracing::info!(
            note_tag_pairs = pair_count,
            impacted = updates.len(),
            "tag filter results"
        );
        Ok((updates, Some(extras)))
    }
}

// =============================================================================
// INCORRECT-TAG FILTER
// =============================================================================

/// Demotes notes with a strong "incorrect" consensus from raters with
/// similar factors.
pub struct FilterIncorrect {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    tag_threshold: i64,
    vote_threshold: i64,
    weighted_total_votes: f64,
}

impl FilterIncorrect {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        tag_threshold: i64,
        vote_threshold: i64,
        weighted_total_votes: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            tag_threshold,
            vote_threshold,
            weighted_total_votes,
        }
    }
}

impl ScoringRule for FilterIncorrect {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::IncorrectAggregates]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            if !current_labels.labeled_other_than(row.note_id, Status::CurrentlyRatedNotHelpful) {
                continue;
            }
            let tags = matches!(
                row.not_helpful_incorrect_interval,
                Some(v) if v >= self.tag_threshold as f64
            );
            let voters = matches!(
                row.num_voters_interval,
                Some(v) if v >= self.vote_threshold as f64
            );
            let weight = matches!(
                row.tf_idf_incorrect_interval,
                Some(v) if v >= self.weighted_total_votes
            );
            if tags && voters && weight {
                updates.push(row.note_id, self.status);
            }
        }
        tracing::info!(impacted = updates.len(), "incorrect filter results");
        Ok((updates, None))
    }
}

// =============================================================================
// LOW-DILIGENCE FILTER
// =============================================================================

/// Demotes notes with a high low-diligence model intercept.
pub struct FilterLowDiligence {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    intercept_threshold: f64,
}

impl FilterLowDiligence {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        intercept_threshold: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            intercept_threshold,
        }
    }
}

impl ScoringRule for FilterLowDiligence {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::LowDiligenceIntercept]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            if !current_labels.labeled_other_than(row.note_id, Status::CurrentlyRatedNotHelpful) {
                continue;
            }
            if matches!(
                row.low_diligence_note_intercept,
                Some(v) if v > self.intercept_threshold
            ) {
                updates.push(row.note_id, self.status);
            }
        }
        tracing::info!(impacted = updates.len(), "low diligence filter results");
        Ok((updates, None))
    }
}

// =============================================================================
// LARGE-FACTOR FILTER
// =============================================================================

/// Demotes currently-CRH notes whose primary factor magnitude is extreme.
pub struct FilterLargeFactor {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    factor_threshold: f64,
}

impl FilterLargeFactor {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        factor_threshold: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            factor_threshold,
        }
    }
}

impl ScoringRule for FilterLargeFactor {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::InternalFactor]
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
            if matches!(
                row.internal_note_factor1,
                Some(v) if v.abs() > self.factor_threshold
            ) {
                updates.push(row.note_id, self.status);
            }
        }
        tracing::info!(impacted = updates.len(), "large factor filter results");
        Ok((updates, None))
    }
}

// =============================================================================
// FIRM REJECTION
// =============================================================================

/// Marks notes with an intercept below the firm-reject threshold so that
/// later rules cannot promote them to CRH. The assigned status is internal
/// and is rewritten to NMR before leaving the engine.
pub struct RejectLowIntercept {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    firm_reject_threshold: f64,
}

impl RejectLowIntercept {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        firm_reject_threshold: f64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            firm_reject_threshold,
        }
    }
}

impl ScoringRule for RejectLowIntercept {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::InternalIntercept]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        // Notes already on track for CRNH keep that stronger status.
        let mut updates = StatusUpdates::new();
        for row in note_stats.rows() {
            if !current_labels.labeled_other_than(row.note_id, Status::CurrentlyRatedNotHelpful) {
                continue;
            }
            if matches!(
                row.internal_note_intercept,
                Some(v) if v < self.firm_reject_threshold
            ) {
                updates.push(row.note_id, self.status);
            }
        }
        Ok((updates, None))
    }
}

// =============================================================================
// INSUFFICIENT EXPLANATION
// =============================================================================

/// Configuration for explanation-tag gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationThresholds {
    /// Minimum occurrences before a tag can be assigned to a note.
    pub min_ratings_to_get_tag: i64,
    /// Minimum assigned tags before a note may keep CRH/CRNH status.
    pub min_tags_needed_for_status: usize,
}

impl Default for ExplanationThresholds {
    fn default() -> Self {
        Self {
            min_ratings_to_get_tag: 1,
            min_tags_needed_for_status: 1,
        }
    }
}

/// Selects the top two explanation tags for CRH/CRNH notes and demotes
/// notes without enough assigned tags to justify their status.
pub struct InsufficientExplanation {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    thresholds: ExplanationThresholds,
    /// When supplied, tag selection runs over this set for every note
    /// instead of the status-specific tie-break vocabularies.
    tags_considered: Option<Vec<RatingTag>>,
}

impl InsufficientExplanation {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        thresholds: ExplanationThresholds,
        tags_considered: Option<Vec<RatingTag>>,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            thresholds,
            tags_considered,
        }
    }

    fn count_of(row: &NoteStats) -> impl Fn(RatingTag) -> f64 + '_ {
        |tag| match tag {
            RatingTag::Helpful(t) => row.helpful_count(t).unwrap_or(f64::NAN),
            RatingTag::NotHelpful(t) => row.not_helpful_count(t).unwrap_or(f64::NAN),
        }
    }

    /// Top-two tag selection for one note under this rule's configuration.
    fn select_tags(
        &self,
        row: &NoteStats,
        label: Status,
    ) -> (Option<RatingTag>, Option<RatingTag>) {
        if let Some(tags) = &self.tags_considered {
            return top_two_tags(
                tags,
                Self::count_of(row),
                self.thresholds.min_ratings_to_get_tag as f64,
            );
        }
        match label {
            // TODO: confirm whether passing min_tags_needed_for_status as the
            // ratings threshold on the helpful branch is intentional; the
            // not-helpful branch passes min_ratings_to_get_tag here.
            Status::CurrentlyRatedHelpful => top_two_tags(
                &HELPFUL_TIEBREAK_RATING_TAGS,
                Self::count_of(row),
                self.thresholds.min_tags_needed_for_status as f64,
            ),
            Status::CurrentlyRatedNotHelpful => top_two_tags(
                &NOT_HELPFUL_TIEBREAK_RATING_TAGS,
                Self::count_of(row),
                self.thresholds.min_ratings_to_get_tag as f64,
            ),
            _ => (None, None),
        }
    }
}

impl ScoringRule for InsufficientExplanation {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::TagCounts]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut candidates = 0usize;
        let mut updates = StatusUpdates::new();
        let mut extras = ExtrasFrame::new();
        for row in note_stats.rows() {
            let label = match current_labels.status(row.note_id) {
                Some(s @ Status::CurrentlyRatedHelpful)
                | Some(s @ Status::CurrentlyRatedNotHelpful) => s,
                _ => continue,
            };
            candidates += 1;
            let (first, second) = self.select_tags(row, label);
            let assigned = first.iter().count() + second.iter().count();
            if assigned >= self.thresholds.min_tags_needed_for_status {
                continue;
            }
            updates.push(row.note_id, self.status);
            extras.push(
                row.note_id,
                ExtraColumns {
                    first_tag: first.map(|t| t.key().to_string()),
                    second_tag: second.map(|t| t.key().to_string()),
                    ..ExtraColumns::default()
                },
            );
        }
        tracing::info!(
            candidates,
            impacted = updates.len(),
            "explanation filter results"
        );
        Ok((updates, Some(extras)))
    }
}
