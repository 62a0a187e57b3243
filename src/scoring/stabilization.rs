//! Status Stabilization Rules
//!
//! Rules that damp status churn between scoring runs: the stable-CRH time
//! gate (a note must hold CRH for a minimum period before the public label
//! flips), CRH inertia (small intercept dips do not revoke an existing
//! CRH), and the drift guard (historical committed labels win over
//! scoring drift).
//!
//! Time never comes from the system clock inside the engine: the scoring
//! epoch is injected by the caller, which is what keeps reruns over the
//! same inputs byte-identical.

use crate::scoring::engine::ScoringError;
use crate::scoring::note_stats::{
    CurrentLabels, ExtraColumns, ExtrasFrame, LockedStatusFrame, Millis, NoteStatsFrame,
    SignalColumn, StatusUpdates, MILLIS_PER_MINUTE,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::rules::{RuleOutput, ScoringRule};
use crate::scoring::status::{Classification, Status};
use std::collections::HashSet;

// =============================================================================
// STABLE-CRH TIME GATE
// =============================================================================

/// Holds back CRH status until a note has been stably CRH for a minimum
/// number of minutes, tracked through an external bookkeeping timestamp.
///
/// For each note whose previous-run label was not CRH (notes already
/// stably CRH bypass the gate entirely):
///
/// - newly CRH with no live timestamp: report NMR, start the clock at the
///   scoring epoch;
/// - CRH with a live timestamp that has matured: report CRH, clear the
///   timestamp to `-1`;
/// - CRH with a live timestamp still maturing: report NMR, keep the
///   timestamp;
/// - no longer CRH with a live timestamp: status unchanged, clear the
///   timestamp to `-1`.
///
/// Only actual CRH→NMR flips are emitted as status updates; timestamp
/// bookkeeping is emitted for every note considered, which makes this the
/// one rule whose extras legitimately cover more notes than its updates.
pub struct NmrDueToMinStableCrhTime {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    required_stable_crh_minutes: i64,
    /// Scoring epoch in epoch milliseconds, injected by the caller.
    epoch_millis: Millis,
}

impl NmrDueToMinStableCrhTime {
    pub const DEFAULT_REQUIRED_STABLE_CRH_MINUTES: i64 = 30;

    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        required_stable_crh_minutes: i64,
        epoch_millis: Millis,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            required_stable_crh_minutes,
            epoch_millis,
        }
    }
}

impl ScoringRule for NmrDueToMinStableCrhTime {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![SignalColumn::CurrentLabel, SignalColumn::StableCrhTimestamp]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let threshold_millis = self.required_stable_crh_minutes * MILLIS_PER_MINUTE;
        let mut updates = StatusUpdates::new();
        let mut extras = ExtrasFrame::new();
        for row in note_stats.rows() {
            // Notes CRHed before the current run bypass the gate.
            if row.current_label == Some(Status::CurrentlyRatedHelpful) {
                continue;
            }
            let status_now = match current_labels.status(row.note_id) {
                Some(s) => s,
                None => continue,
            };
            let stamp = row.timestamp_millis_of_nmr_due_to_min_stable_crh_time;
            let live_stamp = matches!(stamp, Some(t) if t > 0);
            let newly_crh = status_now == Status::CurrentlyRatedHelpful;
            if !newly_crh && !live_stamp {
                continue;
            }

            let mut updated_stamp = stamp;
            if newly_crh {
                match stamp {
                    Some(t) if t > 0 => {
                        if self.epoch_millis - t >= threshold_millis {
                            // Matured: the CRH label stands, stop tracking.
                            updated_stamp = Some(-1);
                        } else {
                            updates.push(row.note_id, Status::NeedsMoreRatings);
                        }
                    }
                    _ => {
                        // First observation of CRH: hold at NMR, start the clock.
                        updates.push(row.note_id, Status::NeedsMoreRatings);
                        updated_stamp = Some(self.epoch_millis);
                    }
                }
            } else {
                // live_stamp holds here; the note fell out of CRH.
                updated_stamp = Some(-1);
            }
            extras.push(
                row.note_id,
                ExtraColumns {
                    updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time: updated_stamp,
                    ..ExtraColumns::default()
                },
            );
        }
        tracing::info!(
            flipped = updates.len(),
            tracked = extras.len(),
            "stable CRH time gate results"
        );
        Ok((updates, Some(extras)))
    }
}

// =============================================================================
// CRH INERTIA
// =============================================================================

/// Keeps CRH status for notes that held it in the previous run and whose
/// intercept dipped only slightly below the promotion threshold, reducing
/// churn from small score variations.
pub struct AddCRHInertia {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    status: Status,
    threshold: f64,
    /// Hard ceiling: a selected note scoring above this indicates the rule
    /// list is misconfigured and aborts the run.
    expected_max: f64,
    min_ratings_needed: i64,
}

impl AddCRHInertia {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        status: Status,
        threshold: f64,
        expected_max: f64,
        min_ratings_needed: i64,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            status,
            threshold,
            expected_max,
            min_ratings_needed,
        }
    }
}

impl ScoringRule for AddCRHInertia {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn required_columns(&self) -> Vec<SignalColumn> {
        vec![
            SignalColumn::InternalIntercept,
            SignalColumn::NumRatings,
            SignalColumn::CurrentLabel,
            SignalColumn::Classification,
        ]
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        let mut over_max = 0usize;
        let mut highest = f64::NEG_INFINITY;
        for row in note_stats.rows() {
            // Notes already on track for CRH need no inertia.
            if !current_labels.labeled_other_than(row.note_id, Status::CurrentlyRatedHelpful) {
                continue;
            }
            let enough_ratings = matches!(
                row.num_ratings,
                Some(n) if n >= self.min_ratings_needed
            );
            let intercept = match row.internal_note_intercept {
                Some(i) if i >= self.threshold => i,
                _ => continue,
            };
            if !enough_ratings
                || row.current_label != Some(Status::CurrentlyRatedHelpful)
                || row.classification == Some(Classification::NotMisleading)
            {
                continue;
            }
            if intercept > self.expected_max {
                over_max += 1;
                highest = highest.max(intercept);
            }
            updates.push(row.note_id, self.status);
        }
        if over_max > 0 {
            return Err(ScoringError::InvariantViolation {
                rule: Some(self.rule_id),
                note_id: None,
                detail: format!(
                    "{} of {} selected notes had intercepts above the expected maximum of {} (highest was {})",
                    over_max,
                    updates.len(),
                    self.expected_max,
                    highest
                ),
            });
        }
        Ok((updates, None))
    }
}

// =============================================================================
// SCORING DRIFT GUARD
// =============================================================================

/// Restores historical committed statuses when scoring would drift away
/// from them, preserving the pre-override status in an extra column.
pub struct ScoringDriftGuard {
    rule_id: RuleId,
    dependencies: HashSet<RuleId>,
    locked_status: LockedStatusFrame,
}

impl ScoringDriftGuard {
    pub fn new(
        rule_id: RuleId,
        dependencies: &[RuleId],
        locked_status: LockedStatusFrame,
    ) -> Self {
        Self {
            rule_id,
            dependencies: dependencies.iter().copied().collect(),
            locked_status,
        }
    }
}

impl ScoringRule for ScoringDriftGuard {
    fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    fn dependencies(&self) -> &HashSet<RuleId> {
        &self.dependencies
    }

    fn score_notes(
        &self,
        note_stats: &NoteStatsFrame,
        current_labels: &CurrentLabels,
    ) -> Result<RuleOutput, ScoringError> {
        let mut updates = StatusUpdates::new();
        let mut extras = ExtrasFrame::new();
        for row in note_stats.rows() {
            let locked = match self.locked_status.get(row.note_id) {
                Some(s) => s,
                None => continue,
            };
            let current = match current_labels.status(row.note_id) {
                Some(s) => s,
                None => continue,
            };
            if locked == current {
                continue;
            }
            updates.push(row.note_id, locked);
            extras.push(
                row.note_id,
                ExtraColumns {
                    unlocked_rating_status: Some(current),
                    ..ExtraColumns::default()
                },
            );
        }
        tracing::info!(restored = updates.len(), "drift guard results");
        Ok((updates, Some(extras)))
    }
}
