//! Tests for the outlier and explanation filters.

use crate::scoring::engine::ScoringError;
use crate::scoring::filters::{
    ExplanationThresholds, FilterIncorrect, FilterLargeFactor, FilterLowDiligence,
    FilterTagOutliers, InsufficientExplanation, RejectLowIntercept,
};
use crate::scoring::note_stats::{
    CurrentLabels, NoteId, NoteStats, NoteStatsFrame, StatusUpdates,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::rules::ScoringRule;
use crate::scoring::status::Status;
use crate::scoring::tags::{HelpfulTag, NotHelpfulTag};
use std::collections::HashMap;

fn note(note_id: NoteId) -> NoteStats {
    NoteStats::new(note_id)
}

fn frame(rows: Vec<NoteStats>) -> NoteStatsFrame {
    NoteStatsFrame::with_all_columns(rows).unwrap()
}

fn labels(pairs: &[(NoteId, Status)]) -> CurrentLabels {
    let mut updates = StatusUpdates::new();
    for &(note_id, status) in pairs {
        updates.push(note_id, status);
    }
    let mut labels = CurrentLabels::new();
    labels.upsert(&updates);
    labels
}

fn updated_ids(updates: &StatusUpdates) -> Vec<NoteId> {
    updates.iter().map(|u| u.note_id).collect()
}

fn uniform_thresholds(ratio: f64) -> HashMap<NotHelpfulTag, f64> {
    crate::scoring::catalog::uniform_tag_filter_thresholds(ratio)
}

// =============================================================================
// TAG OUTLIER FILTER
// =============================================================================

fn tag_filter(thresholds: HashMap<NotHelpfulTag, f64>) -> FilterTagOutliers {
    FilterTagOutliers::new(
        RuleId::TagOutlier,
        &[RuleId::GeneralCrh],
        Status::NeedsMoreRatings,
        thresholds,
        2.5,
    )
}

#[test]
fn test_tag_filter_demotes_outlier_and_reports_tag() {
    let mut a = note(1);
    a.not_helpful_adjusted[NotHelpfulTag::ArgumentativeOrBiased.index()] = Some(3.0);
    a.not_helpful_adjusted_ratio[NotHelpfulTag::ArgumentativeOrBiased.index()] = Some(0.9);
    let frame = frame(vec![a]);
    let rule = tag_filter(uniform_thresholds(0.8));
    let (updates, extras) = rule
        .score_notes(&frame, &labels(&[(1, Status::CurrentlyRatedHelpful)]))
        .unwrap();
    assert_eq!(updated_ids(&updates), vec![1]);
    let extras = extras.unwrap();
    let (_, columns) = extras.iter().next().unwrap();
    assert_eq!(
        columns.active_filter_tags.as_deref(),
        Some("notHelpfulArgumentativeOrBiased")
    );
}

#[test]
fn test_tag_filter_joins_tags_in_tsv_order() {
    let mut a = note(1);
    // OffTopic precedes IrrelevantSources in TSV order even though the
    // ratio is lower; the joined string must follow definition order.
    a.not_helpful_adjusted[NotHelpfulTag::IrrelevantSources.index()] = Some(4.0);
    a.not_helpful_adjusted_ratio[NotHelpfulTag::IrrelevantSources.index()] = Some(0.95);
    a.not_helpful_adjusted[NotHelpfulTag::OffTopic.index()] = Some(3.0);
    a.not_helpful_adjusted_ratio[NotHelpfulTag::OffTopic.index()] = Some(0.85);
    let frame = frame(vec![a]);
    let rule = tag_filter(uniform_thresholds(0.8));
    let (_, extras) = rule
        .score_notes(&frame, &labels(&[(1, Status::NeedsMoreRatings)]))
        .unwrap();
    let extras = extras.unwrap();
    let (_, columns) = extras.iter().next().unwrap();
    assert_eq!(
        columns.active_filter_tags.as_deref(),
        Some("notHelpfulOffTopic,notHelpfulIrrelevantSources")
    );
}

#[test]
fn test_tag_filter_requires_both_thresholds() {
    // High ratio but adjusted total below the floor.
    let mut a = note(1);
    a.not_helpful_adjusted[NotHelpfulTag::Outdated.index()] = Some(2.0);
    a.not_helpful_adjusted_ratio[NotHelpfulTag::Outdated.index()] = Some(0.99);
    // High total but ratio at (not above) the threshold.
    let mut b = note(2);
    b.not_helpful_adjusted[NotHelpfulTag::Outdated.index()] = Some(5.0);
    b.not_helpful_adjusted_ratio[NotHelpfulTag::Outdated.index()] = Some(0.8);
    let frame = frame(vec![a, b]);
    let rule = tag_filter(uniform_thresholds(0.8));
    let (updates, _) = rule
        .score_notes(
            &frame,
            &labels(&[
                (1, Status::NeedsMoreRatings),
                (2, Status::NeedsMoreRatings),
            ]),
        )
        .unwrap();
    assert!(updates.is_empty());
}

#[test]
fn test_tag_filter_skips_crnh_and_unlabeled_notes() {
    let mut a = note(1);
    a.not_helpful_adjusted[NotHelpfulTag::Incorrect.index()] = Some(5.0);
    a.not_helpful_adjusted_ratio[NotHelpfulTag::Incorrect.index()] = Some(0.99);
    let mut b = note(2);
    b.not_helpful_adjusted[NotHelpfulTag::Incorrect.index()] = Some(5.0);
    b.not_helpful_adjusted_ratio[NotHelpfulTag::Incorrect.index()] = Some(0.99);
    let frame = frame(vec![a, b]);
    let rule = tag_filter(uniform_thresholds(0.8));
    // Note 1 is CRNH, note 2 was never labeled: neither is a candidate.
    let (updates, _) = rule
        .score_notes(&frame, &labels(&[(1, Status::CurrentlyRatedNotHelpful)]))
        .unwrap();
    assert!(updates.is_empty());
}

#[test]
fn test_tag_filter_ignores_hard_to_understand() {
    let mut a = note(1);
    a.not_helpful_adjusted[NotHelpfulTag::HardToUnderstand.index()] = Some(9.0);
    a.not_helpful_adjusted_ratio[NotHelpfulTag::HardToUnderstand.index()] = Some(0.99);
    let frame = frame(vec![a]);
    let rule = tag_filter(uniform_thresholds(0.8));
    let (updates, _) = rule
        .score_notes(&frame, &labels(&[(1, Status::NeedsMoreRatings)]))
        .unwrap();
    assert!(updates.is_empty());
}

#[test]
fn test_tag_filter_missing_threshold_is_schema_mismatch() {
    let mut thresholds = uniform_thresholds(0.8);
    thresholds.remove(&NotHelpfulTag::Outdated);
    let mut a = note(1);
    a.not_helpful_adjusted[NotHelpfulTag::Outdated.index()] = Some(5.0);
    let frame = frame(vec![a]);
    let rule = tag_filter(thresholds);
    let err = rule
        .score_notes(&frame, &labels(&[(1, Status::NeedsMoreRatings)]))
        .unwrap_err();
    assert!(matches!(err, ScoringError::SchemaMismatch { .. }));
}

// =============================================================================
// INCORRECT FILTER
// =============================================================================

#[test]
fn test_incorrect_filter_requires_all_three_thresholds() {
    let mut impacted = note(1);
    impacted.not_helpful_incorrect_interval = Some(2.0);
    impacted.num_voters_interval = Some(3.0);
    impacted.tf_idf_incorrect_interval = Some(2.5);
    let mut short_votes = note(2);
    short_votes.not_helpful_incorrect_interval = Some(2.0);
    short_votes.num_voters_interval = Some(2.0);
    short_votes.tf_idf_incorrect_interval = Some(2.5);
    let missing_weight = note(3);
    let frame = frame(vec![impacted, short_votes, missing_weight]);
    let rule = FilterIncorrect::new(
        RuleId::IncorrectOutlier,
        &[RuleId::GeneralCrh],
        Status::NeedsMoreRatings,
        2,
        3,
        2.5,
    );
    let (updates, _) = rule
        .score_notes(
            &frame,
            &labels(&[
                (1, Status::CurrentlyRatedHelpful),
                (2, Status::CurrentlyRatedHelpful),
                (3, Status::CurrentlyRatedHelpful),
            ]),
        )
        .unwrap();
    assert_eq!(updated_ids(&updates), vec![1]);
}

// =============================================================================
// LOW DILIGENCE / LARGE FACTOR / FIRM REJECT
// =============================================================================

#[test]
fn test_low_diligence_filter_uses_strict_threshold() {
    let mut over = note(1);
    over.low_diligence_note_intercept = Some(0.3);
    let mut at = note(2);
    at.low_diligence_note_intercept = Some(0.263);
    let frame = frame(vec![over, at]);
    let rule = FilterLowDiligence::new(
        RuleId::LowDiligence,
        &[RuleId::GeneralCrh],
        Status::NeedsMoreRatings,
        0.263,
    );
    let (updates, _) = rule
        .score_notes(
            &frame,
            &labels(&[
                (1, Status::CurrentlyRatedHelpful),
                (2, Status::CurrentlyRatedHelpful),
            ]),
        )
        .unwrap();
    assert_eq!(updated_ids(&updates), vec![1]);
}

#[test]
fn test_large_factor_filter_only_touches_crh_notes() {
    let mut crh = note(1);
    crh.internal_note_factor1 = Some(-0.8);
    let mut nmr = note(2);
    nmr.internal_note_factor1 = Some(-0.8);
    let frame = frame(vec![crh, nmr]);
    let rule = FilterLargeFactor::new(
        RuleId::LargeFactor,
        &[RuleId::GeneralCrh],
        Status::NeedsMoreRatings,
        0.5,
    );
    let (updates, _) = rule
        .score_notes(
            &frame,
            &labels(&[
                (1, Status::CurrentlyRatedHelpful),
                (2, Status::NeedsMoreRatings),
            ]),
        )
        .unwrap();
    assert_eq!(updated_ids(&updates), vec![1]);
}

#[test]
fn test_reject_low_intercept_preserves_crnh() {
    let mut low = note(1);
    low.internal_note_intercept = Some(0.1);
    let mut low_crnh = note(2);
    low_crnh.internal_note_intercept = Some(0.1);
    let frame = frame(vec![low, low_crnh]);
    let rule = RejectLowIntercept::new(
        RuleId::LowIntercept,
        &[RuleId::GeneralCrh],
        Status::FirmReject,
        0.3,
    );
    let (updates, _) = rule
        .score_notes(
            &frame,
            &labels(&[
                (1, Status::NeedsMoreRatings),
                (2, Status::CurrentlyRatedNotHelpful),
            ]),
        )
        .unwrap();
    assert_eq!(
        updates.iter().map(|u| (u.note_id, u.status)).collect::<Vec<_>>(),
        vec![(1, Status::FirmReject)]
    );
}

// =============================================================================
// INSUFFICIENT EXPLANATION
// =============================================================================

fn explanation_rule(thresholds: ExplanationThresholds) -> InsufficientExplanation {
    InsufficientExplanation::new(
        RuleId::InsufficientExplanation,
        &[RuleId::CoreModel],
        Status::NeedsMoreRatings,
        thresholds,
        None,
    )
}

#[test]
fn test_explanation_filter_demotes_untagged_notes() {
    // No tag reaches the ratings threshold: the CRH note loses status and
    // the extras row records that no tags were assigned.
    let a = note(1);
    let frame = frame(vec![a]);
    let rule = explanation_rule(ExplanationThresholds::default());
    let (updates, extras) = rule
        .score_notes(&frame, &labels(&[(1, Status::CurrentlyRatedHelpful)]))
        .unwrap();
    assert_eq!(updated_ids(&updates), vec![1]);
    let extras = extras.unwrap();
    let (_, columns) = extras.iter().next().unwrap();
    assert_eq!(columns.first_tag, None);
    assert_eq!(columns.second_tag, None);
}

#[test]
fn test_explanation_filter_keeps_tagged_notes() {
    let mut a = note(1);
    a.helpful_tag_counts[HelpfulTag::Clear.index()] = Some(4.0);
    let frame = frame(vec![a]);
    let rule = explanation_rule(ExplanationThresholds::default());
    let (updates, extras) = rule
        .score_notes(&frame, &labels(&[(1, Status::CurrentlyRatedHelpful)]))
        .unwrap();
    assert!(updates.is_empty());
    assert!(extras.unwrap().is_empty());
}

#[test]
fn test_explanation_filter_uses_not_helpful_tags_for_crnh() {
    let mut a = note(1);
    a.not_helpful_tag_counts[NotHelpfulTag::Incorrect.index()] = Some(3.0);
    let frame = frame(vec![a]);
    let rule = explanation_rule(ExplanationThresholds::default());
    let (updates, _) = rule
        .score_notes(&frame, &labels(&[(1, Status::CurrentlyRatedNotHelpful)]))
        .unwrap();
    assert!(updates.is_empty());
}

#[test]
fn test_explanation_filter_helpful_branch_threshold_swap() {
    // The helpful branch uses min_tags_needed_for_status as its per-tag
    // ratings threshold; the not-helpful branch uses min_ratings_to_get_tag.
    // With (min_ratings=1, min_tags=2) a single count of 1 qualifies on the
    // CRNH side but not on the CRH side.
    let thresholds = ExplanationThresholds {
        min_ratings_to_get_tag: 1,
        min_tags_needed_for_status: 2,
    };
    let mut crh = note(1);
    crh.helpful_tag_counts[HelpfulTag::Clear.index()] = Some(1.0);
    crh.helpful_tag_counts[HelpfulTag::GoodSources.index()] = Some(1.0);
    let mut crnh = note(2);
    crnh.not_helpful_tag_counts[NotHelpfulTag::Incorrect.index()] = Some(1.0);
    crnh.not_helpful_tag_counts[NotHelpfulTag::OffTopic.index()] = Some(1.0);
    let frame = frame(vec![crh, crnh]);
    let rule = explanation_rule(thresholds);
    let (updates, extras) = rule
        .score_notes(
            &frame,
            &labels(&[
                (1, Status::CurrentlyRatedHelpful),
                (2, Status::CurrentlyRatedNotHelpful),
            ]),
        )
        .unwrap();
    // CRH note: counts of 1 fall below the swapped threshold of 2, so no
    // tags are assigned and the note is demoted. CRNH note keeps status.
    assert_eq!(updated_ids(&updates), vec![1]);
    let extras = extras.unwrap();
    let (_, columns) = extras.iter().next().unwrap();
    assert_eq!(columns.first_tag, None);
}
