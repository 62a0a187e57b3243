//! Production Rule Catalog
//!
//! Thresholds and builders assembling the rule lists used in production
//! scoring: the per-scorer lists (coarse thresholds plus outlier filters)
//! and the meta-scoring list (model propagation, coverage expansion,
//! stabilization, explanation gating, drift guard).
//!
//! Thresholds live in `ScoringConfig` so that synthetic runs and tests can
//! tighten or relax them; the defaults are the production values. Per-tag
//! outlier-ratio thresholds are computed upstream in prescoring as
//! percentiles over CRH notes and arrive through the config.

use crate::scoring::filters::{
    ExplanationThresholds, FilterIncorrect, FilterLargeFactor, FilterLowDiligence,
    FilterTagOutliers, InsufficientExplanation, RejectLowIntercept,
};
use crate::scoring::model_rules::{ApplyGroupModelResult, ApplyTopicModelResult};
use crate::scoring::note_stats::{
    IntColumn, LockedStatusFrame, Millis, SignalColumn, StatusColumn,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::rules::{ApplyModelResult, DefaultRule, NMtoCRNH, RuleFromFunction, ScoringRule};
use crate::scoring::stabilization::{AddCRHInertia, NmrDueToMinStableCrhTime, ScoringDriftGuard};
use crate::scoring::status::{NoteTopic, Status};
use crate::scoring::tags::{NotHelpfulTag, NOT_HELPFUL_TAGS_TSV_ORDER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-group model configuration. Intercept ceilings are optional; when a
/// sibling scorer supplies no ceiling only the safeguard floor applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupModelConfig {
    pub group_number: i64,
    pub core_crh_threshold: Option<f64>,
    pub expansion_crh_threshold: Option<f64>,
}

/// Thresholds and inputs for the production rule lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Intercept floor for coarse CRH promotion.
    pub crh_threshold: f64,
    /// Elevated intercept floor used by the coverage scorer.
    pub crh_super_threshold: f64,
    /// Base intercept bound for coarse CRNH.
    pub crnh_threshold_intercept: f64,
    /// Factor-magnitude multiplier tightening the CRNH bound.
    pub crnh_threshold_note_factor_multiplier: f64,
    /// Intercept upper-confidence-bound threshold for UCB CRNH.
    pub crnh_threshold_ucb_intercept: f64,
    /// Intercept bound for CRNH on not-misleading notes.
    pub crnh_threshold_nm_intercept: f64,
    /// How far below the CRH threshold inertia keeps an existing CRH.
    pub inertia_margin: f64,
    /// Minimum ratings before a note can hold CRH status.
    pub min_ratings_needed: i64,
    /// Intercept bound below which promotion is firmly rejected.
    pub firm_reject_threshold: f64,
    pub low_diligence_intercept_threshold: f64,
    pub large_factor_threshold: f64,
    pub incorrect_tag_threshold: i64,
    pub incorrect_vote_threshold: i64,
    pub incorrect_weighted_total_votes: f64,
    /// Adjusted-total floor for the tag-outlier filter.
    pub min_adjusted_total: f64,
    /// Per-tag adjusted-ratio thresholds from prescoring.
    pub tag_filter_thresholds: HashMap<NotHelpfulTag, f64>,
    pub explanation: ExplanationThresholds,
    pub required_stable_crh_minutes: i64,
    pub group_models: Vec<GroupModelConfig>,
    pub group_min_safeguard_threshold: f64,
    /// Topics scored by dedicated topic models, at most one per topic
    /// model identity.
    pub topics: Vec<NoteTopic>,
    pub topic_nmr_intercept_threshold: f64,
    pub topic_nmr_factor_threshold: f64,
    /// Scoring epoch in epoch milliseconds; injected so reruns are
    /// reproducible.
    pub scoring_epoch_millis: Millis,
}

impl ScoringConfig {
    /// Production thresholds with the given scoring epoch.
    pub fn new(scoring_epoch_millis: Millis) -> Self {
        Self {
            crh_threshold: 0.40,
            crh_super_threshold: 0.50,
            crnh_threshold_intercept: -0.05,
            crnh_threshold_note_factor_multiplier: -0.8,
            crnh_threshold_ucb_intercept: -0.04,
            crnh_threshold_nm_intercept: -0.15,
            inertia_margin: 0.01,
            min_ratings_needed: 5,
            firm_reject_threshold: 0.30,
            low_diligence_intercept_threshold: 0.263,
            large_factor_threshold: 0.50,
            incorrect_tag_threshold: 2,
            incorrect_vote_threshold: 3,
            incorrect_weighted_total_votes: 2.5,
            min_adjusted_total: FilterTagOutliers::DEFAULT_MIN_ADJUSTED_TOTAL,
            tag_filter_thresholds: uniform_tag_filter_thresholds(0.3),
            explanation: ExplanationThresholds::default(),
            required_stable_crh_minutes:
                NmrDueToMinStableCrhTime::DEFAULT_REQUIRED_STABLE_CRH_MINUTES,
            group_models: (1..=14)
                .map(|group_number| GroupModelConfig {
                    group_number,
                    core_crh_threshold: None,
                    expansion_crh_threshold: None,
                })
                .collect(),
            group_min_safeguard_threshold:
                ApplyGroupModelResult::DEFAULT_MIN_SAFEGUARD_THRESHOLD,
            topics: vec![
                NoteTopic::GazaConflict,
                NoteTopic::MessiRonaldo,
                NoteTopic::Scams,
            ],
            topic_nmr_intercept_threshold:
                ApplyTopicModelResult::DEFAULT_NMR_INTERCEPT_THRESHOLD,
            topic_nmr_factor_threshold: ApplyTopicModelResult::DEFAULT_NMR_FACTOR_THRESHOLD,
            scoring_epoch_millis,
        }
    }

    /// Production thresholds with the scoring epoch taken from a wall-clock
    /// instant. This is the only place time crosses into the engine.
    pub fn at(scoring_epoch: DateTime<Utc>) -> Self {
        Self::new(scoring_epoch.timestamp_millis())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// One adjusted-ratio threshold for every tag the outlier filter inspects.
/// Stands in for prescoring percentiles in tests and synthetic runs.
pub fn uniform_tag_filter_thresholds(ratio: f64) -> HashMap<NotHelpfulTag, f64> {
    NOT_HELPFUL_TAGS_TSV_ORDER
        .iter()
        .map(|&tag| (tag, ratio))
        .collect()
}

/// The rule list a single matrix-factorization scorer applies: coarse
/// CRH/CRNH thresholds, inertia, then the outlier and safety filters.
pub fn mf_scorer_rules(config: &ScoringConfig) -> Vec<Box<dyn ScoringRule>> {
    let crh_threshold = config.crh_threshold;
    let crnh_intercept = config.crnh_threshold_intercept;
    let crnh_multiplier = config.crnh_threshold_note_factor_multiplier;
    let ucb_intercept = config.crnh_threshold_ucb_intercept;
    vec![
        Box::new(DefaultRule::new(
            RuleId::InitialNmr,
            &[],
            Status::NeedsMoreRatings,
        )),
        Box::new(RuleFromFunction::new(
            RuleId::GeneralCrh,
            &[RuleId::InitialNmr],
            Status::CurrentlyRatedHelpful,
            &[SignalColumn::InternalIntercept],
            true,
            move |stats| {
                matches!(stats.internal_note_intercept, Some(i) if i >= crh_threshold)
            },
        )),
        Box::new(RuleFromFunction::new(
            RuleId::GeneralCrnh,
            &[RuleId::GeneralCrh],
            Status::CurrentlyRatedNotHelpful,
            &[SignalColumn::InternalIntercept, SignalColumn::InternalFactor],
            true,
            move |stats| match (stats.internal_note_intercept, stats.internal_note_factor1) {
                (Some(intercept), Some(factor)) => {
                    intercept < crnh_intercept + factor.abs() * crnh_multiplier
                }
                _ => false,
            },
        )),
        Box::new(RuleFromFunction::new(
            RuleId::UcbCrnh,
            &[RuleId::GeneralCrnh],
            Status::CurrentlyRatedNotHelpful,
            &[SignalColumn::InternalInterceptMax],
            true,
            move |stats| {
                matches!(stats.internal_note_intercept_max, Some(i) if i < ucb_intercept)
            },
        )),
        Box::new(NMtoCRNH::new(
            RuleId::NmCrnh,
            &[RuleId::InitialNmr],
            Status::CurrentlyRatedNotHelpful,
            config.crnh_threshold_nm_intercept,
        )),
        Box::new(AddCRHInertia::new(
            RuleId::GeneralCrhInertia,
            &[RuleId::GeneralCrh],
            Status::CurrentlyRatedHelpful,
            config.crh_threshold - config.inertia_margin,
            config.crh_threshold,
            config.min_ratings_needed,
        )),
        Box::new(FilterTagOutliers::new(
            RuleId::TagOutlier,
            &[RuleId::GeneralCrh],
            Status::NeedsMoreRatings,
            config.tag_filter_thresholds.clone(),
            config.min_adjusted_total,
        )),
        Box::new(FilterIncorrect::new(
            RuleId::IncorrectOutlier,
            &[RuleId::GeneralCrh],
            Status::NeedsMoreRatings,
            config.incorrect_tag_threshold,
            config.incorrect_vote_threshold,
            config.incorrect_weighted_total_votes,
        )),
        Box::new(FilterLowDiligence::new(
            RuleId::LowDiligence,
            &[RuleId::GeneralCrh],
            Status::NeedsMoreRatings,
            config.low_diligence_intercept_threshold,
        )),
        Box::new(FilterLargeFactor::new(
            RuleId::LargeFactor,
            &[RuleId::GeneralCrh],
            Status::NeedsMoreRatings,
            config.large_factor_threshold,
        )),
        Box::new(RejectLowIntercept::new(
            RuleId::LowIntercept,
            &[RuleId::GeneralCrh],
            Status::FirmReject,
            config.firm_reject_threshold,
        )),
    ]
}

/// The rule list the coverage scorer applies: the elevated CRH threshold
/// and its inertia band in place of the general ones.
pub fn coverage_scorer_rules(config: &ScoringConfig) -> Vec<Box<dyn ScoringRule>> {
    let super_threshold = config.crh_super_threshold;
    vec![
        Box::new(DefaultRule::new(
            RuleId::InitialNmr,
            &[],
            Status::NeedsMoreRatings,
        )),
        Box::new(RuleFromFunction::new(
            RuleId::ElevatedCrh,
            &[RuleId::InitialNmr],
            Status::CurrentlyRatedHelpful,
            &[SignalColumn::InternalIntercept],
            true,
            move |stats| {
                matches!(stats.internal_note_intercept, Some(i) if i >= super_threshold)
            },
        )),
        Box::new(AddCRHInertia::new(
            RuleId::ElevatedCrhInertia,
            &[RuleId::ElevatedCrh],
            Status::CurrentlyRatedHelpful,
            config.crh_super_threshold - config.inertia_margin,
            config.crh_super_threshold,
            config.min_ratings_needed,
        )),
    ]
}

/// Topic-model rule identities in assignment order.
const TOPIC_MODEL_IDS: [RuleId; 3] = [
    RuleId::TopicModel01,
    RuleId::TopicModel02,
    RuleId::TopicModel03,
];

/// The meta-scoring rule list: propagate per-model statuses (core wins),
/// expand coverage through group models under safeguards, retract through
/// topic models, gate explanations, restore locked statuses and finally
/// hold fresh CRH behind the stable-CRH time gate.
pub fn meta_scoring_rules(
    config: &ScoringConfig,
    locked_status: Option<LockedStatusFrame>,
) -> Vec<Box<dyn ScoringRule>> {
    let mut rules: Vec<Box<dyn ScoringRule>> = vec![
        Box::new(DefaultRule::new(
            RuleId::MetaInitialNmr,
            &[],
            Status::NeedsMoreRatings,
        )),
        Box::new(ApplyModelResult::new(
            RuleId::ExpansionPlusModel,
            &[RuleId::MetaInitialNmr],
            StatusColumn::ExpansionPlus,
            false,
            Vec::new(),
        )),
        Box::new(ApplyModelResult::new(
            RuleId::ExpansionModel,
            &[RuleId::MetaInitialNmr],
            StatusColumn::Expansion,
            false,
            Vec::new(),
        )),
        Box::new(ApplyModelResult::new(
            RuleId::CoverageModel,
            &[RuleId::MetaInitialNmr],
            StatusColumn::Coverage,
            false,
            Vec::new(),
        )),
        Box::new(ApplyModelResult::new(
            RuleId::CoreModel,
            &[RuleId::MetaInitialNmr],
            StatusColumn::Core,
            true,
            Vec::new(),
        )),
    ];
    for group in &config.group_models {
        let rule_id = RuleId::group_model(group.group_number)
            .unwrap_or_else(|| panic!("no rule identity for modeling group {}", group.group_number));
        rules.push(Box::new(ApplyGroupModelResult::new(
            rule_id,
            &[RuleId::CoreModel, RuleId::ExpansionModel],
            group.group_number,
            group.core_crh_threshold,
            group.expansion_crh_threshold,
            config.group_min_safeguard_threshold,
        )));
    }
    rules.push(Box::new(ApplyModelResult::new(
        RuleId::MultiGroupModel01,
        &[RuleId::CoreModel],
        StatusColumn::MultiGroup,
        true,
        vec![(IntColumn::ModelingMultiGroup, 1)],
    )));
    for (&rule_id, &topic) in TOPIC_MODEL_IDS.iter().zip(config.topics.iter()) {
        rules.push(Box::new(ApplyTopicModelResult::new(
            rule_id,
            &[RuleId::CoreModel],
            topic,
            config.topic_nmr_intercept_threshold,
            config.topic_nmr_factor_threshold,
        )));
    }
    rules.push(Box::new(InsufficientExplanation::new(
        RuleId::InsufficientExplanation,
        &[RuleId::CoreModel],
        Status::NeedsMoreRatings,
        config.explanation.clone(),
        None,
    )));
    if let Some(locked_status) = locked_status {
        rules.push(Box::new(ScoringDriftGuard::new(
            RuleId::ScoringDriftGuard,
            &[RuleId::CoreModel],
            locked_status,
        )));
    }
    rules.push(Box::new(NmrDueToMinStableCrhTime::new(
        RuleId::NmrDueToMinStableCrhTime,
        &[RuleId::MetaInitialNmr],
        config.required_stable_crh_minutes,
        config.scoring_epoch_millis,
    )));
    rules
}
