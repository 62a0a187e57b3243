//! Per-Note Statistics Frame
//!
//! Typed view over the prepared per-note statistics table the engine
//! consumes: matrix-factorization intercepts and factors from several
//! models, per-tag aggregates, counts, historical status and bookkeeping
//! timestamps. Every signal field is `Option`-typed: upstream data is
//! sparse and a missing value must stay distinguishable from zero.
//!
//! The frame also carries an explicit declaration of which signal columns
//! the upstream producer actually populated, in the spirit of a data
//! contract: each rule states the columns it requires and the engine
//! refuses to run a rule against a frame that never declared them.

use crate::scoring::status::{Classification, NoteTopic, Status};
use crate::scoring::tags::{HelpfulTag, NotHelpfulTag, HELPFUL_TAG_COUNT, NOT_HELPFUL_TAG_COUNT};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Unique note key.
pub type NoteId = i64;

/// Milliseconds since Unix epoch.
pub type Millis = i64;

pub const MILLIS_PER_MINUTE: Millis = 60 * 1_000;

// =============================================================================
// SIGNAL COLUMNS
// =============================================================================

/// Signal column families a frame can declare as populated.
///
/// Granularity follows how rules consume the data: a rule either needs a
/// whole family (e.g. all topic signals) or none of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalColumn {
    InternalIntercept,
    InternalFactor,
    InternalInterceptMax,
    CoreIntercept,
    CoreStatus,
    ExpansionIntercept,
    ExpansionStatus,
    ExpansionPlusStatus,
    CoverageStatus,
    GroupStatus,
    ModelingGroup,
    MultiGroupStatus,
    ModelingMultiGroup,
    TopicSignals,
    LowDiligenceIntercept,
    Classification,
    NumRatings,
    CurrentLabel,
    StableCrhTimestamp,
    TagAggregates,
    IncorrectAggregates,
    TagCounts,
}

impl SignalColumn {
    /// Every signal column family; convenient for fully-populated frames.
    pub const ALL: [SignalColumn; 22] = [
        Self::InternalIntercept,
        Self::InternalFactor,
        Self::InternalInterceptMax,
        Self::CoreIntercept,
        Self::CoreStatus,
        Self::ExpansionIntercept,
        Self::ExpansionStatus,
        Self::ExpansionPlusStatus,
        Self::CoverageStatus,
        Self::GroupStatus,
        Self::ModelingGroup,
        Self::MultiGroupStatus,
        Self::ModelingMultiGroup,
        Self::TopicSignals,
        Self::LowDiligenceIntercept,
        Self::Classification,
        Self::NumRatings,
        Self::CurrentLabel,
        Self::StableCrhTimestamp,
        Self::TagAggregates,
        Self::IncorrectAggregates,
        Self::TagCounts,
    ];
}

/// Status-valued source columns a propagation rule can copy from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusColumn {
    Core,
    Expansion,
    ExpansionPlus,
    Coverage,
    Group,
    MultiGroup,
}

impl StatusColumn {
    /// Read this status column from a row.
    #[inline]
    pub fn get(&self, stats: &NoteStats) -> Option<Status> {
        match self {
            Self::Core => stats.core_rating_status,
            Self::Expansion => stats.expansion_rating_status,
            Self::ExpansionPlus => stats.expansion_plus_rating_status,
            Self::Coverage => stats.coverage_rating_status,
            Self::Group => stats.group_rating_status,
            Self::MultiGroup => stats.multi_group_rating_status,
        }
    }

    /// The signal family this column belongs to.
    pub fn required_column(&self) -> SignalColumn {
        match self {
            Self::Core => SignalColumn::CoreStatus,
            Self::Expansion => SignalColumn::ExpansionStatus,
            Self::ExpansionPlus => SignalColumn::ExpansionPlusStatus,
            Self::Coverage => SignalColumn::CoverageStatus,
            Self::Group => SignalColumn::GroupStatus,
            Self::MultiGroup => SignalColumn::MultiGroupStatus,
        }
    }
}

/// Integer-valued columns usable in propagation equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntColumn {
    ModelingGroup,
    ModelingMultiGroup,
}

impl IntColumn {
    #[inline]
    pub fn get(&self, stats: &NoteStats) -> Option<i64> {
        match self {
            Self::ModelingGroup => stats.modeling_group,
            Self::ModelingMultiGroup => stats.modeling_multi_group,
        }
    }

    pub fn required_column(&self) -> SignalColumn {
        match self {
            Self::ModelingGroup => SignalColumn::ModelingGroup,
            Self::ModelingMultiGroup => SignalColumn::ModelingMultiGroup,
        }
    }
}

// =============================================================================
// NOTE STATS ROW
// =============================================================================

/// One row of the per-note statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteStats {
    pub note_id: NoteId,

    // Primary matrix-factorization signals.
    pub internal_note_intercept: Option<f64>,
    pub internal_note_factor1: Option<f64>,
    /// Upper confidence bound on the internal intercept.
    pub internal_note_intercept_max: Option<f64>,

    // Core model.
    pub core_note_intercept: Option<f64>,
    pub core_note_factor1: Option<f64>,
    pub core_rating_status: Option<Status>,

    // Expansion / expansion-plus / coverage models.
    pub expansion_note_intercept: Option<f64>,
    pub expansion_rating_status: Option<Status>,
    pub expansion_plus_rating_status: Option<Status>,
    pub coverage_rating_status: Option<Status>,

    // Group models.
    pub group_rating_status: Option<Status>,
    pub modeling_group: Option<i64>,
    pub multi_group_rating_status: Option<Status>,
    pub modeling_multi_group: Option<i64>,

    // Topic models.
    pub topic_note_intercept: Option<f64>,
    pub topic_note_factor1: Option<f64>,
    pub topic_note_confident: Option<bool>,
    pub note_topic: Option<NoteTopic>,

    // Low-diligence model.
    pub low_diligence_note_intercept: Option<f64>,

    // Note attributes.
    pub classification: Option<Classification>,
    pub num_ratings: Option<i64>,
    /// Status assigned by the previous scoring run.
    pub current_label: Option<Status>,
    /// Bookkeeping timestamp for the stable-CRH hysteresis rule.
    pub timestamp_millis_of_nmr_due_to_min_stable_crh_time: Option<Millis>,

    // Per-tag aggregates, indexed by not-helpful TSV position.
    pub not_helpful_adjusted: [Option<f64>; NOT_HELPFUL_TAG_COUNT],
    pub not_helpful_adjusted_ratio: [Option<f64>; NOT_HELPFUL_TAG_COUNT],

    // Incorrect-tag interval aggregates.
    pub not_helpful_incorrect_interval: Option<f64>,
    pub num_voters_interval: Option<f64>,
    pub tf_idf_incorrect_interval: Option<f64>,

    // Raw tag counts used for top-tag selection, indexed by TSV position.
    pub helpful_tag_counts: [Option<f64>; HELPFUL_TAG_COUNT],
    pub not_helpful_tag_counts: [Option<f64>; NOT_HELPFUL_TAG_COUNT],
}

impl NoteStats {
    /// A row with every signal missing.
    pub fn new(note_id: NoteId) -> Self {
        Self {
            note_id,
            internal_note_intercept: None,
            internal_note_factor1: None,
            internal_note_intercept_max: None,
            core_note_intercept: None,
            core_note_factor1: None,
            core_rating_status: None,
            expansion_note_intercept: None,
            expansion_rating_status: None,
            expansion_plus_rating_status: None,
            coverage_rating_status: None,
            group_rating_status: None,
            modeling_group: None,
            multi_group_rating_status: None,
            modeling_multi_group: None,
            topic_note_intercept: None,
            topic_note_factor1: None,
            topic_note_confident: None,
            note_topic: None,
            low_diligence_note_intercept: None,
            classification: None,
            num_ratings: None,
            current_label: None,
            timestamp_millis_of_nmr_due_to_min_stable_crh_time: None,
            not_helpful_adjusted: [None; NOT_HELPFUL_TAG_COUNT],
            not_helpful_adjusted_ratio: [None; NOT_HELPFUL_TAG_COUNT],
            not_helpful_incorrect_interval: None,
            num_voters_interval: None,
            tf_idf_incorrect_interval: None,
            helpful_tag_counts: [None; HELPFUL_TAG_COUNT],
            not_helpful_tag_counts: [None; NOT_HELPFUL_TAG_COUNT],
        }
    }

    #[inline]
    pub fn adjusted(&self, tag: NotHelpfulTag) -> Option<f64> {
        self.not_helpful_adjusted[tag.index()]
    }

    #[inline]
    pub fn adjusted_ratio(&self, tag: NotHelpfulTag) -> Option<f64> {
        self.not_helpful_adjusted_ratio[tag.index()]
    }

    #[inline]
    pub fn helpful_count(&self, tag: HelpfulTag) -> Option<f64> {
        self.helpful_tag_counts[tag.index()]
    }

    #[inline]
    pub fn not_helpful_count(&self, tag: NotHelpfulTag) -> Option<f64> {
        self.not_helpful_tag_counts[tag.index()]
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// The per-note statistics table: rows in a stable order plus an id index
/// and the set of signal columns the producer declared as populated.
#[derive(Debug, Clone)]
pub struct NoteStatsFrame {
    rows: Vec<NoteStats>,
    index: HashMap<NoteId, usize>,
    columns: HashSet<SignalColumn>,
}

impl NoteStatsFrame {
    /// Build a frame, validating that note ids are unique.
    pub fn new(rows: Vec<NoteStats>, columns: &[SignalColumn]) -> Result<Self> {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.insert(row.note_id, i).is_some() {
                bail!("duplicate noteId in note stats: {}", row.note_id);
            }
        }
        Ok(Self {
            rows,
            index,
            columns: columns.iter().copied().collect(),
        })
    }

    /// Build a frame declaring every signal column as populated.
    pub fn with_all_columns(rows: Vec<NoteStats>) -> Result<Self> {
        Self::new(rows, &SignalColumn::ALL)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in input order. All iteration the engine does is in this order,
    /// which is what makes output ordering reproducible.
    #[inline]
    pub fn rows(&self) -> &[NoteStats] {
        &self.rows
    }

    #[inline]
    pub fn get(&self, note_id: NoteId) -> Option<&NoteStats> {
        self.index.get(&note_id).map(|&i| &self.rows[i])
    }

    #[inline]
    pub fn contains(&self, note_id: NoteId) -> bool {
        self.index.contains_key(&note_id)
    }

    #[inline]
    pub fn has_column(&self, column: SignalColumn) -> bool {
        self.columns.contains(&column)
    }

    /// Columns from `required` that this frame never declared.
    pub fn missing_columns(&self, required: &[SignalColumn]) -> Vec<SignalColumn> {
        required
            .iter()
            .copied()
            .filter(|c| !self.columns.contains(c))
            .collect()
    }
}

// =============================================================================
// LABELS AND RULE OUTPUTS
// =============================================================================

/// Statuses assigned so far, at most one per note. The engine owns the only
/// mutable copy; rules receive a shared view.
#[derive(Debug, Clone, Default)]
pub struct CurrentLabels {
    map: HashMap<NoteId, Status>,
}

impl CurrentLabels {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn status(&self, note_id: NoteId) -> Option<Status> {
        self.map.get(&note_id).copied()
    }

    /// True when the note has a label and it is not the given status.
    #[inline]
    pub fn labeled_other_than(&self, note_id: NoteId, status: Status) -> bool {
        matches!(self.status(note_id), Some(s) if s != status)
    }

    /// True when the note currently holds exactly the given status.
    #[inline]
    pub fn labeled(&self, note_id: NoteId, status: Status) -> bool {
        self.status(note_id) == Some(status)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Apply a batch of updates; the incoming status wins per note.
    pub fn upsert(&mut self, updates: &StatusUpdates) {
        for u in updates.iter() {
            self.map.insert(u.note_id, u.status);
        }
    }
}

/// A single `(note, status)` assignment emitted by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub note_id: NoteId,
    pub status: Status,
}

/// The status assignments of one rule invocation, in frame order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusUpdates {
    updates: Vec<StatusUpdate>,
}

impl StatusUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, note_id: NoteId, status: Status) {
        self.updates.push(StatusUpdate { note_id, status });
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &StatusUpdate> {
        self.updates.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// The first note id that appears twice, if any.
    pub fn first_duplicate(&self) -> Option<NoteId> {
        let mut seen = HashSet::with_capacity(self.updates.len());
        for u in &self.updates {
            if !seen.insert(u.note_id) {
                return Some(u.note_id);
            }
        }
        None
    }

    pub fn note_ids(&self) -> HashSet<NoteId> {
        self.updates.iter().map(|u| u.note_id).collect()
    }
}

/// Additional output columns a rule can contribute for a note. Each rule
/// writes a disjoint subset of these fields; the engine outer-joins them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraColumns {
    /// Comma-joined tags that triggered the tag-outlier filter.
    pub active_filter_tags: Option<String>,
    /// Top explanation tags.
    pub first_tag: Option<String>,
    pub second_tag: Option<String>,
    /// Updated stable-CRH bookkeeping timestamp (`-1` clears it).
    pub updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time: Option<Millis>,
    /// Pre-override status preserved by the drift guard.
    pub unlocked_rating_status: Option<Status>,
}

/// Extras emitted by one rule invocation, in frame order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtrasFrame {
    rows: Vec<(NoteId, ExtraColumns)>,
}

impl ExtrasFrame {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, note_id: NoteId, columns: ExtraColumns) {
        self.rows.push((note_id, columns));
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(NoteId, ExtraColumns)> {
        self.rows.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn note_ids(&self) -> HashSet<NoteId> {
        self.rows.iter().map(|(id, _)| *id).collect()
    }
}

/// Historical committed statuses, the drift-guard input. Notes without an
/// entry (or with a `None` status) are unlocked.
#[derive(Debug, Clone, Default)]
pub struct LockedStatusFrame {
    map: HashMap<NoteId, Status>,
    order: Vec<NoteId>,
}

impl LockedStatusFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(noteId, lockedStatus)` pairs; a `None` status means the
    /// note is present upstream but has no committed label.
    pub fn from_pairs(pairs: Vec<(NoteId, Option<Status>)>) -> Self {
        let mut frame = Self::new();
        for (note_id, status) in pairs {
            if let Some(status) = status {
                frame.insert(note_id, status);
            }
        }
        frame
    }

    pub fn insert(&mut self, note_id: NoteId, status: Status) {
        if self.map.insert(note_id, status).is_none() {
            self.order.push(note_id);
        }
    }

    #[inline]
    pub fn get(&self, note_id: NoteId) -> Option<Status> {
        self.map.get(&note_id).copied()
    }

    /// Locked notes in insertion order.
    #[inline]
    pub fn note_ids(&self) -> &[NoteId] {
        &self.order
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
