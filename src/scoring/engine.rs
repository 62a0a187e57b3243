//! Scoring Rule Engine
//!
//! Applies an ordered list of scoring rules to a per-note statistics frame
//! and assembles the final scored-notes table.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    apply_scoring_rules                       │
//! │  (owns labels / attribution / extra-column accumulators,     │
//! │   enforces ordering, dependencies and output invariants)     │
//! └──────────────────────────────────────────────────────────────┘
//!          │ per rule, in list order
//!          ▼
//! ┌─────────────────┐   updates    ┌──────────────────────────┐
//! │  ScoringRule    │─────────────▶│ CurrentLabels            │
//! │  (immutable     │              │ (last writer wins)       │
//! │   views in)     │   extras     ├──────────────────────────┤
//! └─────────────────┘─────────────▶│ Attribution log          │
//!                                  │ (append-only, ordered)   │
//!                                  ├──────────────────────────┤
//!                                  │ Extra columns            │
//!                                  │ (column-exclusive merge) │
//!                                  └──────────────────────────┘
//!
//! Finalization: FIRM_REJECT → NMR rewrite, coverage and closure checks,
//! boolean status mirrors, assembly in input frame order.
//! ```
//!
//! # Determinism Contract
//!
//! - Rules run strictly in list order; the last rule to touch a note wins
//!   and becomes its decided-by attribution.
//! - All iteration is in input frame order; reruns over identical inputs
//!   produce byte-identical output.
//! - The engine never reads the system clock; time-dependent rules carry
//!   an injected scoring epoch.

use crate::scoring::note_stats::{
    CurrentLabels, ExtraColumns, NoteId, NoteStats, NoteStatsFrame,
};
use crate::scoring::rule_id::RuleId;
use crate::scoring::rules::ScoringRule;
use crate::scoring::status::{Classification, Status};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// =============================================================================
// ERRORS
// =============================================================================

/// Fatal errors surfaced by the engine. Every variant indicates a
/// programming error in the rule configuration or a corrupted upstream
/// table; there is no local recovery and no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// A rule declared a dependency on a rule that has not run yet.
    DependencyViolation { rule: RuleId, missing: Vec<RuleId> },
    /// A rule identifier appeared twice in the rule list.
    DuplicateRule { rule: RuleId },
    /// The note stats frame does not carry a column a rule requires.
    SchemaMismatch { rule: RuleId, detail: String },
    /// A rule output or the final assembly violated an engine invariant.
    InvariantViolation {
        rule: Option<RuleId>,
        note_id: Option<NoteId>,
        detail: String,
    },
    /// An unrecognized token reached a boundary parser.
    DomainError { token: String },
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyViolation { rule, missing } => {
                write!(f, "rule {} has unsatisfied dependencies: ", rule)?;
                for (i, dep) in missing.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{dep}")?;
                }
                Ok(())
            }
            Self::DuplicateRule { rule } => write!(f, "repeat rule in list: {rule}"),
            Self::SchemaMismatch { rule, detail } => {
                write!(f, "schema mismatch for rule {rule}: {detail}")
            }
            Self::InvariantViolation {
                rule,
                note_id,
                detail,
            } => {
                write!(f, "invariant violation")?;
                if let Some(rule) = rule {
                    write!(f, " in rule {rule}")?;
                }
                if let Some(note_id) = note_id {
                    write!(f, " (noteId {note_id})")?;
                }
                write!(f, ": {detail}")
            }
            Self::DomainError { token } => write!(f, "unrecognized status token: {token:?}"),
        }
    }
}

impl std::error::Error for ScoringError {}

/// Parse a rating status wire token, rejecting unknown tokens.
pub fn status_from_token(token: &str) -> Result<Status, ScoringError> {
    Status::parse(token).ok_or_else(|| ScoringError::DomainError {
        token: token.to_string(),
    })
}

/// Parse a classification wire token, rejecting unknown tokens.
pub fn classification_from_token(token: &str) -> Result<Classification, ScoringError> {
    Classification::parse(token).ok_or_else(|| ScoringError::DomainError {
        token: token.to_string(),
    })
}

// =============================================================================
// EXPORT PROJECTION
// =============================================================================

/// Column names used when projecting scored notes into export rows. The
/// engine is fully typed; these names exist only at the TSV/JSON boundary
/// where downstream consumers parse `"<Name> (v<Version>)"` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportColumns {
    pub status: String,
    pub active_rules: String,
    /// When set, the display name of the last acting rule is exported
    /// under this column.
    pub decided_by: Option<String>,
}

impl ExportColumns {
    /// Projection used for the final meta-scoring output.
    pub fn final_scoring() -> Self {
        Self {
            status: "finalRatingStatus".to_string(),
            active_rules: "metaScorerActiveRules".to_string(),
            decided_by: Some("decidedBy".to_string()),
        }
    }

    /// Projection used for a single scorer's intermediate output.
    pub fn internal_scoring() -> Self {
        Self {
            status: "internalRatingStatus".to_string(),
            active_rules: "internalActiveRules".to_string(),
            decided_by: None,
        }
    }
}

impl Default for ExportColumns {
    fn default() -> Self {
        Self::final_scoring()
    }
}

// =============================================================================
// SCORED OUTPUT
// =============================================================================

/// One fully-scored note: the input statistics row augmented with the
/// final status, attribution, boolean status mirrors and any extra
/// columns contributed by rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNote {
    pub stats: NoteStats,
    /// Final status; never `FirmReject`.
    pub status: Status,
    /// Rules that acted on the note, in application order.
    pub active_rules: Vec<RuleId>,
    pub currently_rated_helpful: bool,
    pub currently_rated_not_helpful: bool,
    pub awaiting_more_ratings: bool,
    pub extras: ExtraColumns,
}

impl ScoredNote {
    #[inline]
    pub fn note_id(&self) -> NoteId {
        self.stats.note_id
    }

    /// The last rule to act on this note.
    #[inline]
    pub fn decided_by(&self) -> RuleId {
        *self
            .active_rules
            .last()
            .expect("every scored note has at least one active rule")
    }

    /// Comma-joined rule display names in application order.
    pub fn active_rules_string(&self) -> String {
        self.active_rules
            .iter()
            .map(RuleId::display_name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The scored-notes table, in input frame order.
#[derive(Debug, Clone, Default)]
pub struct ScoredNotes {
    notes: Vec<ScoredNote>,
    index: HashMap<NoteId, usize>,
}

impl ScoredNotes {
    fn from_notes(notes: Vec<ScoredNote>) -> Self {
        let index = notes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.note_id(), i))
            .collect();
        Self { notes, index }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ScoredNote> {
        self.notes.iter()
    }

    #[inline]
    pub fn get(&self, note_id: NoteId) -> Option<&ScoredNote> {
        self.index.get(&note_id).map(|&i| &self.notes[i])
    }

    /// Project into export rows under the configured column names. Extra
    /// columns appear only when a rule contributed them for the note.
    pub fn to_export_rows(
        &self,
        columns: &ExportColumns,
    ) -> Vec<serde_json::Map<String, serde_json::Value>> {
        use serde_json::Value;
        self.notes
            .iter()
            .map(|note| {
                let mut row = serde_json::Map::new();
                row.insert("noteId".to_string(), Value::from(note.note_id()));
                row.insert(
                    columns.status.clone(),
                    Value::from(note.status.as_str()),
                );
                row.insert(
                    columns.active_rules.clone(),
                    Value::from(note.active_rules_string()),
                );
                if let Some(decided_by) = &columns.decided_by {
                    row.insert(
                        decided_by.clone(),
                        Value::from(note.decided_by().display_name()),
                    );
                }
                row.insert(
                    "currentlyRatedHelpfulBool".to_string(),
                    Value::from(note.currently_rated_helpful),
                );
                row.insert(
                    "currentlyRatedNotHelpfulBool".to_string(),
                    Value::from(note.currently_rated_not_helpful),
                );
                row.insert(
                    "awaitingMoreRatingsBool".to_string(),
                    Value::from(note.awaiting_more_ratings),
                );
                let ex = &note.extras;
                if let Some(v) = &ex.active_filter_tags {
                    row.insert("activeFilterTags".to_string(), Value::from(v.clone()));
                }
                if let Some(v) = &ex.first_tag {
                    row.insert("firstTag".to_string(), Value::from(v.clone()));
                }
                if let Some(v) = &ex.second_tag {
                    row.insert("secondTag".to_string(), Value::from(v.clone()));
                }
                if let Some(v) =
                    ex.updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time
                {
                    row.insert(
                        "updatedTimestampMillisOfNmrDueToMinStableCrhTime".to_string(),
                        Value::from(v),
                    );
                }
                if let Some(v) = ex.unlocked_rating_status {
                    row.insert(
                        "unlockedRatingStatus".to_string(),
                        Value::from(v.as_str()),
                    );
                }
                row
            })
            .collect()
    }
}

// =============================================================================
// EXTRA-COLUMN MERGE
// =============================================================================

/// Field names of `ExtraColumns` a single extras frame populates.
fn extras_fields(columns: &ExtraColumns) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if columns.active_filter_tags.is_some() {
        fields.push("activeFilterTags");
    }
    if columns.first_tag.is_some() {
        fields.push("firstTag");
    }
    if columns.second_tag.is_some() {
        fields.push("secondTag");
    }
    if columns
        .updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time
        .is_some()
    {
        fields.push("updatedTimestampMillisOfNmrDueToMinStableCrhTime");
    }
    if columns.unlocked_rating_status.is_some() {
        fields.push("unlockedRatingStatus");
    }
    fields
}

fn merge_extras(target: &mut ExtraColumns, incoming: ExtraColumns) {
    if incoming.active_filter_tags.is_some() {
        target.active_filter_tags = incoming.active_filter_tags;
    }
    if incoming.first_tag.is_some() {
        target.first_tag = incoming.first_tag;
    }
    if incoming.second_tag.is_some() {
        target.second_tag = incoming.second_tag;
    }
    if incoming
        .updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time
        .is_some()
    {
        target.updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time =
            incoming.updated_timestamp_millis_of_nmr_due_to_min_stable_crh_time;
    }
    if incoming.unlocked_rating_status.is_some() {
        target.unlocked_rating_status = incoming.unlocked_rating_status;
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Apply scoring rules in order and return the scored-notes table.
///
/// Guarantees, for any legal rule list and input frame:
/// - every input note receives exactly one final status drawn from
///   CRH / CRNH / NMR (the internal firm-reject status never escapes);
/// - every input note has a non-empty attribution list in rule order,
///   whose last element is the deciding rule;
/// - reruns over identical inputs produce identical output.
pub fn apply_scoring_rules(
    note_stats: &NoteStatsFrame,
    rules: &[Box<dyn ScoringRule>],
    export: &ExportColumns,
) -> Result<ScoredNotes, ScoringError> {
    let mut labels = CurrentLabels::new();
    let mut attributions: HashMap<NoteId, Vec<RuleId>> =
        HashMap::with_capacity(note_stats.len());
    let mut extra_columns: HashMap<NoteId, ExtraColumns> = HashMap::new();
    let mut contributed_fields: HashSet<&'static str> = HashSet::new();
    let mut prior_rules: HashSet<RuleId> = HashSet::with_capacity(rules.len());

    tracing::info!(
        notes = note_stats.len(),
        rules = rules.len(),
        status_column = %export.status,
        "applying scoring rules"
    );

    for rule in rules {
        let rule_id = rule.rule_id();
        tracing::info!(rule = %rule.name(), "applying scoring rule");
        rule.check_dependencies(&prior_rules)?;
        if !prior_rules.insert(rule_id) {
            return Err(ScoringError::DuplicateRule { rule: rule_id });
        }
        let missing = note_stats.missing_columns(&rule.required_columns());
        if !missing.is_empty() {
            return Err(ScoringError::SchemaMismatch {
                rule: rule_id,
                detail: format!("frame does not declare required columns: {missing:?}"),
            });
        }

        let (updates, extras) = rule.score_notes(note_stats, &labels)?;

        if let Some(dup) = updates.first_duplicate() {
            return Err(ScoringError::InvariantViolation {
                rule: Some(rule_id),
                note_id: Some(dup),
                detail: "duplicate noteId in rule status updates".to_string(),
            });
        }
        for update in updates.iter() {
            if !note_stats.contains(update.note_id) {
                return Err(ScoringError::InvariantViolation {
                    rule: Some(rule_id),
                    note_id: Some(update.note_id),
                    detail: "rule updated a note absent from the input frame".to_string(),
                });
            }
        }
        if let Some(extras) = &extras {
            // The stable-CRH time gate updates status and bookkeeping on
            // different row sets; every other rule must keep them equal.
            if rule_id != RuleId::NmrDueToMinStableCrhTime
                && updates.note_ids() != extras.note_ids()
            {
                return Err(ScoringError::InvariantViolation {
                    rule: Some(rule_id),
                    note_id: None,
                    detail: "extras noteId set differs from status update set".to_string(),
                });
            }
        }

        labels.upsert(&updates);
        for update in updates.iter() {
            attributions
                .entry(update.note_id)
                .or_default()
                .push(rule_id);
        }
        tracing::debug!(rule = %rule.name(), impacted = updates.len(), "rule applied");

        if let Some(extras) = extras {
            let mut fields: HashSet<&'static str> = HashSet::new();
            for (note_id, columns) in extras.iter() {
                if !note_stats.contains(*note_id) {
                    return Err(ScoringError::InvariantViolation {
                        rule: Some(rule_id),
                        note_id: Some(*note_id),
                        detail: "rule emitted extras for a note absent from the input frame"
                            .to_string(),
                    });
                }
                fields.extend(extras_fields(columns));
            }
            // Each extra column belongs to exactly one rule per run, like
            // a join that refuses overlapping column names.
            if let Some(clash) = fields.iter().find(|f| contributed_fields.contains(*f)) {
                return Err(ScoringError::InvariantViolation {
                    rule: Some(rule_id),
                    note_id: None,
                    detail: format!("extra column {clash} was already contributed by a prior rule"),
                });
            }
            contributed_fields.extend(fields);
            for (note_id, columns) in extras.iter() {
                merge_extras(
                    extra_columns.entry(*note_id).or_default(),
                    columns.clone(),
                );
            }
        }
    }

    // Finalization: every input note must carry a label and at least one
    // attribution entry, and only exportable statuses may leave.
    let mut notes = Vec::with_capacity(note_stats.len());
    for row in note_stats.rows() {
        let status = labels.status(row.note_id).ok_or_else(|| {
            ScoringError::InvariantViolation {
                rule: None,
                note_id: Some(row.note_id),
                detail: "note received no status from any rule".to_string(),
            }
        })?;
        let active_rules = attributions.remove(&row.note_id).ok_or_else(|| {
            ScoringError::InvariantViolation {
                rule: None,
                note_id: Some(row.note_id),
                detail: "note has no rule attribution".to_string(),
            }
        })?;
        let status = status.exportable();
        debug_assert!(status.is_exportable());
        notes.push(ScoredNote {
            stats: row.clone(),
            status,
            currently_rated_helpful: status == Status::CurrentlyRatedHelpful,
            currently_rated_not_helpful: status == Status::CurrentlyRatedNotHelpful,
            awaiting_more_ratings: status == Status::NeedsMoreRatings,
            active_rules,
            extras: extra_columns.remove(&row.note_id).unwrap_or_default(),
        });
    }

    tracing::info!(scored = notes.len(), "scoring rules applied");
    Ok(ScoredNotes::from_notes(notes))
}
