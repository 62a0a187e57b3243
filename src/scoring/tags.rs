//! Rating Tag Vocabulary
//!
//! The closed sets of helpful / not-helpful rating tags, in two canonical
//! orders each:
//!
//! - **TSV order**: the column order of the upstream ratings export. Tag
//!   aggregates are stored in arrays indexed by TSV position, and the
//!   tag-outlier filter walks tags in this order (it determines the order
//!   of the joined `activeFilterTags` string).
//! - **Tie-break order**: the priority order used when selecting top
//!   explanation tags with equal counts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of helpful rating tags.
pub const HELPFUL_TAG_COUNT: usize = 9;
/// Number of not-helpful rating tags.
pub const NOT_HELPFUL_TAG_COUNT: usize = 13;

/// Helpful rating tags, declared in TSV column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HelpfulTag {
    Other,
    Informative,
    Clear,
    Empathetic,
    GoodSources,
    UniqueContext,
    AddressesClaim,
    ImportantContext,
    UnbiasedLanguage,
}

/// Not-helpful rating tags, declared in TSV column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotHelpfulTag {
    Other,
    Incorrect,
    SourcesMissingOrUnreliable,
    OpinionSpeculationOrBias,
    MissingKeyPoints,
    Outdated,
    HardToUnderstand,
    ArgumentativeOrBiased,
    OffTopic,
    SpamHarassmentOrAbuse,
    IrrelevantSources,
    OpinionSpeculation,
    NoteNotNeeded,
}

/// Helpful tags in TSV column order.
pub const HELPFUL_TAGS_TSV_ORDER: [HelpfulTag; HELPFUL_TAG_COUNT] = [
    HelpfulTag::Other,
    HelpfulTag::Informative,
    HelpfulTag::Clear,
    HelpfulTag::Empathetic,
    HelpfulTag::GoodSources,
    HelpfulTag::UniqueContext,
    HelpfulTag::AddressesClaim,
    HelpfulTag::ImportantContext,
    HelpfulTag::UnbiasedLanguage,
];

/// Helpful tags in tie-break priority order (highest priority first).
pub const HELPFUL_TAGS_TIEBREAK_ORDER: [HelpfulTag; HELPFUL_TAG_COUNT] = [
    HelpfulTag::Other,
    HelpfulTag::UnbiasedLanguage,
    HelpfulTag::UniqueContext,
    HelpfulTag::Empathetic,
    HelpfulTag::GoodSources,
    HelpfulTag::AddressesClaim,
    HelpfulTag::ImportantContext,
    HelpfulTag::Clear,
    HelpfulTag::Informative,
];

/// Not-helpful tags in TSV column order.
pub const NOT_HELPFUL_TAGS_TSV_ORDER: [NotHelpfulTag; NOT_HELPFUL_TAG_COUNT] = [
    NotHelpfulTag::Other,
    NotHelpfulTag::Incorrect,
    NotHelpfulTag::SourcesMissingOrUnreliable,
    NotHelpfulTag::OpinionSpeculationOrBias,
    NotHelpfulTag::MissingKeyPoints,
    NotHelpfulTag::Outdated,
    NotHelpfulTag::HardToUnderstand,
    NotHelpfulTag::ArgumentativeOrBiased,
    NotHelpfulTag::OffTopic,
    NotHelpfulTag::SpamHarassmentOrAbuse,
    NotHelpfulTag::IrrelevantSources,
    NotHelpfulTag::OpinionSpeculation,
    NotHelpfulTag::NoteNotNeeded,
];

/// Not-helpful tags in tie-break priority order (highest priority first).
pub const NOT_HELPFUL_TAGS_TIEBREAK_ORDER: [NotHelpfulTag; NOT_HELPFUL_TAG_COUNT] = [
    NotHelpfulTag::Other,
    NotHelpfulTag::IrrelevantSources,
    NotHelpfulTag::SourcesMissingOrUnreliable,
    NotHelpfulTag::OpinionSpeculation,
    NotHelpfulTag::OpinionSpeculationOrBias,
    NotHelpfulTag::MissingKeyPoints,
    NotHelpfulTag::NoteNotNeeded,
    NotHelpfulTag::ArgumentativeOrBiased,
    NotHelpfulTag::Incorrect,
    NotHelpfulTag::OffTopic,
    NotHelpfulTag::HardToUnderstand,
    NotHelpfulTag::SpamHarassmentOrAbuse,
    NotHelpfulTag::Outdated,
];

impl HelpfulTag {
    /// TSV column key, e.g. `"helpfulGoodSources"`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Other => "helpfulOther",
            Self::Informative => "helpfulInformative",
            Self::Clear => "helpfulClear",
            Self::Empathetic => "helpfulEmpathetic",
            Self::GoodSources => "helpfulGoodSources",
            Self::UniqueContext => "helpfulUniqueContext",
            Self::AddressesClaim => "helpfulAddressesClaim",
            Self::ImportantContext => "helpfulImportantContext",
            Self::UnbiasedLanguage => "helpfulUnbiasedLanguage",
        }
    }

    /// Position in TSV order; index into per-note count arrays.
    #[inline]
    pub fn index(&self) -> usize {
        HELPFUL_TAGS_TSV_ORDER
            .iter()
            .position(|t| t == self)
            .expect("tag present in TSV order")
    }
}

impl NotHelpfulTag {
    /// TSV column key, e.g. `"notHelpfulArgumentativeOrBiased"`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Other => "notHelpfulOther",
            Self::Incorrect => "notHelpfulIncorrect",
            Self::SourcesMissingOrUnreliable => "notHelpfulSourcesMissingOrUnreliable",
            Self::OpinionSpeculationOrBias => "notHelpfulOpinionSpeculationOrBias",
            Self::MissingKeyPoints => "notHelpfulMissingKeyPoints",
            Self::Outdated => "notHelpfulOutdated",
            Self::HardToUnderstand => "notHelpfulHardToUnderstand",
            Self::ArgumentativeOrBiased => "notHelpfulArgumentativeOrBiased",
            Self::OffTopic => "notHelpfulOffTopic",
            Self::SpamHarassmentOrAbuse => "notHelpfulSpamHarassmentOrAbuse",
            Self::IrrelevantSources => "notHelpfulIrrelevantSources",
            Self::OpinionSpeculation => "notHelpfulOpinionSpeculation",
            Self::NoteNotNeeded => "notHelpfulNoteNotNeeded",
        }
    }

    /// Position in TSV order; index into per-note count and aggregate arrays.
    #[inline]
    pub fn index(&self) -> usize {
        NOT_HELPFUL_TAGS_TSV_ORDER
            .iter()
            .position(|t| t == self)
            .expect("tag present in TSV order")
    }

    /// Key of the rater-weight-adjusted aggregate column for this tag.
    pub fn adjusted_key(&self) -> String {
        format!("{}Adjusted", self.key())
    }

    /// Key of the adjusted-ratio aggregate column for this tag.
    pub fn adjusted_ratio_key(&self) -> String {
        format!("{}AdjustedRatio", self.key())
    }
}

impl fmt::Display for HelpfulTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl fmt::Display for NotHelpfulTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A rating tag from either vocabulary, used where a caller supplies a
/// custom tag set for top-tag selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatingTag {
    Helpful(HelpfulTag),
    NotHelpful(NotHelpfulTag),
}

impl RatingTag {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Helpful(t) => t.key(),
            Self::NotHelpful(t) => t.key(),
        }
    }
}

impl fmt::Display for RatingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Select up to two top tags for a note.
///
/// `order` embodies the tie-break priority (earlier wins on equal counts)
/// and `count_of` supplies the per-note count for each tag. Tags whose
/// count falls below `min_ratings` are ignored entirely.
pub fn top_two_tags(
    order: &[RatingTag],
    count_of: impl Fn(RatingTag) -> f64,
    min_ratings: f64,
) -> (Option<RatingTag>, Option<RatingTag>) {
    let mut first: Option<(RatingTag, f64)> = None;
    let mut second: Option<(RatingTag, f64)> = None;
    for &tag in order {
        let count = count_of(tag);
        // Written as a negated `>=` so NaN counts (missing aggregates) are skipped.
        if !(count >= min_ratings) {
            continue;
        }
        // Strict comparisons keep earlier tags in `order` ahead on ties.
        match first {
            Some((_, best)) if count <= best => match second {
                Some((_, runner_up)) if count <= runner_up => {}
                _ => second = Some((tag, count)),
            },
            Some(prev) => {
                second = Some(prev);
                first = Some((tag, count));
            }
            None => first = Some((tag, count)),
        }
    }
    (first.map(|(t, _)| t), second.map(|(t, _)| t))
}
