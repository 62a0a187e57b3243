//! Rating Status Vocabulary
//!
//! Closed enumerations for note rating statuses, note classifications and
//! topic assignments. These are typed end to end inside the engine; the
//! string forms exist only for the TSV boundary and are parsed/printed here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final or intermediate rating status of a note.
///
/// `FirmReject` is internal-only: it blocks downstream promotion to CRH and
/// must be rewritten to `NeedsMoreRatings` before any status leaves the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    CurrentlyRatedHelpful,
    CurrentlyRatedNotHelpful,
    NeedsMoreRatings,
    FirmReject,
}

impl Status {
    /// Wire token used in upstream and downstream TSV data.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentlyRatedHelpful => "CURRENTLY_RATED_HELPFUL",
            Self::CurrentlyRatedNotHelpful => "CURRENTLY_RATED_NOT_HELPFUL",
            Self::NeedsMoreRatings => "NEEDS_MORE_RATINGS",
            Self::FirmReject => "FIRM_REJECT",
        }
    }

    /// Parse a wire token. Unknown tokens are a domain error, not a default.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "CURRENTLY_RATED_HELPFUL" => Some(Self::CurrentlyRatedHelpful),
            "CURRENTLY_RATED_NOT_HELPFUL" => Some(Self::CurrentlyRatedNotHelpful),
            "NEEDS_MORE_RATINGS" => Some(Self::NeedsMoreRatings),
            "FIRM_REJECT" => Some(Self::FirmReject),
            _ => None,
        }
    }

    /// True for the statuses allowed to leave the engine.
    #[inline]
    pub fn is_exportable(&self) -> bool {
        !matches!(self, Self::FirmReject)
    }

    /// Rewrite the internal-only status to its exportable form.
    #[inline]
    pub fn exportable(self) -> Self {
        match self {
            Self::FirmReject => Self::NeedsMoreRatings,
            other => other,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author classification of the annotated post.
///
/// A missing classification (deleted note) is represented as `None` at the
/// field level, never as a sentinel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Misleading,
    NotMisleading,
}

impl Classification {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Misleading => "MISLEADING",
            Self::NotMisleading => "NOT_MISLEADING",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "MISLEADING" => Some(Self::Misleading),
            "NOT_MISLEADING" => Some(Self::NotMisleading),
            _ => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topics with dedicated topic models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteTopic {
    UkraineConflict,
    GazaConflict,
    MessiRonaldo,
    Scams,
}

impl NoteTopic {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UkraineConflict => "UkraineConflict",
            Self::GazaConflict => "GazaConflict",
            Self::MessiRonaldo => "MessiRonaldo",
            Self::Scams => "Scams",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "UkraineConflict" => Some(Self::UkraineConflict),
            "GazaConflict" => Some(Self::GazaConflict),
            "MessiRonaldo" => Some(Self::MessiRonaldo),
            "Scams" => Some(Self::Scams),
            _ => None,
        }
    }
}

impl fmt::Display for NoteTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
