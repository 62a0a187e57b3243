//! Rule Identity
//!
//! Every scoring rule is uniquely tagged by a `(name, version, locking)`
//! triple. The display form `"<name> (v<version>)"` is an interface
//! contract: downstream consumers parse it out of the active-rules and
//! decided-by columns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name, revision and locking metadata for a scoring rule.
///
/// `locking_enabled` is consumed by the external status-locking
/// collaborator which produces the locked-status input for
/// `ScoringDriftGuard`; the engine itself only carries the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleAndVersion {
    pub rule_name: &'static str,
    pub rule_version: &'static str,
    pub locking_enabled: bool,
}

/// Closed catalog of rule identities. Each identity may be assigned to at
/// most one rule instance per engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleId {
    // Rules used by the per-scorer rule lists.
    InitialNmr,
    GeneralCrh,
    GeneralCrnh,
    UcbCrnh,
    TagOutlier,
    ElevatedCrh,
    NmCrnh,
    GeneralCrhInertia,
    ElevatedCrhInertia,
    IncorrectOutlier,
    LowDiligence,
    LargeFactor,
    LowIntercept,

    // Rules used by meta-scoring.
    MetaInitialNmr,
    ExpansionModel,
    ExpansionPlusModel,
    CoreModel,
    CoverageModel,
    GroupModel01,
    GroupModel02,
    GroupModel03,
    GroupModel04,
    GroupModel05,
    GroupModel06,
    GroupModel07,
    GroupModel08,
    GroupModel09,
    GroupModel10,
    GroupModel11,
    GroupModel12,
    GroupModel13,
    GroupModel14,
    TopicModel01,
    TopicModel02,
    TopicModel03,
    MultiGroupModel01,
    InsufficientExplanation,
    ScoringDriftGuard,
    NmrDueToMinStableCrhTime,
}

const fn rv(name: &'static str, version: &'static str, locking: bool) -> RuleAndVersion {
    RuleAndVersion {
        rule_name: name,
        rule_version: version,
        locking_enabled: locking,
    }
}

impl RuleId {
    /// The `(name, version, locking)` triple for this identity.
    pub const fn rule(&self) -> RuleAndVersion {
        match self {
            Self::InitialNmr => rv("InitialNMR", "1.0", false),
            Self::GeneralCrh => rv("GeneralCRH", "1.0", false),
            Self::GeneralCrnh => rv("GeneralCRNH", "1.0", false),
            Self::UcbCrnh => rv("UcbCRNH", "1.0", false),
            Self::TagOutlier => rv("TagFilter", "1.0", false),
            Self::ElevatedCrh => rv("CRHSuperThreshold", "1.0", false),
            Self::NmCrnh => rv("NmCRNH", "1.0", false),
            Self::GeneralCrhInertia => rv("GeneralCRHInertia", "1.0", false),
            Self::ElevatedCrhInertia => rv("ElevatedCRHInertia", "1.0", false),
            Self::IncorrectOutlier => rv("FilterIncorrect", "1.0", false),
            Self::LowDiligence => rv("FilterLowDiligence", "1.0", false),
            Self::LargeFactor => rv("FilterLargeFactor", "1.0", false),
            Self::LowIntercept => rv("RejectLowIntercept", "1.0", false),
            Self::MetaInitialNmr => rv("MetaInitialNMR", "1.0", false),
            Self::ExpansionModel => rv("ExpansionModel", "1.1", false),
            Self::ExpansionPlusModel => rv("ExpansionPlusModel", "1.1", false),
            Self::CoreModel => rv("CoreModel", "1.1", true),
            Self::CoverageModel => rv("CoverageModel", "1.1", false),
            Self::GroupModel01 => rv("GroupModel01", "1.1", true),
            Self::GroupModel02 => rv("GroupModel02", "1.1", true),
            Self::GroupModel03 => rv("GroupModel03", "1.1", true),
            Self::GroupModel04 => rv("GroupModel04", "1.1", false),
            Self::GroupModel05 => rv("GroupModel05", "1.1", false),
            Self::GroupModel06 => rv("GroupModel06", "1.1", true),
            Self::GroupModel07 => rv("GroupModel07", "1.1", false),
            Self::GroupModel08 => rv("GroupModel08", "1.1", true),
            Self::GroupModel09 => rv("GroupModel09", "1.1", true),
            Self::GroupModel10 => rv("GroupModel10", "1.1", true),
            Self::GroupModel11 => rv("GroupModel11", "1.1", true),
            Self::GroupModel12 => rv("GroupModel12", "1.1", false),
            Self::GroupModel13 => rv("GroupModel13", "1.1", true),
            Self::GroupModel14 => rv("GroupModel14", "1.1", true),
            Self::TopicModel01 => rv("TopicModel01", "1.0", false),
            Self::TopicModel02 => rv("TopicModel02", "1.0", false),
            Self::TopicModel03 => rv("TopicModel03", "1.0", false),
            Self::MultiGroupModel01 => rv("MultiGroupModel01", "1.0", false),
            Self::InsufficientExplanation => rv("InsufficientExplanation", "1.0", true),
            Self::ScoringDriftGuard => rv("ScoringDriftGuard", "1.0", false),
            Self::NmrDueToMinStableCrhTime => rv("NmrDueToMinStableCrhTime", "1.0", false),
        }
    }

    /// Display identifier combining name and version, e.g. `"GeneralCRH (v1.0)"`.
    pub fn display_name(&self) -> String {
        let r = self.rule();
        format!("{} (v{})", r.rule_name, r.rule_version)
    }

    /// Group-model identity for a 1-based modeling group number, if one exists.
    pub fn group_model(group_number: i64) -> Option<Self> {
        match group_number {
            1 => Some(Self::GroupModel01),
            2 => Some(Self::GroupModel02),
            3 => Some(Self::GroupModel03),
            4 => Some(Self::GroupModel04),
            5 => Some(Self::GroupModel05),
            6 => Some(Self::GroupModel06),
            7 => Some(Self::GroupModel07),
            8 => Some(Self::GroupModel08),
            9 => Some(Self::GroupModel09),
            10 => Some(Self::GroupModel10),
            11 => Some(Self::GroupModel11),
            12 => Some(Self::GroupModel12),
            13 => Some(Self::GroupModel13),
            14 => Some(Self::GroupModel14),
            _ => None,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.rule();
        write!(f, "{} (v{})", r.rule_name, r.rule_version)
    }
}
