//! Intermediate composition output: accepted categories with roles, merged
//! prompts, adapters and settings, plus every conflict and warning raised on
//! the way.

use crate::category::{AdapterRole, CategoryType};
use crate::error::UnknownTagError;
use crate::request::MatchKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The role a category plays in a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PrimarySubject,
    SecondarySubject,
    Setting,
    Modifier,
    Style,
}

impl Role {
    /// Role of a non-subject category type. Subjects are assigned explicitly.
    pub fn for_type(kind: CategoryType) -> Self {
        match kind {
            CategoryType::Subject => Self::SecondarySubject,
            CategoryType::Setting => Self::Setting,
            CategoryType::Modifier => Self::Modifier,
            CategoryType::Style => Self::Style,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PrimarySubject => "primary_subject",
            Self::SecondarySubject => "secondary_subject",
            Self::Setting => "setting",
            Self::Modifier => "modifier",
            Self::Style => "style",
        };
        f.write_str(s)
    }
}

/// A category that survived resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedCategory {
    pub id: String,
    pub kind: CategoryType,
    pub role: Role,
    pub priority: i32,
    pub match_kind: MatchKind,
    pub confidence: f64,
    /// Accepted categories that declare they enhance this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enhanced_by: Vec<String>,
}

/// What a conflict resolution removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSubject {
    Category,
    Adapter,
}

/// A record of one conflict and how it was settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// The category that won.
    pub kept: String,
    /// The category (or adapter) that was removed.
    pub dropped: String,
    pub subject: ConflictSubject,
    pub reason: String,
}

/// Non-fatal findings. Every warning is also recorded in the explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum Warning {
    ConflictResolved(ConflictResolution),
    AdapterCapExceeded {
        cap: usize,
        dropped: Vec<String>,
    },
    DependencyMissing {
        category: String,
        missing: Vec<String>,
    },
    SecondaryExcluded {
        category: String,
        primary: String,
        max_per_type: u32,
    },
    CardinalityExceeded {
        category: String,
        kind: CategoryType,
        max_per_type: u32,
    },
    PolicyExcluded {
        category: String,
        required_tier: String,
        active_tier: String,
    },
    SettingRangeConflict {
        setting: String,
        category: String,
    },
    StrengthDiscrepancy {
        adapter: String,
        kept_from: String,
        kept_strength: f64,
        ignored_from: String,
        ignored_strength: f64,
    },
    UnknownTag(UnknownTagError),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictResolved(c) => write!(
                f,
                "kept '{}' over '{}': {}",
                c.kept, c.dropped, c.reason
            ),
            Self::AdapterCapExceeded { cap, dropped } => write!(
                f,
                "adapter cap {cap} exceeded, dropped [{}]",
                dropped.join(", ")
            ),
            Self::DependencyMissing { category, missing } => write!(
                f,
                "dropped '{category}': missing required [{}]",
                missing.join(", ")
            ),
            Self::SecondaryExcluded { category, primary, max_per_type } => write!(
                f,
                "excluded subject '{category}': primary '{primary}' allows {max_per_type} subject(s)"
            ),
            Self::CardinalityExceeded { category, kind, max_per_type } => write!(
                f,
                "excluded {kind} '{category}': at most {max_per_type} allowed"
            ),
            Self::PolicyExcluded { category, required_tier, active_tier } => write!(
                f,
                "excluded '{category}': requires tier '{required_tier}', active tier is '{active_tier}'"
            ),
            Self::SettingRangeConflict { setting, category } => write!(
                f,
                "'{category}' range for '{setting}' is incompatible, kept existing range"
            ),
            Self::StrengthDiscrepancy {
                adapter,
                kept_from,
                kept_strength,
                ignored_from,
                ignored_strength,
            } => write!(
                f,
                "adapter '{adapter}': kept {kept_strength} from '{kept_from}', ignored {ignored_strength} from '{ignored_from}'"
            ),
            Self::UnknownTag(e) => write!(f, "{e}"),
        }
    }
}

/// An adapter in the merged stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedAdapter {
    pub name: String,
    pub strength: f64,
    pub role: AdapterRole,
    /// Category whose declaration placed the adapter in the stack.
    pub source: String,
}

/// A merged numeric setting with the range it was narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergedSetting {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// The full output of resolution and merging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositionResult {
    pub accepted: Vec<AcceptedCategory>,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub adapters: Vec<MergedAdapter>,
    pub settings: BTreeMap<String, MergedSetting>,
    pub warnings: Vec<Warning>,
}

impl CompositionResult {
    pub fn primary_subject(&self) -> Option<&AcceptedCategory> {
        self.accepted.iter().find(|c| c.role == Role::PrimarySubject)
    }

    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.accepted.iter().find(|c| c.id == id).map(|c| c.role)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ConflictResolution> {
        self.warnings.iter().filter_map(|w| match w {
            Warning::ConflictResolved(c) => Some(c),
            _ => None,
        })
    }
}
