//! Execution template manifests.
//!
//! A manifest describes a generation pipeline's hard constraints and soft
//! preference tags. It is used for selection only; whether the pipeline can
//! actually run is the execution collaborator's concern.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateManifest {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub schema_version: u32,

    /// Output modality ("image", "video", ...).
    pub modality: String,

    /// Base model families this template can drive.
    #[serde(default)]
    pub base_families: Vec<String>,

    /// Capability flags ("inpainting", "controlnet", "hires_fix", ...).
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Hard cap on stacked adapters.
    pub max_adapters: u32,

    /// Soft preference tags matched against accepted categories.
    #[serde(default)]
    pub best_for: Vec<String>,
}

/// A single hard constraint a template failed during selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum HardConstraint {
    Modality { required: String, offered: String },
    BaseFamily { required: Vec<String>, offered: Vec<String> },
    MissingCapabilities { missing: Vec<String> },
    AdapterCapacity { required: usize, max: u32 },
    ExcludedBy { category: String },
}

impl fmt::Display for HardConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modality { required, offered } => {
                write!(f, "modality '{offered}' does not match required '{required}'")
            }
            Self::BaseFamily { required, offered } => write!(
                f,
                "base families [{}] do not include any of [{}]",
                offered.join(", "),
                required.join(", ")
            ),
            Self::MissingCapabilities { missing } => {
                write!(f, "missing capabilities [{}]", missing.join(", "))
            }
            Self::AdapterCapacity { required, max } => {
                write!(f, "needs {required} required adapters but caps at {max}")
            }
            Self::ExcludedBy { category } => write!(f, "excluded by category '{category}'"),
        }
    }
}
