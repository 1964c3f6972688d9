//! Incoming generation requests and the candidate matches parsed from them.

use serde::{Deserialize, Serialize};

/// A free-form generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionRequest {
    /// Natural text, optionally containing explicit markers (`@portrait`).
    pub text: String,

    /// Active content tier. Falls back to the configured default tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,

    /// Required output modality. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,

    /// Base model family the recipe must target, if the caller cares.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_family: Option<String>,
}

impl CompositionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = Some(modality.into());
        self
    }

    pub fn with_base_family(mut self, family: impl Into<String>) -> Self {
        self.base_family = Some(family.into());
        self
    }
}

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Explicit,
    Inferred,
}

/// A category the parser believes the request refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub category_id: String,
    /// Confidence in `[0.0, 1.0]`; explicit markers are always `1.0`.
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub kind: MatchKind,
}

impl CandidateMatch {
    pub fn explicit(category_id: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            confidence: 1.0,
            matched_keywords: vec![marker.into()],
            kind: MatchKind::Explicit,
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.kind == MatchKind::Explicit
    }
}
