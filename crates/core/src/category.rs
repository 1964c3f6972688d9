//! Category definitions, the declarative building blocks of a recipe.
//!
//! A category is a reusable domain definition (subject, setting, modifier or
//! style) that contributes prompt fragments, adapter recommendations, numeric
//! setting ranges and compatibility rules. Definitions are loaded by the
//! registry and are immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The closed set of category types.
///
/// Each composition phase dispatches on this enum through the small tables
/// below instead of inspecting definitions at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    Subject,
    Setting,
    Modifier,
    Style,
}

impl CategoryType {
    /// All types in prompt order.
    pub const PROMPT_ORDER: [CategoryType; 4] = [
        CategoryType::Subject,
        CategoryType::Setting,
        CategoryType::Modifier,
        CategoryType::Style,
    ];

    /// Position of this type's fragments in the merged prompt (lower = earlier).
    pub fn prompt_rank(self) -> u8 {
        match self {
            Self::Subject => 0,
            Self::Setting => 1,
            Self::Modifier => 2,
            Self::Style => 3,
        }
    }

    /// Adapter role assumed when a recommendation does not declare one.
    pub fn default_adapter_role(self) -> AdapterRole {
        match self {
            Self::Subject => AdapterRole::Identity,
            Self::Setting => AdapterRole::Environment,
            Self::Modifier => AdapterRole::Detail,
            Self::Style => AdapterRole::Style,
        }
    }

    /// Cardinality cap used when a definition does not set `max_per_type`.
    pub fn default_max_per_type(self) -> u32 {
        match self {
            Self::Subject => 2,
            Self::Setting => 1,
            Self::Modifier => 4,
            Self::Style => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Setting => "setting",
            Self::Modifier => "modifier",
            Self::Style => "style",
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The functional role of an adapter in the stack.
///
/// The recommended-adapter ordering is driven by a role-priority table held in
/// configuration; the declaration order here is the default table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterRole {
    Identity,
    Clothing,
    Style,
    Environment,
    Detail,
}

impl AdapterRole {
    pub const DEFAULT_PRIORITY: [AdapterRole; 5] = [
        AdapterRole::Identity,
        AdapterRole::Clothing,
        AdapterRole::Style,
        AdapterRole::Environment,
        AdapterRole::Detail,
    ];
}

impl fmt::Display for AdapterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Clothing => "clothing",
            Self::Style => "style",
            Self::Environment => "environment",
            Self::Detail => "detail",
        };
        f.write_str(s)
    }
}

/// A fully loaded, validated category definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryDefinition {
    /// Unique identifier, also the explicit marker name (`@portrait`).
    pub id: String,

    #[serde(rename = "type")]
    pub kind: CategoryType,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Free-form tags matched against template `best_for` lists.
    #[serde(default)]
    pub tags: Vec<String>,

    pub schema_version: u32,

    /// Minimum content tier required to use this category.
    #[serde(default = "default_policy_tier")]
    pub policy_tier: String,

    #[serde(default)]
    pub keywords: KeywordSet,

    #[serde(default)]
    pub prompts: PromptFragments,

    #[serde(default)]
    pub adapters: AdapterRecommendations,

    #[serde(default)]
    pub settings: BTreeMap<String, SettingRange>,

    #[serde(default)]
    pub templates: TemplatePreferences,

    #[serde(default)]
    pub composition: CompositionRules,

    /// Content digest computed by the registry at load; never authored.
    #[serde(default, skip_deserializing)]
    pub fingerprint: String,
}

pub fn default_policy_tier() -> String {
    "general".into()
}

impl CategoryDefinition {
    pub fn priority(&self) -> i32 {
        self.composition.priority
    }

    /// Effective per-type cardinality cap.
    pub fn max_per_type(&self) -> u32 {
        self.composition
            .max_per_type
            .unwrap_or_else(|| self.kind.default_max_per_type())
    }

    /// Whether either definition declares a conflict with the other.
    pub fn conflicts_with(&self, other: &CategoryDefinition) -> bool {
        self.composition.conflicts_with.contains(&other.id)
            || other.composition.conflicts_with.contains(&self.id)
    }

    /// Whether either definition declares explicit compatibility with the other.
    pub fn compatible_with(&self, other: &CategoryDefinition) -> bool {
        self.composition.compatible_with.contains(&other.id)
            || other.composition.compatible_with.contains(&self.id)
    }

    /// Role of an adapter recommendation, falling back to the type default.
    pub fn adapter_role(&self, adapter: &AdapterRef) -> AdapterRole {
        adapter
            .role
            .unwrap_or_else(|| self.kind.default_adapter_role())
    }

    /// Every id this definition references through composition rules.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &String> {
        let rules = &self.composition;
        rules
            .conflicts_with
            .iter()
            .chain(rules.requires.iter())
            .chain(rules.enhances.iter())
            .chain(rules.compatible_with.iter())
    }
}

/// Keywords at three confidence tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordSet {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    /// Specific multi-word phrases ("golden hour", "studio lighting").
    #[serde(default)]
    pub specific: Vec<String>,
}

/// Confidence tier of a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordTier {
    Specific,
    Primary,
    Secondary,
}

impl KeywordSet {
    /// Iterate over every keyword with its tier.
    pub fn iter(&self) -> impl Iterator<Item = (KeywordTier, &String)> {
        self.specific
            .iter()
            .map(|k| (KeywordTier::Specific, k))
            .chain(self.primary.iter().map(|k| (KeywordTier::Primary, k)))
            .chain(self.secondary.iter().map(|k| (KeywordTier::Secondary, k)))
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty() && self.specific.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptFragments {
    #[serde(default)]
    pub positive: FragmentGroup,
    #[serde(default)]
    pub negative: FragmentGroup,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FragmentGroup {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

/// Adapter recommendations declared by a category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterRecommendations {
    #[serde(default)]
    pub required: Vec<AdapterRef>,
    #[serde(default)]
    pub recommended: Vec<AdapterRef>,
    /// Adapter names that must not appear alongside this category.
    #[serde(default)]
    pub avoid: Vec<String>,
}

/// A single adapter (LoRA) reference with its strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterRef {
    pub name: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AdapterRole>,
}

fn default_strength() -> f64 {
    1.0
}

/// A numeric setting range (`min ≤ default ≤ max`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl SettingRange {
    /// Intersect two ranges. Returns `None` when they do not overlap.
    pub fn intersect(&self, other: &SettingRange) -> Option<(f64, f64)> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some((min, max))
    }
}

/// Template preferences and requirements declared by a category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatePreferences {
    /// Preferred template ids, strongest first.
    #[serde(default)]
    pub preferred: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Compatible base model families. Empty means any.
    #[serde(default)]
    pub base_families: Vec<String>,
}

/// Composition metadata: priority and relationships to other categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositionRules {
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conflicts_with: BTreeSet<String>,
    #[serde(default)]
    pub requires: BTreeSet<String>,
    #[serde(default)]
    pub enhances: BTreeSet<String>,
    /// Categories that may exceed `max_per_type` together with this one.
    #[serde(default)]
    pub compatible_with: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_type: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(id: &str) -> CategoryDefinition {
        CategoryDefinition {
            id: id.into(),
            kind: CategoryType::Style,
            name: String::new(),
            description: String::new(),
            tags: vec![],
            schema_version: 3,
            policy_tier: default_policy_tier(),
            keywords: KeywordSet::default(),
            prompts: PromptFragments::default(),
            adapters: AdapterRecommendations::default(),
            settings: BTreeMap::new(),
            templates: TemplatePreferences::default(),
            composition: CompositionRules::default(),
            fingerprint: String::new(),
        }
    }

    #[test]
    fn conflicts_are_symmetric() {
        let mut anime = style("anime");
        anime.composition.conflicts_with.insert("photo".into());
        let photo = style("photo");
        assert!(anime.conflicts_with(&photo));
        assert!(photo.conflicts_with(&anime));
    }

    #[test]
    fn max_per_type_falls_back_to_type_default() {
        let mut s = style("ink");
        assert_eq!(s.max_per_type(), 2);
        s.composition.max_per_type = Some(1);
        assert_eq!(s.max_per_type(), 1);
    }

    #[test]
    fn adapter_role_defaults_from_type() {
        let s = style("ink");
        let adapter = AdapterRef {
            name: "ink_lines".into(),
            strength: 0.7,
            role: None,
        };
        assert_eq!(s.adapter_role(&adapter), AdapterRole::Style);
    }

    #[test]
    fn range_intersection() {
        let a = SettingRange { min: 20.0, max: 40.0, default: 30.0 };
        let b = SettingRange { min: 30.0, max: 50.0, default: 35.0 };
        assert_eq!(a.intersect(&b), Some((30.0, 40.0)));
        let c = SettingRange { min: 41.0, max: 50.0, default: 45.0 };
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn prompt_order_matches_rank() {
        let ranks: Vec<u8> = CategoryType::PROMPT_ORDER
            .iter()
            .map(|t| t.prompt_rank())
            .collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }
}
