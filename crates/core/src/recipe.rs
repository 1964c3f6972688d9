//! The final, immutable recipe and its provenance fingerprints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fully specified generation request, ready for the execution collaborator.
///
/// Fields are private; a recipe is only built by the assembler and read
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    template_id: String,
    positive_prompt: String,
    negative_prompt: String,
    adapters: Vec<RecipeAdapter>,
    settings: BTreeMap<String, f64>,
    categories: Vec<String>,
}

/// An adapter entry in a recipe, in stacking order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeAdapter {
    pub name: String,
    pub strength: f64,
}

impl Recipe {
    pub fn new(
        template_id: String,
        positive_prompt: String,
        negative_prompt: String,
        adapters: Vec<RecipeAdapter>,
        settings: BTreeMap<String, f64>,
        categories: Vec<String>,
    ) -> Self {
        Self {
            template_id,
            positive_prompt,
            negative_prompt,
            adapters,
            settings,
            categories,
        }
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn positive_prompt(&self) -> &str {
        &self.positive_prompt
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn adapters(&self) -> &[RecipeAdapter] {
        &self.adapters
    }

    pub fn settings(&self) -> &BTreeMap<String, f64> {
        &self.settings
    }

    /// Category ids used, in composition order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

/// Fingerprints used by the tracking collaborator to detect drift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceHashes {
    pub recipe_hash: String,
    pub category_set_hash: String,
    /// Registry schema version at composition time.
    pub schema_version: u32,
}
