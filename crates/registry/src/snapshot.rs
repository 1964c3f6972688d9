//! Immutable registry snapshot.

use chrono::{DateTime, Utc};
use promptsmith_core::{CategoryDefinition, CategoryType, TemplateManifest};
use std::collections::BTreeMap;

use crate::index::KeywordIndex;

/// One immutable, fully validated set of definitions.
///
/// Every listing is in id order so that anything iterating a snapshot is
/// deterministic.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    categories: BTreeMap<String, CategoryDefinition>,
    templates: BTreeMap<String, TemplateManifest>,
    index: KeywordIndex,
    schema_version: u32,
    generation: u64,
    loaded_at: DateTime<Utc>,
    document_count: usize,
}

impl RegistrySnapshot {
    pub(crate) fn new(
        categories: BTreeMap<String, CategoryDefinition>,
        templates: BTreeMap<String, TemplateManifest>,
        schema_version: u32,
        document_count: usize,
    ) -> Self {
        let index = KeywordIndex::build(categories.values());
        Self {
            categories,
            templates,
            index,
            schema_version,
            generation: 0,
            loaded_at: Utc::now(),
            document_count,
        }
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn get(&self, id: &str) -> Option<&CategoryDefinition> {
        self.categories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.categories.contains_key(id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.values()
    }

    pub fn category_ids(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn list_by_type(&self, kind: CategoryType) -> Vec<&CategoryDefinition> {
        self.categories.values().filter(|c| c.kind == kind).collect()
    }

    pub fn list_by_policy_tier(&self, tier: &str) -> Vec<&CategoryDefinition> {
        self.categories
            .values()
            .filter(|c| c.policy_tier == tier)
            .collect()
    }

    pub fn template(&self, id: &str) -> Option<&TemplateManifest> {
        self.templates.get(id)
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateManifest> {
        self.templates.values()
    }

    pub fn keyword_index(&self) -> &KeywordIndex {
        &self.index
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Swap counter assigned by [`crate::RegistryHandle`]; 0 for detached snapshots.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}
