//! Template selection: hard-constraint filter, then soft scoring.

use promptsmith_config::SelectionConfig;
use promptsmith_core::{
    AcceptedCategory, CategoryDefinition, ExplanationBuilder, HardConstraint, MergedAdapter,
    Phase, TemplateManifest, TemplateRejection, TemplateSelectionError, Warning,
};
use promptsmith_registry::RegistrySnapshot;
use std::collections::{BTreeMap, BTreeSet};

use crate::merger::Merged;

/// What the accepted categories and the request demand from a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirements {
    pub modality: String,
    /// Allowed base families; `None` means any.
    pub base_families: Option<BTreeSet<String>>,
    pub capabilities: BTreeSet<String>,
    /// Excluded template id → first category excluding it.
    pub excluded: BTreeMap<String, String>,
    /// Stacked adapters some accepted category requires; a template must hold them all.
    pub required_adapters: usize,
}

impl Requirements {
    /// Merge template requirements of `defs` (in rank order) over the merged `stack`.
    pub fn gather<'a>(
        defs: impl IntoIterator<Item = &'a CategoryDefinition>,
        modality: &str,
        base_family: Option<&str>,
        stack: &[MergedAdapter],
    ) -> Self {
        let mut req = Self {
            modality: modality.to_string(),
            base_families: base_family.map(|f| BTreeSet::from([f.to_string()])),
            capabilities: BTreeSet::new(),
            excluded: BTreeMap::new(),
            required_adapters: 0,
        };
        let mut required: BTreeSet<&'a str> = BTreeSet::new();
        for def in defs {
            required.extend(def.adapters.required.iter().map(|a| a.name.as_str()));
            let prefs = &def.templates;
            req.capabilities
                .extend(prefs.required_capabilities.iter().cloned());
            for template in &prefs.excluded {
                req.excluded
                    .entry(template.clone())
                    .or_insert_with(|| def.id.clone());
            }
            if !prefs.base_families.is_empty() {
                let declared: BTreeSet<String> = prefs.base_families.iter().cloned().collect();
                req.base_families = Some(match req.base_families.take() {
                    Some(current) => current.intersection(&declared).cloned().collect(),
                    None => declared,
                });
            }
        }
        req.required_adapters = stack
            .iter()
            .filter(|a| required.contains(a.name.as_str()))
            .count();
        req
    }

    /// Every hard constraint `template` fails.
    pub fn check(&self, template: &TemplateManifest) -> Vec<HardConstraint> {
        let mut failed = Vec::new();
        if template.modality != self.modality {
            failed.push(HardConstraint::Modality {
                required: self.modality.clone(),
                offered: template.modality.clone(),
            });
        }
        if let Some(families) = &self.base_families {
            if !template.base_families.iter().any(|f| families.contains(f)) {
                failed.push(HardConstraint::BaseFamily {
                    required: families.iter().cloned().collect(),
                    offered: template.base_families.clone(),
                });
            }
        }
        let missing: Vec<String> = self
            .capabilities
            .difference(&template.capabilities)
            .cloned()
            .collect();
        if !missing.is_empty() {
            failed.push(HardConstraint::MissingCapabilities { missing });
        }
        if self.required_adapters > template.max_adapters as usize {
            failed.push(HardConstraint::AdapterCapacity {
                required: self.required_adapters,
                max: template.max_adapters,
            });
        }
        if let Some(category) = self.excluded.get(&template.id) {
            failed.push(HardConstraint::ExcludedBy {
                category: category.clone(),
            });
        }
        failed
    }
}

/// The chosen template and its soft score.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'s> {
    pub template: &'s TemplateManifest,
    pub score: f64,
}

pub struct TemplateSelector<'c> {
    config: &'c SelectionConfig,
}

impl<'c> TemplateSelector<'c> {
    pub fn new(config: &'c SelectionConfig) -> Self {
        Self { config }
    }

    /// Choose the best template for `accepted` (in rank order).
    pub fn select<'s>(
        &self,
        snapshot: &'s RegistrySnapshot,
        accepted: &[AcceptedCategory],
        requirements: &Requirements,
        explain: &mut ExplanationBuilder,
    ) -> Result<Selection<'s>, TemplateSelectionError> {
        let defs: Vec<&CategoryDefinition> =
            accepted.iter().filter_map(|a| snapshot.get(&a.id)).collect();

        let mut rejections = Vec::new();
        let mut best: Option<Selection<'s>> = None;
        for template in snapshot.templates() {
            let failed = requirements.check(template);
            if !failed.is_empty() {
                let reasons: Vec<String> = failed.iter().map(ToString::to_string).collect();
                explain.record(Phase::Select, "reject", reasons.join("; "), Some(&template.id));
                rejections.push(TemplateRejection {
                    template_id: template.id.clone(),
                    failed,
                });
                continue;
            }

            let score = self.score(template, &defs);
            explain.record(Phase::Select, "score", format!("{score:.2}"), Some(&template.id));
            // Templates iterate in id order, so a strict comparison keeps the
            // lexicographically smallest id on ties.
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(Selection { template, score });
            }
        }

        match best {
            Some(selection) => {
                explain.record(
                    Phase::Select,
                    "choose",
                    format!("highest score {:.2}", selection.score),
                    Some(&selection.template.id),
                );
                Ok(selection)
            }
            None => Err(TemplateSelectionError { rejections }),
        }
    }

    fn score(&self, template: &TemplateManifest, defs: &[&CategoryDefinition]) -> f64 {
        let preference: f64 = defs
            .iter()
            .filter_map(|def| def.templates.preferred.iter().position(|t| *t == template.id))
            .map(|r| self.config.preference_weight / (r as f64 + 1.0))
            .sum();
        let matching_tags = template
            .best_for
            .iter()
            .filter(|tag| {
                defs.iter().any(|def| {
                    def.id == **tag || def.kind.as_str() == tag.as_str() || def.tags.contains(tag)
                })
            })
            .count();
        preference + self.config.best_for_bonus * matching_tags as f64
    }
}

/// Truncate the merged stack to the chosen template's `max_adapters`.
///
/// Adapters are dropped from the end and folded into the single
/// `AdapterCapExceeded` warning, after any adapters the configured cap
/// already dropped.
pub fn fit_adapters(
    merged: &mut Merged,
    template: &TemplateManifest,
    explain: &mut ExplanationBuilder,
) {
    let cap = template.max_adapters as usize;
    if merged.adapters.len() <= cap {
        return;
    }
    let mut dropped: Vec<String> = merged.adapters.drain(cap..).map(|a| a.name).collect();
    explain.record(
        Phase::Select,
        "truncate",
        format!("template caps at {cap}, dropped [{}]", dropped.join(", ")),
        Some(&template.id),
    );
    let earlier = merged.warnings.iter_mut().find_map(|w| match w {
        Warning::AdapterCapExceeded { cap: c, dropped: d } => Some((c, d)),
        _ => None,
    });
    match earlier {
        Some((earlier_cap, earlier_dropped)) => {
            *earlier_cap = cap;
            dropped.append(earlier_dropped);
            *earlier_dropped = dropped;
        }
        None => merged.warnings.push(Warning::AdapterCapExceeded { cap, dropped }),
    }
}
