//! The composition pipeline.
//!
//! Registry snapshot → parse → policy (pre) → resolve → merge → select →
//! assemble → policy (post) → fingerprint. Every stage appends to one
//! explanation, and nothing calls back into an earlier stage.

use promptsmith_config::EngineConfig;
use promptsmith_core::{
    CompositionRequest, CompositionResult, Error, ExplanationBlock, ExplanationBuilder, Phase,
    ProvenanceHashes, Recipe, Result, UnknownTagError, Warning,
};
use promptsmith_policy::PolicyGate;
use promptsmith_registry::RegistrySnapshot;
use serde::Serialize;
use tracing::{debug, info};

use crate::assembler::assemble;
use crate::merger::Merger;
use crate::parser::RequestParser;
use crate::provenance;
use crate::resolver::resolve;
use crate::selector::{Requirements, TemplateSelector, fit_adapters};

/// Everything produced for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    pub recipe: Recipe,
    pub explanation: ExplanationBlock,
    pub provenance: ProvenanceHashes,
    /// Accepted categories (prompt order), merged output and all warnings.
    pub result: CompositionResult,
    pub unknown_tags: Vec<UnknownTagError>,
    /// Tier the request ran at.
    pub tier: String,
    /// Soft score of the selected template.
    pub template_score: f64,
}

impl Composition {
    pub fn warnings(&self) -> &[Warning] {
        &self.result.warnings
    }

    /// One-paragraph description for front ends.
    pub fn summary(&self) -> String {
        let categories: Vec<String> = self
            .result
            .accepted
            .iter()
            .map(|c| format!("{} ({})", c.id, c.role))
            .collect();
        let adapters: Vec<String> = self
            .recipe
            .adapters()
            .iter()
            .map(|a| format!("{}@{:.2}", a.name, a.strength))
            .collect();
        let mut text = format!(
            "Template '{}' at tier '{}' with {}. Adapters: {}.",
            self.recipe.template_id(),
            self.tier,
            categories.join(", "),
            if adapters.is_empty() {
                "none".to_string()
            } else {
                adapters.join(", ")
            }
        );
        if !self.result.warnings.is_empty() {
            text.push_str(&format!(" {} warning(s).", self.result.warnings.len()));
        }
        text
    }
}

/// Stateless composer. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct Composer {
    config: EngineConfig,
    parser: RequestParser,
    gate: PolicyGate,
}

impl Composer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            parser: RequestParser::new(config.parser.clone()),
            gate: PolicyGate::new(config.policy.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compose a recipe for `request` against `snapshot`.
    pub fn compose(
        &self,
        snapshot: &RegistrySnapshot,
        request: &CompositionRequest,
    ) -> Result<Composition> {
        let mut explain = ExplanationBuilder::new();
        let tier = self.gate.active_tier(request.tier.as_deref())?;
        explain.record(Phase::PolicyPre, "tier", format!("active tier '{tier}'"), None);

        let parsed = self.parser.parse(snapshot, &request.text, &mut explain);
        let mut warnings: Vec<Warning> = parsed
            .unknown_tags
            .iter()
            .cloned()
            .map(Warning::UnknownTag)
            .collect();

        let filtered = self.gate.pre_filter(
            parsed.candidates,
            |id| snapshot.get(id),
            &tier,
            &mut explain,
        );
        warnings.extend(filtered.warnings);

        let resolution = resolve(snapshot, filtered.kept, &mut explain).map_err(|mut e| {
            let mut exclusions: Vec<String> = warnings.iter().map(ToString::to_string).collect();
            exclusions.append(&mut e.exclusions);
            e.exclusions = exclusions;
            Error::EmptyComposition(e)
        })?;
        warnings.extend(resolution.warnings.iter().cloned());

        let cap = self
            .config
            .composition
            .cap_for(request.base_family.as_deref());
        let mut merged = Merger::new(&self.config.composition).merge(
            snapshot,
            &resolution.accepted,
            cap,
            &mut explain,
        );

        let modality = request
            .modality
            .as_deref()
            .unwrap_or(self.config.selection.default_modality.as_str());
        let defs = resolution.accepted.iter().filter_map(|a| snapshot.get(&a.id));
        let requirements = Requirements::gather(
            defs,
            modality,
            request.base_family.as_deref(),
            &merged.adapters,
        );
        debug!(?requirements, "Template requirements");
        let selection = TemplateSelector::new(&self.config.selection).select(
            snapshot,
            &resolution.accepted,
            &requirements,
            &mut explain,
        )?;
        fit_adapters(&mut merged, selection.template, &mut explain);
        warnings.extend(merged.warnings.iter().cloned());

        let ordered = resolution.in_prompt_order();
        let recipe = assemble(&selection.template.id, &merged, &ordered, &mut explain);

        self.gate.post_check(
            &tier,
            recipe.template_id(),
            recipe.adapters().iter().map(|a| a.name.as_str()),
            &mut explain,
        )?;

        let provenance = provenance::fingerprint(
            &recipe,
            ordered.iter().filter_map(|a| snapshot.get(&a.id)),
            snapshot.schema_version(),
        );

        let result = CompositionResult {
            accepted: ordered.into_iter().cloned().collect(),
            positive_prompt: merged.positive_prompt,
            negative_prompt: merged.negative_prompt,
            adapters: merged.adapters,
            settings: merged.settings,
            warnings,
        };

        info!(
            template = %recipe.template_id(),
            categories = result.accepted.len(),
            adapters = recipe.adapters().len(),
            warnings = result.warnings.len(),
            recipe_hash = %provenance.recipe_hash,
            "Composition complete"
        );

        Ok(Composition {
            template_score: selection.score,
            recipe,
            explanation: explain.finish(),
            provenance,
            result,
            unknown_tags: parsed.unknown_tags,
            tier,
        })
    }
}
