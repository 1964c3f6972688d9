//! The policy gate, applied twice per request.
//!
//! Before composition it removes candidates whose required tier ranks above
//! the active tier. After assembly it checks the selected template and every
//! adapter against the active tier's allow/deny lists.

use promptsmith_config::PolicyConfig;
use promptsmith_core::{
    CandidateMatch, CategoryDefinition, ExplanationBuilder, Phase, PolicyViolationError, Warning,
};
use tracing::debug;

use crate::allowlist::{AllowList, ListCheck};

/// Outcome of the pre-composition filter.
#[derive(Debug, Clone, Default)]
pub struct PreFilter {
    pub kept: Vec<CandidateMatch>,
    /// One `PolicyExcluded` warning per removed candidate.
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone)]
pub struct PolicyGate {
    config: PolicyConfig,
}

impl PolicyGate {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Resolve the tier a request runs at. Unknown tiers are fatal.
    pub fn active_tier(&self, requested: Option<&str>) -> Result<String, PolicyViolationError> {
        let tier = requested.unwrap_or(self.config.default_tier.as_str());
        if self.config.tier_rank(tier).is_none() {
            return Err(PolicyViolationError::UnknownTier(tier.to_string()));
        }
        Ok(tier.to_string())
    }

    /// The tier a category needs, honoring configured overrides.
    pub fn required_tier<'a>(&'a self, def: &'a CategoryDefinition) -> &'a str {
        self.config
            .category_tiers
            .get(&def.id)
            .map(String::as_str)
            .unwrap_or(&def.policy_tier)
    }

    /// Whether `def` may be used at `active_tier`.
    pub fn permits(&self, def: &CategoryDefinition, active_tier: &str) -> bool {
        match (
            self.config.tier_rank(self.required_tier(def)),
            self.config.tier_rank(active_tier),
        ) {
            (Some(required), Some(active)) => required <= active,
            _ => false,
        }
    }

    /// Drop every candidate the active tier does not permit.
    ///
    /// Candidates `lookup` cannot resolve are dropped as well; the parser only
    /// emits known ids, so this only happens for hand-built candidate lists.
    pub fn pre_filter<'a>(
        &self,
        candidates: Vec<CandidateMatch>,
        lookup: impl Fn(&str) -> Option<&'a CategoryDefinition>,
        active_tier: &str,
        explain: &mut ExplanationBuilder,
    ) -> PreFilter {
        let mut out = PreFilter::default();
        for candidate in candidates {
            let Some(def) = lookup(&candidate.category_id) else {
                debug!(category = %candidate.category_id, "Candidate has no definition, skipping");
                continue;
            };
            if self.permits(def, active_tier) {
                out.kept.push(candidate);
                continue;
            }

            let required = self.required_tier(def);
            let reason = if self.config.tier_rank(required).is_none() {
                format!("requires unknown tier '{required}'")
            } else {
                format!("requires tier '{required}' above active tier '{active_tier}'")
            };
            explain.record(Phase::PolicyPre, "exclude", reason, Some(&def.id));
            out.warnings.push(Warning::PolicyExcluded {
                category: def.id.clone(),
                required_tier: required.to_string(),
                active_tier: active_tier.to_string(),
            });
        }
        out
    }

    /// Check the final template and adapters against the active tier.
    ///
    /// Every offending item is reported, not just the first.
    pub fn post_check<'a>(
        &self,
        active_tier: &str,
        template_id: &str,
        adapters: impl IntoIterator<Item = &'a str>,
        explain: &mut ExplanationBuilder,
    ) -> Result<(), PolicyViolationError> {
        let tier = self
            .config
            .tier(active_tier)
            .ok_or_else(|| PolicyViolationError::UnknownTier(active_tier.to_string()))?;

        let mut violations = Vec::new();
        if let ListCheck::Denied { reason, .. } =
            AllowList::check(template_id, &tier.allow_templates, &tier.deny_templates)
        {
            explain.record(Phase::PolicyPost, "deny_template", reason, Some(template_id));
            violations.push(format!("template '{template_id}'"));
        }
        for adapter in adapters {
            if let ListCheck::Denied { reason, .. } =
                AllowList::check(adapter, &tier.allow_adapters, &tier.deny_adapters)
            {
                explain.record(Phase::PolicyPost, "deny_adapter", reason, Some(adapter));
                violations.push(format!("adapter '{adapter}'"));
            }
        }

        if violations.is_empty() {
            explain.record(
                Phase::PolicyPost,
                "pass",
                format!("template and adapters allowed at tier '{active_tier}'"),
                None,
            );
            Ok(())
        } else {
            Err(PolicyViolationError::Denied {
                tier: active_tier.to_string(),
                violations,
            })
        }
    }
}
