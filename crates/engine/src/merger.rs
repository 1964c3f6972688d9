//! Fragment, adapter and setting merging.

use promptsmith_config::CompositionConfig;
use promptsmith_core::{
    AcceptedCategory, AdapterRole, CategoryDefinition, ConflictResolution, ConflictSubject,
    ExplanationBuilder, MergedAdapter, MergedSetting, Phase, Role, Warning,
};
use promptsmith_registry::RegistrySnapshot;
use std::collections::BTreeMap;

/// Merged prompt text, adapter stack and settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub adapters: Vec<MergedAdapter>,
    pub settings: BTreeMap<String, MergedSetting>,
    pub warnings: Vec<Warning>,
}

/// An accepted category with its definition and global rank (0 = highest).
struct Member<'s> {
    accepted: &'s AcceptedCategory,
    def: &'s CategoryDefinition,
    rank: usize,
}

/// One adapter request before deduplication.
struct Contribution<'s> {
    name: &'s str,
    strength: f64,
    role: AdapterRole,
    source: &'s str,
    rank: usize,
}

pub struct Merger<'c> {
    config: &'c CompositionConfig,
}

impl<'c> Merger<'c> {
    pub fn new(config: &'c CompositionConfig) -> Self {
        Self { config }
    }

    /// Merge `accepted` (in rank order) with the given adapter cap.
    pub fn merge(
        &self,
        snapshot: &RegistrySnapshot,
        accepted: &[AcceptedCategory],
        cap: usize,
        explain: &mut ExplanationBuilder,
    ) -> Merged {
        let members: Vec<Member<'_>> = accepted
            .iter()
            .enumerate()
            .filter_map(|(rank, accepted)| {
                let def = snapshot.get(&accepted.id)?;
                Some(Member { accepted, def, rank })
            })
            .collect();
        let mut prompt_order: Vec<&Member<'_>> = members.iter().collect();
        prompt_order.sort_by_key(|m| (m.def.kind.prompt_rank(), m.rank));

        let mut merged = Merged {
            positive_prompt: positive_prompt(&prompt_order),
            negative_prompt: negative_prompt(&prompt_order),
            ..Merged::default()
        };
        explain.record(
            Phase::Merge,
            "prompt",
            format!("merged fragments from {} categories", members.len()),
            None,
        );

        merged.adapters = self.stack_adapters(&prompt_order, cap, &mut merged.warnings, explain);
        merged.settings = merge_settings(&members, &mut merged.warnings, explain);
        merged
    }

    fn stack_adapters(
        &self,
        prompt_order: &[&Member<'_>],
        cap: usize,
        warnings: &mut Vec<Warning>,
        explain: &mut ExplanationBuilder,
    ) -> Vec<MergedAdapter> {
        let is_secondary = |m: &Member<'_>| m.accepted.role == Role::SecondarySubject;
        let (deferred, leading): (Vec<&Member<'_>>, Vec<&Member<'_>>) =
            prompt_order.iter().copied().partition(|m| is_secondary(m));

        let mut contributions = Vec::new();
        for group in [&leading, &deferred] {
            for m in group.iter() {
                contributions.extend(m.def.adapters.required.iter().map(|a| Contribution {
                    name: &a.name,
                    strength: a.strength,
                    role: m.def.adapter_role(a),
                    source: &m.def.id,
                    rank: m.rank,
                }));
            }
            let mut recommended: Vec<Contribution<'_>> = group
                .iter()
                .flat_map(|m| {
                    m.def.adapters.recommended.iter().map(move |a| Contribution {
                        name: &a.name,
                        strength: a.strength,
                        role: m.def.adapter_role(a),
                        source: &m.def.id,
                        rank: m.rank,
                    })
                })
                .collect();
            recommended.sort_by_key(|c| (self.config.role_rank(c.role), c.rank));
            contributions.extend(recommended);
        }

        let mut stack: Vec<MergedAdapter> = Vec::new();
        for c in &contributions {
            if stack.iter().any(|a| a.name == c.name) {
                continue;
            }
            // The highest-ranked requester decides the strength.
            let strength = contributions
                .iter()
                .filter(|o| o.name == c.name)
                .min_by_key(|o| o.rank)
                .map_or(c.strength, |o| o.strength);
            stack.push(MergedAdapter {
                name: c.name.to_string(),
                strength,
                role: c.role,
                source: c.source.to_string(),
            });
        }

        if stack.len() > cap {
            let dropped: Vec<String> = stack.drain(cap..).map(|a| a.name).collect();
            explain.record(
                Phase::Merge,
                "truncate",
                format!("cap {cap} exceeded, dropped [{}]", dropped.join(", ")),
                None,
            );
            warnings.push(Warning::AdapterCapExceeded { cap, dropped });
        }

        stack.retain(|adapter| {
            let Some(avoider) = prompt_order.iter().find(|m| {
                m.def.id != adapter.source && m.def.adapters.avoid.contains(&adapter.name)
            }) else {
                return true;
            };
            let reason = format!("'{}' avoids adapter '{}'", avoider.def.id, adapter.name);
            explain.record(Phase::Merge, "drop_adapter", reason.clone(), Some(&avoider.def.id));
            warnings.push(Warning::ConflictResolved(ConflictResolution {
                kept: avoider.def.id.clone(),
                dropped: adapter.name.clone(),
                subject: ConflictSubject::Adapter,
                reason,
            }));
            false
        });

        for adapter in &stack {
            let Some(winner) = contributions
                .iter()
                .filter(|c| c.name == adapter.name)
                .min_by_key(|c| c.rank)
            else {
                continue;
            };
            for other in contributions
                .iter()
                .filter(|c| c.name == adapter.name && c.strength != winner.strength)
            {
                explain.record(
                    Phase::Merge,
                    "strength",
                    format!(
                        "'{}' kept {} from '{}', ignored {} from '{}'",
                        adapter.name, winner.strength, winner.source, other.strength, other.source
                    ),
                    Some(winner.source),
                );
                warnings.push(Warning::StrengthDiscrepancy {
                    adapter: adapter.name.clone(),
                    kept_from: winner.source.to_string(),
                    kept_strength: winner.strength,
                    ignored_from: other.source.to_string(),
                    ignored_strength: other.strength,
                });
            }
        }

        explain.record(
            Phase::Merge,
            "adapters",
            format!(
                "stack [{}]",
                stack.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
            ),
            None,
        );
        stack
    }
}

/// Required fragments before optional ones within each type, deduplicated.
fn positive_prompt(prompt_order: &[&Member<'_>]) -> String {
    let mut fragments: Vec<&str> = Vec::new();
    let mut start = 0;
    while start < prompt_order.len() {
        let kind = prompt_order[start].def.kind;
        let end = prompt_order[start..]
            .iter()
            .position(|m| m.def.kind != kind)
            .map_or(prompt_order.len(), |offset| start + offset);
        let group = &prompt_order[start..end];
        let required = group.iter().flat_map(|m| &m.def.prompts.positive.required);
        let optional = group.iter().flat_map(|m| &m.def.prompts.positive.optional);
        push_unique(&mut fragments, required.chain(optional));
        start = end;
    }
    fragments.join(", ")
}

/// All required negatives, then optional ones not already present.
fn negative_prompt(prompt_order: &[&Member<'_>]) -> String {
    let mut fragments: Vec<&str> = Vec::new();
    push_unique(
        &mut fragments,
        prompt_order.iter().flat_map(|m| &m.def.prompts.negative.required),
    );
    push_unique(
        &mut fragments,
        prompt_order.iter().flat_map(|m| &m.def.prompts.negative.optional),
    );
    fragments.join(", ")
}

fn push_unique<'a>(out: &mut Vec<&'a str>, fragments: impl Iterator<Item = &'a String>) {
    for fragment in fragments {
        if !out.contains(&fragment.as_str()) {
            out.push(fragment);
        }
    }
}

/// Seed from the primary subject (else the top-ranked category), then let
/// every other category add settings or narrow existing ranges.
fn merge_settings(
    members: &[Member<'_>],
    warnings: &mut Vec<Warning>,
    explain: &mut ExplanationBuilder,
) -> BTreeMap<String, MergedSetting> {
    let seed = members
        .iter()
        .find(|m| m.accepted.role == Role::PrimarySubject)
        .or_else(|| members.first());
    let Some(seed) = seed else {
        return BTreeMap::new();
    };

    let mut settings: BTreeMap<String, MergedSetting> = seed
        .def
        .settings
        .iter()
        .map(|(name, range)| {
            (
                name.clone(),
                MergedSetting {
                    value: range.default,
                    min: range.min,
                    max: range.max,
                },
            )
        })
        .collect();
    if !settings.is_empty() {
        explain.record(
            Phase::Merge,
            "seed_settings",
            format!("{} setting(s)", settings.len()),
            Some(&seed.def.id),
        );
    }

    for m in members.iter().filter(|m| m.def.id != seed.def.id) {
        for (name, range) in &m.def.settings {
            let Some(current) = settings.get_mut(name) else {
                explain.record(
                    Phase::Merge,
                    "add_setting",
                    format!("{name} = {} in [{}, {}]", range.default, range.min, range.max),
                    Some(&m.def.id),
                );
                settings.insert(
                    name.clone(),
                    MergedSetting {
                        value: range.default,
                        min: range.min,
                        max: range.max,
                    },
                );
                continue;
            };
            let existing = promptsmith_core::SettingRange {
                min: current.min,
                max: current.max,
                default: current.value,
            };
            match existing.intersect(range) {
                Some((min, max)) => {
                    if min != current.min || max != current.max {
                        current.min = min;
                        current.max = max;
                        current.value = current.value.clamp(min, max);
                        explain.record(
                            Phase::Merge,
                            "narrow_setting",
                            format!("{name} narrowed to [{min}, {max}], value {}", current.value),
                            Some(&m.def.id),
                        );
                    }
                }
                None => {
                    explain.record(
                        Phase::Merge,
                        "setting_conflict",
                        format!(
                            "{name} range [{}, {}] does not overlap [{}, {}]",
                            range.min, range.max, current.min, current.max
                        ),
                        Some(&m.def.id),
                    );
                    warnings.push(Warning::SettingRangeConflict {
                        setting: name.clone(),
                        category: m.def.id.clone(),
                    });
                }
            }
        }
    }
    settings
}
