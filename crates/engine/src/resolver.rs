//! Conflict and priority resolution.
//!
//! Every comparison uses one rank key: priority descending, explicit before
//! inferred, confidence descending, id ascending. Conflicts, the subject cap
//! and per-type caps are recomputed over a shrinking pool until every kept
//! category has its requirements kept too. Every exclusion is recorded as a
//! warning and an explanation step.

use promptsmith_core::{
    AcceptedCategory, CandidateMatch, CategoryDefinition, CategoryType, ConflictResolution,
    ConflictSubject, EmptyCompositionError, ExplanationBuilder, Phase, Role, Warning,
};
use promptsmith_registry::RegistrySnapshot;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// Accepted categories in rank order plus the warnings raised on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub accepted: Vec<AcceptedCategory>,
    pub warnings: Vec<Warning>,
}

impl Resolution {
    /// Accepted categories in prompt order: by type, then rank.
    pub fn in_prompt_order(&self) -> Vec<&AcceptedCategory> {
        let mut ordered: Vec<&AcceptedCategory> = self.accepted.iter().collect();
        ordered.sort_by_key(|c| c.kind.prompt_rank());
        ordered
    }
}

struct Ranked<'s> {
    def: &'s CategoryDefinition,
    candidate: CandidateMatch,
}

/// One removal, replayed into the explanation once the pool settles.
struct Exclusion {
    id: String,
    action: &'static str,
    detail: String,
    warning: Warning,
}

/// The primary subject of a pass and the subject cap it imposes.
struct Primary {
    id: String,
    cap: u32,
}

fn rank_cmp(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    b.def
        .priority()
        .cmp(&a.def.priority())
        .then_with(|| a.candidate.kind.cmp(&b.candidate.kind))
        .then_with(|| b.candidate.confidence.total_cmp(&a.candidate.confidence))
        .then_with(|| a.def.id.cmp(&b.def.id))
}

/// Resolve policy-filtered candidates into an accepted set.
pub fn resolve(
    snapshot: &RegistrySnapshot,
    candidates: Vec<CandidateMatch>,
    explain: &mut ExplanationBuilder,
) -> Result<Resolution, EmptyCompositionError> {
    let mut ranked: Vec<Ranked<'_>> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let def = snapshot.get(&candidate.category_id)?;
            Some(Ranked { def, candidate })
        })
        .collect();
    ranked.sort_by(rank_cmp);

    let mut pool: Vec<&Ranked<'_>> = ranked.iter().collect();
    let mut dependency_drops: Vec<Exclusion> = Vec::new();
    let (kept, exclusions, primary) = loop {
        let mut exclusions = Vec::new();
        let kept = drop_conflicts(&pool, &mut exclusions);
        let (kept, primary) = cap_subjects(kept, &mut exclusions);
        let kept = cap_types(kept, &mut exclusions);
        match first_unmet(&pool, &kept) {
            Some((id, missing)) => {
                debug!(category = %id, ?missing, "Requirement unmet, dropping");
                pool.retain(|r| r.def.id != id);
                dependency_drops.push(Exclusion {
                    detail: format!("requires [{}]", missing.join(", ")),
                    action: "drop_dependency",
                    warning: Warning::DependencyMissing {
                        category: id.clone(),
                        missing,
                    },
                    id,
                });
            }
            None => break (kept, exclusions, primary),
        }
    };

    if let Some(primary) = &primary {
        explain.record(
            Phase::Resolve,
            "primary",
            format!("highest-ranked subject (allows {} subject(s))", primary.cap),
            Some(&primary.id),
        );
        let first_subject = ranked.iter().find(|r| r.def.kind == CategoryType::Subject);
        if let Some(dropped) = first_subject.filter(|r| r.def.id != primary.id) {
            explain.record(
                Phase::Resolve,
                "promote",
                format!(
                    "'{}' promoted to primary subject after '{}' was dropped",
                    primary.id, dropped.def.id
                ),
                Some(&primary.id),
            );
        }
    }

    let mut warnings = Vec::new();
    for e in exclusions.into_iter().chain(dependency_drops) {
        explain.record(Phase::Resolve, e.action, e.detail, Some(&e.id));
        warnings.push(e.warning);
    }

    if kept.is_empty() {
        return Err(EmptyCompositionError {
            exclusions: warnings.iter().map(ToString::to_string).collect(),
        });
    }

    let primary_id = primary.as_ref().map(|p| p.id.as_str());
    let mut accepted: Vec<AcceptedCategory> = kept
        .iter()
        .map(|r| {
            let role = if primary_id == Some(r.def.id.as_str()) {
                Role::PrimarySubject
            } else {
                Role::for_type(r.def.kind)
            };
            explain.record(
                Phase::Resolve,
                "accept",
                format!(
                    "{role} (priority {}, {:?} match, confidence {:.2})",
                    r.def.priority(),
                    r.candidate.kind,
                    r.candidate.confidence
                ),
                Some(&r.def.id),
            );
            AcceptedCategory {
                id: r.def.id.clone(),
                kind: r.def.kind,
                role,
                priority: r.def.priority(),
                match_kind: r.candidate.kind,
                confidence: r.candidate.confidence,
                enhanced_by: Vec::new(),
            }
        })
        .collect();

    annotate_enhancements(&kept, &mut accepted, explain);

    debug!(accepted = accepted.len(), warnings = warnings.len(), "Resolution complete");
    Ok(Resolution { accepted, warnings })
}

/// Walk in rank order; a category conflicting with one already kept is dropped.
fn drop_conflicts<'r, 's>(
    pool: &[&'r Ranked<'s>],
    exclusions: &mut Vec<Exclusion>,
) -> Vec<&'r Ranked<'s>> {
    let mut kept: Vec<&'r Ranked<'s>> = Vec::with_capacity(pool.len());
    for &r in pool {
        match kept.iter().find(|k| k.def.conflicts_with(r.def)) {
            Some(winner) => {
                let reason = format!(
                    "conflicts with '{}' (priority {} vs {})",
                    winner.def.id,
                    winner.def.priority(),
                    r.def.priority()
                );
                exclusions.push(Exclusion {
                    id: r.def.id.clone(),
                    action: "drop_conflict",
                    detail: reason.clone(),
                    warning: Warning::ConflictResolved(ConflictResolution {
                        kept: winner.def.id.clone(),
                        dropped: r.def.id.clone(),
                        subject: ConflictSubject::Category,
                        reason,
                    }),
                });
            }
            None => kept.push(r),
        }
    }
    kept
}

/// Members of one type that fit under `cap`, plus extras compatible with
/// every member already kept. Returns the kept set and the rest.
fn within_cap<'r, 's>(
    members: Vec<&'r Ranked<'s>>,
    cap: u32,
) -> (Vec<&'r Ranked<'s>>, Vec<&'r Ranked<'s>>) {
    let mut kept: Vec<&'r Ranked<'s>> = Vec::new();
    let mut over = Vec::new();
    for r in members {
        if kept.len() < cap as usize || kept.iter().all(|k| k.def.compatible_with(r.def)) {
            kept.push(r);
        } else {
            over.push(r);
        }
    }
    (kept, over)
}

/// The top-ranked subject becomes primary and caps the subject count.
fn cap_subjects<'r, 's>(
    pool: Vec<&'r Ranked<'s>>,
    exclusions: &mut Vec<Exclusion>,
) -> (Vec<&'r Ranked<'s>>, Option<Primary>) {
    let Some(first) = pool.iter().find(|r| r.def.kind == CategoryType::Subject) else {
        return (pool, None);
    };
    let primary = Primary {
        id: first.def.id.clone(),
        cap: first.def.max_per_type(),
    };
    let subjects = pool
        .iter()
        .copied()
        .filter(|r| r.def.kind == CategoryType::Subject)
        .collect();
    let (_, over) = within_cap(subjects, primary.cap);
    for r in &over {
        exclusions.push(Exclusion {
            id: r.def.id.clone(),
            action: "exclude_secondary",
            detail: format!("primary '{}' allows {} subject(s)", primary.id, primary.cap),
            warning: Warning::SecondaryExcluded {
                category: r.def.id.clone(),
                primary: primary.id.clone(),
                max_per_type: primary.cap,
            },
        });
    }
    (retain_outside(pool, &over), Some(primary))
}

/// Non-subject types keep at most the `max_per_type` of their top-ranked member.
fn cap_types<'r, 's>(
    pool: Vec<&'r Ranked<'s>>,
    exclusions: &mut Vec<Exclusion>,
) -> Vec<&'r Ranked<'s>> {
    let mut over_all: Vec<&'r Ranked<'s>> = Vec::new();
    for kind in CategoryType::PROMPT_ORDER {
        if kind == CategoryType::Subject {
            continue;
        }
        let members: Vec<&'r Ranked<'s>> =
            pool.iter().copied().filter(|r| r.def.kind == kind).collect();
        let Some(top) = members.first() else {
            continue;
        };
        let cap = top.def.max_per_type();
        let (_, over) = within_cap(members, cap);
        for r in over {
            exclusions.push(Exclusion {
                id: r.def.id.clone(),
                action: "exclude_cardinality",
                detail: format!("at most {cap} {kind} categories"),
                warning: Warning::CardinalityExceeded {
                    category: r.def.id.clone(),
                    kind,
                    max_per_type: cap,
                },
            });
            over_all.push(r);
        }
    }
    retain_outside(pool, &over_all)
}

fn retain_outside<'r, 's>(
    mut pool: Vec<&'r Ranked<'s>>,
    removed: &[&'r Ranked<'s>],
) -> Vec<&'r Ranked<'s>> {
    pool.retain(|r| !removed.iter().any(|x| x.def.id == r.def.id));
    pool
}

/// The first kept category, in rank order, with requirements outside `kept`.
/// Requirements absent from the whole pool are settled before those excluded
/// only by a cap.
fn first_unmet(pool: &[&Ranked<'_>], kept: &[&Ranked<'_>]) -> Option<(String, Vec<String>)> {
    let unmet = |present: &BTreeSet<&str>| {
        kept.iter().find_map(|r| {
            let missing: Vec<String> = r
                .def
                .composition
                .requires
                .iter()
                .filter(|id| !present.contains(id.as_str()))
                .cloned()
                .collect();
            (!missing.is_empty()).then(|| (r.def.id.clone(), missing))
        })
    };
    let in_pool: BTreeSet<&str> = pool.iter().map(|r| r.def.id.as_str()).collect();
    let in_kept: BTreeSet<&str> = kept.iter().map(|r| r.def.id.as_str()).collect();
    unmet(&in_pool).or_else(|| unmet(&in_kept))
}

fn annotate_enhancements(
    ranked: &[&Ranked<'_>],
    accepted: &mut [AcceptedCategory],
    explain: &mut ExplanationBuilder,
) {
    for r in ranked {
        for target in &r.def.composition.enhances {
            if let Some(enhanced) = accepted.iter_mut().find(|a| &a.id == target) {
                explain.record(
                    Phase::Resolve,
                    "enhance",
                    format!("enhances '{target}'"),
                    Some(&r.def.id),
                );
                enhanced.enhanced_by.push(r.def.id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use promptsmith_registry::{DefinitionSource, Loader, SourceDocument};

    fn inferred(id: &str, confidence: f64) -> CandidateMatch {
        CandidateMatch {
            category_id: id.into(),
            confidence,
            matched_keywords: vec![id.into()],
            kind: promptsmith_core::MatchKind::Inferred,
        }
    }

    fn explicit(id: &str) -> CandidateMatch {
        CandidateMatch::explicit(id, format!("@{id}"))
    }

    fn ids(resolution: &Resolution) -> Vec<&str> {
        resolution.accepted.iter().map(|c| c.id.as_str()).collect()
    }

    fn load(doc: &str) -> RegistrySnapshot {
        Loader::new()
            .load(&DefinitionSource::Documents(vec![SourceDocument::new("t.toml", doc)]))
            .unwrap()
    }

    #[test]
    fn portrait_at_night_assigns_roles() {
        let snapshot = fixtures::snapshot();
        let mut explain = ExplanationBuilder::new();
        let res = resolve(
            &snapshot,
            vec![inferred("night", 0.75), inferred("portrait", 0.75)],
            &mut explain,
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["portrait", "night"]);
        assert_eq!(res.accepted[0].role, Role::PrimarySubject);
        assert_eq!(res.accepted[1].role, Role::Modifier);
        assert_eq!(res.accepted[0].enhanced_by, vec!["night".to_string()]);
        assert!(res.warnings.is_empty());
        assert_eq!(explain.finish().with_action("enhance").count(), 1);
    }

    #[test]
    fn higher_priority_style_wins_conflict() {
        let snapshot = fixtures::snapshot();
        let res = resolve(
            &snapshot,
            vec![inferred("photorealistic", 0.9), inferred("anime", 0.75)],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["anime"]);
        let conflicts: Vec<&Warning> = res.warnings.iter().collect();
        assert_eq!(conflicts.len(), 1);
        match conflicts[0] {
            Warning::ConflictResolved(c) => {
                assert_eq!(c.kept, "anime");
                assert_eq!(c.dropped, "photorealistic");
                assert_eq!(c.subject, ConflictSubject::Category);
            }
            other => panic!("Expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = resolve(&fixtures::snapshot(), vec![], &mut ExplanationBuilder::new()).unwrap_err();
        assert!(err.exclusions.is_empty());
    }

    #[test]
    fn rank_breaks_ties_by_kind_then_confidence_then_id() {
        let doc = r#"
[[categories]]
id = "b_mod"
type = "modifier"
schema_version = 3
[[categories]]
id = "a_mod"
type = "modifier"
schema_version = 3
[[categories]]
id = "c_mod"
type = "modifier"
schema_version = 3
[[categories]]
id = "d_mod"
type = "modifier"
schema_version = 3
"#;
        let snapshot = load(doc);
        let res = resolve(
            &snapshot,
            vec![
                inferred("a_mod", 0.5),
                inferred("b_mod", 0.5),
                inferred("c_mod", 0.9),
                explicit("d_mod"),
            ],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["d_mod", "c_mod", "a_mod", "b_mod"]);
    }

    #[test]
    fn extra_subjects_are_excluded_with_warning() {
        let doc = r#"
[[categories]]
id = "hero"
type = "subject"
schema_version = 3
[categories.composition]
priority = 90
max_per_type = 1
[[categories]]
id = "sidekick"
type = "subject"
schema_version = 3
[[categories]]
id = "pet"
type = "subject"
schema_version = 3
[categories.composition]
compatible_with = ["hero"]
"#;
        let snapshot = load(doc);
        let res = resolve(
            &snapshot,
            vec![inferred("sidekick", 0.8), inferred("hero", 0.8), inferred("pet", 0.8)],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        // "pet" declares compatibility with every kept subject, so it may exceed the cap.
        assert_eq!(ids(&res), vec!["hero", "pet"]);
        assert_eq!(res.accepted[1].role, Role::SecondarySubject);
        assert_eq!(
            res.warnings,
            vec![Warning::SecondaryExcluded {
                category: "sidekick".into(),
                primary: "hero".into(),
                max_per_type: 1,
            }]
        );
    }

    #[test]
    fn missing_requirements_cascade_to_fixpoint() {
        let doc = r#"
[[categories]]
id = "rim_light"
type = "modifier"
schema_version = 3
[categories.composition]
requires = ["studio"]
[[categories]]
id = "halo"
type = "modifier"
schema_version = 3
[categories.composition]
requires = ["rim_light"]
[[categories]]
id = "studio"
type = "setting"
schema_version = 3
[[categories]]
id = "grain"
type = "modifier"
schema_version = 3
"#;
        let snapshot = load(doc);
        let res = resolve(
            &snapshot,
            vec![inferred("halo", 0.9), inferred("rim_light", 0.8), inferred("grain", 0.5)],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["grain"]);
        let dropped: Vec<String> = res
            .warnings
            .iter()
            .filter_map(|w| match w {
                Warning::DependencyMissing { category, .. } => Some(category.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(dropped, vec!["rim_light".to_string(), "halo".to_string()]);
    }

    #[test]
    fn setting_cardinality_keeps_top_ranked() {
        let snapshot = fixtures::snapshot();
        let res = resolve(
            &snapshot,
            vec![inferred("studio", 0.9), inferred("boudoir", 0.9)],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["boudoir"]);
        assert!(matches!(
            &res.warnings[0],
            Warning::CardinalityExceeded { category, kind: CategoryType::Setting, max_per_type: 1 }
                if category == "studio"
        ));
    }

    #[test]
    fn dropped_primary_is_replaced_by_next_subject() {
        let doc = r#"
[[categories]]
id = "knight"
type = "subject"
schema_version = 3
[categories.composition]
priority = 80
requires = ["castle"]
[[categories]]
id = "dragon"
type = "subject"
schema_version = 3
[categories.composition]
priority = 60
[[categories]]
id = "castle"
type = "setting"
schema_version = 3
"#;
        let snapshot = load(doc);
        let mut explain = ExplanationBuilder::new();
        let res = resolve(
            &snapshot,
            vec![inferred("knight", 0.9), inferred("dragon", 0.9)],
            &mut explain,
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["dragon"]);
        assert_eq!(res.accepted[0].role, Role::PrimarySubject);
        assert_eq!(explain.finish().with_action("promote").count(), 1);
    }

    #[test]
    fn requirement_removed_by_cardinality_drops_dependent() {
        let doc = r#"
[[categories]]
id = "studio"
type = "setting"
schema_version = 3
[categories.composition]
priority = 50
[[categories]]
id = "castle"
type = "setting"
schema_version = 3
[categories.composition]
priority = 55
[[categories]]
id = "rim_light"
type = "modifier"
schema_version = 3
[categories.composition]
requires = ["studio"]
"#;
        let snapshot = load(doc);
        let mut explain = ExplanationBuilder::new();
        let res = resolve(
            &snapshot,
            vec![explicit("studio"), explicit("castle"), explicit("rim_light")],
            &mut explain,
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["castle"]);
        assert_eq!(
            res.warnings,
            vec![
                Warning::CardinalityExceeded {
                    category: "studio".into(),
                    kind: CategoryType::Setting,
                    max_per_type: 1,
                },
                Warning::DependencyMissing {
                    category: "rim_light".into(),
                    missing: vec!["studio".into()],
                },
            ]
        );
        let block = explain.finish();
        assert_eq!(block.with_action("drop_dependency").count(), 1);
        assert_eq!(block.with_action("exclude_cardinality").count(), 1);
    }

    #[test]
    fn promoted_primary_applies_its_own_subject_cap() {
        let doc = r#"
[[categories]]
id = "knight"
type = "subject"
schema_version = 3
[categories.composition]
priority = 90
max_per_type = 3
requires = ["castle"]
[[categories]]
id = "dragon"
type = "subject"
schema_version = 3
[categories.composition]
priority = 60
max_per_type = 1
[[categories]]
id = "squire"
type = "subject"
schema_version = 3
[categories.composition]
priority = 50
"#;
        let snapshot = load(doc);
        let res = resolve(
            &snapshot,
            vec![explicit("knight"), explicit("dragon"), explicit("squire")],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        assert_eq!(ids(&res), vec!["dragon"]);
        assert_eq!(res.accepted[0].role, Role::PrimarySubject);
        assert!(res.warnings.contains(&Warning::SecondaryExcluded {
            category: "squire".into(),
            primary: "dragon".into(),
            max_per_type: 1,
        }));
    }

    #[test]
    fn capped_subject_is_readmitted_when_room_frees() {
        let doc = r#"
[[categories]]
id = "hero"
type = "subject"
schema_version = 3
[categories.composition]
priority = 90
max_per_type = 2
[[categories]]
id = "rival"
type = "subject"
schema_version = 3
[categories.composition]
priority = 80
[[categories]]
id = "ghost"
type = "subject"
schema_version = 3
[categories.composition]
priority = 75
requires = ["crypt"]
[[categories]]
id = "bystander"
type = "subject"
schema_version = 3
[categories.composition]
priority = 70
[[categories]]
id = "noir"
type = "style"
schema_version = 3
[categories.composition]
priority = 95
conflicts_with = ["rival"]
"#;
        let snapshot = load(doc);
        let res = resolve(
            &snapshot,
            vec![
                explicit("hero"),
                explicit("rival"),
                explicit("ghost"),
                explicit("bystander"),
                explicit("noir"),
            ],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        // rival loses its conflict and ghost its requirement, leaving room for bystander.
        assert_eq!(ids(&res), vec!["noir", "hero", "bystander"]);
        assert_eq!(res.accepted[2].role, Role::SecondarySubject);
        assert!(
            !res.warnings
                .iter()
                .any(|w| matches!(w, Warning::SecondaryExcluded { .. }))
        );
    }

    #[test]
    fn exclusions_are_listed_when_nothing_survives() {
        let doc = r#"
[[categories]]
id = "rim_light"
type = "modifier"
schema_version = 3
[categories.composition]
requires = ["studio"]
"#;
        let snapshot = load(doc);
        let err = resolve(&snapshot, vec![inferred("rim_light", 0.9)], &mut ExplanationBuilder::new())
            .unwrap_err();
        assert_eq!(err.exclusions.len(), 1);
        assert!(err.exclusions[0].contains("rim_light"));
    }

    #[test]
    fn at_most_one_primary_subject() {
        let snapshot = fixtures::snapshot();
        let res = resolve(
            &snapshot,
            vec![explicit("landscape"), explicit("portrait")],
            &mut ExplanationBuilder::new(),
        )
        .unwrap();
        let primaries = res
            .accepted
            .iter()
            .filter(|c| c.role == Role::PrimarySubject)
            .count();
        assert_eq!(primaries, 1);
        assert_eq!(res.accepted[0].id, "portrait");
    }
}
