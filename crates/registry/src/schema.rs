//! Semantic schema checks applied after typed deserialization.
//!
//! Structural problems (unknown fields, wrong types) are caught by serde;
//! these checks cover the value-level rules. Every violation is returned as a
//! `(pointer, message)` pair relative to the definition.

use promptsmith_core::{AdapterRef, CategoryDefinition, TemplateManifest};
use regex_lite::Regex;
use std::sync::OnceLock;

use crate::index::normalize_phrase;
use crate::migrate::CURRENT_SCHEMA_VERSION;

pub(crate) type Violation = (String, String);

const MAX_STRENGTH: f64 = 2.0;
const MAX_PRIORITY: i32 = 100;

const ID_PATTERN: &str = r"^[a-z0-9][a-z0-9_-]{0,63}$";

fn id_pattern() -> Result<&'static Regex, &'static str> {
    static PATTERN: OnceLock<Result<Regex, String>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ID_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(String::as_str)
}

fn violation(pointer: impl Into<String>, message: impl Into<String>) -> Violation {
    (pointer.into(), message.into())
}

pub(crate) fn check_id(id: &str) -> Result<(), Violation> {
    match_id(id_pattern(), id)
}

fn match_id(pattern: Result<&Regex, &str>, id: &str) -> Result<(), Violation> {
    let re = pattern.map_err(|e| {
        violation("id", format!("id pattern {ID_PATTERN} failed to compile: {e}"))
    })?;
    if re.is_match(id) {
        Ok(())
    } else {
        Err(violation("id", format!("'{id}' does not match {ID_PATTERN}")))
    }
}

pub(crate) fn validate_category(def: &CategoryDefinition) -> Result<(), Violation> {
    check_id(&def.id)?;

    if def.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(violation(
            "schema_version",
            format!("expected {CURRENT_SCHEMA_VERSION} after migration, found {}", def.schema_version),
        ));
    }
    if def.policy_tier.trim().is_empty() {
        return Err(violation("policy_tier", "must not be empty"));
    }

    for (tier, list) in [
        ("primary", &def.keywords.primary),
        ("secondary", &def.keywords.secondary),
        ("specific", &def.keywords.specific),
    ] {
        for (i, keyword) in list.iter().enumerate() {
            if normalize_phrase(keyword).is_empty() {
                return Err(violation(
                    format!("keywords.{tier}[{i}]"),
                    "keyword contains no word characters",
                ));
            }
        }
    }

    let prompts = &def.prompts;
    for (group, list) in [
        ("positive.required", &prompts.positive.required),
        ("positive.optional", &prompts.positive.optional),
        ("negative.required", &prompts.negative.required),
        ("negative.optional", &prompts.negative.optional),
    ] {
        if let Some(i) = list.iter().position(|f| f.trim().is_empty()) {
            return Err(violation(format!("prompts.{group}[{i}]"), "fragment is empty"));
        }
    }

    check_adapters("adapters.required", &def.adapters.required)?;
    check_adapters("adapters.recommended", &def.adapters.recommended)?;
    if let Some(i) = def.adapters.avoid.iter().position(|a| a.trim().is_empty()) {
        return Err(violation(format!("adapters.avoid[{i}]"), "adapter name is empty"));
    }

    for (name, range) in &def.settings {
        let pointer = format!("settings.{name}");
        if name.trim().is_empty() {
            return Err(violation("settings", "setting name is empty"));
        }
        if !(range.min.is_finite() && range.max.is_finite() && range.default.is_finite()) {
            return Err(violation(pointer, "values must be finite"));
        }
        if !(range.min <= range.default && range.default <= range.max) {
            return Err(violation(
                pointer,
                format!(
                    "expected min <= default <= max, got {} / {} / {}",
                    range.min, range.default, range.max
                ),
            ));
        }
    }

    let rules = &def.composition;
    if !(0..=MAX_PRIORITY).contains(&rules.priority) {
        return Err(violation(
            "composition.priority",
            format!("{} is outside 0..={MAX_PRIORITY}", rules.priority),
        ));
    }
    if rules.max_per_type == Some(0) {
        return Err(violation("composition.max_per_type", "must be at least 1"));
    }
    for (field, set) in [
        ("conflicts_with", &rules.conflicts_with),
        ("requires", &rules.requires),
        ("enhances", &rules.enhances),
        ("compatible_with", &rules.compatible_with),
    ] {
        if set.contains(&def.id) {
            return Err(violation(
                format!("composition.{field}"),
                "a category cannot reference itself",
            ));
        }
    }
    if let Some(id) = rules.requires.intersection(&rules.conflicts_with).next() {
        return Err(violation(
            "composition.requires",
            format!("'{id}' is both required and conflicting"),
        ));
    }

    Ok(())
}

fn check_adapters(prefix: &str, adapters: &[AdapterRef]) -> Result<(), Violation> {
    for (i, adapter) in adapters.iter().enumerate() {
        if adapter.name.trim().is_empty() {
            return Err(violation(format!("{prefix}[{i}].name"), "adapter name is empty"));
        }
        if !(adapter.strength.is_finite() && (0.0..=MAX_STRENGTH).contains(&adapter.strength)) {
            return Err(violation(
                format!("{prefix}[{i}].strength"),
                format!("{} is outside 0.0..={MAX_STRENGTH}", adapter.strength),
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_template(template: &TemplateManifest) -> Result<(), Violation> {
    check_id(&template.id)?;
    if template.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(violation(
            "schema_version",
            format!(
                "expected {CURRENT_SCHEMA_VERSION} after migration, found {}",
                template.schema_version
            ),
        ));
    }
    if template.modality.trim().is_empty() {
        return Err(violation("modality", "must not be empty"));
    }
    if let Some(i) = template.base_families.iter().position(|f| f.trim().is_empty()) {
        return Err(violation(format!("base_families[{i}]"), "family name is empty"));
    }
    if template.capabilities.iter().any(|c| c.trim().is_empty()) {
        return Err(violation("capabilities", "capability flag is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(extra: &str) -> CategoryDefinition {
        let doc = format!(
            "id = \"portrait\"\ntype = \"subject\"\nschema_version = 3\n{extra}"
        );
        toml::from_str(&doc).unwrap()
    }

    #[test]
    fn valid_category_passes() {
        let def = category("[settings.steps]\nmin = 20\nmax = 40\ndefault = 30\n");
        assert!(validate_category(&def).is_ok());
    }

    #[test]
    fn bad_id_is_rejected() {
        assert!(check_id("Portrait").is_err());
        assert!(check_id("-portrait").is_err());
        assert!(check_id("portrait_v2").is_ok());
    }

    #[test]
    fn id_pattern_compiles() {
        assert!(id_pattern().is_ok());
    }

    #[test]
    fn broken_pattern_is_reported_instead_of_rejecting_the_id() {
        let broken = Regex::new("(").map_err(|e| e.to_string());
        let (pointer, message) =
            match_id(broken.as_ref().map_err(String::as_str), "portrait").unwrap_err();
        assert_eq!(pointer, "id");
        assert!(message.contains("failed to compile"));
        assert!(!message.contains("does not match"));
    }

    #[test]
    fn strength_out_of_range_points_at_field() {
        let def = category(
            "[[adapters.recommended]]\nname = \"face\"\nstrength = 0.5\n\
             [[adapters.recommended]]\nname = \"skin\"\nstrength = 3.5\n",
        );
        let (pointer, message) = validate_category(&def).unwrap_err();
        assert_eq!(pointer, "adapters.recommended[1].strength");
        assert!(message.contains("3.5"));
    }

    #[test]
    fn inverted_setting_range_is_rejected() {
        let def = category("[settings.cfg]\nmin = 9.0\nmax = 4.0\ndefault = 6.0\n");
        let (pointer, _) = validate_category(&def).unwrap_err();
        assert_eq!(pointer, "settings.cfg");
    }

    #[test]
    fn self_conflict_is_rejected() {
        let def = category("[composition]\nconflicts_with = [\"portrait\"]\n");
        let (pointer, _) = validate_category(&def).unwrap_err();
        assert_eq!(pointer, "composition.conflicts_with");
    }

    #[test]
    fn zero_max_per_type_is_rejected() {
        let def = category("[composition]\nmax_per_type = 0\n");
        assert!(validate_category(&def).is_err());
    }

    #[test]
    fn template_requires_modality() {
        let t: TemplateManifest =
            toml::from_str("id = \"t\"\nschema_version = 3\nmodality = \" \"\nmax_adapters = 2\n")
                .unwrap();
        let (pointer, _) = validate_template(&t).unwrap_err();
        assert_eq!(pointer, "modality");
    }
}
