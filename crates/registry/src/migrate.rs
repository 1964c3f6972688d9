//! Schema-version migration hooks.
//!
//! Raw definitions are migrated as untyped TOML tables before typed
//! deserialization, one version step at a time, until they reach
//! [`CURRENT_SCHEMA_VERSION`].

use std::collections::BTreeMap;
use toml::{Table, Value};

/// Schema version every loaded definition ends up at.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Oldest schema version that can still be migrated.
pub const MIN_SCHEMA_VERSION: u32 = 1;

/// Upgrades a raw definition by exactly one schema version.
pub type MigrationFn = fn(&mut Table) -> Result<(), String>;

/// Version-keyed migration hooks for categories and templates.
///
/// A hook registered under version `n` upgrades a definition from `n` to
/// `n + 1`. Missing steps are no-ops.
#[derive(Debug, Clone)]
pub struct MigrationSet {
    category: BTreeMap<u32, MigrationFn>,
    template: BTreeMap<u32, MigrationFn>,
}

impl Default for MigrationSet {
    fn default() -> Self {
        Self::empty()
            .with_category_migration(1, keywords_list_to_tiers)
            .with_category_migration(2, composition_fields_to_table)
    }
}

impl MigrationSet {
    /// A set with no hooks at all.
    pub fn empty() -> Self {
        Self {
            category: BTreeMap::new(),
            template: BTreeMap::new(),
        }
    }

    pub fn with_category_migration(mut self, from_version: u32, hook: MigrationFn) -> Self {
        self.category.insert(from_version, hook);
        self
    }

    pub fn with_template_migration(mut self, from_version: u32, hook: MigrationFn) -> Self {
        self.template.insert(from_version, hook);
        self
    }

    /// Migrate a raw category in place. Returns the version it declared.
    pub(crate) fn migrate_category(&self, table: &mut Table) -> Result<u32, String> {
        run_chain(&self.category, table)
    }

    /// Migrate a raw template in place. Returns the version it declared.
    pub(crate) fn migrate_template(&self, table: &mut Table) -> Result<u32, String> {
        run_chain(&self.template, table)
    }
}

fn run_chain(chain: &BTreeMap<u32, MigrationFn>, table: &mut Table) -> Result<u32, String> {
    let declared = match table.get("schema_version") {
        Some(Value::Integer(v)) => u32::try_from(*v)
            .map_err(|_| format!("schema_version {v} is out of range"))?,
        Some(_) => return Err("schema_version must be an integer".into()),
        None => return Err("missing schema_version".into()),
    };
    if declared < MIN_SCHEMA_VERSION {
        return Err(format!(
            "schema version {declared} is older than the minimum supported version {MIN_SCHEMA_VERSION}"
        ));
    }
    if declared > CURRENT_SCHEMA_VERSION {
        return Err(format!(
            "schema version {declared} is newer than the supported version {CURRENT_SCHEMA_VERSION}"
        ));
    }
    for version in declared..CURRENT_SCHEMA_VERSION {
        if let Some(hook) = chain.get(&version) {
            hook(table).map_err(|e| format!("migration {version}→{}: {e}", version + 1))?;
        }
    }
    table.insert(
        "schema_version".into(),
        Value::Integer(i64::from(CURRENT_SCHEMA_VERSION)),
    );
    Ok(declared)
}

/// v1 → v2: a flat `keywords = [..]` list becomes `keywords.primary`.
fn keywords_list_to_tiers(table: &mut Table) -> Result<(), String> {
    if let Some(Value::Array(list)) = table.get("keywords") {
        let mut tiers = Table::new();
        tiers.insert("primary".into(), Value::Array(list.clone()));
        table.insert("keywords".into(), Value::Table(tiers));
    }
    Ok(())
}

/// v2 → v3: top-level `priority`, `conflicts_with` and `requires` move into
/// the `composition` table.
fn composition_fields_to_table(table: &mut Table) -> Result<(), String> {
    const MOVED: [&str; 3] = ["priority", "conflicts_with", "requires"];
    if !MOVED.iter().any(|k| table.contains_key(*k)) {
        return Ok(());
    }
    let mut composition = match table.remove("composition") {
        Some(Value::Table(t)) => t,
        Some(_) => return Err("composition must be a table".into()),
        None => Table::new(),
    };
    for key in MOVED {
        if let Some(value) = table.remove(key) {
            if composition.contains_key(key) {
                return Err(format!("'{key}' is declared both at top level and in composition"));
            }
            composition.insert(key.into(), value);
        }
    }
    table.insert("composition".into(), Value::Table(composition));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Table {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn v1_definition_is_migrated_to_current() {
        let mut t = parse(
            r#"
id = "night"
type = "modifier"
schema_version = 1
keywords = ["night", "midnight"]
priority = 40
conflicts_with = ["daylight"]
"#,
        );
        let declared = MigrationSet::default().migrate_category(&mut t).unwrap();
        assert_eq!(declared, 1);
        assert_eq!(t["schema_version"].as_integer(), Some(3));
        assert_eq!(t["keywords"]["primary"].as_array().unwrap().len(), 2);
        assert_eq!(t["composition"]["priority"].as_integer(), Some(40));
        assert!(!t.contains_key("priority"));
    }

    #[test]
    fn current_definition_is_untouched() {
        let mut t = parse("id = \"x\"\nschema_version = 3\n[keywords]\nprimary = [\"x\"]\n");
        let before = t.clone();
        MigrationSet::default().migrate_category(&mut t).unwrap();
        assert_eq!(t, before);
    }

    #[test]
    fn too_old_version_is_rejected() {
        let mut t = parse("schema_version = 0");
        let err = MigrationSet::default().migrate_category(&mut t).unwrap_err();
        assert!(err.contains("minimum supported"));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut t = parse("schema_version = 9");
        assert!(MigrationSet::default().migrate_template(&mut t).is_err());
    }

    #[test]
    fn duplicate_moved_field_is_an_error() {
        let mut t = parse("schema_version = 2\npriority = 5\n[composition]\npriority = 6\n");
        let err = MigrationSet::default().migrate_category(&mut t).unwrap_err();
        assert!(err.contains("priority"));
    }

    #[test]
    fn custom_hooks_run_in_version_order() {
        fn tag_two(t: &mut Table) -> Result<(), String> {
            t.insert("from_two".into(), Value::Boolean(true));
            Ok(())
        }
        let set = MigrationSet::empty().with_template_migration(2, tag_two);
        let mut t = parse("schema_version = 2");
        set.migrate_template(&mut t).unwrap();
        assert_eq!(t["from_two"].as_bool(), Some(true));
    }
}
