//! Document loading: TOML → migrated → typed → validated definitions.

use promptsmith_core::{CategoryDefinition, SchemaValidationError, TemplateManifest};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, info, warn};

use crate::index::normalize_phrase;
use crate::migrate::{CURRENT_SCHEMA_VERSION, MigrationSet};
use crate::schema;
use crate::snapshot::RegistrySnapshot;
use crate::{RegistryError, RegistryResult};

/// Where definitions come from.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    /// Every `*.toml` file below this directory, read in sorted path order.
    Directory(PathBuf),
    /// In-memory documents, processed in the given order.
    Documents(Vec<SourceDocument>),
}

/// A named TOML document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: String,
    pub content: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Builds registry snapshots. Holds the migration hooks to apply.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    migrations: MigrationSet,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_migrations(migrations: MigrationSet) -> Self {
        Self { migrations }
    }

    /// Load every definition from `source` into a new snapshot.
    ///
    /// All-or-nothing: the first violation aborts the load.
    pub fn load(&self, source: &DefinitionSource) -> RegistryResult<RegistrySnapshot> {
        let documents = match source {
            DefinitionSource::Directory(dir) => read_directory(dir)?,
            DefinitionSource::Documents(docs) => docs.clone(),
        };

        let mut categories: BTreeMap<String, CategoryDefinition> = BTreeMap::new();
        let mut templates: BTreeMap<String, TemplateManifest> = BTreeMap::new();
        let mut origins: BTreeMap<String, String> = BTreeMap::new();

        for doc in &documents {
            let table: Table = toml::from_str(&doc.content).map_err(|e| {
                let pointer = e
                    .span()
                    .map(|span| format!("line {}", line_of(&doc.content, span.start)))
                    .unwrap_or_default();
                SchemaValidationError::new(&doc.path, pointer, e.message())
            })?;

            for (key, value) in table {
                match key.as_str() {
                    "categories" => {
                        for (i, raw) in array_of_tables(&doc.path, &key, value)?.into_iter().enumerate() {
                            let pointer = format!("categories[{i}]");
                            let def = self.load_category(&doc.path, &pointer, raw)?;
                            claim_id(&mut origins, &def.id, &doc.path, &pointer)?;
                            categories.insert(def.id.clone(), def);
                        }
                    }
                    "templates" => {
                        for (i, raw) in array_of_tables(&doc.path, &key, value)?.into_iter().enumerate() {
                            let pointer = format!("templates[{i}]");
                            let template = self.load_template(&doc.path, &pointer, raw)?;
                            claim_id(&mut origins, &template.id, &doc.path, &pointer)?;
                            templates.insert(template.id.clone(), template);
                        }
                    }
                    other => {
                        return Err(SchemaValidationError::new(
                            &doc.path,
                            other,
                            "unknown top-level key (expected 'categories' or 'templates')",
                        )
                        .into());
                    }
                }
            }
        }

        warn_dangling_references(&categories);

        info!(
            documents = documents.len(),
            categories = categories.len(),
            templates = templates.len(),
            schema_version = CURRENT_SCHEMA_VERSION,
            "Definitions loaded"
        );
        Ok(RegistrySnapshot::new(
            categories,
            templates,
            CURRENT_SCHEMA_VERSION,
            documents.len(),
        ))
    }

    fn load_category(
        &self,
        path: &str,
        pointer: &str,
        mut raw: Table,
    ) -> RegistryResult<CategoryDefinition> {
        let declared = self
            .migrations
            .migrate_category(&mut raw)
            .map_err(|e| SchemaValidationError::new(path, format!("{pointer}.schema_version"), e))?;
        if declared != CURRENT_SCHEMA_VERSION {
            debug!(path, pointer, declared, "Migrated category definition");
        }

        let mut def: CategoryDefinition = deserialize(path, pointer, raw)?;
        schema::validate_category(&def).map_err(|(field, message)| {
            SchemaValidationError::new(path, format!("{pointer}.{field}"), message)
        })?;

        normalize_keywords(&mut def);
        def.fingerprint = fingerprint(&def)
            .map_err(|e| SchemaValidationError::new(path, pointer, e))?;
        Ok(def)
    }

    fn load_template(
        &self,
        path: &str,
        pointer: &str,
        mut raw: Table,
    ) -> RegistryResult<TemplateManifest> {
        self.migrations
            .migrate_template(&mut raw)
            .map_err(|e| SchemaValidationError::new(path, format!("{pointer}.schema_version"), e))?;
        let template: TemplateManifest = deserialize(path, pointer, raw)?;
        schema::validate_template(&template).map_err(|(field, message)| {
            SchemaValidationError::new(path, format!("{pointer}.{field}"), message)
        })?;
        Ok(template)
    }
}

fn deserialize<T: DeserializeOwned>(path: &str, pointer: &str, raw: Table) -> RegistryResult<T> {
    Value::Table(raw)
        .try_into()
        .map_err(|e: toml::de::Error| SchemaValidationError::new(path, pointer, e.message()).into())
}

fn array_of_tables(path: &str, key: &str, value: Value) -> RegistryResult<Vec<Table>> {
    let Value::Array(items) = value else {
        return Err(SchemaValidationError::new(path, key, "expected an array of tables").into());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Table(t) => Ok(t),
            _ => Err(SchemaValidationError::new(path, format!("{key}[{i}]"), "expected a table").into()),
        })
        .collect()
}

/// Ids are unique across categories and templates of every document.
fn claim_id(
    origins: &mut BTreeMap<String, String>,
    id: &str,
    path: &str,
    pointer: &str,
) -> RegistryResult<()> {
    if let Some(first) = origins.get(id) {
        return Err(SchemaValidationError::new(
            path,
            format!("{pointer}.id"),
            format!("duplicate id '{id}' (first defined in {first})"),
        )
        .into());
    }
    origins.insert(id.to_string(), path.to_string());
    Ok(())
}

fn normalize_keywords(def: &mut CategoryDefinition) {
    for list in [
        &mut def.keywords.primary,
        &mut def.keywords.secondary,
        &mut def.keywords.specific,
    ] {
        for keyword in list.iter_mut() {
            *keyword = normalize_phrase(keyword);
        }
    }
}

/// SHA-256 over the definition's canonical JSON form.
fn fingerprint(def: &CategoryDefinition) -> Result<String, String> {
    let bytes = serde_json::to_vec(def).map_err(|e| e.to_string())?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn warn_dangling_references(categories: &BTreeMap<String, CategoryDefinition>) {
    for def in categories.values() {
        for id in def.referenced_ids() {
            if !categories.contains_key(id) {
                warn!(category = %def.id, reference = %id, "Composition rule references unknown category");
            }
        }
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

fn read_directory(dir: &Path) -> RegistryResult<Vec<SourceDocument>> {
    let mut paths = Vec::new();
    collect_toml_files(dir, &mut paths)?;
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let content = std::fs::read_to_string(&path).map_err(|e| RegistryError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(SourceDocument::new(path.display().to_string(), content))
        })
        .collect()
}

fn collect_toml_files(dir: &Path, out: &mut Vec<PathBuf>) -> RegistryResult<()> {
    let io_err = |e: std::io::Error| RegistryError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_toml_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsmith_core::CategoryType;

    const STYLES: &str = r#"
[[categories]]
id = "anime"
type = "style"
schema_version = 3

[categories.keywords]
primary = ["Anime", "manga"]

[categories.composition]
priority = 80
conflicts_with = ["photorealistic"]

[[categories]]
id = "photorealistic"
type = "style"
schema_version = 3

[categories.keywords]
primary = ["photo"]
"#;

    const TEMPLATES: &str = r#"
[[templates]]
id = "sdxl_base"
schema_version = 3
modality = "image"
base_families = ["sdxl"]
max_adapters = 4
"#;

    fn load(docs: Vec<SourceDocument>) -> RegistryResult<RegistrySnapshot> {
        Loader::new().load(&DefinitionSource::Documents(docs))
    }

    #[test]
    fn loads_categories_and_templates() {
        let snapshot = load(vec![
            SourceDocument::new("styles.toml", STYLES),
            SourceDocument::new("templates.toml", TEMPLATES),
        ])
        .unwrap();
        assert_eq!(snapshot.list_by_type(CategoryType::Style).len(), 2);
        assert!(snapshot.template("sdxl_base").is_some());
        assert_eq!(snapshot.document_count(), 2);
    }

    #[test]
    fn keywords_are_normalized_and_fingerprint_is_set() {
        let snapshot = load(vec![SourceDocument::new("styles.toml", STYLES)]).unwrap();
        let anime = snapshot.get("anime").unwrap();
        assert_eq!(anime.keywords.primary[0], "anime");
        assert_eq!(anime.fingerprint.len(), 64);
    }

    #[test]
    fn unknown_field_aborts_with_pointer() {
        let doc = "[[categories]]\nid = \"x\"\ntype = \"style\"\nschema_version = 3\ncolour = \"red\"\n";
        let err = load(vec![SourceDocument::new("bad.toml", doc)]).unwrap_err();
        let RegistryError::Schema(err) = err else {
            panic!("expected schema error");
        };
        assert_eq!(err.path, "bad.toml");
        assert_eq!(err.pointer, "categories[0]");
        assert!(err.message.contains("colour"));
    }

    #[test]
    fn one_bad_document_aborts_the_whole_load() {
        let bad = "[[templates]]\nid = \"t\"\nschema_version = 3\nmodality = \"image\"\n";
        let err = load(vec![
            SourceDocument::new("styles.toml", STYLES),
            SourceDocument::new("broken.toml", bad),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
        assert!(err.to_string().contains("max_adapters"));
    }

    #[test]
    fn duplicate_ids_across_documents_are_rejected() {
        let err = load(vec![
            SourceDocument::new("a.toml", STYLES),
            SourceDocument::new("b.toml", STYLES),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate id 'anime'"));
        assert!(err.to_string().contains("a.toml"));
    }

    #[test]
    fn validation_errors_are_prefixed_with_definition_pointer() {
        let doc = r#"
[[categories]]
id = "ok"
type = "modifier"
schema_version = 3

[[categories]]
id = "Bad Id"
type = "modifier"
schema_version = 3
"#;
        let err = load(vec![SourceDocument::new("mods.toml", doc)]).unwrap_err();
        let RegistryError::Schema(err) = err else {
            panic!("expected schema error");
        };
        assert_eq!(err.pointer, "categories[1].id");
    }

    #[test]
    fn legacy_definitions_are_migrated() {
        let doc = r#"
[[categories]]
id = "night"
type = "modifier"
schema_version = 1
keywords = ["night"]
priority = 40
"#;
        let snapshot = load(vec![SourceDocument::new("legacy.toml", doc)]).unwrap();
        let night = snapshot.get("night").unwrap();
        assert_eq!(night.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(night.keywords.primary, vec!["night".to_string()]);
        assert_eq!(night.priority(), 40);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let doc = "[[categories]]\nid = \"x\"\ntype = \"style\"\nschema_version = 0\n";
        let err = load(vec![SourceDocument::new("old.toml", doc)]).unwrap_err();
        let RegistryError::Schema(err) = err else {
            panic!("expected schema error");
        };
        assert_eq!(err.pointer, "categories[0].schema_version");
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = load(vec![SourceDocument::new("x.toml", "[[categories]]\nid = \n")]).unwrap_err();
        let RegistryError::Schema(err) = err else {
            panic!("expected schema error");
        };
        assert!(err.pointer.starts_with("line "));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = load(vec![SourceDocument::new("x.toml", "version = 3\n")]).unwrap_err();
        assert!(err.to_string().contains("unknown top-level key"));
    }

    #[test]
    fn loads_from_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("styles")).unwrap();
        std::fs::write(dir.path().join("styles/anime.toml"), STYLES).unwrap();
        std::fs::write(dir.path().join("templates.toml"), TEMPLATES).unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let snapshot = Loader::new()
            .load(&DefinitionSource::Directory(dir.path().to_path_buf()))
            .unwrap();
        assert_eq!(snapshot.document_count(), 2);
        assert!(snapshot.get("photorealistic").is_some());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = Loader::new()
            .load(&DefinitionSource::Directory(PathBuf::from("/nonexistent/defs")))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
