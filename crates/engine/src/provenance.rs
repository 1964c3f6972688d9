//! Provenance fingerprints.
//!
//! `recipe_hash` covers a canonical JSON rendering of the recipe with a fixed
//! field order and every number printed with exactly four decimals, so float
//! noise below that precision never changes the hash. `category_set_hash`
//! covers the schema version plus each accepted definition's content
//! fingerprint, so editing a definition changes it even when the accepted ids
//! stay the same.

use promptsmith_core::{CategoryDefinition, ProvenanceHashes, Recipe};
use sha2::{Digest, Sha256};

pub fn fingerprint<'a>(
    recipe: &Recipe,
    accepted: impl IntoIterator<Item = &'a CategoryDefinition>,
    schema_version: u32,
) -> ProvenanceHashes {
    ProvenanceHashes {
        recipe_hash: recipe_hash(recipe),
        category_set_hash: category_set_hash(accepted, schema_version),
        schema_version,
    }
}

pub fn recipe_hash(recipe: &Recipe) -> String {
    sha256_hex(canonical_json(recipe).as_bytes())
}

pub fn category_set_hash<'a>(
    accepted: impl IntoIterator<Item = &'a CategoryDefinition>,
    schema_version: u32,
) -> String {
    let mut lines: Vec<String> = accepted
        .into_iter()
        .map(|def| format!("{}:{}", def.id, def.fingerprint))
        .collect();
    lines.sort();
    let mut body = format!("schema_version:{schema_version}\n");
    for line in lines {
        body.push_str(&line);
        body.push('\n');
    }
    sha256_hex(body.as_bytes())
}

/// Canonical JSON: fixed field order, sorted settings, 4-decimal numbers.
pub fn canonical_json(recipe: &Recipe) -> String {
    let adapters: Vec<String> = recipe
        .adapters()
        .iter()
        .map(|a| {
            format!(
                "{{\"name\":{},\"strength\":{}}}",
                quote(&a.name),
                number(a.strength)
            )
        })
        .collect();
    let settings: Vec<String> = recipe
        .settings()
        .iter()
        .map(|(name, value)| format!("{}:{}", quote(name), number(*value)))
        .collect();
    let categories: Vec<String> = recipe.categories().iter().map(|id| quote(id)).collect();

    format!(
        "{{\"template_id\":{},\"positive_prompt\":{},\"negative_prompt\":{},\
         \"adapters\":[{}],\"settings\":{{{}}},\"categories\":[{}]}}",
        quote(recipe.template_id()),
        quote(recipe.positive_prompt()),
        quote(recipe.negative_prompt()),
        adapters.join(","),
        settings.join(","),
        categories.join(",")
    )
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn number(value: f64) -> String {
    // -0.0 and 0.0 must hash the same.
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:.4}")
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
