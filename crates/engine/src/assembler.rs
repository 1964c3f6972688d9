//! Recipe assembly from the merged composition and the chosen template.

use promptsmith_core::{AcceptedCategory, ExplanationBuilder, Phase, Recipe, RecipeAdapter};

use crate::merger::Merged;

/// Build the immutable recipe. `categories` are in prompt order.
pub fn assemble(
    template_id: &str,
    merged: &Merged,
    categories: &[&AcceptedCategory],
    explain: &mut ExplanationBuilder,
) -> Recipe {
    let adapters: Vec<RecipeAdapter> = merged
        .adapters
        .iter()
        .map(|a| RecipeAdapter {
            name: a.name.clone(),
            strength: a.strength,
        })
        .collect();
    let settings = merged
        .settings
        .iter()
        .map(|(name, s)| (name.clone(), s.value))
        .collect();
    let ids: Vec<String> = categories.iter().map(|c| c.id.clone()).collect();

    explain.record(
        Phase::Assemble,
        "recipe",
        format!(
            "{} categories, {} adapters, {} settings",
            ids.len(),
            adapters.len(),
            merged.settings.len()
        ),
        Some(template_id),
    );

    Recipe::new(
        template_id.to_string(),
        merged.positive_prompt.clone(),
        merged.negative_prompt.clone(),
        adapters,
        settings,
        ids,
    )
}
