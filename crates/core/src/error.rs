//! Error types for PromptSmith.
//!
//! Uses `thiserror` for ergonomic error definitions. Fatal errors abort before
//! a recipe exists; non-fatal findings are `Warning`s (see `composition`).

use crate::template::HardConstraint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all PromptSmith operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaValidationError),

    #[error("Empty composition: {0}")]
    EmptyComposition(#[from] EmptyCompositionError),

    #[error("Template selection failed: {0}")]
    TemplateSelection(#[from] TemplateSelectionError),

    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] PolicyViolationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A malformed definition. Aborts the whole registry load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {pointer}: {message}")]
pub struct SchemaValidationError {
    /// Document the definition came from.
    pub path: String,
    /// Location inside the document (`categories[2].adapters.required[0].strength`).
    pub pointer: String,
    pub message: String,
}

impl SchemaValidationError {
    pub fn new(
        path: impl Into<String>,
        pointer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

/// An explicit marker that names no known category. Parsing continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("unknown tag '{tag}'{}", format_suggestions(.suggestions))]
pub struct UnknownTagError {
    pub tag: String,
    /// Known ids ranked by string distance, closest first.
    pub suggestions: Vec<String>,
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

/// No category survived resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no category survived resolution ({} exclusion(s){})", .exclusions.len(), format_exclusions(.exclusions))]
pub struct EmptyCompositionError {
    /// One human-readable reason per excluded candidate.
    pub exclusions: Vec<String>,
}

fn format_exclusions(exclusions: &[String]) -> String {
    if exclusions.is_empty() {
        String::new()
    } else {
        format!(": {}", exclusions.join("; "))
    }
}

/// No template satisfies the hard constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no template satisfies the merged requirements: {}", format_rejections(.rejections))]
pub struct TemplateSelectionError {
    pub rejections: Vec<TemplateRejection>,
}

/// Why one template was eliminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRejection {
    pub template_id: String,
    pub failed: Vec<HardConstraint>,
}

fn format_rejections(rejections: &[TemplateRejection]) -> String {
    if rejections.is_empty() {
        return "no templates are registered".into();
    }
    rejections
        .iter()
        .map(|r| {
            let reasons: Vec<String> = r.failed.iter().map(ToString::to_string).collect();
            format!("{} ({})", r.template_id, reasons.join("; "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Post-assembly policy failure. No recipe is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolationError {
    #[error("tier '{tier}' denies {}", .violations.join(", "))]
    Denied { tier: String, violations: Vec<String> },

    #[error("unknown policy tier '{0}'")]
    UnknownTier(String),
}

/// Failure reported by the execution collaborator.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("backend rejected recipe: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_lists_suggestions() {
        let err = UnknownTagError {
            tag: "portait".into(),
            suggestions: vec!["portrait".into(), "port".into()],
        };
        let text = err.to_string();
        assert!(text.contains("portait"));
        assert!(text.contains("did you mean: portrait, port?"));
    }

    #[test]
    fn template_selection_names_each_failure() {
        let err = Error::TemplateSelection(TemplateSelectionError {
            rejections: vec![TemplateRejection {
                template_id: "sdxl_basic".into(),
                failed: vec![HardConstraint::AdapterCapacity { required: 5, max: 3 }],
            }],
        });
        let text = err.to_string();
        assert!(text.contains("sdxl_basic"));
        assert!(text.contains("caps at 3"));
    }

    #[test]
    fn schema_error_carries_path_and_pointer() {
        let err = SchemaValidationError::new("styles.toml", "categories[0].id", "invalid id");
        assert_eq!(err.to_string(), "styles.toml: categories[0].id: invalid id");
    }

    #[test]
    fn policy_violation_lists_items() {
        let err = PolicyViolationError::Denied {
            tier: "general".into(),
            violations: vec!["adapter 'nsfw_detail'".into()],
        };
        assert!(err.to_string().contains("nsfw_detail"));
    }
}
