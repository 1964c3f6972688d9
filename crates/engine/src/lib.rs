//! The PromptSmith composition engine.
//!
//! Turns a free-form request into a reproducible recipe:
//!
//! 1. **Parse** explicit `@markers` and infer categories from keywords
//! 2. **Gate** candidates by content tier
//! 3. **Resolve** conflicts, requirements and per-type cardinality
//! 4. **Merge** prompt fragments, the adapter stack and numeric settings
//! 5. **Select** a template by hard constraints, then soft score
//! 6. **Assemble** the recipe and check it against the tier's allow lists
//! 7. **Fingerprint** the recipe and the accepted definitions
//!
//! Every decision is appended to an [`ExplanationBlock`] as it is made.
//!
//! [`ExplanationBlock`]: promptsmith_core::ExplanationBlock

pub mod assembler;
pub mod composer;
pub mod merger;
pub mod parser;
pub mod provenance;
pub mod resolver;
pub mod selector;
pub mod studio;
pub mod tracking;

#[cfg(test)]
mod fixtures;

pub use composer::{Composer, Composition};
pub use merger::{Merged, Merger};
pub use parser::{ParseOutcome, RequestParser};
pub use provenance::{category_set_hash, recipe_hash};
pub use resolver::{Resolution, resolve};
pub use selector::{Requirements, Selection, TemplateSelector};
pub use studio::{Generation, Studio};
pub use tracking::{MemoryTracker, TrackedComposition, TracingTracker};
