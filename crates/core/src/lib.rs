//! # PromptSmith Core
//!
//! Domain types, traits, and error definitions for the PromptSmith recipe
//! engine. This crate has no knowledge of files, configuration or hashing;
//! it defines the model every other crate implements against.
//!
//! ## Layout
//!
//! - `category` / `template`: the declarative definitions held by a registry snapshot
//! - `request`: generation requests and parsed candidate matches
//! - `composition`: roles, merged output, conflicts and warnings
//! - `recipe` / `explain`: the immutable output pair and provenance hashes
//! - `execution`: collaborator seams (execution backend, tracking sink)

pub mod category;
pub mod composition;
pub mod error;
pub mod execution;
pub mod explain;
pub mod recipe;
pub mod request;
pub mod template;

// Re-export key types at crate root for ergonomics
pub use category::{
    AdapterRecommendations, AdapterRef, AdapterRole, CategoryDefinition, CategoryType,
    CompositionRules, FragmentGroup, KeywordSet, KeywordTier, PromptFragments, SettingRange,
    TemplatePreferences,
};
pub use composition::{
    AcceptedCategory, CompositionResult, ConflictResolution, ConflictSubject, MergedAdapter,
    MergedSetting, Role, Warning,
};
pub use error::{
    EmptyCompositionError, Error, ExecutionError, PolicyViolationError, Result,
    SchemaValidationError, TemplateRejection, TemplateSelectionError, UnknownTagError,
};
pub use execution::{CompositionRecord, ExecutionBackend, JobTicket, TrackingSink};
pub use explain::{DecisionStep, ExplanationBlock, ExplanationBuilder, Phase};
pub use recipe::{ProvenanceHashes, Recipe, RecipeAdapter};
pub use request::{CandidateMatch, CompositionRequest, MatchKind};
pub use template::{HardConstraint, TemplateManifest};
