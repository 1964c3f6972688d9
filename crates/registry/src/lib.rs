//! Definition Registry: declarative category and template documents loaded
//! into immutable, schema-checked snapshots.
//!
//! Documents are TOML files holding `[[categories]]` and/or `[[templates]]`
//! arrays. Loading is all-or-nothing: the first malformed definition aborts
//! the load with its document path, field pointer and the exact violation.
//!
//! # Example Document
//!
//! ```toml
//! [[categories]]
//! id = "portrait"
//! type = "subject"
//! schema_version = 3
//!
//! [categories.keywords]
//! primary = ["portrait", "headshot"]
//! specific = ["close-up portrait"]
//!
//! [categories.prompts.positive]
//! required = ["portrait of a person"]
//! optional = ["detailed face"]
//!
//! [[categories.adapters.recommended]]
//! name = "face_detail"
//! strength = 0.6
//! role = "identity"
//!
//! [categories.composition]
//! priority = 70
//!
//! [[templates]]
//! id = "sdxl_portrait"
//! schema_version = 3
//! modality = "image"
//! base_families = ["sdxl"]
//! max_adapters = 4
//! best_for = ["portrait"]
//! ```

mod handle;
mod index;
mod loader;
mod migrate;
mod schema;
mod snapshot;

pub use handle::RegistryHandle;
pub use index::{KeywordEntry, KeywordIndex, normalize_phrase, tokenize_words};
pub use loader::{DefinitionSource, Loader, SourceDocument};
pub use migrate::{CURRENT_SCHEMA_VERSION, MIN_SCHEMA_VERSION, MigrationFn, MigrationSet};
pub use snapshot::RegistrySnapshot;

use promptsmith_core::SchemaValidationError;

/// Re-export for convenience.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Errors from the registry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error("failed to read definitions at {path}: {reason}")]
    Io { path: String, reason: String },
}

impl From<RegistryError> for promptsmith_core::Error {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Schema(e) => promptsmith_core::Error::Schema(e),
            RegistryError::Io { path, reason } => promptsmith_core::Error::Io { path, reason },
        }
    }
}
