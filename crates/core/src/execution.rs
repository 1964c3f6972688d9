//! Collaborator seams: execution backends and tracking sinks.
//!
//! The engine never executes a recipe or persists anything itself. Front ends
//! hand recipes to an [`ExecutionBackend`] and forward composition records to
//! a [`TrackingSink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::explain::ExplanationBlock;
use crate::recipe::{ProvenanceHashes, Recipe};

/// Handle returned by a backend once a recipe has been accepted for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    pub backend: String,
}

/// The execution collaborator.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend name (e.g. "comfyui", "local").
    fn name(&self) -> &str;

    /// Turn a recipe into a concrete job.
    async fn submit(&self, recipe: &Recipe) -> Result<JobTicket, ExecutionError>;
}

/// Everything the tracking collaborator receives for one composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub request_text: String,
    pub recipe: Recipe,
    pub explanation: ExplanationBlock,
    pub provenance: ProvenanceHashes,
    /// Registry snapshot generation the recipe was composed against.
    pub snapshot_generation: u64,
    /// Set when the recipe was handed to a backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobTicket>,
}

/// Sink for composition records (experiment tracking, audit trails).
pub trait TrackingSink: Send + Sync {
    fn record(&self, record: &CompositionRecord);
}
