//! Front-end facade over the registry handle, composer and tracker.
//!
//! `preview` composes without executing. `generate` also hands the recipe to
//! an execution backend. Both forward a record to the tracker when one is
//! attached.

use promptsmith_config::EngineConfig;
use promptsmith_core::{
    CompositionRecord, CompositionRequest, Error, ExecutionBackend, JobTicket, Result,
    TrackingSink,
};
use promptsmith_registry::{DefinitionSource, Loader, RegistryHandle};
use std::sync::Arc;
use tracing::{info, warn};

use crate::composer::{Composer, Composition};

/// A composition that was submitted for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub composition: Composition,
    pub ticket: JobTicket,
}

pub struct Studio {
    registry: Arc<RegistryHandle>,
    composer: Composer,
    tracker: Option<Arc<dyn TrackingSink>>,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("registry", &self.registry)
            .field("tracker", &self.tracker.is_some())
            .finish()
    }
}

impl Studio {
    pub fn new(registry: Arc<RegistryHandle>, composer: Composer) -> Self {
        Self {
            registry,
            composer,
            tracker: None,
        }
    }

    /// Build a studio from configuration, loading `definitions_dir`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let dir = config.definitions_dir.clone().ok_or_else(|| Error::Config {
            message: "definitions_dir is not set".into(),
        })?;
        let registry = RegistryHandle::open(Loader::new(), &DefinitionSource::Directory(dir))?;
        Ok(Self::new(Arc::new(registry), Composer::new(config)))
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn TrackingSink>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn registry(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Swap in definitions from `source`. Returns the new generation.
    pub fn reload(&self, source: &DefinitionSource) -> Result<u64> {
        Ok(self.registry.reload(source)?.generation())
    }

    /// Compose against the current snapshot without executing.
    pub fn preview(&self, request: &CompositionRequest) -> Result<Composition> {
        let snapshot = self.registry.snapshot();
        let composition = self.composer.compose(&snapshot, request)?;
        self.track(request, &composition, snapshot.generation(), None);
        Ok(composition)
    }

    /// Compose and submit the recipe to `backend`.
    pub async fn generate(
        &self,
        request: &CompositionRequest,
        backend: &dyn ExecutionBackend,
    ) -> Result<Generation> {
        let snapshot = self.registry.snapshot();
        let composition = self.composer.compose(&snapshot, request)?;
        let ticket = match backend.submit(&composition.recipe).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Recipe submission failed");
                return Err(e.into());
            }
        };
        info!(
            backend = backend.name(),
            job_id = %ticket.job_id,
            recipe_hash = %composition.provenance.recipe_hash,
            "Recipe submitted"
        );
        self.track(request, &composition, snapshot.generation(), Some(ticket.clone()));
        Ok(Generation {
            composition,
            ticket,
        })
    }

    fn track(
        &self,
        request: &CompositionRequest,
        composition: &Composition,
        generation: u64,
        job: Option<JobTicket>,
    ) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        tracker.record(&CompositionRecord {
            request_text: request.text.clone(),
            recipe: composition.recipe.clone(),
            explanation: composition.explanation.clone(),
            provenance: composition.provenance.clone(),
            snapshot_generation: generation,
            job,
        });
    }
}
