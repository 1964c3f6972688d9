//! Atomic snapshot swapping.
//!
//! Readers clone the current `Arc` and keep using it for the whole request;
//! a reload builds a complete new snapshot first and only then swaps the
//! pointer, so a failed load never disturbs the live snapshot.

use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::loader::{DefinitionSource, Loader};
use crate::snapshot::RegistrySnapshot;
use crate::RegistryResult;

/// Shared handle to the current registry snapshot.
pub struct RegistryHandle {
    current: RwLock<Arc<RegistrySnapshot>>,
    loader: Loader,
}

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("RegistryHandle")
            .field("generation", &snapshot.generation())
            .field("categories", &snapshot.category_count())
            .field("templates", &snapshot.template_count())
            .finish()
    }
}

impl RegistryHandle {
    /// Wrap an initial snapshot as generation 1.
    pub fn new(mut snapshot: RegistrySnapshot) -> Self {
        snapshot.set_generation(1);
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            loader: Loader::new(),
        }
    }

    /// Load the initial snapshot from `source`.
    pub fn open(loader: Loader, source: &DefinitionSource) -> RegistryResult<Self> {
        let mut snapshot = loader.load(source)?;
        snapshot.set_generation(1);
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            loader,
        })
    }

    /// The snapshot new requests should use.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current snapshot. Returns the new one.
    pub fn swap(&self, mut snapshot: RegistrySnapshot) -> Arc<RegistrySnapshot> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        snapshot.set_generation(guard.generation() + 1);
        let next = Arc::new(snapshot);
        *guard = Arc::clone(&next);
        info!(
            generation = next.generation(),
            categories = next.category_count(),
            templates = next.template_count(),
            "Registry snapshot swapped"
        );
        next
    }

    /// Load `source` and swap it in. On failure the current snapshot stays live.
    pub fn reload(&self, source: &DefinitionSource) -> RegistryResult<Arc<RegistrySnapshot>> {
        match self.loader.load(source) {
            Ok(snapshot) => Ok(self.swap(snapshot)),
            Err(e) => {
                warn!(error = %e, "Registry reload failed, keeping current snapshot");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceDocument;

    fn source(fragment: &str) -> DefinitionSource {
        let doc = format!(
            "[[categories]]\nid = \"night\"\ntype = \"modifier\"\nschema_version = 3\n\
             [categories.prompts.positive]\nrequired = [\"{fragment}\"]\n"
        );
        DefinitionSource::Documents(vec![SourceDocument::new("night.toml", doc)])
    }

    #[test]
    fn reload_swaps_and_bumps_generation() {
        let handle = RegistryHandle::open(Loader::new(), &source("night scene")).unwrap();
        let before = handle.snapshot();
        assert_eq!(before.generation(), 1);

        let after = handle.reload(&source("moonlit night")).unwrap();
        assert_eq!(after.generation(), 2);
        assert_eq!(handle.snapshot().generation(), 2);

        // In-flight readers keep the snapshot they started with.
        assert_eq!(
            before.get("night").unwrap().prompts.positive.required[0],
            "night scene"
        );
        assert_ne!(
            before.get("night").unwrap().fingerprint,
            after.get("night").unwrap().fingerprint
        );
    }

    #[test]
    fn failed_reload_keeps_current_snapshot() {
        let handle = RegistryHandle::open(Loader::new(), &source("night scene")).unwrap();
        let broken = DefinitionSource::Documents(vec![SourceDocument::new("x.toml", "nonsense = [")]);
        assert!(handle.reload(&broken).is_err());
        assert_eq!(handle.snapshot().generation(), 1);
        assert!(handle.snapshot().contains("night"));
    }

    #[test]
    fn handle_is_shareable_across_threads() {
        let handle = Arc::new(RegistryHandle::open(Loader::new(), &source("night")).unwrap());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.snapshot().category_count())
            })
            .collect();
        for r in readers {
            assert_eq!(r.join().unwrap(), 1);
        }
    }
}
